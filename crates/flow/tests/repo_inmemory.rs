use flow::stubs::InMemoryInstanceRepository;
use flow::{FlowError, InstanceRepository, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn save_is_an_upsert() {
  let repo = InMemoryInstanceRepository::new();
  repo.save("i-1", b"v1").unwrap();
  repo.save("i-1", b"v2").unwrap();
  assert_eq!(repo.load("i-1").unwrap(), b"v2".to_vec());
  assert_eq!(repo.len(), 1);
  assert_eq!(repo.save_calls(), 2);
}

#[test]
fn load_missing_is_not_found() {
  let repo = InMemoryInstanceRepository::new();
  match repo.load("nope") {
    Err(FlowError::NotFound(msg)) => assert!(msg.contains("nope")),
    other => panic!("se esperaba NotFound, se obtuvo {:?}", other),
  }
  assert!(!repo.exists("nope").unwrap());
}

#[test]
fn delete_removes_and_is_idempotent() {
  let repo = InMemoryInstanceRepository::new();
  repo.save("i-1", b"x").unwrap();
  repo.delete("i-1").unwrap();
  repo.delete("i-1").unwrap();
  assert!(repo.is_empty());
  assert_eq!(repo.delete_calls(), 2);
}

#[test]
fn list_ids_is_sorted() {
  let repo = InMemoryInstanceRepository::new();
  for id in ["c", "a", "b"] {
    repo.save(id, b"{}").unwrap();
  }
  assert_eq!(repo.list_ids().unwrap(), vec!["a", "b", "c"]);
}

#[test]
fn injected_failures_are_consumed_in_order() {
  let repo = InMemoryInstanceRepository::new();
  repo.fail_next_saves(2);
  assert!(matches!(repo.save("i-1", b"x"), Err(FlowError::Storage(_))));
  assert!(matches!(repo.save("i-1", b"x"), Err(FlowError::Storage(_))));
  repo.save("i-1", b"x").unwrap();
  assert_eq!(repo.save_calls(), 3);
  assert!(repo.exists("i-1").unwrap());
}

#[test]
fn retry_policy_recovers_from_transient_failures() {
  let repo = Arc::new(InMemoryInstanceRepository::new());
  repo.fail_next_saves(2);
  let policy = RetryPolicy::new(3, Duration::from_millis(1));
  policy.run_blocking(|| repo.save("i-1", b"ok")).unwrap();
  assert_eq!(repo.save_calls(), 3);
  assert_eq!(repo.load("i-1").unwrap(), b"ok".to_vec());
}

#[test]
fn retry_policy_does_not_retry_conflicts() {
  let repo = InMemoryInstanceRepository::new();
  repo.push_save_failure(FlowError::Conflict("versión".into()));
  let policy = RetryPolicy::new(5, Duration::ZERO);
  let err = policy.run_blocking(|| repo.save("i-1", b"x")).unwrap_err();
  assert_eq!(err, (FlowError::Conflict("versión".into()), 1));
}

#[test]
fn arc_repository_delegates() {
  let repo: Arc<dyn InstanceRepository> = Arc::new(InMemoryInstanceRepository::new());
  let shared = Arc::clone(&repo);
  shared.save("i-1", b"x").unwrap();
  assert_eq!(repo.list_ids().unwrap(), vec!["i-1"]);
}
