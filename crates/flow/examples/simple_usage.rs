use flow::errors::FlowError;
use flow::stubs::InMemoryInstanceRepository;
use flow::{InstanceRepository, RetryPolicy};
use std::time::Duration;

fn main() -> Result<(), FlowError> {
    let repo = InMemoryInstanceRepository::new();
    // Simular dos fallos transitorios antes de la escritura
    repo.fail_next_saves(2);
    let policy = RetryPolicy::new(4, Duration::from_millis(10));
    policy.run_blocking(|| repo.save("instance-1", br#"{"instanceId":"instance-1"}"#))
          .map_err(|(e, attempts)| FlowError::Other(format!("{} tras {} intentos", e, attempts)))?;
    println!("save calls: {}", repo.save_calls());
    println!("ids: {:?}", repo.list_ids()?);
    println!("record: {}", String::from_utf8_lossy(&repo.load("instance-1")?));
    repo.delete("instance-1")?;
    println!("after delete: {:?}", repo.list_ids()?);
    Ok(())
}
