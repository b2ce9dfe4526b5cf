use broker_domain::{Aes256GcmCodec, InstanceStatus, ParameterMap, WorkflowProgress, WorkflowType};
use broker_persistence::DieselInstanceRepository;
use broker_providers::fakes::ops;
use broker_providers::{FakeCloud, ProviderError};
use broker_workflow::flows::{default_registry, CosmosdbInstanceDetails, DbmsInstanceDetails, DbmsUpdatingParameters,
                             MysqlDatabaseDetails, ProviderClients, SecureDbmsInstanceDetails};
use broker_workflow::{CancellationToken, EngineConfig, InstanceService, ProvisionRequest, RunOutcome, WorkflowError};
use flow::{FlowError, InMemoryInstanceRepository, InstanceRepository};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct Broker {
  cloud: Arc<FakeCloud>,
  repo: Arc<InMemoryInstanceRepository>,
  service: InstanceService,
}

fn service_over(cloud: &Arc<FakeCloud>, repo: Arc<dyn InstanceRepository>) -> InstanceService {
  let registry = default_registry(&ProviderClients::from_fake(cloud.clone())).unwrap();
  let codec = Arc::new(Aes256GcmCodec::new(&[7u8; 32]).unwrap());
  InstanceService::new(Arc::new(registry), repo, codec, EngineConfig::default())
}

fn broker() -> Broker {
  let cloud = Arc::new(FakeCloud::new());
  let repo = Arc::new(InMemoryInstanceRepository::new());
  let service = service_over(&cloud, repo.clone());
  Broker { cloud, repo, service }
}

fn params(value: serde_json::Value) -> ParameterMap {
  value.as_object().cloned().unwrap_or_default()
}

fn pg_request(alias: &str) -> ProvisionRequest {
  ProvisionRequest::new("postgresql-dbms", "basic").with_alias(alias)
                                                   .with_placement("eastus", "rg-pg")
                                                   .with_tag("team", "data")
                                                   .with_parameter("sslEnforcement", "enabled")
}

#[tokio::test]
async fn postgresql_provision_update_and_deprovision() {
  let b = broker();
  let cancel = CancellationToken::new();

  let (instance, outcome) = b.service.provision(pg_request("pg"), &cancel).await.unwrap();
  assert_eq!(outcome, RunOutcome::Completed);
  assert_eq!(instance.status, InstanceStatus::Provisioned);
  assert!(instance.progress.is_none());
  let server = instance.details_as::<DbmsInstanceDetails>().unwrap().server_name.clone();
  assert!(b.cloud.has_server("rg-pg", &server));
  let password = &instance.secure_details_as::<SecureDbmsInstanceDetails>().unwrap().administrator_login_password;
  assert!(!password.is_empty());

  // el registro persistido se decodifica con las variantes del plan
  let stored = b.service.get(&instance.instance_id).unwrap().unwrap();
  assert_eq!(stored, instance);
  assert!(stored.details_as::<DbmsInstanceDetails>().unwrap().enforce_ssl);
  assert_eq!(stored.tags.get("team").map(String::as_str), Some("data"));

  let (updated, outcome) = b.service
                            .update(&instance.instance_id, &params(json!({"sslEnforcement": "disabled"})), &cancel)
                            .await
                            .unwrap();
  assert!(outcome.is_completed());
  assert_eq!(updated.status, InstanceStatus::Updated);
  assert!(!updated.details_as::<DbmsInstanceDetails>().unwrap().enforce_ssl);
  let deployment_name = updated.details_as::<DbmsInstanceDetails>().unwrap().arm_deployment_name.clone();
  let deployment = b.cloud.deployment("rg-pg", &deployment_name).unwrap();
  assert_eq!(deployment.parameter_str("sslEnforcement"), Some("disabled"));

  let (_, outcome) = b.service.deprovision(&instance.instance_id, &cancel).await.unwrap();
  assert!(outcome.is_completed());
  assert!(b.service.get(&instance.instance_id).unwrap().is_none());
  assert!(!b.cloud.has_server("rg-pg", &server));
  assert!(b.repo.is_empty());
  // el candado de la instancia borrada se libera
  assert!(format!("{:?}", b.service).contains("locks: 0"));
}

#[tokio::test]
async fn invalid_parameters_are_rejected_without_persisting() {
  let b = broker();
  let request = pg_request("pg").with_parameter("sslEnforcement", "sometimes");
  let err = b.service.provision(request, &CancellationToken::new()).await.unwrap_err();
  assert!(matches!(err, WorkflowError::Validation(_)));
  assert!(b.repo.is_empty());

  let err = b.service
             .provision(ProvisionRequest::new("postgresql-dbms", "basic"), &CancellationToken::new())
             .await
             .unwrap_err();
  assert!(matches!(err, WorkflowError::Validation(_)), "alias obligatorio: {:?}", err);

  let err = b.service
             .provision(ProvisionRequest::new("redis", "basic"), &CancellationToken::new())
             .await
             .unwrap_err();
  assert!(matches!(err, WorkflowError::UnknownService(_)), "{:?}", err);
}

#[tokio::test]
async fn duplicate_alias_is_a_conflict() {
  let b = broker();
  let cancel = CancellationToken::new();
  b.service.provision(pg_request("pg"), &cancel).await.unwrap();
  let err = b.service.provision(pg_request("pg"), &cancel).await.unwrap_err();
  assert!(matches!(err, WorkflowError::Flow(FlowError::Conflict(_))), "{:?}", err);
  assert_eq!(b.repo.len(), 1);
}

#[tokio::test]
async fn mysql_database_lives_under_its_dbms() {
  let b = broker();
  let cancel = CancellationToken::new();
  let dbms_request = ProvisionRequest::new("mysql-dbms", "standard").with_alias("mysql")
                                                                    .with_placement("westeurope", "rg-mysql");
  let (dbms, _) = b.service.provision(dbms_request, &cancel).await.unwrap();
  let server = dbms.details_as::<DbmsInstanceDetails>().unwrap().server_name.clone();

  let request = ProvisionRequest::new("mysql-database", "database").with_parent_alias("mysql")
                                                                   .with_placement("eastus", "otro-rg");
  let (db, outcome) = b.service.provision(request, &cancel).await.unwrap();
  assert!(outcome.is_completed(), "{:?}", outcome);
  assert_eq!(db.resource_group, "rg-mysql");
  assert_eq!(db.location, "westeurope");
  assert_eq!(db.parent.as_ref().map(|p| p.instance_id.as_str()), Some(dbms.instance_id.as_str()));
  let database = db.details_as::<MysqlDatabaseDetails>().unwrap().database_name.clone();
  assert!(b.cloud.has_database("rg-mysql", &server, &database));

  let err = b.service.deprovision(&dbms.instance_id, &cancel).await.unwrap_err();
  assert!(matches!(err, WorkflowError::Validation(_)), "{:?}", err);
  assert!(b.cloud.has_server("rg-mysql", &server));

  b.service.deprovision(&db.instance_id, &cancel).await.unwrap();
  assert!(!b.cloud.has_database("rg-mysql", &server, &database));
  let (_, outcome) = b.service.deprovision(&dbms.instance_id, &cancel).await.unwrap();
  assert!(outcome.is_completed());
  assert!(b.repo.is_empty());
}

#[tokio::test]
async fn child_requires_an_existing_settled_parent() {
  let b = broker();
  let cancel = CancellationToken::new();
  let orphan = ProvisionRequest::new("mysql-database", "database").with_parent_alias("ghost");
  let err = b.service.provision(orphan, &cancel).await.unwrap_err();
  assert!(matches!(err, WorkflowError::Validation(_)), "{:?}", err);

  let missing_parent = ProvisionRequest::new("mysql-database", "database");
  assert!(matches!(b.service.provision(missing_parent, &cancel).await, Err(WorkflowError::Validation(_))));

  // un padre de otro tipo tampoco sirve
  b.service.provision(pg_request("pg"), &cancel).await.unwrap();
  let wrong_parent = ProvisionRequest::new("mysql-database", "database").with_parent_alias("pg");
  assert!(matches!(b.service.provision(wrong_parent, &cancel).await, Err(WorkflowError::Validation(_))));
  assert_eq!(b.repo.len(), 1);
}

#[tokio::test]
async fn cosmosdb_accounts_expose_connection_strings() {
  let b = broker();
  let cancel = CancellationToken::new();

  let sql = ProvisionRequest::new("cosmosdb-sql-all-in-one", "sql-api").with_placement("eastus", "rg-cosmos");
  let (instance, outcome) = b.service.provision(sql, &cancel).await.unwrap();
  assert!(outcome.is_completed());
  let dt = instance.details_as::<CosmosdbInstanceDetails>().unwrap();
  assert!(dt.connection_string.starts_with("AccountEndpoint=https://"));
  assert!(b.cloud.has_cosmos_database(&dt.database_account_name, &dt.database_name));

  let mongo = ProvisionRequest::new("cosmosdb-mongo", "mongo-db").with_placement("eastus", "rg-cosmos");
  let (instance, _) = b.service.provision(mongo, &cancel).await.unwrap();
  let dt = instance.details_as::<CosmosdbInstanceDetails>().unwrap().clone();
  assert!(dt.connection_string.starts_with("mongodb://"));
  assert!(dt.connection_string.ends_with("&replicaSet=globaldb"));

  b.service.deprovision(&instance.instance_id, &cancel).await.unwrap();
  assert!(!b.cloud.has_account("rg-cosmos", &dt.database_account_name));
  assert_eq!(b.service.list().unwrap().len(), 1);
}

#[tokio::test]
async fn reconcile_resumes_after_a_failed_deployment() {
  let b = broker();
  let cancel = CancellationToken::new();
  b.cloud.fail_next(ops::DEPLOY, ProviderError::Quota("quota exceeded".into()));

  let (instance, outcome) = b.service.provision(pg_request("pg"), &cancel).await.unwrap();
  match &outcome {
    RunOutcome::Failed { step, reason } => {
      assert_eq!(step, "deployARMTemplate");
      assert!(reason.contains("quota exceeded"), "{}", reason);
    }
    other => panic!("se esperaba un fallo: {:?}", other),
  }
  assert_eq!(instance.status, InstanceStatus::Failed);
  assert_eq!(instance.progress, Some(WorkflowProgress::after(WorkflowType::Provision, "preProvision")));

  let outcome = b.service.reconcile(&instance.instance_id, &cancel).await.unwrap();
  assert_eq!(outcome, Some(RunOutcome::Completed));
  let stored = b.service.get(&instance.instance_id).unwrap().unwrap();
  assert_eq!(stored.status, InstanceStatus::Provisioned);
  assert_eq!(stored.details_as::<DbmsInstanceDetails>().unwrap().server_name,
             instance.details_as::<DbmsInstanceDetails>().unwrap().server_name);
  assert_eq!(b.cloud.calls(ops::DEPLOY), 2);

  // nada pendiente
  assert_eq!(b.service.reconcile(&instance.instance_id, &cancel).await.unwrap(), None);
}

#[tokio::test]
async fn interrupted_first_update_step_is_resumable() {
  let b = broker();
  let (instance, _) = b.service.provision(pg_request("pg"), &CancellationToken::new()).await.unwrap();
  let id = instance.instance_id.clone();

  // el despliegue tarda y la solicitud se cancela a mitad del primer paso
  b.cloud.set_latency(Duration::from_millis(500));
  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(30)).await;
    trigger.cancel();
  });
  let (_, outcome) = b.service
                      .update(&id, &params(json!({"sslEnforcement": "disabled"})), &cancel)
                      .await
                      .unwrap();
  assert_eq!(outcome, RunOutcome::Canceled { step: "updateARMTemplate".into() });

  let stored = b.service.get(&id).unwrap().unwrap();
  assert_eq!(stored.status, InstanceStatus::Updating);
  assert_eq!(stored.progress, Some(WorkflowProgress::started(WorkflowType::Update)));
  assert_eq!(stored.updating_parameters_as::<DbmsUpdatingParameters>().unwrap().ssl_enforcement.as_deref(),
             Some("disabled"));
  // mientras tanto no se admite otra actualizacion
  let err = b.service.update(&id, &ParameterMap::new(), &CancellationToken::new()).await.unwrap_err();
  assert!(matches!(err, WorkflowError::Validation(_)), "{:?}", err);

  b.cloud.set_latency(Duration::ZERO);
  let outcome = b.service.reconcile(&id, &CancellationToken::new()).await.unwrap();
  assert_eq!(outcome, Some(RunOutcome::Completed));
  let stored = b.service.get(&id).unwrap().unwrap();
  assert_eq!(stored.status, InstanceStatus::Updated);
  assert!(stored.progress.is_none());
  let dt = stored.details_as::<DbmsInstanceDetails>().unwrap();
  assert!(!dt.enforce_ssl);
  assert_eq!(b.cloud.deployment("rg-pg", &dt.arm_deployment_name).unwrap().parameter_str("sslEnforcement"),
             Some("disabled"));
}

#[tokio::test]
async fn failed_first_update_step_is_resumable() {
  let b = broker();
  let cancel = CancellationToken::new();
  let (instance, _) = b.service.provision(pg_request("pg"), &cancel).await.unwrap();
  b.cloud.fail_next(ops::DEPLOY, ProviderError::Quota("quota exceeded".into()));

  let (failed, outcome) = b.service
                           .update(&instance.instance_id, &params(json!({"sslEnforcement": "disabled"})), &cancel)
                           .await
                           .unwrap();
  assert!(matches!(outcome, RunOutcome::Failed { ref step, .. } if step == "updateARMTemplate"), "{:?}", outcome);
  assert_eq!(failed.status, InstanceStatus::Failed);

  let stored = b.service.get(&instance.instance_id).unwrap().unwrap();
  assert_eq!(stored.status, InstanceStatus::Failed);
  assert!(stored.status_reason.contains("quota exceeded"), "{}", stored.status_reason);
  assert_eq!(stored.progress, Some(WorkflowProgress::started(WorkflowType::Update)));

  let outcome = b.service.reconcile(&instance.instance_id, &cancel).await.unwrap();
  assert_eq!(outcome, Some(RunOutcome::Completed));
  let stored = b.service.get(&instance.instance_id).unwrap().unwrap();
  assert_eq!(stored.status, InstanceStatus::Updated);
  assert!(!stored.details_as::<DbmsInstanceDetails>().unwrap().enforce_ssl);
  assert_eq!(b.service.reconcile(&instance.instance_id, &cancel).await.unwrap(), None);
}

#[tokio::test]
async fn failed_first_deprovision_step_is_resumable() {
  let b = broker();
  let cancel = CancellationToken::new();
  let (instance, _) = b.service.provision(pg_request("pg"), &cancel).await.unwrap();
  let server = instance.details_as::<DbmsInstanceDetails>().unwrap().server_name.clone();
  b.cloud.fail_next(ops::DELETE_DEPLOYMENT, ProviderError::Quota("throttled".into()));

  let (_, outcome) = b.service.deprovision(&instance.instance_id, &cancel).await.unwrap();
  assert!(matches!(outcome, RunOutcome::Failed { ref step, .. } if step == "deleteARMDeployment"), "{:?}", outcome);
  let stored = b.service.get(&instance.instance_id).unwrap().unwrap();
  assert_eq!(stored.status, InstanceStatus::Failed);
  assert_eq!(stored.progress, Some(WorkflowProgress::started(WorkflowType::Deprovision)));
  assert!(b.cloud.has_server("rg-pg", &server));

  let outcome = b.service.reconcile(&instance.instance_id, &cancel).await.unwrap();
  assert_eq!(outcome, Some(RunOutcome::Completed));
  assert!(b.repo.is_empty());
  assert!(!b.cloud.has_server("rg-pg", &server));
  assert!(format!("{:?}", b.service).contains("locks: 0"));
}

#[tokio::test]
async fn concurrent_requests_cannot_share_an_alias() {
  let b = broker();
  let cancel = CancellationToken::new();

  let (first, second) = tokio::join!(b.service.provision(pg_request("shared").with_instance_id("a"), &cancel),
                                     b.service.provision(pg_request("shared").with_instance_id("b"), &cancel));
  let results = [first, second];
  assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
  assert!(results.iter()
                 .any(|r| matches!(r, Err(WorkflowError::Flow(FlowError::Conflict(_))))));
  assert_eq!(b.repo.len(), 1);

  // liberada la reserva, el alias sigue ocupado por el registro persistido
  let err = b.service.provision(pg_request("shared"), &cancel).await.unwrap_err();
  assert!(matches!(err, WorkflowError::Flow(FlowError::Conflict(_))), "{:?}", err);
  assert!(format!("{:?}", b.service).contains("aliases: 0"));
}

#[tokio::test]
async fn same_instance_requests_are_serialized() {
  let b = broker();
  let cancel = CancellationToken::new();
  b.cloud.set_latency(Duration::from_millis(20));

  let request = ProvisionRequest::new("cosmosdb-mongo", "mongo-db").with_instance_id("inst-1")
                                                                   .with_placement("eastus", "rg");
  let (first, second) = tokio::join!(b.service.provision(request.clone(), &cancel),
                                     b.service.provision(request, &cancel));
  let results = [first, second];
  assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
  assert!(results.iter()
                 .any(|r| matches!(r, Err(WorkflowError::Flow(FlowError::Conflict(_))))));
  assert_eq!(b.cloud.calls(ops::DEPLOY), 1);

  let (params_a, params_c) = (ParameterMap::new(), ParameterMap::new());
  let (a, c) = tokio::join!(b.service.update("inst-1", &params_a, &cancel),
                            b.service.update("inst-1", &params_c, &cancel));
  assert!(a.unwrap().1.is_completed());
  assert!(c.unwrap().1.is_completed());
  assert_eq!(b.service.get("inst-1").unwrap().unwrap().status, InstanceStatus::Updated);
}

#[tokio::test]
async fn instances_survive_a_restart_on_sqlite() {
  let path = std::env::temp_dir().join(format!("broker-{}.db", uuid::Uuid::new_v4().simple()));
  let url = path.to_string_lossy().to_string();
  let cloud = Arc::new(FakeCloud::new());
  let cancel = CancellationToken::new();

  let id = {
    let repo = Arc::new(DieselInstanceRepository::new(&url).unwrap());
    let service = service_over(&cloud, repo);
    let (instance, _) = service.provision(pg_request("pg"), &cancel).await.unwrap();
    instance.instance_id
  };

  let repo = Arc::new(DieselInstanceRepository::new(&url).unwrap());
  let service = service_over(&cloud, repo);
  let instance = service.get(&id).unwrap().unwrap();
  assert_eq!(instance.status, InstanceStatus::Provisioned);
  assert_eq!(instance.alias, "pg");
  assert!(!instance.secure_details_as::<SecureDbmsInstanceDetails>().unwrap().administrator_login_password.is_empty());

  service.deprovision(&id, &cancel).await.unwrap();
  assert!(service.list().unwrap().is_empty());
  let _ = std::fs::remove_file(&path);
}
