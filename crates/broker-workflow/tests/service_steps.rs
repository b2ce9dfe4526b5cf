use broker_domain::{downcast_ref, FacetValue, Instance, ParameterMap, Plan, WorkflowType};
use broker_providers::fakes::ops;
use broker_providers::FakeCloud;
use broker_workflow::flows::{CosmosManager, CosmosdbInstanceDetails, DbmsInstanceDetails, DbmsManager, MysqlDatabaseDetails,
                             MysqlDatabaseManager, ProviderClients, SecureDbmsInstanceDetails};
use broker_workflow::{Deprovisioner, DeprovisioningStep, ProvisioningStep, Provisioner, ServiceManager, StepContext};
use serde_json::json;
use std::sync::Arc;

const RG: &str = "rg-test";

fn cloud() -> (Arc<FakeCloud>, ProviderClients) {
  let cloud = Arc::new(FakeCloud::new());
  let clients = ProviderClients::from_fake(cloud.clone());
  (cloud, clients)
}

/// Instancia aceptada como lo haria el servicio de orquestacion.
fn accepted(manager: &dyn ServiceManager, alias: &str, params: serde_json::Value) -> Instance {
  let service = manager.service();
  let plan = service.plans[0].clone();
  let mut instance = Instance::new(&service.id, &plan.id).with_alias(alias).with_placement("eastus", RG);
  let params: ParameterMap = params.as_object().cloned().unwrap_or_default();
  let (pp, spp) = manager.split_provisioning_parameters(&params).unwrap();
  instance.provisioning_parameters = Some(pp);
  instance.secure_provisioning_parameters = Some(spp);
  instance.fill_missing_facets(manager.facet_defaults(&plan.id));
  if let Some(sd) = manager.initial_secure_details(&instance).unwrap() {
    instance.secure_details = Some(sd);
  }
  instance.plan = Some(plan);
  instance.service = Some(service);
  instance
}

/// Ejecuta cada paso dos veces seguidas; ambas deben dar el mismo resultado.
async fn provision_twice(seq: &Provisioner,
                         workflow: WorkflowType,
                         instance: &mut Instance,
                         parent: Option<Arc<Instance>>) {
  for step in seq.steps() {
    let ctx = StepContext::new(&instance.instance_id, workflow, step.name()).with_parent(parent.clone());
    let first = step.execute(&ctx, instance).await.unwrap();
    instance.details = Some(first);
    let second = step.execute(&ctx, instance).await.unwrap();
    assert_eq!(second.to_json().unwrap(),
               instance.details.as_ref().unwrap().to_json().unwrap(),
               "el paso {} no es idempotente",
               step.name());
    instance.details = Some(second);
  }
}

async fn deprovision_twice(seq: &Deprovisioner, instance: &mut Instance, parent: Option<Arc<Instance>>) {
  for step in seq.steps() {
    let ctx = StepContext::new(&instance.instance_id, WorkflowType::Deprovision, step.name()).with_parent(parent.clone());
    let (details, secure_details) = step.execute(&ctx, instance).await.unwrap();
    instance.details = Some(details);
    instance.secure_details = secure_details;
    let (details, secure_details) = step.execute(&ctx, instance).await.unwrap();
    instance.details = Some(details);
    instance.secure_details = secure_details;
  }
}

fn plan_of(instance: &Instance) -> Plan {
  instance.plan.clone().unwrap()
}

#[tokio::test]
async fn postgresql_dbms_steps_are_idempotent() {
  let (cloud, clients) = cloud();
  let manager = DbmsManager::postgresql(clients);
  let mut instance = accepted(&manager,
                              "pg",
                              json!({"sslEnforcement": "disabled",
                                     "firewallRules": [{"name": "office", "startIPAddress": "10.0.0.1", "endIPAddress": "10.0.0.9"}]}));

  let provisioner = manager.get_provisioner(&plan_of(&instance)).unwrap();
  assert_eq!(provisioner.step_names(), vec!["preProvision", "deployARMTemplate"]);
  provision_twice(&provisioner, WorkflowType::Provision, &mut instance, None).await;

  let dt = instance.details_as::<DbmsInstanceDetails>().unwrap().clone();
  assert!(!dt.enforce_ssl);
  assert_eq!(dt.fully_qualified_domain_name, format!("{}.postgres.database.fake", dt.server_name));
  assert!(cloud.has_server(RG, &dt.server_name));
  let deployment = cloud.deployment(RG, &dt.arm_deployment_name).unwrap();
  assert_eq!(deployment.parameter_str("sslEnforcement"), Some("disabled"));
  assert_eq!(deployment.parameters["firewallRules"][0]["startIPAddress"], "10.0.0.1");
  assert_eq!(cloud.calls(ops::DEPLOY), 2);

  let updater = manager.get_updater(&plan_of(&instance)).unwrap();
  instance.updating_parameters = Some(manager.updating_parameters(json!({"sslEnforcement": "enabled"}).as_object().unwrap())
                                             .unwrap());
  provision_twice(&updater, WorkflowType::Update, &mut instance, None).await;
  assert!(instance.details_as::<DbmsInstanceDetails>().unwrap().enforce_ssl);
  let deployment = cloud.deployment(RG, &dt.arm_deployment_name).unwrap();
  assert_eq!(deployment.parameter_str("sslEnforcement"), Some("enabled"));
  // las reglas de firewall no informadas se conservan
  assert_eq!(deployment.parameters["firewallRules"][0]["name"], "office");

  let deprovisioner = manager.get_deprovisioner(&plan_of(&instance)).unwrap();
  assert_eq!(deprovisioner.step_names(), vec!["deleteARMDeployment", "deletePostgreSQLServer"]);
  deprovision_twice(&deprovisioner, &mut instance, None).await;
  assert!(!cloud.has_server(RG, &dt.server_name));
  assert!(!cloud.has_deployment(RG, &dt.arm_deployment_name));
  let secure = instance.secure_details_as::<SecureDbmsInstanceDetails>().unwrap();
  assert!(secure.administrator_login_password.is_empty());
}

#[tokio::test]
async fn mysql_database_steps_are_idempotent() {
  let (cloud, clients) = cloud();
  let dbms = DbmsManager::mysql(clients.clone());
  let mut parent = accepted(&dbms, "mysql", json!({}));
  provision_twice(&dbms.get_provisioner(&plan_of(&parent)).unwrap(), WorkflowType::Provision, &mut parent, None).await;
  let server = parent.details_as::<DbmsInstanceDetails>().unwrap().server_name.clone();
  let parent = Arc::new(parent);

  let manager = MysqlDatabaseManager::new(clients);
  let mut instance = accepted(&manager, "", json!({}));
  instance.attach_parent(&parent);
  let provisioner = manager.get_provisioner(&plan_of(&instance)).unwrap();
  provision_twice(&provisioner, WorkflowType::Provision, &mut instance, Some(parent.clone())).await;

  let database = instance.details_as::<MysqlDatabaseDetails>().unwrap().database_name.clone();
  assert!(cloud.has_database(RG, &server, &database));

  let deprovisioner = manager.get_deprovisioner(&plan_of(&instance)).unwrap();
  assert_eq!(deprovisioner.step_names(), vec!["deleteARMDeployment", "deleteMySQLDatabase"]);
  deprovision_twice(&deprovisioner, &mut instance, Some(parent.clone())).await;
  assert!(!cloud.has_database(RG, &server, &database));
  assert!(cloud.has_server(RG, &server));
}

#[tokio::test]
async fn cosmosdb_sql_steps_are_idempotent() {
  let (cloud, clients) = cloud();
  let manager = CosmosManager::sql_all_in_one(clients);
  let mut instance = accepted(&manager, "docs", json!({"consistency": "session"}));

  let provisioner = manager.get_provisioner(&plan_of(&instance)).unwrap();
  provision_twice(&provisioner, WorkflowType::Provision, &mut instance, None).await;

  let dt = instance.details_as::<CosmosdbInstanceDetails>().unwrap().clone();
  assert!(cloud.has_account(RG, &dt.database_account_name));
  assert!(cloud.has_cosmos_database(&dt.database_account_name, &dt.database_name));
  assert_eq!(dt.connection_string,
             format!("AccountEndpoint={};AccountKey={};", dt.fully_qualified_domain_name, dt.primary_key));
  assert_eq!(cloud.deployment(RG, &dt.arm_deployment_name).unwrap().tags["defaultExperience"], "DocumentDB");

  let deprovisioner = manager.get_deprovisioner(&plan_of(&instance)).unwrap();
  assert_eq!(deprovisioner.step_names(), vec!["deleteARMDeployment", "deleteCosmosDBServer"]);
  deprovision_twice(&deprovisioner, &mut instance, None).await;
  assert!(!cloud.has_account(RG, &dt.database_account_name));
}

#[tokio::test]
async fn cosmosdb_mongo_steps_are_idempotent() {
  let (cloud, clients) = cloud();
  let manager = CosmosManager::mongo(clients);
  let mut instance = accepted(&manager, "mongo", json!({}));

  provision_twice(&manager.get_provisioner(&plan_of(&instance)).unwrap(), WorkflowType::Provision, &mut instance, None)
    .await;
  let dt = downcast_ref::<CosmosdbInstanceDetails>(instance.details.as_deref().unwrap()).unwrap().clone();
  assert!(dt.connection_string.starts_with(&format!("mongodb://{}:{}@", dt.database_account_name, dt.primary_key)));
  assert!(dt.database_name.is_empty());

  deprovision_twice(&manager.get_deprovisioner(&plan_of(&instance)).unwrap(), &mut instance, None).await;
  assert!(!cloud.has_account(RG, &dt.database_account_name));
  assert_eq!(cloud.calls(ops::DELETE_ACCOUNT), 2);
}
