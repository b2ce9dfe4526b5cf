// Cuentas Cosmos DB: API SQL (cuenta + base) y API MongoDB.
use crate::errors::WorkflowError;
use crate::factory::ServiceManager;
use crate::flows::{ignore_conflict, ignore_not_found, new_resource_name, read_facet, ProviderClients};
use crate::step::{Deprovisioner, DeprovisioningStep, Provisioner, ProvisioningStep, Step, StepContext};
use async_trait::async_trait;
use broker_domain::{facet, Facet, FacetDefaults, Instance, ParameterMap, Plan, Service};
use broker_providers::fakes::templates;
use broker_providers::DeploymentRequest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CosmosKind {
  /// Cuenta con API SQL y una base creada junto con la cuenta.
  SqlAllInOne,
  Mongo,
}

impl CosmosKind {
  pub fn service_id(self) -> &'static str {
    match self {
      CosmosKind::SqlAllInOne => "cosmosdb-sql-all-in-one",
      CosmosKind::Mongo => "cosmosdb-mongo",
    }
  }

  fn template(self) -> &'static str {
    match self {
      CosmosKind::SqlAllInOne => templates::COSMOSDB_SQL,
      CosmosKind::Mongo => templates::COSMOSDB_MONGO,
    }
  }

  fn database_kind(self) -> &'static str {
    match self {
      CosmosKind::SqlAllInOne => "GlobalDocumentDB",
      CosmosKind::Mongo => "MongoDB",
    }
  }

  fn default_experience(self) -> &'static str {
    match self {
      CosmosKind::SqlAllInOne => "DocumentDB",
      CosmosKind::Mongo => "MongoDB",
    }
  }
}

/// Detalles de una cuenta Cosmos. La clave primaria se guarda en los
/// detalles en texto plano, igual que la cadena de conexion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CosmosdbInstanceDetails {
  #[serde(rename = "armDeployment")]
  pub arm_deployment_name: String,
  pub database_account_name: String,
  pub fully_qualified_domain_name: String,
  pub primary_key: String,
  pub connection_string: String,
  /// Solo en la variante SQL.
  #[serde(rename = "database", skip_serializing_if = "String::is_empty")]
  pub database_name: String,
}

/// Host de la cuenta a partir de su endpoint `https://host:443/`.
fn endpoint_host(fqdn: &str) -> &str {
  let host = fqdn.trim_start_matches("https://");
  host.split(':').next().unwrap_or(host).trim_end_matches('/')
}

fn connection_string(kind: CosmosKind, dt: &CosmosdbInstanceDetails) -> String {
  match kind {
    CosmosKind::SqlAllInOne => {
      format!("AccountEndpoint={};AccountKey={};", dt.fully_qualified_domain_name, dt.primary_key)
    }
    CosmosKind::Mongo => format!("mongodb://{}:{}@{}:10255/?ssl=true&replicaSet=globaldb",
                                 dt.database_account_name,
                                 dt.primary_key,
                                 endpoint_host(&dt.fully_qualified_domain_name)),
  }
}

#[derive(Debug, Clone)]
pub struct CosmosManager {
  kind: CosmosKind,
  clients: ProviderClients,
}

impl CosmosManager {
  pub fn sql_all_in_one(clients: ProviderClients) -> Self {
    Self { kind: CosmosKind::SqlAllInOne, clients }
  }

  pub fn mongo(clients: ProviderClients) -> Self {
    Self { kind: CosmosKind::Mongo, clients }
  }

  pub fn kind(&self) -> CosmosKind {
    self.kind
  }

  fn provision_step(&self, op: ProvisionOp) -> Arc<dyn ProvisioningStep> {
    Arc::new(CosmosProvisionStep { op, manager: self.clone() })
  }

  fn deprovision_step(&self, op: DeprovisionOp) -> Arc<dyn DeprovisioningStep> {
    Arc::new(CosmosDeprovisionStep { op, manager: self.clone() })
  }

  fn pre_provision(&self, instance: &Instance) -> Result<Facet, WorkflowError> {
    let mut dt: CosmosdbInstanceDetails = read_facet(instance.details.as_deref())?;
    if dt.arm_deployment_name.is_empty() {
      dt.arm_deployment_name = uuid::Uuid::new_v4().to_string();
    }
    if dt.database_account_name.is_empty() {
      dt.database_account_name = new_resource_name("cosmos");
    }
    if self.kind == CosmosKind::SqlAllInOne && dt.database_name.is_empty() {
      dt.database_name = uuid::Uuid::new_v4().to_string();
    }
    Ok(facet(dt))
  }

  async fn deploy_arm_template(&self, ctx: &StepContext, instance: &Instance) -> Result<Facet, WorkflowError> {
    let mut dt: CosmosdbInstanceDetails = read_facet(instance.details.as_deref())?;
    let mut tags = instance.tags.clone();
    tags.insert("defaultExperience".into(), self.kind.default_experience().into());
    let request = DeploymentRequest::new(&dt.arm_deployment_name,
                                         &instance.resource_group,
                                         &instance.location,
                                         self.kind.template()).with_parameter("accountName",
                                                                              dt.database_account_name.as_str())
                                                              .with_parameter("kind", self.kind.database_kind())
                                                              .with_tags(tags);
    log::info!("desplegando cuenta Cosmos {} ({})", dt.database_account_name, self.kind.database_kind());
    let outputs = ctx.call(self.clients.deployer.deploy(&request)).await?;
    let output = |key: &str| {
      outputs.get(key)
             .and_then(|v| v.as_str())
             .map(str::to_string)
             .ok_or_else(|| WorkflowError::step(&ctx.step_name, format!("el despliegue no devolvio {}", key)))
    };
    dt.fully_qualified_domain_name = output("fullyQualifiedDomainName")?;
    dt.primary_key = output("primaryKey")?;
    dt.connection_string = connection_string(self.kind, &dt);
    Ok(facet(dt))
  }

  async fn create_database(&self, ctx: &StepContext, instance: &Instance) -> Result<Facet, WorkflowError> {
    let dt: CosmosdbInstanceDetails = read_facet(instance.details.as_deref())?;
    let res = ctx.call(self.clients
                           .accounts
                           .create_database(&dt.database_account_name, &dt.database_name, &dt.primary_key))
                 .await;
    ignore_conflict(res, &format!("base {}", dt.database_name))?;
    Ok(facet(dt))
  }

  async fn delete_arm_deployment(&self,
                                 ctx: &StepContext,
                                 instance: &Instance)
                                 -> Result<(Facet, Option<Facet>), WorkflowError> {
    let dt: CosmosdbInstanceDetails = read_facet(instance.details.as_deref())?;
    let res = ctx.call(self.clients.deployer.delete(&dt.arm_deployment_name, &instance.resource_group)).await;
    ignore_not_found(res, &format!("despliegue {}", dt.arm_deployment_name))?;
    Ok((facet(dt), instance.secure_details.clone()))
  }

  async fn delete_account(&self,
                          ctx: &StepContext,
                          instance: &Instance)
                          -> Result<(Facet, Option<Facet>), WorkflowError> {
    let dt: CosmosdbInstanceDetails = read_facet(instance.details.as_deref())?;
    let res = ctx.call(self.clients.accounts.delete_account(&instance.resource_group, &dt.database_account_name)).await;
    ignore_not_found(res, &format!("cuenta {}", dt.database_account_name))?;
    Ok((facet(dt), instance.secure_details.clone()))
  }
}

impl ServiceManager for CosmosManager {
  fn service(&self) -> Service {
    match self.kind {
      CosmosKind::SqlAllInOne => Service::new(self.kind.service_id(),
                                              "Cosmos DB SQL (cuenta y base)",
                                              "Cuenta Cosmos DB con API SQL y una base",
                                              vec![Plan::new("sql-api", "SQL API", "Cuenta y base SQL")]),
      CosmosKind::Mongo => Service::new(self.kind.service_id(),
                                        "Cosmos DB MongoDB",
                                        "Cuenta Cosmos DB con API MongoDB",
                                        vec![Plan::new("mongo-db", "MongoDB", "Cuenta MongoDB")]),
    }
  }

  fn facet_defaults(&self, _plan_id: &str) -> FacetDefaults {
    FacetDefaults::new().provisioning_parameters::<ParameterMap>()
                        .secure_provisioning_parameters::<ParameterMap>()
                        .updating_parameters::<ParameterMap>()
                        .details::<CosmosdbInstanceDetails>()
                        .secure_details::<ParameterMap>()
  }

  fn get_provisioner(&self, _plan: &Plan) -> Result<Provisioner, WorkflowError> {
    let mut steps = vec![self.provision_step(ProvisionOp::PreProvision),
                         self.provision_step(ProvisionOp::DeployArmTemplate)];
    if self.kind == CosmosKind::SqlAllInOne {
      steps.push(self.provision_step(ProvisionOp::CreateDatabase));
    }
    Provisioner::new(steps)
  }

  fn get_deprovisioner(&self, _plan: &Plan) -> Result<Deprovisioner, WorkflowError> {
    Deprovisioner::new(vec![self.deprovision_step(DeprovisionOp::DeleteArmDeployment),
                            self.deprovision_step(DeprovisionOp::DeleteAccount)])
  }

  /// Todo es texto plano; se pasa tal cual a la plantilla.
  fn split_provisioning_parameters(&self, params: &ParameterMap) -> Result<(Facet, Facet), WorkflowError> {
    Ok((facet(params.clone()), facet(ParameterMap::new())))
  }
}

#[derive(Debug, Clone, Copy)]
enum ProvisionOp {
  PreProvision,
  DeployArmTemplate,
  CreateDatabase,
}

#[derive(Debug, Clone, Copy)]
enum DeprovisionOp {
  DeleteArmDeployment,
  DeleteAccount,
}

struct CosmosProvisionStep {
  op: ProvisionOp,
  manager: CosmosManager,
}

impl Step for CosmosProvisionStep {
  fn name(&self) -> &str {
    match self.op {
      ProvisionOp::PreProvision => "preProvision",
      ProvisionOp::DeployArmTemplate => "deployARMTemplate",
      ProvisionOp::CreateDatabase => "createDatabase",
    }
  }
}

#[async_trait]
impl ProvisioningStep for CosmosProvisionStep {
  async fn execute(&self, ctx: &StepContext, instance: &Instance) -> Result<Facet, WorkflowError> {
    match self.op {
      ProvisionOp::PreProvision => self.manager.pre_provision(instance),
      ProvisionOp::DeployArmTemplate => self.manager.deploy_arm_template(ctx, instance).await,
      ProvisionOp::CreateDatabase => self.manager.create_database(ctx, instance).await,
    }
  }
}

struct CosmosDeprovisionStep {
  op: DeprovisionOp,
  manager: CosmosManager,
}

impl Step for CosmosDeprovisionStep {
  fn name(&self) -> &str {
    match self.op {
      DeprovisionOp::DeleteArmDeployment => "deleteARMDeployment",
      DeprovisionOp::DeleteAccount => "deleteCosmosDBServer",
    }
  }
}

#[async_trait]
impl DeprovisioningStep for CosmosDeprovisionStep {
  async fn execute(&self, ctx: &StepContext, instance: &Instance) -> Result<(Facet, Option<Facet>), WorkflowError> {
    match self.op {
      DeprovisionOp::DeleteArmDeployment => self.manager.delete_arm_deployment(ctx, instance).await,
      DeprovisionOp::DeleteAccount => self.manager.delete_account(ctx, instance).await,
    }
  }
}
