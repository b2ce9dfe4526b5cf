// Bases de datos MySQL alojadas en un DBMS MySQL (instancia padre).
use crate::errors::WorkflowError;
use crate::factory::ServiceManager;
use crate::flows::dbms::{DbmsEngine, DbmsInstanceDetails};
use crate::flows::{ignore_not_found, new_resource_name, read_facet, ProviderClients};
use crate::step::{Deprovisioner, DeprovisioningStep, Provisioner, ProvisioningStep, Step, StepContext};
use async_trait::async_trait;
use broker_domain::{facet, Facet, FacetDefaults, Instance, ParameterMap, Plan, Service};
use broker_providers::fakes::templates;
use broker_providers::DeploymentRequest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const SERVICE_ID: &str = "mysql-database";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MysqlDatabaseDetails {
  #[serde(rename = "armDeployment")]
  pub arm_deployment_name: String,
  #[serde(rename = "database")]
  pub database_name: String,
}

#[derive(Debug, Clone)]
pub struct MysqlDatabaseManager {
  clients: ProviderClients,
}

/// Servidor del padre; falla si el padre aun no tiene servidor.
fn parent_server(ctx: &StepContext, parent: &Instance) -> Result<String, WorkflowError> {
  let pdt: DbmsInstanceDetails = read_facet(parent.details.as_deref())?;
  if pdt.server_name.is_empty() {
    return Err(WorkflowError::step(&ctx.step_name, format!("el DBMS {} no tiene servidor", parent.alias)));
  }
  Ok(pdt.server_name)
}

impl MysqlDatabaseManager {
  pub fn new(clients: ProviderClients) -> Self {
    Self { clients }
  }

  fn provision_step(&self, op: ProvisionOp) -> Arc<dyn ProvisioningStep> {
    Arc::new(MysqlProvisionStep { op, manager: self.clone() })
  }

  fn deprovision_step(&self, op: DeprovisionOp) -> Arc<dyn DeprovisioningStep> {
    Arc::new(MysqlDeprovisionStep { op, manager: self.clone() })
  }

  fn pre_provision(&self, instance: &Instance) -> Result<Facet, WorkflowError> {
    let mut dt: MysqlDatabaseDetails = read_facet(instance.details.as_deref())?;
    if dt.arm_deployment_name.is_empty() {
      dt.arm_deployment_name = uuid::Uuid::new_v4().to_string();
    }
    if dt.database_name.is_empty() {
      dt.database_name = new_resource_name("db");
    }
    Ok(facet(dt))
  }

  async fn deploy_arm_template(&self, ctx: &StepContext, instance: &Instance) -> Result<Facet, WorkflowError> {
    let dt: MysqlDatabaseDetails = read_facet(instance.details.as_deref())?;
    let server = parent_server(ctx, ctx.require_parent()?)?;
    let request = DeploymentRequest::new(&dt.arm_deployment_name,
                                         &instance.resource_group,
                                         &instance.location,
                                         templates::MYSQL_DATABASE).with_parameter("serverName", server.as_str())
                                                                   .with_parameter("databaseName",
                                                                                   dt.database_name.as_str())
                                                                   .with_tags(instance.tags.clone());
    log::info!("desplegando base {} en el servidor {}", dt.database_name, server);
    ctx.call(self.clients.deployer.deploy(&request)).await?;
    Ok(facet(dt))
  }

  async fn delete_arm_deployment(&self,
                                 ctx: &StepContext,
                                 instance: &Instance)
                                 -> Result<(Facet, Option<Facet>), WorkflowError> {
    let dt: MysqlDatabaseDetails = read_facet(instance.details.as_deref())?;
    let res = ctx.call(self.clients.deployer.delete(&dt.arm_deployment_name, &instance.resource_group)).await;
    ignore_not_found(res, &format!("despliegue {}", dt.arm_deployment_name))?;
    Ok((facet(dt), instance.secure_details.clone()))
  }

  /// Sin padre el servidor ya no existe y la base se fue con el.
  async fn delete_database(&self,
                           ctx: &StepContext,
                           instance: &Instance)
                           -> Result<(Facet, Option<Facet>), WorkflowError> {
    let dt: MysqlDatabaseDetails = read_facet(instance.details.as_deref())?;
    match ctx.parent() {
      None => log::warn!("{}: sin DBMS padre, la base {} se da por borrada", instance.instance_id, dt.database_name),
      Some(parent) => {
        let server = parent_server(ctx, parent)?;
        let res = ctx.call(self.clients.servers.delete_database(&instance.resource_group, &server, &dt.database_name))
                     .await;
        ignore_not_found(res, &format!("base {}", dt.database_name))?;
      }
    }
    Ok((facet(dt), instance.secure_details.clone()))
  }
}

impl ServiceManager for MysqlDatabaseManager {
  fn service(&self) -> Service {
    Service::new(SERVICE_ID,
                 "MySQL Database",
                 "Base de datos en un DBMS MySQL existente",
                 vec![Plan::new("database", "Database", "Base de datos nueva en el DBMS padre")])
        .with_parent_service(DbmsEngine::MySql.service_id())
  }

  fn facet_defaults(&self, _plan_id: &str) -> FacetDefaults {
    FacetDefaults::new().provisioning_parameters::<ParameterMap>()
                        .secure_provisioning_parameters::<ParameterMap>()
                        .updating_parameters::<ParameterMap>()
                        .details::<MysqlDatabaseDetails>()
                        .secure_details::<ParameterMap>()
  }

  fn get_provisioner(&self, _plan: &Plan) -> Result<Provisioner, WorkflowError> {
    Provisioner::new(vec![self.provision_step(ProvisionOp::PreProvision),
                          self.provision_step(ProvisionOp::DeployArmTemplate)])
  }

  fn get_deprovisioner(&self, _plan: &Plan) -> Result<Deprovisioner, WorkflowError> {
    Deprovisioner::new(vec![self.deprovision_step(DeprovisionOp::DeleteArmDeployment),
                            self.deprovision_step(DeprovisionOp::DeleteDatabase)])
  }

  /// La base no acepta parametros propios.
  fn split_provisioning_parameters(&self, _params: &ParameterMap) -> Result<(Facet, Facet), WorkflowError> {
    Ok((facet(ParameterMap::new()), facet(ParameterMap::new())))
  }
}

#[derive(Debug, Clone, Copy)]
enum ProvisionOp {
  PreProvision,
  DeployArmTemplate,
}

#[derive(Debug, Clone, Copy)]
enum DeprovisionOp {
  DeleteArmDeployment,
  DeleteDatabase,
}

struct MysqlProvisionStep {
  op: ProvisionOp,
  manager: MysqlDatabaseManager,
}

impl Step for MysqlProvisionStep {
  fn name(&self) -> &str {
    match self.op {
      ProvisionOp::PreProvision => "preProvision",
      ProvisionOp::DeployArmTemplate => "deployARMTemplate",
    }
  }
}

#[async_trait]
impl ProvisioningStep for MysqlProvisionStep {
  async fn execute(&self, ctx: &StepContext, instance: &Instance) -> Result<Facet, WorkflowError> {
    match self.op {
      ProvisionOp::PreProvision => self.manager.pre_provision(instance),
      ProvisionOp::DeployArmTemplate => self.manager.deploy_arm_template(ctx, instance).await,
    }
  }
}

struct MysqlDeprovisionStep {
  op: DeprovisionOp,
  manager: MysqlDatabaseManager,
}

impl Step for MysqlDeprovisionStep {
  fn name(&self) -> &str {
    match self.op {
      DeprovisionOp::DeleteArmDeployment => "deleteARMDeployment",
      DeprovisionOp::DeleteDatabase => "deleteMySQLDatabase",
    }
  }
}

#[async_trait]
impl DeprovisioningStep for MysqlDeprovisionStep {
  async fn execute(&self, ctx: &StepContext, instance: &Instance) -> Result<(Facet, Option<Facet>), WorkflowError> {
    match self.op {
      DeprovisionOp::DeleteArmDeployment => self.manager.delete_arm_deployment(ctx, instance).await,
      DeprovisionOp::DeleteDatabase => self.manager.delete_database(ctx, instance).await,
    }
  }
}
