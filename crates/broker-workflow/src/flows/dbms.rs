// Servidores administrados de PostgreSQL y MySQL (DBMS).
//
// Aprovisionamiento: preProvision -> deployARMTemplate.
// Actualizacion: updateARMTemplate (ssl y reglas de firewall).
// Desaprovisionamiento: deleteARMDeployment -> delete<Motor>Server.
use crate::errors::WorkflowError;
use crate::factory::ServiceManager;
use crate::flows::{ignore_not_found, new_resource_name, read_facet, ProviderClients};
use crate::step::{Deprovisioner, DeprovisioningStep, Provisioner, ProvisioningStep, Step, StepContext, Updater};
use async_trait::async_trait;
use broker_domain::{facet, Facet, FacetDefaults, Instance, ParameterMap, Plan, Service};
use broker_providers::fakes::templates;
use broker_providers::DeploymentRequest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbmsEngine {
  PostgreSql,
  MySql,
}

impl DbmsEngine {
  pub fn service_id(self) -> &'static str {
    match self {
      DbmsEngine::PostgreSql => "postgresql-dbms",
      DbmsEngine::MySql => "mysql-dbms",
    }
  }

  fn template(self) -> &'static str {
    match self {
      DbmsEngine::PostgreSql => templates::POSTGRESQL_DBMS,
      DbmsEngine::MySql => templates::MYSQL_DBMS,
    }
  }

  fn delete_server_step(self) -> &'static str {
    match self {
      DbmsEngine::PostgreSql => "deletePostgreSQLServer",
      DbmsEngine::MySql => "deleteMySQLServer",
    }
  }

  fn display_name(self) -> &'static str {
    match self {
      DbmsEngine::PostgreSql => "PostgreSQL",
      DbmsEngine::MySql => "MySQL",
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
  pub name: String,
  #[serde(rename = "startIPAddress")]
  pub start_ip: String,
  #[serde(rename = "endIPAddress")]
  pub end_ip: String,
}

/// Parametros de aprovisionamiento (texto plano).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DbmsProvisioningParameters {
  /// `enabled`, `disabled` o vacio (equivale a `enabled`).
  pub ssl_enforcement: String,
  pub firewall_rules: Vec<FirewallRule>,
}

/// Parametros de actualizacion: solo se aplica lo que venga informado.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DbmsUpdatingParameters {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub ssl_enforcement: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub firewall_rules: Option<Vec<FirewallRule>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DbmsInstanceDetails {
  #[serde(rename = "armDeployment")]
  pub arm_deployment_name: String,
  #[serde(rename = "server")]
  pub server_name: String,
  pub fully_qualified_domain_name: String,
  #[serde(rename = "enforceSSL")]
  pub enforce_ssl: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecureDbmsInstanceDetails {
  pub administrator_login_password: String,
}

fn parse_ssl_enforcement(value: &str) -> Result<bool, WorkflowError> {
  match value {
    "" | "enabled" => Ok(true),
    "disabled" => Ok(false),
    other => Err(WorkflowError::Validation(format!("sslEnforcement invalido: {:?}", other))),
  }
}

fn ssl_parameter(enforce: bool) -> &'static str {
  if enforce {
    "enabled"
  } else {
    "disabled"
  }
}

fn generate_password() -> String {
  let raw = uuid::Uuid::new_v4().simple().to_string();
  // mayuscula, minusculas, digitos y simbolo
  format!("P{}!", &raw[..22])
}

/// Manager de un DBMS; las dos variantes solo difieren en el motor.
#[derive(Debug, Clone)]
pub struct DbmsManager {
  engine: DbmsEngine,
  clients: ProviderClients,
}

impl DbmsManager {
  pub fn postgresql(clients: ProviderClients) -> Self {
    Self { engine: DbmsEngine::PostgreSql, clients }
  }

  pub fn mysql(clients: ProviderClients) -> Self {
    Self { engine: DbmsEngine::MySql, clients }
  }

  pub fn engine(&self) -> DbmsEngine {
    self.engine
  }

  fn provision_step(&self, op: ProvisionOp) -> Arc<dyn ProvisioningStep> {
    Arc::new(DbmsProvisionStep { op, manager: self.clone() })
  }

  fn deprovision_step(&self, op: DeprovisionOp) -> Arc<dyn DeprovisioningStep> {
    let name = match op {
      DeprovisionOp::DeleteArmDeployment => "deleteARMDeployment",
      DeprovisionOp::DeleteServer => self.engine.delete_server_step(),
    };
    Arc::new(DbmsDeprovisionStep { name, op, manager: self.clone() })
  }

  /// Genera (o reutiliza) los nombres del despliegue y del servidor.
  fn pre_provision(&self, instance: &Instance) -> Result<Facet, WorkflowError> {
    let mut dt: DbmsInstanceDetails = read_facet(instance.details.as_deref())?;
    let pp: DbmsProvisioningParameters = read_facet(instance.provisioning_parameters.as_deref())?;
    if dt.arm_deployment_name.is_empty() {
      dt.arm_deployment_name = uuid::Uuid::new_v4().to_string();
    }
    if dt.server_name.is_empty() {
      dt.server_name = new_resource_name("srv");
    }
    dt.enforce_ssl = parse_ssl_enforcement(&pp.ssl_enforcement)?;
    Ok(facet(dt))
  }

  fn deployment_request(&self,
                        instance: &Instance,
                        dt: &DbmsInstanceDetails,
                        rules: &[FirewallRule])
                        -> Result<DeploymentRequest, WorkflowError> {
    let sdt: SecureDbmsInstanceDetails = read_facet(instance.secure_details.as_deref())?;
    if sdt.administrator_login_password.is_empty() {
      return Err(WorkflowError::Validation("falta la contrasena de administrador".into()));
    }
    Ok(DeploymentRequest::new(&dt.arm_deployment_name,
                              &instance.resource_group,
                              &instance.location,
                              self.engine.template()).with_parameter("serverName", dt.server_name.as_str())
                                                     .with_parameter("administratorLoginPassword",
                                                                     sdt.administrator_login_password)
                                                     .with_parameter("sslEnforcement", ssl_parameter(dt.enforce_ssl))
                                                     .with_parameter("firewallRules", serde_json::to_value(rules)?)
                                                     .with_tags(instance.tags.clone()))
  }

  async fn deploy(&self,
                  ctx: &StepContext,
                  request: &DeploymentRequest,
                  mut dt: DbmsInstanceDetails)
                  -> Result<Facet, WorkflowError> {
    let outputs = ctx.call(self.clients.deployer.deploy(request)).await?;
    let fqdn = outputs.get("fullyQualifiedDomainName")
                      .and_then(|v| v.as_str())
                      .ok_or_else(|| WorkflowError::step(&ctx.step_name, "el despliegue no devolvio fullyQualifiedDomainName"))?;
    dt.fully_qualified_domain_name = fqdn.to_string();
    Ok(facet(dt))
  }

  async fn deploy_arm_template(&self, ctx: &StepContext, instance: &Instance) -> Result<Facet, WorkflowError> {
    let dt: DbmsInstanceDetails = read_facet(instance.details.as_deref())?;
    let pp: DbmsProvisioningParameters = read_facet(instance.provisioning_parameters.as_deref())?;
    let request = self.deployment_request(instance, &dt, &pp.firewall_rules)?;
    log::info!("desplegando {} {} en {}", self.engine.display_name(), dt.server_name, instance.resource_group);
    self.deploy(ctx, &request, dt).await
  }

  /// Vuelve a desplegar con el mismo nombre aplicando los cambios pedidos.
  async fn update_arm_template(&self, ctx: &StepContext, instance: &Instance) -> Result<Facet, WorkflowError> {
    let mut dt: DbmsInstanceDetails = read_facet(instance.details.as_deref())?;
    let pp: DbmsProvisioningParameters = read_facet(instance.provisioning_parameters.as_deref())?;
    let up: DbmsUpdatingParameters = read_facet(instance.updating_parameters.as_deref())?;
    if let Some(ssl) = &up.ssl_enforcement {
      dt.enforce_ssl = parse_ssl_enforcement(ssl)?;
    }
    let rules = up.firewall_rules.unwrap_or(pp.firewall_rules);
    let request = self.deployment_request(instance, &dt, &rules)?;
    log::info!("actualizando {} {}", self.engine.display_name(), dt.server_name);
    self.deploy(ctx, &request, dt).await
  }

  async fn delete_arm_deployment(&self,
                                 ctx: &StepContext,
                                 instance: &Instance)
                                 -> Result<(Facet, Option<Facet>), WorkflowError> {
    let dt: DbmsInstanceDetails = read_facet(instance.details.as_deref())?;
    let res = ctx.call(self.clients.deployer.delete(&dt.arm_deployment_name, &instance.resource_group)).await;
    ignore_not_found(res, &format!("despliegue {}", dt.arm_deployment_name))?;
    Ok((facet(dt), instance.secure_details.clone()))
  }

  /// Borra el servidor y descarta la contrasena de administrador.
  async fn delete_server(&self,
                         ctx: &StepContext,
                         instance: &Instance)
                         -> Result<(Facet, Option<Facet>), WorkflowError> {
    let dt: DbmsInstanceDetails = read_facet(instance.details.as_deref())?;
    let res = ctx.call(self.clients.servers.delete_server(&instance.resource_group, &dt.server_name)).await;
    ignore_not_found(res, &format!("servidor {}", dt.server_name))?;
    Ok((facet(dt), Some(facet(SecureDbmsInstanceDetails::default()))))
  }
}

impl ServiceManager for DbmsManager {
  fn service(&self) -> Service {
    let name = self.engine.display_name();
    Service::new(self.engine.service_id(),
                 &format!("{} DBMS", name),
                 &format!("Servidor {} administrado", name),
                 vec![Plan::new("basic", "Basic", "Servidor de uso general"),
                      Plan::new("standard", "Standard", "Servidor con mayor capacidad")])
  }

  fn facet_defaults(&self, _plan_id: &str) -> FacetDefaults {
    FacetDefaults::new().provisioning_parameters::<DbmsProvisioningParameters>()
                        .secure_provisioning_parameters::<ParameterMap>()
                        .updating_parameters::<DbmsUpdatingParameters>()
                        .details::<DbmsInstanceDetails>()
                        .secure_details::<SecureDbmsInstanceDetails>()
  }

  fn requires_alias(&self) -> bool {
    true
  }

  fn get_provisioner(&self, _plan: &Plan) -> Result<Provisioner, WorkflowError> {
    Provisioner::new(vec![self.provision_step(ProvisionOp::PreProvision),
                          self.provision_step(ProvisionOp::DeployArmTemplate)])
  }

  fn get_updater(&self, _plan: &Plan) -> Result<Updater, WorkflowError> {
    Updater::new(vec![self.provision_step(ProvisionOp::UpdateArmTemplate)])
  }

  fn get_deprovisioner(&self, _plan: &Plan) -> Result<Deprovisioner, WorkflowError> {
    Deprovisioner::new(vec![self.deprovision_step(DeprovisionOp::DeleteArmDeployment),
                            self.deprovision_step(DeprovisionOp::DeleteServer)])
  }

  fn split_provisioning_parameters(&self, params: &ParameterMap) -> Result<(Facet, Facet), WorkflowError> {
    let pp: DbmsProvisioningParameters = serde_json::from_value(serde_json::Value::Object(params.clone()))?;
    parse_ssl_enforcement(&pp.ssl_enforcement)?;
    Ok((facet(pp), facet(ParameterMap::new())))
  }

  fn updating_parameters(&self, params: &ParameterMap) -> Result<Facet, WorkflowError> {
    let up: DbmsUpdatingParameters = serde_json::from_value(serde_json::Value::Object(params.clone()))?;
    if let Some(ssl) = &up.ssl_enforcement {
      parse_ssl_enforcement(ssl)?;
    }
    Ok(facet(up))
  }

  fn initial_secure_details(&self, instance: &Instance) -> Result<Option<Facet>, WorkflowError> {
    let sdt: SecureDbmsInstanceDetails = read_facet(instance.secure_details.as_deref())?;
    if !sdt.administrator_login_password.is_empty() {
      return Ok(None);
    }
    Ok(Some(facet(SecureDbmsInstanceDetails { administrator_login_password: generate_password() })))
  }
}

#[derive(Debug, Clone, Copy)]
enum ProvisionOp {
  PreProvision,
  DeployArmTemplate,
  UpdateArmTemplate,
}

#[derive(Debug, Clone, Copy)]
enum DeprovisionOp {
  DeleteArmDeployment,
  DeleteServer,
}

struct DbmsProvisionStep {
  op: ProvisionOp,
  manager: DbmsManager,
}

impl Step for DbmsProvisionStep {
  fn name(&self) -> &str {
    match self.op {
      ProvisionOp::PreProvision => "preProvision",
      ProvisionOp::DeployArmTemplate => "deployARMTemplate",
      ProvisionOp::UpdateArmTemplate => "updateARMTemplate",
    }
  }
}

#[async_trait]
impl ProvisioningStep for DbmsProvisionStep {
  async fn execute(&self, ctx: &StepContext, instance: &Instance) -> Result<Facet, WorkflowError> {
    match self.op {
      ProvisionOp::PreProvision => self.manager.pre_provision(instance),
      ProvisionOp::DeployArmTemplate => self.manager.deploy_arm_template(ctx, instance).await,
      ProvisionOp::UpdateArmTemplate => self.manager.update_arm_template(ctx, instance).await,
    }
  }
}

struct DbmsDeprovisionStep {
  name: &'static str,
  op: DeprovisionOp,
  manager: DbmsManager,
}

impl Step for DbmsDeprovisionStep {
  fn name(&self) -> &str {
    self.name
  }
}

#[async_trait]
impl DeprovisioningStep for DbmsDeprovisionStep {
  async fn execute(&self, ctx: &StepContext, instance: &Instance) -> Result<(Facet, Option<Facet>), WorkflowError> {
    match self.op {
      DeprovisionOp::DeleteArmDeployment => self.manager.delete_arm_deployment(ctx, instance).await,
      DeprovisionOp::DeleteServer => self.manager.delete_server(ctx, instance).await,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use broker_providers::FakeCloud;
  use serde_json::json;

  fn manager() -> DbmsManager {
    DbmsManager::postgresql(ProviderClients::from_fake(Arc::new(FakeCloud::new())))
  }

  #[test]
  fn split_keeps_only_known_parameters() {
    let params = json!({"sslEnforcement": "disabled",
                        "firewallRules": [{"name": "all", "startIPAddress": "0.0.0.0", "endIPAddress": "255.255.255.255"}],
                        "extra": 1});
    let (pp, spp) = manager().split_provisioning_parameters(params.as_object().unwrap()).unwrap();
    assert_eq!(pp.to_json().unwrap(),
               json!({"sslEnforcement": "disabled",
                      "firewallRules": [{"name": "all", "startIPAddress": "0.0.0.0", "endIPAddress": "255.255.255.255"}]}));
    assert_eq!(spp.to_json().unwrap(), json!({}));
  }

  #[test]
  fn invalid_ssl_enforcement_is_rejected() {
    let params = json!({"sslEnforcement": "sometimes"});
    let err = manager().split_provisioning_parameters(params.as_object().unwrap()).err().unwrap();
    assert!(matches!(err, WorkflowError::Validation(_)));
  }

  #[test]
  fn pre_provision_reuses_existing_names() {
    let m = manager();
    let instance = Instance::new("postgresql-dbms", "basic").with_details(DbmsInstanceDetails { arm_deployment_name: "dep".into(),
                                                                                               server_name: "srv".into(),
                                                                                               ..Default::default() });
    let first = m.pre_provision(&instance).unwrap();
    let dt = broker_domain::downcast_ref::<DbmsInstanceDetails>(first.as_ref()).unwrap();
    assert_eq!(dt.arm_deployment_name, "dep");
    assert_eq!(dt.server_name, "srv");
    assert!(dt.enforce_ssl);
  }

  #[test]
  fn details_use_wire_names() {
    let dt = DbmsInstanceDetails { arm_deployment_name: "d".into(),
                                   server_name: "s".into(),
                                   fully_qualified_domain_name: "s.fake".into(),
                                   enforce_ssl: true };
    assert_eq!(serde_json::to_value(&dt).unwrap(),
               json!({"armDeployment": "d", "server": "s", "fullyQualifiedDomainName": "s.fake", "enforceSSL": true}));
  }

  #[test]
  fn initial_password_is_generated_once() {
    let m = manager();
    let instance = Instance::new("postgresql-dbms", "basic");
    assert!(m.initial_secure_details(&instance).unwrap().is_some());
    let seeded = instance.with_secure_details(SecureDbmsInstanceDetails { administrator_login_password: "x".into() });
    assert!(m.initial_secure_details(&seeded).unwrap().is_none());
  }
}
