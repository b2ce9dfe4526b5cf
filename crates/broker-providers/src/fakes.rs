// fakes.rs
//
// Nube simulada en memoria que implementa los tres clientes externos sobre un
// estado compartido. Cuenta llamadas por operación, permite encolar fallos y
// añadir latencia para ejercitar cancelaciones y timeouts.
use crate::clients::{DatabaseAccountsClient, ServersClient};
use crate::deployer::{ArmDeployer, DeploymentOutputs, DeploymentRequest};
use crate::errors::{ProviderError, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Nombres de operación usados por los contadores y la inyección de fallos.
pub mod ops {
  pub const DEPLOY: &str = "deploy";
  pub const DELETE_DEPLOYMENT: &str = "deleteDeployment";
  pub const DELETE_SERVER: &str = "deleteServer";
  pub const DELETE_DATABASE: &str = "deleteDatabase";
  pub const CREATE_COSMOS_DATABASE: &str = "createCosmosDatabase";
  pub const DELETE_ACCOUNT: &str = "deleteAccount";
}

/// Tipos de plantilla que entiende la nube simulada.
pub mod templates {
  pub const POSTGRESQL_DBMS: &str = "postgresql-dbms";
  pub const MYSQL_DBMS: &str = "mysql-dbms";
  pub const MYSQL_DATABASE: &str = "mysql-database";
  pub const COSMOSDB_SQL: &str = "cosmosdb-sql";
  pub const COSMOSDB_MONGO: &str = "cosmosdb-mongo";
}

type Key2 = (String, String);

#[derive(Debug, Default)]
struct CloudState {
  deployments: BTreeMap<Key2, DeploymentRequest>,
  servers: BTreeMap<Key2, String>,
  databases: BTreeSet<(String, String, String)>,
  accounts: BTreeMap<Key2, String>,
  cosmos_databases: BTreeSet<Key2>,
}

#[derive(Debug, Default)]
pub struct FakeCloud {
  state: Mutex<CloudState>,
  calls: Mutex<HashMap<String, usize>>,
  failures: Mutex<HashMap<String, VecDeque<ProviderError>>>,
  latency: Mutex<Duration>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
  m.lock().unwrap_or_else(|e| e.into_inner())
}

fn key(a: &str, b: &str) -> Key2 {
  (a.to_string(), b.to_string())
}

fn required<'a>(request: &'a DeploymentRequest, name: &str) -> Result<&'a str> {
  request.parameter_str(name)
         .filter(|v| !v.is_empty())
         .ok_or_else(|| ProviderError::Remote(format!("{}: falta el parámetro {}", request.template, name)))
}

impl FakeCloud {
  pub fn new() -> Self {
    Self::default()
  }

  /// Cada operación espera `latency` antes de ejecutarse.
  pub fn with_latency(self, latency: Duration) -> Self {
    self.set_latency(latency);
    self
  }

  pub fn set_latency(&self, latency: Duration) {
    *lock(&self.latency) = latency;
  }

  /// Encola un error para la próxima llamada a `op` (ver [`ops`]).
  pub fn fail_next(&self, op: &str, err: ProviderError) {
    lock(&self.failures).entry(op.to_string()).or_default().push_back(err);
  }

  /// Número de llamadas a `op`, incluidas las fallidas.
  pub fn calls(&self, op: &str) -> usize {
    lock(&self.calls).get(op).copied().unwrap_or(0)
  }

  pub fn deployment(&self, resource_group: &str, deployment_name: &str) -> Option<DeploymentRequest> {
    lock(&self.state).deployments.get(&key(resource_group, deployment_name)).cloned()
  }

  pub fn has_deployment(&self, resource_group: &str, deployment_name: &str) -> bool {
    self.deployment(resource_group, deployment_name).is_some()
  }

  pub fn has_server(&self, resource_group: &str, server_name: &str) -> bool {
    lock(&self.state).servers.contains_key(&key(resource_group, server_name))
  }

  pub fn has_database(&self, resource_group: &str, server_name: &str, database_name: &str) -> bool {
    lock(&self.state).databases
                     .contains(&(resource_group.to_string(), server_name.to_string(), database_name.to_string()))
  }

  pub fn has_account(&self, resource_group: &str, account_name: &str) -> bool {
    lock(&self.state).accounts.contains_key(&key(resource_group, account_name))
  }

  pub fn has_cosmos_database(&self, account_name: &str, database_name: &str) -> bool {
    lock(&self.state).cosmos_databases.contains(&key(account_name, database_name))
  }

  /// Registra la llamada, aplica la latencia y consume un fallo encolado.
  async fn begin(&self, op: &str) -> Result<()> {
    *lock(&self.calls).entry(op.to_string()).or_insert(0) += 1;
    let latency = *lock(&self.latency);
    if !latency.is_zero() {
      tokio::time::sleep(latency).await;
    }
    if let Some(err) = lock(&self.failures).get_mut(op).and_then(VecDeque::pop_front) {
      log::debug!("fake: fallo inyectado en {}: {}", op, err);
      return Err(err);
    }
    Ok(())
  }

  fn apply_template(state: &mut CloudState, request: &DeploymentRequest) -> Result<DeploymentOutputs> {
    let rg = request.resource_group.as_str();
    let mut outputs = DeploymentOutputs::new();
    match request.template.as_str() {
      templates::POSTGRESQL_DBMS | templates::MYSQL_DBMS => {
        let server = required(request, "serverName")?;
        required(request, "administratorLoginPassword")?;
        let engine = if request.template == templates::MYSQL_DBMS { "mysql" } else { "postgres" };
        state.servers.insert(key(rg, server), request.template.clone());
        outputs.insert("fullyQualifiedDomainName".into(),
                       JsonValue::String(format!("{}.{}.database.fake", server, engine)));
      }
      templates::MYSQL_DATABASE => {
        let server = required(request, "serverName")?;
        let database = required(request, "databaseName")?;
        if !state.servers.contains_key(&key(rg, server)) {
          return Err(ProviderError::NotFound(format!("servidor {}/{}", rg, server)));
        }
        state.databases.insert((rg.to_string(), server.to_string(), database.to_string()));
        outputs.insert("databaseName".into(), JsonValue::String(database.to_string()));
      }
      templates::COSMOSDB_SQL | templates::COSMOSDB_MONGO => {
        let account = required(request, "accountName")?;
        let primary_key = format!("key-{}", account);
        state.accounts.insert(key(rg, account), primary_key.clone());
        outputs.insert("fullyQualifiedDomainName".into(),
                       JsonValue::String(format!("https://{}.documents.fake:443/", account)));
        outputs.insert("primaryKey".into(), JsonValue::String(primary_key));
      }
      other => return Err(ProviderError::Remote(format!("plantilla desconocida: {}", other))),
    }
    Ok(outputs)
  }
}

#[async_trait]
impl ArmDeployer for FakeCloud {
  async fn deploy(&self, request: &DeploymentRequest) -> Result<DeploymentOutputs> {
    self.begin(ops::DEPLOY).await?;
    let mut state = lock(&self.state);
    let outputs = Self::apply_template(&mut state, request)?;
    state.deployments
         .insert(key(&request.resource_group, &request.deployment_name), request.clone());
    log::debug!("fake: despliegue {} ({})", request.deployment_name, request.template);
    Ok(outputs)
  }

  async fn delete(&self, deployment_name: &str, resource_group: &str) -> Result<()> {
    self.begin(ops::DELETE_DEPLOYMENT).await?;
    lock(&self.state).deployments
                     .remove(&key(resource_group, deployment_name))
                     .map(|_| ())
                     .ok_or_else(|| ProviderError::NotFound(format!("despliegue {}/{}", resource_group, deployment_name)))
  }
}

#[async_trait]
impl ServersClient for FakeCloud {
  async fn delete_server(&self, resource_group: &str, server_name: &str) -> Result<()> {
    self.begin(ops::DELETE_SERVER).await?;
    let mut state = lock(&self.state);
    if state.servers.remove(&key(resource_group, server_name)).is_none() {
      return Err(ProviderError::NotFound(format!("servidor {}/{}", resource_group, server_name)));
    }
    state.databases.retain(|(rg, server, _)| !(rg == resource_group && server == server_name));
    Ok(())
  }

  async fn delete_database(&self, resource_group: &str, server_name: &str, database_name: &str) -> Result<()> {
    self.begin(ops::DELETE_DATABASE).await?;
    let removed = lock(&self.state).databases.remove(&(resource_group.to_string(),
                                                        server_name.to_string(),
                                                        database_name.to_string()));
    if removed {
      Ok(())
    } else {
      Err(ProviderError::NotFound(format!("base {}/{}/{}", resource_group, server_name, database_name)))
    }
  }
}

#[async_trait]
impl DatabaseAccountsClient for FakeCloud {
  async fn create_database(&self, account_name: &str, database_name: &str, primary_key: &str) -> Result<()> {
    self.begin(ops::CREATE_COSMOS_DATABASE).await?;
    let mut state = lock(&self.state);
    let account_key = state.accounts
                           .iter()
                           .find(|((_, name), _)| name == account_name)
                           .map(|(_, k)| k.clone())
                           .ok_or_else(|| ProviderError::NotFound(format!("cuenta {}", account_name)))?;
    if account_key != primary_key {
      return Err(ProviderError::Remote(format!("clave inválida para la cuenta {}", account_name)));
    }
    if !state.cosmos_databases.insert(key(account_name, database_name)) {
      return Err(ProviderError::Conflict(format!("base {}/{}", account_name, database_name)));
    }
    Ok(())
  }

  async fn delete_account(&self, resource_group: &str, account_name: &str) -> Result<()> {
    self.begin(ops::DELETE_ACCOUNT).await?;
    let mut state = lock(&self.state);
    if state.accounts.remove(&key(resource_group, account_name)).is_none() {
      return Err(ProviderError::NotFound(format!("cuenta {}/{}", resource_group, account_name)));
    }
    state.cosmos_databases.retain(|(account, _)| account != account_name);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pg_request(server: &str) -> DeploymentRequest {
    DeploymentRequest::new("dep-1", "rg", "eastus", templates::POSTGRESQL_DBMS).with_parameter("serverName", server)
                                                                               .with_parameter("administratorLoginPassword",
                                                                                               "pw")
  }

  #[tokio::test]
  async fn deploy_is_idempotent_by_name() {
    let cloud = FakeCloud::new();
    let a = cloud.deploy(&pg_request("srv")).await.unwrap();
    let b = cloud.deploy(&pg_request("srv")).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(cloud.calls(ops::DEPLOY), 2);
    assert!(cloud.has_server("rg", "srv"));
  }

  #[tokio::test]
  async fn injected_failure_is_consumed_once() {
    let cloud = FakeCloud::new();
    cloud.fail_next(ops::DEPLOY, ProviderError::Quota("quota exceeded".into()));
    assert_eq!(cloud.deploy(&pg_request("srv")).await, Err(ProviderError::Quota("quota exceeded".into())));
    assert!(cloud.deploy(&pg_request("srv")).await.is_ok());
  }

  #[tokio::test]
  async fn missing_parameter_is_remote_error() {
    let cloud = FakeCloud::new();
    let req = DeploymentRequest::new("dep-1", "rg", "eastus", templates::POSTGRESQL_DBMS).with_parameter("serverName", "srv");
    assert!(matches!(cloud.deploy(&req).await, Err(ProviderError::Remote(_))));
  }

  #[tokio::test]
  async fn deleting_server_drops_its_databases() {
    let cloud = FakeCloud::new();
    cloud.deploy(&pg_request("srv")).await.unwrap();
    let db = DeploymentRequest::new("dep-2", "rg", "eastus", templates::MYSQL_DATABASE).with_parameter("serverName", "srv")
                                                                                          .with_parameter("databaseName", "db1");
    cloud.deploy(&db).await.unwrap();
    assert!(cloud.has_database("rg", "srv", "db1"));
    cloud.delete_server("rg", "srv").await.unwrap();
    assert!(!cloud.has_database("rg", "srv", "db1"));
    assert!(cloud.delete_server("rg", "srv").await.unwrap_err().is_not_found());
  }
}
