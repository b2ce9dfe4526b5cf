//! Servicios administrados incluidos en el broker.
//!
//! Cada modulo define las variantes tipadas de sus facets, el manager
//! (`ServiceManager`) y los pasos de cada workflow. Los pasos hablan con el
//! exterior solo a traves de [`ProviderClients`].
pub mod cosmosdb;
pub mod dbms;
pub mod mysql;

use crate::errors::WorkflowError;
use crate::factory::ServiceRegistry;
use broker_domain::FacetValue;
use broker_providers::{ArmDeployer, DatabaseAccountsClient, FakeCloud, ServersClient};
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub use cosmosdb::{CosmosKind, CosmosManager, CosmosdbInstanceDetails};
pub use dbms::{DbmsEngine, DbmsInstanceDetails, DbmsManager, DbmsProvisioningParameters, DbmsUpdatingParameters,
               FirewallRule, SecureDbmsInstanceDetails};
pub use mysql::{MysqlDatabaseDetails, MysqlDatabaseManager};

/// Clientes externos compartidos por los pasos de todos los servicios.
#[derive(Clone)]
pub struct ProviderClients {
  pub deployer: Arc<dyn ArmDeployer>,
  pub servers: Arc<dyn ServersClient>,
  pub accounts: Arc<dyn DatabaseAccountsClient>,
}

impl std::fmt::Debug for ProviderClients {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("ProviderClients")
  }
}

impl ProviderClients {
  /// Usa la nube en memoria para los tres contratos.
  pub fn from_fake(cloud: Arc<FakeCloud>) -> Self {
    Self { deployer: cloud.clone(), servers: cloud.clone(), accounts: cloud }
  }
}

/// Registro con todos los servicios incluidos.
pub fn default_registry(clients: &ProviderClients) -> Result<ServiceRegistry, WorkflowError> {
  let mut registry = ServiceRegistry::new();
  registry.register(Arc::new(DbmsManager::postgresql(clients.clone())))?;
  registry.register(Arc::new(DbmsManager::mysql(clients.clone())))?;
  registry.register(Arc::new(MysqlDatabaseManager::new(clients.clone())))?;
  registry.register(Arc::new(CosmosManager::sql_all_in_one(clients.clone())))?;
  registry.register(Arc::new(CosmosManager::mongo(clients.clone())))?;
  Ok(registry)
}

/// Lee un facet como su variante tipada.
///
/// Si el facet guarda otra representacion (JSON crudo conservado al
/// decodificar) se reinterpreta a traves de su JSON; si falta, se usa el
/// valor por defecto.
pub(crate) fn read_facet<T>(value: Option<&dyn FacetValue>) -> Result<T, WorkflowError>
  where T: DeserializeOwned + Default + Clone + 'static
{
  match value {
    None => Ok(T::default()),
    Some(v) => match broker_domain::downcast_ref::<T>(v) {
      Some(typed) => Ok(typed.clone()),
      None => {
        let json = v.to_json()?;
        if json.is_null() {
          return Ok(T::default());
        }
        Ok(serde_json::from_value(json)?)
      }
    },
  }
}

/// Trata "no encontrado" como exito en los pasos de borrado.
pub(crate) fn ignore_not_found(res: Result<(), WorkflowError>, what: &str) -> Result<(), WorkflowError> {
  match res {
    Err(WorkflowError::Provider(err)) if err.is_not_found() => {
      log::debug!("{} ya no existe: {}", what, err);
      Ok(())
    }
    other => other,
  }
}

/// Trata "ya existe" como exito en los pasos de creacion.
pub(crate) fn ignore_conflict(res: Result<(), WorkflowError>, what: &str) -> Result<(), WorkflowError> {
  match res {
    Err(WorkflowError::Provider(err)) if err.is_conflict() => {
      log::debug!("{} ya existe: {}", what, err);
      Ok(())
    }
    other => other,
  }
}

/// Identificador nuevo sin guiones, apto como nombre de recurso.
pub(crate) fn new_resource_name(prefix: &str) -> String {
  let id = uuid::Uuid::new_v4().simple().to_string();
  format!("{}{}", prefix, &id[..20])
}
