// deployer.rs
//
// Contrato del cliente de despliegues de plantillas (resource manager).
use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// Salidas de un despliegue (`fullyQualifiedDomainName`, `primaryKey`, ...).
pub type DeploymentOutputs = Map<String, JsonValue>;

/// Solicitud de despliegue de una plantilla.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
  /// Nombre del despliegue; identifica el despliegue de forma idempotente.
  pub deployment_name: String,
  pub resource_group: String,
  pub location: String,
  /// Tipo de plantilla (`postgresql-dbms`, `mysql-database`, `cosmosdb-sql`,
  /// `cosmosdb-mongo`).
  pub template: String,
  pub parameters: Map<String, JsonValue>,
  pub tags: BTreeMap<String, String>,
}

impl DeploymentRequest {
  pub fn new(deployment_name: &str, resource_group: &str, location: &str, template: &str) -> Self {
    Self { deployment_name: deployment_name.to_string(),
           resource_group: resource_group.to_string(),
           location: location.to_string(),
           template: template.to_string(),
           parameters: Map::new(),
           tags: BTreeMap::new() }
  }

  pub fn with_parameter(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
    self.parameters.insert(key.to_string(), value.into());
    self
  }

  pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
    self.tags = tags;
    self
  }

  /// Lee un parámetro de texto; `None` si falta o no es string.
  pub fn parameter_str(&self, key: &str) -> Option<&str> {
    self.parameters.get(key).and_then(JsonValue::as_str)
  }
}

/// Cliente del resource manager.
///
/// `deploy` es idempotente por `deployment_name`: volver a desplegar con el
/// mismo nombre actualiza en sitio y devuelve las salidas. `delete` de un
/// despliegue inexistente devuelve `ProviderError::NotFound`; los pasos
/// deciden tratarlo como éxito.
#[async_trait]
pub trait ArmDeployer: Send + Sync {
  async fn deploy(&self, request: &DeploymentRequest) -> Result<DeploymentOutputs>;
  async fn delete(&self, deployment_name: &str, resource_group: &str) -> Result<()>;
}
