// clients.rs
//
// Clientes específicos por servicio, usados por los pasos de
// desaprovisionamiento y por la creación de bases Cosmos.
use crate::errors::Result;
use async_trait::async_trait;

/// Cliente de servidores de bases relacionales (PostgreSQL, MySQL).
#[async_trait]
pub trait ServersClient: Send + Sync {
  /// Borra el servidor. `NotFound` si ya no existe.
  async fn delete_server(&self, resource_group: &str, server_name: &str) -> Result<()>;
  /// Borra una base de datos del servidor. `NotFound` si ya no existe.
  async fn delete_database(&self, resource_group: &str, server_name: &str, database_name: &str) -> Result<()>;
}

/// Cliente de cuentas Cosmos DB.
#[async_trait]
pub trait DatabaseAccountsClient: Send + Sync {
  /// Crea la base dentro de la cuenta. `Conflict` si ya existe.
  async fn create_database(&self, account_name: &str, database_name: &str, primary_key: &str) -> Result<()>;
  /// Borra la cuenta. `NotFound` si ya no existe.
  async fn delete_account(&self, resource_group: &str, account_name: &str) -> Result<()>;
}
