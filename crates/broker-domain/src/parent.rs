// parent.rs
//
// Relación padre/hijo entre instancias (por ejemplo base de datos -> DBMS).
// La instancia hija sólo guarda la identidad del padre; la resolución la
// hace un lookup externo.
use crate::{DomainError, Instance};

/// Referencia no propietaria a la instancia padre.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
  pub instance_id: String,
  pub alias: String,
}

/// Búsqueda de instancias por alias, provista por la capa de persistencia.
pub trait InstanceLookup: Send + Sync {
  fn find_by_alias(&self, alias: &str) -> Result<Option<Instance>, DomainError>;
}
