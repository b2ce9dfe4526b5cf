// errors.rs
use thiserror::Error;

/// Errores devueltos por los clientes externos (resource manager, servidores,
/// cuentas de base de datos).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
  /// El recurso no existe (p. ej. ya fue borrado).
  #[error("Recurso no encontrado: {0}")]
  NotFound(String),
  /// El recurso ya existe.
  #[error("Recurso ya existe: {0}")]
  Conflict(String),
  #[error("Cuota excedida: {0}")]
  Quota(String),
  /// Fallo remoto genérico (red, API, plantilla inválida).
  #[error("Error remoto: {0}")]
  Remote(String),
  #[error("Operación cancelada: {0}")]
  Canceled(String),
}

impl ProviderError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, ProviderError::NotFound(_))
  }

  pub fn is_conflict(&self) -> bool {
    matches!(self, ProviderError::Conflict(_))
  }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
