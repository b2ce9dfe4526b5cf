// Archivo: errors.rs
// Propósito: definir los errores del colaborador de almacenamiento y el
// alias Result<T> usado por las APIs del crate.
use thiserror::Error;
/// Errores comunes del almacenamiento de instancias.
///
/// - `NotFound`: registro no encontrado.
/// - `Conflict`: conflicto de concurrencia o de datos.
/// - `Storage`: error al acceder al almacenamiento externo (transitorio,
///   reintentable).
/// - `Other`: cualquier otro error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// Registro no encontrado (por ejemplo, una instancia borrada).
    #[error("No encontrado: {0}")]
    NotFound(String),
    /// Conflicto al escribir.
    #[error("Conflicto: {0}")]
    Conflict(String),
    /// Error genérico de almacenamiento (BD, pool, mutex envenenado).
    #[error("Error de almacenamiento: {0}")]
    Storage(String),
    /// Otro tipo de error.
    #[error("Otro: {0}")]
    Other(String),
}

impl FlowError {
    /// Sólo los errores de almacenamiento se consideran transitorios.
    pub fn is_transient(&self) -> bool {
        matches!(self, FlowError::Storage(_))
    }
}

/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, FlowError>;
