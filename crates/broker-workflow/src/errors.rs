use broker_domain::DomainError;
use broker_providers::ProviderError;
use flow::errors::FlowError;
use std::time::Duration;
use thiserror::Error;

// Errores comunes del motor de workflow.
//
// Este enum centraliza los errores que pueden ocurrir durante la
// ejecucion de un workflow: errores del almacenamiento (`FlowError`), del
// dominio (`DomainError`), de los clientes externos (`ProviderError`),
// errores de construccion de secuencias y fallos de pasos.
#[derive(Error, Debug)]
pub enum WorkflowError {
  /// Errores originados por la capa de persistencia/flow crate.
  #[error("Error de flujo: {0}")]
  Flow(#[from] FlowError),

  /// Errores del dominio (codec, decodificacion, validaciones).
  #[error("Error de dominio: {0}")]
  Domain(#[from] DomainError),

  /// Errores de los clientes externos.
  #[error("Error del proveedor: {0}")]
  Provider(#[from] ProviderError),

  /// Errores de serializacion/deserializacion JSON.
  #[error("Error de serializacion: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("Nombre de paso duplicado: {0}")]
  DuplicateStepName(String),

  #[error("Paso desconocido: {0}")]
  UnknownStep(String),

  #[error("Servicio desconocido: {0}")]
  UnknownService(String),

  /// Fallo reportado por un paso.
  #[error("{step}: {message}")]
  Step { step: String, message: String },

  /// El paso excedio el tiempo maximo configurado.
  #[error("{step}: tiempo agotado tras {after:?}")]
  Timeout { step: String, after: Duration },

  /// La escritura tras un paso siguio fallando despues de todos los
  /// reintentos.
  #[error("Persistencia agotada tras el paso {step} ({attempts} intentos): {source}")]
  PersistenceExhausted {
    step: String,
    attempts: u32,
    #[source]
    source: FlowError,
  },

  #[error("Ejecucion cancelada en el paso {step}")]
  Canceled { step: String },

  /// Errores de validacion local del workflow.
  #[error("Error de validacion: {0}")]
  Validation(String),

  /// Error generico: captura otros tipos de errores no tipados.
  #[error("Otro error: {0}")]
  Other(String),
}

impl WorkflowError {
  /// Construye un fallo de paso con mensaje libre.
  pub fn step(step: &str, message: impl Into<String>) -> Self {
    WorkflowError::Step { step: step.to_string(), message: message.into() }
  }

  pub fn is_canceled(&self) -> bool {
    matches!(self, WorkflowError::Canceled { .. } | WorkflowError::Provider(ProviderError::Canceled(_)))
  }
}
