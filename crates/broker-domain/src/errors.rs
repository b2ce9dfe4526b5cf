// errors.rs
use crate::facet::FacetKind;
use thiserror::Error;

/// Errores del codec simétrico usado para los facets sensibles.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
  /// El blob fue truncado, alterado o cifrado con otra clave/versión.
  #[error("Error de integridad: {0}")]
  Integrity(String),
  /// La clave configurada no es utilizable (longitud, formato).
  #[error("Clave inválida: {0}")]
  InvalidKey(String),
  /// Fallo interno del cifrador al cifrar.
  #[error("Error de cifrado: {0}")]
  Cipher(String),
}

#[derive(Debug, Error, Clone)]
pub enum DomainError {
  /// JSON externo mal formado o un facet que no encaja en su variante.
  #[error("Error de decodificación: {0}")]
  Decode(String),
  /// Un facet en texto plano no pudo serializarse a JSON.
  #[error("Error de codificación en {facet}: {reason}")]
  Encode { facet: FacetKind, reason: String },
  /// El registro completo (ya con los facets codificados) no pudo
  /// serializarse.
  #[error("Error de codificación del registro: {0}")]
  EncodeRecord(String),
  /// Fallo de decodificación causado por el codec (manipulación o clave
  /// distinta). Identifica el facet que falló.
  #[error("Error de integridad al descifrar {facet}: {source}")]
  Integrity {
    facet: FacetKind,
    #[source]
    source: CodecError,
  },
  /// Fallo del codec al cifrar un facet.
  #[error("Error de cifrado en {facet}: {source}")]
  Codec {
    facet: FacetKind,
    #[source]
    source: CodecError,
  },
  #[error("Error de serialización: {0}")]
  Serialization(String),
  #[error("Error de validación: {0}")]
  Validation(String),
  #[error("No encontrado: {0}")]
  NotFound(String),
  #[error("Error externo: {0}")]
  External(String),
}

impl DomainError {
  /// `true` cuando el error proviene de una verificación de integridad del
  /// codec durante la decodificación.
  pub fn is_integrity(&self) -> bool {
    matches!(self, DomainError::Integrity { source: CodecError::Integrity(_), .. })
  }
}

impl From<serde_json::Error> for DomainError {
  fn from(e: serde_json::Error) -> Self {
    Self::Serialization(e.to_string())
  }
}
