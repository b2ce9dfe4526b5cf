// facet.rs
//
// Un facet es un sub-documento de la instancia (parámetros o detalles). Cada
// servicio define su propia variante tipada; el registro de facets decide
// qué variante usar a partir de `service_id`/`plan_id`.
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::any::Any;
use std::fmt;

/// Mapa de parámetros opaco para servicios que no declaran una variante
/// tipada.
pub type ParameterMap = serde_json::Map<String, JsonValue>;

/// Capacidad común de todos los facets: (de)serialización JSON y downcast a
/// la variante concreta.
///
/// Se implementa automáticamente para cualquier tipo `Serialize +
/// DeserializeOwned + Clone + Debug`. Un `serde_json::Value` también es un
/// facet válido (variante "cruda" cuando no se conoce el tipo).
pub trait FacetValue: fmt::Debug + Send + Sync + 'static {
  fn to_json(&self) -> Result<JsonValue, serde_json::Error>;

  /// Reemplaza el contenido con `value`, conservando el tipo concreto.
  fn load_json(&mut self, value: JsonValue) -> Result<(), serde_json::Error>;

  fn clone_facet(&self) -> Facet;

  fn as_any(&self) -> &dyn Any;

  fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub type Facet = Box<dyn FacetValue>;

impl<T> FacetValue for T where T: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
  fn to_json(&self) -> Result<JsonValue, serde_json::Error> {
    serde_json::to_value(self)
  }

  fn load_json(&mut self, value: JsonValue) -> Result<(), serde_json::Error> {
    *self = serde_json::from_value(value)?;
    Ok(())
  }

  fn clone_facet(&self) -> Facet {
    Box::new(self.clone())
  }

  fn as_any(&self) -> &dyn Any {
    self
  }

  fn as_any_mut(&mut self) -> &mut dyn Any {
    self
  }
}

impl Clone for Facet {
  fn clone(&self) -> Self {
    self.clone_facet()
  }
}

/// Envuelve un valor tipado como `Facet`.
pub fn facet<T: FacetValue>(value: T) -> Facet {
  Box::new(value)
}

/// Downcast de un facet a su variante concreta.
pub fn downcast_ref<T: 'static>(facet: &dyn FacetValue) -> Option<&T> {
  facet.as_any().downcast_ref::<T>()
}

/// Igualdad semántica: dos facets son iguales si su JSON lo es.
pub fn facet_eq(a: &dyn FacetValue, b: &dyn FacetValue) -> bool {
  match (a.to_json(), b.to_json()) {
    (Ok(x), Ok(y)) => x == y,
    _ => false,
  }
}

pub(crate) fn option_facet_eq(a: Option<&dyn FacetValue>, b: Option<&dyn FacetValue>) -> bool {
  match (a, b) {
    (None, None) => true,
    (Some(x), Some(y)) => facet_eq(x, y),
    _ => false,
  }
}

/// Nombre de cada facet de la instancia, usado para identificar el facet que
/// falló en los errores de (de)codificación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacetKind {
  ProvisioningParameters,
  SecureProvisioningParameters,
  UpdatingParameters,
  Details,
  SecureDetails,
}

impl fmt::Display for FacetKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      FacetKind::ProvisioningParameters => "provisioningParameters",
      FacetKind::SecureProvisioningParameters => "secureProvisioningParameters",
      FacetKind::UpdatingParameters => "updatingParameters",
      FacetKind::Details => "details",
      FacetKind::SecureDetails => "secureDetails",
    };
    write!(f, "{}", s)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::Deserialize;

  #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
  struct Sample {
    name: String,
  }

  #[test]
  fn downcast_returns_concrete_variant() {
    let f = facet(Sample { name: "a".into() });
    assert_eq!(downcast_ref::<Sample>(f.as_ref()).map(|s| s.name.as_str()), Some("a"));
    assert!(downcast_ref::<ParameterMap>(f.as_ref()).is_none());
  }

  #[test]
  fn load_json_keeps_type() {
    let mut f = facet(Sample::default());
    f.load_json(serde_json::json!({"name": "b"})).unwrap();
    assert_eq!(downcast_ref::<Sample>(f.as_ref()).unwrap().name, "b");
    let cloned = f.clone();
    assert!(facet_eq(cloned.as_ref(), f.as_ref()));
  }
}
