// facet_registry.rs
//
// Registro (service_id, plan_id) -> constructor de las variantes de facets
// usadas como defaults al decodificar una instancia persistida.
use crate::facet::{Facet, FacetValue};
use crate::DomainError;
use std::collections::HashMap;
use std::sync::Arc;

/// Variantes vacías de cada facet para un servicio/plan. Un campo `None`
/// indica que el servicio no usa ese facet.
#[derive(Debug, Clone, Default)]
pub struct FacetDefaults {
  pub provisioning_parameters: Option<Facet>,
  pub secure_provisioning_parameters: Option<Facet>,
  pub updating_parameters: Option<Facet>,
  pub details: Option<Facet>,
  pub secure_details: Option<Facet>,
}

impl FacetDefaults {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn provisioning_parameters<T: FacetValue + Default>(mut self) -> Self {
    self.provisioning_parameters = Some(Box::new(T::default()));
    self
  }

  pub fn secure_provisioning_parameters<T: FacetValue + Default>(mut self) -> Self {
    self.secure_provisioning_parameters = Some(Box::new(T::default()));
    self
  }

  pub fn updating_parameters<T: FacetValue + Default>(mut self) -> Self {
    self.updating_parameters = Some(Box::new(T::default()));
    self
  }

  pub fn details<T: FacetValue + Default>(mut self) -> Self {
    self.details = Some(Box::new(T::default()));
    self
  }

  pub fn secure_details<T: FacetValue + Default>(mut self) -> Self {
    self.secure_details = Some(Box::new(T::default()));
    self
  }
}

type DefaultsFactory = Arc<dyn Fn() -> FacetDefaults + Send + Sync>;

#[derive(Clone, Default)]
pub struct FacetRegistry {
  factories: HashMap<(String, String), DefaultsFactory>,
}

impl FacetRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registra el constructor de defaults para un plan. Un registro posterior
  /// para el mismo par reemplaza al anterior.
  pub fn register<F>(&mut self, service_id: &str, plan_id: &str, factory: F)
    where F: Fn() -> FacetDefaults + Send + Sync + 'static
  {
    self.factories.insert((service_id.to_string(), plan_id.to_string()), Arc::new(factory));
  }

  /// Construye defaults frescos para el plan; cada llamada devuelve
  /// variantes nuevas.
  pub fn defaults_for(&self, service_id: &str, plan_id: &str) -> Result<FacetDefaults, DomainError> {
    self.factories
        .get(&(service_id.to_string(), plan_id.to_string()))
        .map(|f| f())
        .ok_or_else(|| DomainError::NotFound(format!("variantes de facets para {}/{}", service_id, plan_id)))
  }

  pub fn contains(&self, service_id: &str, plan_id: &str) -> bool {
    self.factories.contains_key(&(service_id.to_string(), plan_id.to_string()))
  }
}

impl std::fmt::Debug for FacetRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FacetRegistry").field("plans", &self.factories.keys().collect::<Vec<_>>()).finish()
  }
}
