// catalog.rs
use crate::DomainError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
  pub id: String,
  pub name: String,
  pub description: String,
}

impl Plan {
  pub fn new(id: &str, name: &str, description: &str) -> Self {
    Self { id: id.to_string(), name: name.to_string(), description: description.to_string() }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
  pub id: String,
  pub name: String,
  pub description: String,
  /// Servicio padre (por ejemplo el DBMS que aloja una base de datos).
  pub parent_service_id: Option<String>,
  pub plans: Vec<Plan>,
}

impl Service {
  pub fn new(id: &str, name: &str, description: &str, plans: Vec<Plan>) -> Self {
    Self { id: id.to_string(),
           name: name.to_string(),
           description: description.to_string(),
           parent_service_id: None,
           plans }
  }

  pub fn with_parent_service(mut self, parent_service_id: &str) -> Self {
    self.parent_service_id = Some(parent_service_id.to_string());
    self
  }

  pub fn plan(&self, plan_id: &str) -> Option<&Plan> {
    self.plans.iter().find(|p| p.id == plan_id)
  }
}

/// Catálogo de servicios y planes conocidos por el broker.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
  services: BTreeMap<String, Service>,
}

impl Catalog {
  pub fn new() -> Self {
    Self::default()
  }

  /// Agrega un servicio. Falla si el id ya existe.
  pub fn add_service(&mut self, service: Service) -> Result<(), DomainError> {
    if self.services.contains_key(&service.id) {
      return Err(DomainError::Validation(format!("servicio duplicado: {}", service.id)));
    }
    self.services.insert(service.id.clone(), service);
    Ok(())
  }

  pub fn services(&self) -> impl Iterator<Item = &Service> {
    self.services.values()
  }

  pub fn get_service(&self, service_id: &str) -> Option<&Service> {
    self.services.get(service_id)
  }

  /// Resuelve el par (servicio, plan).
  pub fn resolve(&self, service_id: &str, plan_id: &str) -> Result<(&Service, &Plan), DomainError> {
    let service =
      self.services.get(service_id).ok_or_else(|| DomainError::NotFound(format!("servicio {}", service_id)))?;
    let plan = service.plan(plan_id)
                      .ok_or_else(|| DomainError::NotFound(format!("plan {} del servicio {}", plan_id, service_id)))?;
    Ok((service, plan))
  }
}
