use crate::errors::WorkflowError;
use crate::step::{Deprovisioner, Provisioner, Updater};
use broker_domain::{facet, Catalog, Facet, FacetDefaults, FacetRegistry, Instance, ParameterMap, Plan, Service};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Implementacion de un servicio administrado.
///
/// Describe el servicio para el catalogo, las variantes de facets de cada
/// plan y las secuencias de pasos de cada workflow. Las secuencias se
/// construyen en cada llamada; los pasos comparten los clientes externos
/// del manager.
pub trait ServiceManager: Send + Sync {
  fn service(&self) -> Service;

  /// Variantes vacias de los facets del plan, usadas al decodificar.
  fn facet_defaults(&self, plan_id: &str) -> FacetDefaults;

  /// `true` si las instancias deben aceptarse con alias (otras instancias
  /// las referencian como padre).
  fn requires_alias(&self) -> bool {
    false
  }

  fn get_provisioner(&self, plan: &Plan) -> Result<Provisioner, WorkflowError>;

  /// Por defecto el servicio no tiene pasos de actualizacion: la
  /// actualizacion termina de inmediato.
  fn get_updater(&self, _plan: &Plan) -> Result<Updater, WorkflowError> {
    Ok(Updater::empty())
  }

  fn get_deprovisioner(&self, plan: &Plan) -> Result<Deprovisioner, WorkflowError>;

  /// Separa los parametros de la solicitud en (texto plano, sensibles).
  fn split_provisioning_parameters(&self, params: &ParameterMap) -> Result<(Facet, Facet), WorkflowError>;

  /// Convierte los parametros de una actualizacion en su facet. Por
  /// defecto se guardan tal cual.
  fn updating_parameters(&self, params: &ParameterMap) -> Result<Facet, WorkflowError> {
    Ok(facet(params.clone()))
  }

  /// Detalles sensibles con los que arranca una instancia aceptada (por
  /// ejemplo la contrasena de administrador generada). `None` deja la
  /// variante vacia del plan.
  fn initial_secure_details(&self, _instance: &Instance) -> Result<Option<Facet>, WorkflowError> {
    Ok(None)
  }
}

/// Registro de servicios: managers por `service_id`, catalogo y registro de
/// variantes de facets derivados de ellos.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
  managers: BTreeMap<String, Arc<dyn ServiceManager>>,
  catalog: Catalog,
  facets: FacetRegistry,
}

impl std::fmt::Debug for ServiceRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ServiceRegistry").field("services", &self.managers.keys().collect::<Vec<_>>()).finish()
  }
}

impl ServiceRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registra un manager. Falla si el servicio ya estaba registrado.
  pub fn register(&mut self, manager: Arc<dyn ServiceManager>) -> Result<(), WorkflowError> {
    let service = manager.service();
    self.catalog.add_service(service.clone())?;
    for plan in &service.plans {
      let m = manager.clone();
      let plan_id = plan.id.clone();
      self.facets.register(&service.id, &plan.id, move || m.facet_defaults(&plan_id));
    }
    log::debug!("servicio registrado: {} ({} planes)", service.id, service.plans.len());
    self.managers.insert(service.id, manager);
    Ok(())
  }

  pub fn manager(&self, service_id: &str) -> Result<&Arc<dyn ServiceManager>, WorkflowError> {
    self.managers.get(service_id).ok_or_else(|| WorkflowError::UnknownService(service_id.to_string()))
  }

  pub fn catalog(&self) -> &Catalog {
    &self.catalog
  }

  pub fn facet_registry(&self) -> &FacetRegistry {
    &self.facets
  }

  pub fn defaults_for(&self, service_id: &str, plan_id: &str) -> Result<FacetDefaults, WorkflowError> {
    Ok(self.facets.defaults_for(service_id, plan_id)?)
  }

  /// Resuelve el manager y el plan de un par (servicio, plan).
  pub fn resolve(&self, service_id: &str, plan_id: &str) -> Result<(&Arc<dyn ServiceManager>, &Plan), WorkflowError> {
    let manager = self.manager(service_id)?;
    let (_, plan) = self.catalog.resolve(service_id, plan_id)?;
    Ok((manager, plan))
  }

  pub fn get_provisioner(&self, service_id: &str, plan_id: &str) -> Result<Provisioner, WorkflowError> {
    let (manager, plan) = self.resolve(service_id, plan_id)?;
    manager.get_provisioner(plan)
  }

  pub fn get_updater(&self, service_id: &str, plan_id: &str) -> Result<Updater, WorkflowError> {
    let (manager, plan) = self.resolve(service_id, plan_id)?;
    manager.get_updater(plan)
  }

  pub fn get_deprovisioner(&self, service_id: &str, plan_id: &str) -> Result<Deprovisioner, WorkflowError> {
    let (manager, plan) = self.resolve(service_id, plan_id)?;
    manager.get_deprovisioner(plan)
  }
}
