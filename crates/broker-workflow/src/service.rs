use crate::engine::{EngineConfig, InstanceEngine, RunOutcome};
use crate::errors::WorkflowError;
use crate::factory::{ServiceManager, ServiceRegistry};
use crate::store::InstanceStore;
use broker_domain::{Codec, Instance, InstanceStatus, ParameterMap, Plan, WorkflowProgress, WorkflowType};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flow::{FlowError, InstanceRepository};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Solicitud de aprovisionamiento aceptada por el broker.
#[derive(Debug, Clone, Default)]
pub struct ProvisionRequest {
  /// Id explicito; si falta se genera uno.
  pub instance_id: Option<String>,
  pub service_id: String,
  pub plan_id: String,
  pub alias: String,
  pub parent_alias: Option<String>,
  pub location: String,
  pub resource_group: String,
  pub tags: BTreeMap<String, String>,
  /// Parametros combinados; el manager los separa en plano y sensibles.
  pub parameters: ParameterMap,
}

impl ProvisionRequest {
  pub fn new(service_id: &str, plan_id: &str) -> Self {
    Self { service_id: service_id.to_string(), plan_id: plan_id.to_string(), ..Default::default() }
  }

  pub fn with_instance_id(mut self, instance_id: &str) -> Self {
    self.instance_id = Some(instance_id.to_string());
    self
  }

  pub fn with_alias(mut self, alias: &str) -> Self {
    self.alias = alias.to_string();
    self
  }

  pub fn with_parent_alias(mut self, parent_alias: &str) -> Self {
    self.parent_alias = Some(parent_alias.to_string());
    self
  }

  pub fn with_placement(mut self, location: &str, resource_group: &str) -> Self {
    self.location = location.to_string();
    self.resource_group = resource_group.to_string();
    self
  }

  pub fn with_tag(mut self, key: &str, value: &str) -> Self {
    self.tags.insert(key.to_string(), value.to_string());
    self
  }

  pub fn with_parameter(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
    self.parameters.insert(key.to_string(), value.into());
    self
  }
}

/// Orquestacion de instancias.
///
/// Valida las solicitudes contra el catalogo, resuelve la instancia padre
/// y ejecuta los workflows con el motor. Cada operacion sobre una
/// instancia toma su candado: dos llamadas sobre el mismo id se ejecutan
/// una detras de otra; ids distintos avanzan en paralelo. Los alias se
/// reservan en memoria hasta que el registro aceptado queda persistido.
pub struct InstanceService {
  registry: Arc<ServiceRegistry>,
  store: InstanceStore,
  engine: InstanceEngine,
  locks: DashMap<String, Arc<Mutex<()>>>,
  aliases: DashMap<String, String>,
}

/// Alias reservado por una solicitud en curso; se libera al soltarse.
struct AliasReservation<'a> {
  aliases: &'a DashMap<String, String>,
  alias: String,
}

impl Drop for AliasReservation<'_> {
  fn drop(&mut self) {
    if !self.alias.is_empty() {
      self.aliases.remove(&self.alias);
    }
  }
}

impl std::fmt::Debug for InstanceService {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("InstanceService")
     .field("registry", &self.registry)
     .field("engine", &self.engine)
     .field("locks", &self.locks.len())
     .field("aliases", &self.aliases.len())
     .finish()
  }
}

fn is_settled(status: InstanceStatus) -> bool {
  matches!(status, InstanceStatus::Provisioned | InstanceStatus::Updated)
}

impl InstanceService {
  pub fn new(registry: Arc<ServiceRegistry>,
             repo: Arc<dyn InstanceRepository>,
             codec: Arc<dyn Codec>,
             config: EngineConfig)
             -> Self {
    let store = InstanceStore::new(repo.clone(), codec.clone(), registry.clone());
    let engine = InstanceEngine::new(repo, codec, config).with_parent_lookup(Arc::new(store.clone()));
    Self { registry, store, engine, locks: DashMap::new(), aliases: DashMap::new() }
  }

  pub fn registry(&self) -> &ServiceRegistry {
    &self.registry
  }

  pub fn store(&self) -> &InstanceStore {
    &self.store
  }

  pub fn engine(&self) -> &InstanceEngine {
    &self.engine
  }

  fn lock_for(&self, instance_id: &str) -> Arc<Mutex<()>> {
    self.locks
        .entry(instance_id.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .value()
        .clone()
  }

  /// Suelta el candado de una instancia borrada si nadie mas lo espera.
  fn release_lock(&self, instance_id: &str) {
    self.locks.remove_if(instance_id, |_, lock| Arc::strong_count(lock) == 1);
  }

  fn reserve_alias(&self, alias: &str, instance_id: &str) -> Result<AliasReservation<'_>, WorkflowError> {
    if !alias.is_empty() {
      match self.aliases.entry(alias.to_string()) {
        Entry::Occupied(taken) => {
          return Err(FlowError::Conflict(format!("el alias {} ya esta reservado por {}", alias, taken.get())).into());
        }
        Entry::Vacant(slot) => {
          slot.insert(instance_id.to_string());
        }
      }
    }
    Ok(AliasReservation { aliases: &self.aliases, alias: alias.to_string() })
  }

  /// Ejecuta una consulta del almacen fuera de los hilos del runtime.
  async fn blocking<T, F>(&self, op: F) -> Result<T, WorkflowError>
    where F: FnOnce(&InstanceStore) -> Result<T, WorkflowError> + Send + 'static,
          T: Send + 'static
  {
    let store = self.store.clone();
    match tokio::task::spawn_blocking(move || op(&store)).await {
      Ok(result) => result,
      Err(e) => Err(FlowError::Other(format!("consulta interrumpida: {}", e)).into()),
    }
  }

  async fn load(&self, instance_id: &str) -> Result<Instance, WorkflowError> {
    let id = instance_id.to_string();
    self.blocking(move |store| store.load(&id)).await
  }

  fn manager_for(&self, instance: &Instance) -> Result<(Arc<dyn ServiceManager>, Plan), WorkflowError> {
    let (manager, plan) = self.registry.resolve(&instance.service_id, &instance.plan_id)?;
    Ok((manager.clone(), plan.clone()))
  }

  /// Acepta una solicitud y ejecuta el aprovisionamiento.
  ///
  /// Devuelve la instancia tal como quedo al terminar la ejecucion. Las
  /// solicitudes invalidas se rechazan sin persistir nada.
  pub async fn provision(&self,
                         request: ProvisionRequest,
                         cancel: &CancellationToken)
                         -> Result<(Instance, RunOutcome), WorkflowError> {
    let mut instance = self.accept(&request).await?;
    let (manager, plan) = self.manager_for(&instance)?;

    let reservation = self.reserve_alias(&instance.alias, &instance.instance_id)?;
    let alias = instance.alias.clone();
    if self.blocking(move |store| store.by_alias(&alias)).await?.is_some() {
      return Err(FlowError::Conflict(format!("el alias {} ya esta en uso", instance.alias)).into());
    }

    let lock = self.lock_for(&instance.instance_id);
    let _guard = lock.lock().await;
    let id = instance.instance_id.clone();
    if self.blocking(move |store| store.exists(&id)).await? {
      return Err(FlowError::Conflict(format!("la instancia {} ya existe", instance.instance_id)).into());
    }
    instance.progress = Some(WorkflowProgress::started(WorkflowType::Provision));
    self.engine.save("accepted", &instance).await?;
    drop(reservation);
    log::info!("instancia {} aceptada ({}/{})", instance.instance_id, instance.service_id, instance.plan_id);

    let provisioner = manager.get_provisioner(&plan)?;
    let outcome = self.engine.provision(&mut instance, &provisioner, cancel).await?;
    Ok((instance, outcome))
  }

  /// Construye la instancia inicial de una solicitud valida. La unicidad
  /// del alias se comprueba despues, con el alias reservado.
  async fn accept(&self, request: &ProvisionRequest) -> Result<Instance, WorkflowError> {
    let (manager, plan) = self.registry.resolve(&request.service_id, &request.plan_id)?;
    let service = manager.service();
    if manager.requires_alias() && request.alias.is_empty() {
      return Err(WorkflowError::Validation(format!("el servicio {} requiere alias", service.id)));
    }

    let mut instance = Instance::new(&request.service_id, &request.plan_id);
    if let Some(id) = request.instance_id.as_deref().filter(|id| !id.is_empty()) {
      instance = instance.with_id(id);
    }
    instance = instance.with_alias(&request.alias)
                       .with_placement(&request.location, &request.resource_group);
    instance.tags = request.tags.clone();

    let parent_alias = request.parent_alias.as_deref().filter(|a| !a.is_empty());
    match (service.parent_service_id.as_deref(), parent_alias) {
      (Some(parent_service), Some(alias)) => {
        let lookup = alias.to_string();
        let parent = self.blocking(move |store| store.by_alias(&lookup))
                         .await?
                         .ok_or_else(|| WorkflowError::Validation(format!("no existe la instancia padre {}", alias)))?;
        if parent.service_id != parent_service {
          return Err(WorkflowError::Validation(format!("la instancia {} no es de tipo {}", alias, parent_service)));
        }
        if !is_settled(parent.status) {
          return Err(WorkflowError::Validation(format!("la instancia padre {} esta en estado {}",
                                                       alias, parent.status)));
        }
        instance.attach_parent(&parent);
        // la instancia hija vive junto a su padre
        instance.location = parent.location.clone();
        instance.resource_group = parent.resource_group.clone();
      }
      (Some(_), None) => {
        return Err(WorkflowError::Validation(format!("el servicio {} requiere parentAlias", service.id)));
      }
      (None, Some(_)) => {
        return Err(WorkflowError::Validation(format!("el servicio {} no admite instancia padre", service.id)));
      }
      (None, None) => {}
    }

    let (pp, spp) = manager.split_provisioning_parameters(&request.parameters)?;
    instance.provisioning_parameters = Some(pp);
    instance.secure_provisioning_parameters = Some(spp);
    instance.fill_missing_facets(manager.facet_defaults(&plan.id));
    if let Some(secure_details) = manager.initial_secure_details(&instance)? {
      instance.secure_details = Some(secure_details);
    }
    instance.service = Some(service);
    instance.plan = Some(plan.clone());
    Ok(instance)
  }

  /// Actualiza una instancia aprovisionada con nuevos parametros. Una
  /// actualizacion fallida admite una nueva solicitud, que reinicia el
  /// workflow con los parametros recibidos.
  ///
  /// La solicitud (estado, marcador y parametros) se persiste antes del
  /// primer paso; si la ejecucion se interrumpe, `reconcile` la retoma.
  pub async fn update(&self,
                      instance_id: &str,
                      parameters: &ParameterMap,
                      cancel: &CancellationToken)
                      -> Result<(Instance, RunOutcome), WorkflowError> {
    let lock = self.lock_for(instance_id);
    let _guard = lock.lock().await;
    let mut instance = self.load(instance_id).await?;
    let failed_update = instance.status == InstanceStatus::Failed
                        && instance.progress.as_ref().map(|p| p.workflow) == Some(WorkflowType::Update);
    if !is_settled(instance.status) && !failed_update {
      return Err(WorkflowError::Validation(format!("no se puede actualizar {} en estado {}",
                                                   instance_id, instance.status)));
    }
    let (manager, plan) = self.manager_for(&instance)?;
    let updater = manager.get_updater(&plan)?;
    instance.updating_parameters = Some(manager.updating_parameters(parameters)?);
    instance.status = InstanceStatus::Updating;
    instance.status_reason.clear();
    instance.progress = Some(WorkflowProgress::started(WorkflowType::Update));
    self.engine.save("update", &instance).await?;
    let outcome = self.engine.update(&mut instance, &updater, cancel).await?;
    Ok((instance, outcome))
  }

  /// Desaprovisiona la instancia. Se rechaza mientras tenga hijas o haya un
  /// workflow en curso. Como en `update`, la solicitud se persiste antes
  /// del primer paso.
  pub async fn deprovision(&self,
                           instance_id: &str,
                           cancel: &CancellationToken)
                           -> Result<(Instance, RunOutcome), WorkflowError> {
    let lock = self.lock_for(instance_id);
    let guard = lock.lock().await;
    let mut instance = self.load(instance_id).await?;
    let resumable = instance.progress.as_ref().map(|p| p.workflow) == Some(WorkflowType::Deprovision);
    if !is_settled(instance.status) && instance.status != InstanceStatus::Failed && !resumable {
      return Err(WorkflowError::Validation(format!("no se puede desaprovisionar {} en estado {}",
                                                   instance_id, instance.status)));
    }
    let alias = instance.alias.clone();
    let children = self.blocking(move |store| store.children_of(&alias)).await?;
    if !children.is_empty() {
      return Err(WorkflowError::Validation(format!("la instancia {} tiene {} instancias hijas",
                                                   instance_id,
                                                   children.len())));
    }
    let (manager, plan) = self.manager_for(&instance)?;
    let deprovisioner = manager.get_deprovisioner(&plan)?;
    if !resumable {
      instance.progress = Some(WorkflowProgress::started(WorkflowType::Deprovision));
    }
    instance.status = InstanceStatus::Deprovisioning;
    instance.status_reason.clear();
    self.engine.save("deprovision", &instance).await?;
    let outcome = self.engine.deprovision(&mut instance, &deprovisioner, cancel).await?;
    drop(guard);
    drop(lock);
    if outcome.is_completed() {
      self.release_lock(instance_id);
    }
    Ok((instance, outcome))
  }

  /// Retoma la ejecucion pendiente de una instancia.
  ///
  /// Con marcador de progreso se retoma ese workflow, tambien tras un fallo
  /// en su primer paso; sin marcador, un estado en curso reinicia su
  /// workflow desde el primer paso. `None` si no hay nada pendiente.
  pub async fn reconcile(&self,
                         instance_id: &str,
                         cancel: &CancellationToken)
                         -> Result<Option<RunOutcome>, WorkflowError> {
    let lock = self.lock_for(instance_id);
    let guard = lock.lock().await;
    let mut instance = self.load(instance_id).await?;
    let workflow = match (&instance.progress, instance.status) {
      (Some(progress), _) => progress.workflow,
      (None, InstanceStatus::Provisioning) => WorkflowType::Provision,
      (None, InstanceStatus::Updating) => WorkflowType::Update,
      (None, InstanceStatus::Deprovisioning) => WorkflowType::Deprovision,
      _ => return Ok(None),
    };
    log::info!("reconciliando {}: {} desde {:?}", instance_id, workflow, instance.progress);
    let (manager, plan) = self.manager_for(&instance)?;
    let outcome = match workflow {
      WorkflowType::Provision => {
        let provisioner = manager.get_provisioner(&plan)?;
        self.engine.provision(&mut instance, &provisioner, cancel).await?
      }
      WorkflowType::Update => {
        let updater = manager.get_updater(&plan)?;
        self.engine.update(&mut instance, &updater, cancel).await?
      }
      WorkflowType::Deprovision => {
        let deprovisioner = manager.get_deprovisioner(&plan)?;
        self.engine.deprovision(&mut instance, &deprovisioner, cancel).await?
      }
    };
    drop(guard);
    drop(lock);
    if workflow == WorkflowType::Deprovision && outcome.is_completed() {
      self.release_lock(instance_id);
    }
    Ok(Some(outcome))
  }

  pub fn get(&self, instance_id: &str) -> Result<Option<Instance>, WorkflowError> {
    self.store.find(instance_id)
  }

  pub fn list(&self) -> Result<Vec<Instance>, WorkflowError> {
    self.store.list()
  }
}
