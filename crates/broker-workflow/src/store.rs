use crate::errors::WorkflowError;
use crate::factory::ServiceRegistry;
use broker_domain::{Codec, DomainError, FacetDefaults, Instance, InstanceLookup};
use flow::{FlowError, InstanceRepository};
use serde::Deserialize;
use std::sync::Arc;

/// Cabecera en claro de un registro persistido; permite elegir las
/// variantes de facets y filtrar por alias sin descifrar.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordHeader {
  #[serde(default)]
  alias: String,
  #[serde(default)]
  service_id: String,
  #[serde(default)]
  plan_id: String,
  #[serde(default)]
  parent_alias: Option<String>,
}

fn read_header(bytes: &[u8]) -> Result<RecordHeader, WorkflowError> {
  serde_json::from_slice(bytes).map_err(|e| DomainError::Decode(format!("cabecera del registro: {}", e)).into())
}

/// Acceso tipado a las instancias persistidas.
///
/// Decodifica cada registro con las variantes de facets del plan (segun el
/// registro de servicios) y resuelve el servicio y el plan en el catalogo.
#[derive(Clone)]
pub struct InstanceStore {
  repo: Arc<dyn InstanceRepository>,
  codec: Arc<dyn Codec>,
  registry: Arc<ServiceRegistry>,
}

impl std::fmt::Debug for InstanceStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("InstanceStore").field("registry", &self.registry).finish()
  }
}

impl InstanceStore {
  pub fn new(repo: Arc<dyn InstanceRepository>, codec: Arc<dyn Codec>, registry: Arc<ServiceRegistry>) -> Self {
    Self { repo, codec, registry }
  }

  pub fn repository(&self) -> Arc<dyn InstanceRepository> {
    self.repo.clone()
  }

  pub fn codec(&self) -> Arc<dyn Codec> {
    self.codec.clone()
  }

  pub fn exists(&self, instance_id: &str) -> Result<bool, WorkflowError> {
    Ok(self.repo.exists(instance_id)?)
  }

  /// Carga y decodifica una instancia. `Flow(NotFound)` si no existe.
  pub fn load(&self, instance_id: &str) -> Result<Instance, WorkflowError> {
    let bytes = self.repo.load(instance_id)?;
    self.decode(&bytes)
  }

  /// Igual que [`load`](Self::load) pero `None` si no existe.
  pub fn find(&self, instance_id: &str) -> Result<Option<Instance>, WorkflowError> {
    match self.load(instance_id) {
      Ok(instance) => Ok(Some(instance)),
      Err(WorkflowError::Flow(FlowError::NotFound(_))) => Ok(None),
      Err(e) => Err(e),
    }
  }

  fn decode(&self, bytes: &[u8]) -> Result<Instance, WorkflowError> {
    let header = read_header(bytes)?;
    let defaults = match self.registry.defaults_for(&header.service_id, &header.plan_id) {
      Ok(defaults) => defaults,
      Err(_) => {
        log::warn!("sin variantes para {}/{}, facets como JSON", header.service_id, header.plan_id);
        FacetDefaults::new()
      }
    };
    let mut instance = Instance::from_persisted_form(bytes, defaults, self.codec.as_ref())?;
    if let Ok((service, plan)) = self.registry.catalog().resolve(&instance.service_id, &instance.plan_id) {
      instance.service = Some(service.clone());
      instance.plan = Some(plan.clone());
    }
    Ok(instance)
  }

  /// Todas las instancias, en orden de id.
  pub fn list(&self) -> Result<Vec<Instance>, WorkflowError> {
    let mut out = Vec::new();
    for id in self.repo.list_ids()? {
      if let Some(instance) = self.find(&id)? {
        out.push(instance);
      }
    }
    Ok(out)
  }

  /// Recorre las cabeceras y decodifica solo las que cumplen `pred`.
  fn select<F>(&self, pred: F) -> Result<Vec<Instance>, WorkflowError>
    where F: Fn(&RecordHeader) -> bool
  {
    let mut out = Vec::new();
    for id in self.repo.list_ids()? {
      let bytes = match self.repo.load(&id) {
        Ok(bytes) => bytes,
        Err(FlowError::NotFound(_)) => continue,
        Err(e) => return Err(e.into()),
      };
      if pred(&read_header(&bytes)?) {
        out.push(self.decode(&bytes)?);
      }
    }
    Ok(out)
  }

  pub fn by_alias(&self, alias: &str) -> Result<Option<Instance>, WorkflowError> {
    if alias.is_empty() {
      return Ok(None);
    }
    Ok(self.select(|h| h.alias == alias)?.into_iter().next())
  }

  /// Instancias que declaran `alias` como padre.
  pub fn children_of(&self, alias: &str) -> Result<Vec<Instance>, WorkflowError> {
    if alias.is_empty() {
      return Ok(Vec::new());
    }
    self.select(|h| h.parent_alias.as_deref() == Some(alias))
  }
}

impl InstanceLookup for InstanceStore {
  fn find_by_alias(&self, alias: &str) -> Result<Option<Instance>, DomainError> {
    self.by_alias(alias).map_err(|e| match e {
                          WorkflowError::Domain(inner) => inner,
                          other => DomainError::External(other.to_string()),
                        })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use broker_domain::Aes256GcmCodec;
  use flow::InMemoryInstanceRepository;

  fn store() -> (Arc<InMemoryInstanceRepository>, InstanceStore) {
    let repo = Arc::new(InMemoryInstanceRepository::new());
    let codec = Arc::new(Aes256GcmCodec::new(&[3u8; 32]).unwrap());
    (repo.clone(), InstanceStore::new(repo, codec, Arc::new(ServiceRegistry::new())))
  }

  fn put(store: &InstanceStore, instance: &Instance) {
    let bytes = instance.to_persisted_form(store.codec().as_ref()).unwrap();
    store.repository().save(&instance.instance_id, &bytes).unwrap();
  }

  #[test]
  fn finds_by_alias_and_children() {
    let (_repo, store) = store();
    let parent = Instance::new("svc", "plan").with_alias("dbms");
    let child = Instance::new("svc", "plan").with_alias("db").with_parent_alias("dbms");
    put(&store, &parent);
    put(&store, &child);

    let found = store.find_by_alias("dbms").unwrap().unwrap();
    assert_eq!(found.instance_id, parent.instance_id);
    let children = store.children_of("dbms").unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].instance_id, child.instance_id);
    assert!(store.by_alias("nope").unwrap().is_none());
    assert!(store.by_alias("").unwrap().is_none());
  }

  #[test]
  fn missing_instance_is_none() {
    let (_repo, store) = store();
    assert!(store.find("missing").unwrap().is_none());
    assert!(matches!(store.load("missing"), Err(WorkflowError::Flow(FlowError::NotFound(_)))));
  }

  #[test]
  fn unknown_plan_decodes_untyped() {
    let (_repo, store) = store();
    let instance = Instance::new("svc", "plan").with_details(serde_json::json!({"k": "v"}));
    put(&store, &instance);
    let loaded = store.load(&instance.instance_id).unwrap();
    assert_eq!(loaded, instance);
    assert!(loaded.service.is_none());
  }
}
