// instance.rs
//
// Registro de instancia: identidad, facets en texto plano y sensibles,
// estado, ubicación y relación con la instancia padre. La forma persistida
// nunca contiene los facets sensibles en claro; sólo sus espejos cifrados.
use crate::catalog::{Plan, Service};
use crate::codec::Codec;
use crate::facet::{downcast_ref, option_facet_eq, Facet, FacetKind, FacetValue};
use crate::facet_registry::FacetDefaults;
use crate::parent::{InstanceLookup, ParentRef};
use crate::status::InstanceStatus;
use crate::workflow_type::WorkflowProgress;
use crate::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Instancia de un servicio administrado.
///
/// Los campos `service`, `plan` y `parent` son transitorios: se resuelven
/// externamente (catálogo, lookup por alias) y no se persisten.
#[derive(Debug, Clone)]
pub struct Instance {
  pub instance_id: String,
  pub alias: String,
  pub service_id: String,
  pub service: Option<Service>,
  pub plan_id: String,
  pub plan: Option<Plan>,
  pub provisioning_parameters: Option<Facet>,
  pub secure_provisioning_parameters: Option<Facet>,
  pub updating_parameters: Option<Facet>,
  pub status: InstanceStatus,
  pub status_reason: String,
  pub location: String,
  pub resource_group: String,
  pub parent: Option<ParentRef>,
  pub parent_alias: Option<String>,
  pub tags: BTreeMap<String, String>,
  pub details: Option<Facet>,
  pub secure_details: Option<Facet>,
  pub created: Option<DateTime<Utc>>,
  /// Marcador de reanudación del workflow en curso.
  pub progress: Option<WorkflowProgress>,
}

/// Forma persistida (JSON camelCase). Los facets sensibles sólo aparecen
/// como ciphertext en base64.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedInstance {
  instance_id: String,
  #[serde(default)]
  alias: String,
  #[serde(default)]
  service_id: String,
  #[serde(default)]
  plan_id: String,
  #[serde(default)]
  provisioning_parameters: Option<JsonValue>,
  #[serde(default, with = "base64_bytes")]
  secure_provisioning_parameters: Vec<u8>,
  #[serde(default, with = "base64_bytes")]
  updating_parameters: Vec<u8>,
  #[serde(default)]
  status: InstanceStatus,
  #[serde(default)]
  status_reason: String,
  #[serde(default)]
  location: String,
  #[serde(default)]
  resource_group: String,
  #[serde(default)]
  parent_alias: Option<String>,
  #[serde(default)]
  tags: Option<BTreeMap<String, String>>,
  #[serde(default)]
  details: Option<JsonValue>,
  #[serde(default, with = "base64_bytes")]
  secure_details: Vec<u8>,
  #[serde(default)]
  created: Option<DateTime<Utc>>,
  #[serde(default)]
  progress: Option<WorkflowProgress>,
}

mod base64_bytes {
  use base64::engine::general_purpose::STANDARD;
  use base64::Engine;
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&STANDARD.encode(bytes))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
    match Option::<String>::deserialize(d)? {
      Some(s) => STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom),
      None => Ok(Vec::new()),
    }
  }
}

impl Instance {
  /// Crea una instancia nueva aceptada para aprovisionamiento, con id
  /// aleatorio, estado `Provisioning` y `created` fijado ahora.
  pub fn new(service_id: &str, plan_id: &str) -> Self {
    Self { instance_id: Uuid::new_v4().to_string(),
           alias: String::new(),
           service_id: service_id.to_string(),
           service: None,
           plan_id: plan_id.to_string(),
           plan: None,
           provisioning_parameters: None,
           secure_provisioning_parameters: None,
           updating_parameters: None,
           status: InstanceStatus::Provisioning,
           status_reason: String::new(),
           location: String::new(),
           resource_group: String::new(),
           parent: None,
           parent_alias: None,
           tags: BTreeMap::new(),
           details: None,
           secure_details: None,
           created: Some(Utc::now()),
           progress: None }
  }

  pub fn with_id(mut self, instance_id: &str) -> Self {
    self.instance_id = instance_id.to_string();
    self
  }

  pub fn with_alias(mut self, alias: &str) -> Self {
    self.alias = alias.to_string();
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

  pub fn with_parent_alias(mut self, parent_alias: &str) -> Self {
    self.parent_alias = Some(parent_alias.to_string());
    self
  }

  pub fn with_provisioning_parameters<T: FacetValue>(mut self, value: T) -> Self {
    self.provisioning_parameters = Some(Box::new(value));
    self
  }

  pub fn with_secure_provisioning_parameters<T: FacetValue>(mut self, value: T) -> Self {
    self.secure_provisioning_parameters = Some(Box::new(value));
    self
  }

  pub fn with_updating_parameters<T: FacetValue>(mut self, value: T) -> Self {
    self.updating_parameters = Some(Box::new(value));
    self
  }

  pub fn with_details<T: FacetValue>(mut self, value: T) -> Self {
    self.details = Some(Box::new(value));
    self
  }

  pub fn with_secure_details<T: FacetValue>(mut self, value: T) -> Self {
    self.secure_details = Some(Box::new(value));
    self
  }

  /// Completa los facets ausentes con las variantes vacías del plan, sin
  /// tocar los que ya están presentes.
  pub fn fill_missing_facets(&mut self, defaults: FacetDefaults) {
    let FacetDefaults { provisioning_parameters,
                        secure_provisioning_parameters,
                        updating_parameters,
                        details,
                        secure_details, } = defaults;
    if self.provisioning_parameters.is_none() {
      self.provisioning_parameters = provisioning_parameters;
    }
    if self.secure_provisioning_parameters.is_none() {
      self.secure_provisioning_parameters = secure_provisioning_parameters;
    }
    if self.updating_parameters.is_none() {
      self.updating_parameters = updating_parameters;
    }
    if self.details.is_none() {
      self.details = details;
    }
    if self.secure_details.is_none() {
      self.secure_details = secure_details;
    }
  }

  pub fn provisioning_parameters_as<T: 'static>(&self) -> Result<&T, DomainError> {
    facet_as(self.provisioning_parameters.as_deref(), FacetKind::ProvisioningParameters)
  }

  pub fn secure_provisioning_parameters_as<T: 'static>(&self) -> Result<&T, DomainError> {
    facet_as(self.secure_provisioning_parameters.as_deref(), FacetKind::SecureProvisioningParameters)
  }

  pub fn updating_parameters_as<T: 'static>(&self) -> Result<&T, DomainError> {
    facet_as(self.updating_parameters.as_deref(), FacetKind::UpdatingParameters)
  }

  pub fn details_as<T: 'static>(&self) -> Result<&T, DomainError> {
    facet_as(self.details.as_deref(), FacetKind::Details)
  }

  pub fn secure_details_as<T: 'static>(&self) -> Result<&T, DomainError> {
    facet_as(self.secure_details.as_deref(), FacetKind::SecureDetails)
  }

  /// Vincula la instancia con su padre ya resuelto (sólo por identidad).
  pub fn attach_parent(&mut self, parent: &Instance) {
    self.parent_alias = Some(parent.alias.clone());
    self.parent = Some(ParentRef { instance_id: parent.instance_id.clone(), alias: parent.alias.clone() });
  }

  /// Resuelve la instancia padre a partir de `parent_alias` usando el lookup
  /// externo. `Ok(None)` si la instancia no declara padre.
  pub fn resolve_parent(&self, lookup: &dyn InstanceLookup) -> Result<Option<Instance>, DomainError> {
    match self.parent_alias.as_deref() {
      None | Some("") => Ok(None),
      Some(alias) => {
        let parent = lookup.find_by_alias(alias)?
                           .ok_or_else(|| DomainError::NotFound(format!("instancia padre con alias {}", alias)))?;
        Ok(Some(parent))
      }
    }
  }

  /// Decodifica la forma persistida.
  ///
  /// Los facets en texto plano omitidos (o `null`) toman la variante de
  /// `defaults`. Luego se descifran, en este orden, los parámetros seguros
  /// de aprovisionamiento, los parámetros de actualización y los detalles
  /// seguros; el primer fallo corta la decodificación y no se devuelve
  /// ningún registro parcial.
  pub fn from_persisted_form(bytes: &[u8], defaults: FacetDefaults, codec: &dyn Codec) -> Result<Instance, DomainError> {
    let stored: PersistedInstance = serde_json::from_slice(bytes).map_err(|e| {
                                      log::warn!("registro de instancia ilegible: {}", e);
                                      DomainError::Decode(format!("registro de instancia: {}", e))
                                    })?;
    let FacetDefaults { provisioning_parameters,
                        secure_provisioning_parameters,
                        updating_parameters,
                        details,
                        secure_details, } = defaults;

    let provisioning_parameters =
      load_plain(FacetKind::ProvisioningParameters, stored.provisioning_parameters, provisioning_parameters)?;
    let details = load_plain(FacetKind::Details, stored.details, details)?;
    let secure_provisioning_parameters = decrypt_facet(FacetKind::SecureProvisioningParameters,
                                                       &stored.secure_provisioning_parameters,
                                                       secure_provisioning_parameters,
                                                       codec)?;
    let updating_parameters =
      decrypt_facet(FacetKind::UpdatingParameters, &stored.updating_parameters, updating_parameters, codec)?;
    let secure_details = decrypt_facet(FacetKind::SecureDetails, &stored.secure_details, secure_details, codec)?;

    Ok(Instance { instance_id: stored.instance_id,
                  alias: stored.alias,
                  service_id: stored.service_id,
                  service: None,
                  plan_id: stored.plan_id,
                  plan: None,
                  provisioning_parameters,
                  secure_provisioning_parameters,
                  updating_parameters,
                  status: stored.status,
                  status_reason: stored.status_reason,
                  location: stored.location,
                  resource_group: stored.resource_group,
                  parent: None,
                  parent_alias: stored.parent_alias,
                  tags: stored.tags.unwrap_or_default(),
                  details,
                  secure_details,
                  created: stored.created,
                  progress: stored.progress })
  }

  /// Codifica la instancia: cifra los tres facets sensibles (mismo orden que
  /// la decodificación) con ciphertext fresco y serializa el registro.
  pub fn to_persisted_form(&self, codec: &dyn Codec) -> Result<Vec<u8>, DomainError> {
    let secure_provisioning_parameters = encrypt_facet(FacetKind::SecureProvisioningParameters,
                                                       self.secure_provisioning_parameters.as_deref(),
                                                       codec)?;
    let updating_parameters =
      encrypt_facet(FacetKind::UpdatingParameters, self.updating_parameters.as_deref(), codec)?;
    let secure_details = encrypt_facet(FacetKind::SecureDetails, self.secure_details.as_deref(), codec)?;

    let stored = PersistedInstance { instance_id: self.instance_id.clone(),
                                     alias: self.alias.clone(),
                                     service_id: self.service_id.clone(),
                                     plan_id: self.plan_id.clone(),
                                     provisioning_parameters:
                                       plain_json(FacetKind::ProvisioningParameters,
                                                  self.provisioning_parameters.as_deref())?,
                                     secure_provisioning_parameters,
                                     updating_parameters,
                                     status: self.status,
                                     status_reason: self.status_reason.clone(),
                                     location: self.location.clone(),
                                     resource_group: self.resource_group.clone(),
                                     parent_alias: self.parent_alias.clone(),
                                     tags: Some(self.tags.clone()),
                                     details: plain_json(FacetKind::Details, self.details.as_deref())?,
                                     secure_details,
                                     created: self.created,
                                     progress: self.progress.clone() };
    encode_record(&stored)
  }
}

/// Igualdad sobre los campos persistidos; los facets se comparan por su
/// JSON y los campos transitorios (`service`, `plan`, `parent`) se ignoran.
impl PartialEq for Instance {
  fn eq(&self, other: &Self) -> bool {
    self.instance_id == other.instance_id
    && self.alias == other.alias
    && self.service_id == other.service_id
    && self.plan_id == other.plan_id
    && option_facet_eq(self.provisioning_parameters.as_deref(), other.provisioning_parameters.as_deref())
    && option_facet_eq(self.secure_provisioning_parameters.as_deref(),
                       other.secure_provisioning_parameters.as_deref())
    && option_facet_eq(self.updating_parameters.as_deref(), other.updating_parameters.as_deref())
    && self.status == other.status
    && self.status_reason == other.status_reason
    && self.location == other.location
    && self.resource_group == other.resource_group
    && self.parent_alias == other.parent_alias
    && self.tags == other.tags
    && option_facet_eq(self.details.as_deref(), other.details.as_deref())
    && option_facet_eq(self.secure_details.as_deref(), other.secure_details.as_deref())
    && self.created == other.created
    && self.progress == other.progress
  }
}

fn facet_as<'a, T: 'static>(facet: Option<&'a dyn FacetValue>, kind: FacetKind) -> Result<&'a T, DomainError> {
  let facet = facet.ok_or_else(|| DomainError::Validation(format!("{} ausente", kind)))?;
  downcast_ref::<T>(facet).ok_or_else(|| {
                            DomainError::Validation(format!("{} no es de tipo {}", kind, std::any::type_name::<T>()))
                          })
}

fn load_plain(kind: FacetKind, stored: Option<JsonValue>, default: Option<Facet>) -> Result<Option<Facet>, DomainError> {
  match (stored, default) {
    (None, default) => Ok(default),
    (Some(value), Some(mut facet)) => {
      facet.load_json(value).map_err(|e| decode_error(kind, e))?;
      Ok(Some(facet))
    }
    // sin variante declarada se conserva el JSON crudo para no perderlo en
    // la siguiente escritura
    (Some(value), None) => Ok(Some(Box::new(value) as Facet)),
  }
}

fn plain_json(kind: FacetKind, facet: Option<&dyn FacetValue>) -> Result<Option<JsonValue>, DomainError> {
  facet.map(|f| f.to_json().map_err(|e| DomainError::Encode { facet: kind, reason: e.to_string() }))
       .transpose()
}

fn decrypt_facet(kind: FacetKind,
                 ciphertext: &[u8],
                 destination: Option<Facet>,
                 codec: &dyn Codec)
                 -> Result<Option<Facet>, DomainError> {
  let mut facet = match destination {
    Some(facet) if !ciphertext.is_empty() => facet,
    other => return Ok(other),
  };
  let plaintext = match codec.decrypt(ciphertext) {
    Ok(plaintext) => plaintext,
    Err(source) => {
      log::warn!("{} no supera la verificación de integridad: {}", kind, source);
      return Err(DomainError::Integrity { facet: kind, source });
    }
  };
  let value: JsonValue = serde_json::from_slice(&plaintext).map_err(|e| decode_error(kind, e))?;
  if !value.is_null() {
    facet.load_json(value).map_err(|e| decode_error(kind, e))?;
  }
  Ok(Some(facet))
}

fn decode_error(kind: FacetKind, err: impl std::fmt::Display) -> DomainError {
  log::warn!("{} no se pudo decodificar: {}", kind, err);
  DomainError::Decode(format!("{}: {}", kind, err))
}

fn encrypt_facet(kind: FacetKind, facet: Option<&dyn FacetValue>, codec: &dyn Codec) -> Result<Vec<u8>, DomainError> {
  let value = match facet {
    Some(f) => f.to_json().map_err(|e| DomainError::Encode { facet: kind, reason: e.to_string() })?,
    None => JsonValue::Null,
  };
  let bytes = serde_json::to_vec(&value).map_err(|e| DomainError::Encode { facet: kind, reason: e.to_string() })?;
  codec.encrypt(&bytes).map_err(|source| DomainError::Codec { facet: kind, source })
}

fn encode_record<T: Serialize>(record: &T) -> Result<Vec<u8>, DomainError> {
  serde_json::to_vec(record).map_err(|e| DomainError::EncodeRecord(e.to_string()))
}
