//! broker-domain: modelo de instancia de servicio administrado
//!
//! Define el registro de instancia (`Instance`) con sus facets en texto
//! plano y sensibles, el codec simétrico que protege los facets sensibles en
//! reposo, el catálogo de servicios/planes y el registro de variantes de
//! facets por plan usado al decodificar instancias persistidas.
mod catalog;
pub mod codec;
mod errors;
pub mod facet;
mod facet_registry;
mod instance;
mod parent;
mod status;
mod workflow_type;

pub use catalog::{Catalog, Plan, Service};
pub use codec::{codec_from_env, Aes256GcmCodec, Codec};
pub use errors::{CodecError, DomainError};
pub use facet::{downcast_ref, facet, Facet, FacetKind, FacetValue, ParameterMap};
pub use facet_registry::{FacetDefaults, FacetRegistry};
pub use instance::Instance;
pub use parent::{InstanceLookup, ParentRef};
pub use status::InstanceStatus;
pub use workflow_type::{WorkflowProgress, WorkflowType};
