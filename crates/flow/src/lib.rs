//! Crate `flow`: contrato de almacenamiento de instancias
//!
//! Este crate define el contrato de persistencia `InstanceRepository`, una
//! implementación en memoria útil para pruebas (`InMemoryInstanceRepository`)
//! y la política de reintento (`RetryPolicy`) que aplica el motor a las
//! escrituras tras cada paso.
//!
//! Diseño resumido:
//! - Los registros son bytes opacos indexados por `instance_id`; el cifrado
//!   de facets sensibles ocurre antes, en el dominio.
//! - `save` es un upsert del registro completo: cada escritura reemplaza la
//!   anterior.
//! - Sólo `FlowError::Storage` se considera transitorio y reintentable.
//!
//! Ejemplo rápido:
//! ```rust
//! use flow::stubs::InMemoryInstanceRepository;
//! use flow::InstanceRepository;
//! let repo = InMemoryInstanceRepository::new();
//! repo.save("i-1", b"{}").unwrap();
//! assert_eq!(repo.load("i-1").unwrap(), b"{}".to_vec());
//! ```
pub mod errors;
pub mod repository;
pub mod retry;
pub mod stubs;

pub use errors::*;
pub use repository::*;
pub use retry::*;
pub use stubs::*;
