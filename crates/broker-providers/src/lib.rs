//! broker-providers: contratos de los clientes externos
//!
//! - [`ArmDeployer`]: despliegue/borrado de plantillas, idempotente por
//!   nombre de despliegue.
//! - [`ServersClient`] y [`DatabaseAccountsClient`]: operaciones directas por
//!   servicio.
//! - [`fakes::FakeCloud`]: implementación en memoria de los tres contratos,
//!   con contadores de llamadas e inyección de fallos, usada por los tests y
//!   el binario de demostración.
mod clients;
mod deployer;
mod errors;
pub mod fakes;

pub use clients::{DatabaseAccountsClient, ServersClient};
pub use deployer::{ArmDeployer, DeploymentOutputs, DeploymentRequest};
pub use errors::{ProviderError, Result};
pub use fakes::FakeCloud;
