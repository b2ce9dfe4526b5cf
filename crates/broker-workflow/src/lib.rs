//! broker-workflow: ejecucion de workflows de instancias
//!
//! Motor de pasos (`InstanceEngine`) que aprovisiona, actualiza y
//! desaprovisiona instancias de servicios administrados persistiendo el
//! avance tras cada paso, el registro de servicios (`ServiceRegistry`) con
//! los servicios incluidos (`flows`) y la capa de orquestacion
//! (`InstanceService`) que valida solicitudes y serializa las operaciones
//! por instancia.
//!
//! Ejemplo rapido:
//! ```rust,no_run
//! use broker_workflow::{flows, EngineConfig, InstanceService, ProvisionRequest};
//! use broker_domain::Aes256GcmCodec;
//! use broker_providers::FakeCloud;
//! use flow::InMemoryInstanceRepository;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), broker_workflow::WorkflowError> {
//! let clients = flows::ProviderClients::from_fake(Arc::new(FakeCloud::new()));
//! let registry = Arc::new(flows::default_registry(&clients)?);
//! let codec = Arc::new(Aes256GcmCodec::new(&[1u8; 32]).map_err(|e| broker_workflow::WorkflowError::Other(e.to_string()))?);
//! let service = InstanceService::new(registry,
//!                                    Arc::new(InMemoryInstanceRepository::new()),
//!                                    codec,
//!                                    EngineConfig::default());
//! let request = ProvisionRequest::new("postgresql-dbms", "basic").with_alias("pg")
//!                                                                .with_placement("eastus", "rg");
//! let (instance, outcome) = service.provision(request, &CancellationToken::new()).await?;
//! println!("{} -> {:?}", instance.instance_id, outcome);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod errors;
pub mod factory;
pub mod flows;
pub mod service;
pub mod step;
pub mod store;

pub use broker_domain::{WorkflowProgress, WorkflowType};
pub use engine::{EngineConfig, InstanceEngine, RunOutcome};
pub use errors::WorkflowError;
pub use factory::{ServiceManager, ServiceRegistry};
pub use service::{InstanceService, ProvisionRequest};
pub use step::{deprovision_step_fn, step_fn, Deprovisioner, DeprovisioningStep, ProvisioningStep, Provisioner, Step,
               StepContext, StepSequence, Updater};
pub use store::InstanceStore;
pub use tokio_util::sync::CancellationToken;
