mod context;
mod sequence;
mod traits;

pub use context::StepContext;
pub use sequence::{Deprovisioner, Provisioner, StepSequence, Updater};
pub use traits::{deprovision_step_fn, step_fn, DeprovisioningStep, FnDeprovisionStep, FnStep, ProvisioningStep, Step};
