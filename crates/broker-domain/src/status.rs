use serde::{Deserialize, Serialize};
use std::fmt;

/// Estado de ciclo de vida de una instancia.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum InstanceStatus {
  #[default]
  Provisioning,
  Provisioned,
  Updating,
  Updated,
  Deprovisioning,
  Deprovisioned,
  Failed,
}

impl InstanceStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(self,
             InstanceStatus::Provisioned | InstanceStatus::Updated | InstanceStatus::Deprovisioned | InstanceStatus::Failed)
  }
}

impl fmt::Display for InstanceStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      InstanceStatus::Provisioning => "provisioning",
      InstanceStatus::Provisioned => "provisioned",
      InstanceStatus::Updating => "updating",
      InstanceStatus::Updated => "updated",
      InstanceStatus::Deprovisioning => "deprovisioning",
      InstanceStatus::Deprovisioned => "deprovisioned",
      InstanceStatus::Failed => "failed",
    };
    write!(f, "{}", s)
  }
}
