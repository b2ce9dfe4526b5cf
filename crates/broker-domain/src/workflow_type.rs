use crate::status::InstanceStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tipos de workflow que recorre una instancia.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowType {
  Provision,
  Update,
  Deprovision,
}

impl WorkflowType {
  /// Estado de la instancia mientras el workflow está en curso.
  pub fn in_progress_status(&self) -> InstanceStatus {
    match self {
      WorkflowType::Provision => InstanceStatus::Provisioning,
      WorkflowType::Update => InstanceStatus::Updating,
      WorkflowType::Deprovision => InstanceStatus::Deprovisioning,
    }
  }

  /// Estado terminal de éxito.
  pub fn success_status(&self) -> InstanceStatus {
    match self {
      WorkflowType::Provision => InstanceStatus::Provisioned,
      WorkflowType::Update => InstanceStatus::Updated,
      WorkflowType::Deprovision => InstanceStatus::Deprovisioned,
    }
  }
}

impl fmt::Display for WorkflowType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      WorkflowType::Provision => "provision",
      WorkflowType::Update => "update",
      WorkflowType::Deprovision => "deprovision",
    };
    write!(f, "{}", s)
  }
}

impl FromStr for WorkflowType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "provision" => Ok(WorkflowType::Provision),
      "update" => Ok(WorkflowType::Update),
      "deprovision" => Ok(WorkflowType::Deprovision),
      other => Err(format!("workflow desconocido: {}", other)),
    }
  }
}

/// Marcador de reanudación persistido junto a la instancia: workflow en
/// curso y último paso completado. `None` indica que el workflow arrancó
/// (o falló) sin completar ningún paso.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowProgress {
  pub workflow: WorkflowType,
  #[serde(default)]
  pub last_completed_step: Option<String>,
}

impl WorkflowProgress {
  /// Marcador de un workflow que aún no completó ningún paso.
  pub fn started(workflow: WorkflowType) -> Self {
    Self { workflow, last_completed_step: None }
  }

  pub fn after(workflow: WorkflowType, step: &str) -> Self {
    Self { workflow, last_completed_step: Some(step.to_string()) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_and_display_match() {
    for wt in [WorkflowType::Provision, WorkflowType::Update, WorkflowType::Deprovision] {
      assert_eq!(wt.to_string().parse::<WorkflowType>().unwrap(), wt);
    }
    assert!("rollback".parse::<WorkflowType>().is_err());
  }

  #[test]
  fn started_marker_round_trips_without_step() {
    let json = serde_json::to_value(WorkflowProgress::started(WorkflowType::Update)).unwrap();
    assert_eq!(json, serde_json::json!({"workflow": "update", "lastCompletedStep": null}));
    let back: WorkflowProgress = serde_json::from_value(serde_json::json!({"workflow": "deprovision"})).unwrap();
    assert_eq!(back, WorkflowProgress::started(WorkflowType::Deprovision));
    let after: WorkflowProgress =
      serde_json::from_value(serde_json::json!({"workflow": "provision", "lastCompletedStep": "preProvision"})).unwrap();
    assert_eq!(after, WorkflowProgress::after(WorkflowType::Provision, "preProvision"));
  }
}
