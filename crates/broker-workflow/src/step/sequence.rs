use crate::errors::WorkflowError;
use crate::step::{DeprovisioningStep, ProvisioningStep, Step};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Lista ordenada de pasos con nombre unico.
///
/// El orden de insercion es el orden de ejecucion. Es inmutable una vez
/// construida y se comparte entre ejecuciones.
pub struct StepSequence<S: ?Sized> {
  steps: IndexMap<String, Arc<S>>,
}

/// Secuencia de aprovisionamiento.
pub type Provisioner = StepSequence<dyn ProvisioningStep>;
/// Secuencia de actualizacion (mismo contrato de paso que el
/// aprovisionamiento).
pub type Updater = StepSequence<dyn ProvisioningStep>;
/// Secuencia de desaprovisionamiento.
pub type Deprovisioner = StepSequence<dyn DeprovisioningStep>;

impl<S: Step + ?Sized> StepSequence<S> {
  /// Construye la secuencia; falla con `DuplicateStepName` si dos pasos
  /// comparten nombre.
  pub fn new(steps: Vec<Arc<S>>) -> Result<Self, WorkflowError> {
    let mut map = IndexMap::with_capacity(steps.len());
    for step in steps {
      let name = step.name().to_string();
      if map.contains_key(&name) {
        return Err(WorkflowError::DuplicateStepName(name));
      }
      map.insert(name, step);
    }
    Ok(Self { steps: map })
  }

  /// Secuencia sin pasos (servicios que no soportan el workflow).
  pub fn empty() -> Self {
    Self { steps: IndexMap::new() }
  }

  pub fn steps(&self) -> impl Iterator<Item = &Arc<S>> {
    self.steps.values()
  }

  pub fn step_names(&self) -> Vec<&str> {
    self.steps.keys().map(String::as_str).collect()
  }

  pub fn step(&self, name: &str) -> Option<&Arc<S>> {
    self.steps.get(name)
  }

  pub fn first_step_name(&self) -> Option<&str> {
    self.steps.get_index(0).map(|(name, _)| name.as_str())
  }

  /// Nombre del paso siguiente a `current`; `None` si era el ultimo.
  pub fn next_step_name(&self, current: &str) -> Result<Option<&str>, WorkflowError> {
    let idx = self.steps
                  .get_index_of(current)
                  .ok_or_else(|| WorkflowError::UnknownStep(current.to_string()))?;
    Ok(self.steps.get_index(idx + 1).map(|(name, _)| name.as_str()))
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }
}

impl<S: ?Sized> Clone for StepSequence<S> {
  fn clone(&self) -> Self {
    Self { steps: self.steps.clone() }
  }
}

impl<S: ?Sized> fmt::Debug for StepSequence<S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list().entries(self.steps.keys()).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::step::step_fn;
  use broker_domain::{facet, Facet};
  use serde_json::json;

  fn noop(name: &str) -> Arc<dyn ProvisioningStep> {
    step_fn(name, |_ctx, _inst| async { Ok::<Facet, WorkflowError>(facet(json!({}))) })
  }

  #[test]
  fn navigation_follows_insertion_order() {
    let seq = Provisioner::new(vec![noop("preProvision"), noop("deploy"), noop("verify")]).unwrap();
    assert_eq!(seq.len(), 3);
    assert_eq!(seq.first_step_name(), Some("preProvision"));
    assert_eq!(seq.next_step_name("preProvision").unwrap(), Some("deploy"));
    assert_eq!(seq.next_step_name("verify").unwrap(), None);
    assert_eq!(seq.step_names(), vec!["preProvision", "deploy", "verify"]);
    assert!(seq.step("deploy").is_some());
  }

  #[test]
  fn duplicate_names_are_rejected() {
    match Provisioner::new(vec![noop("deploy"), noop("deploy")]) {
      Err(WorkflowError::DuplicateStepName(name)) => assert_eq!(name, "deploy"),
      other => panic!("se esperaba DuplicateStepName, se obtuvo {:?}", other.map(|s| s.len())),
    }
  }

  #[test]
  fn unknown_current_step_is_an_error() {
    let seq = Provisioner::new(vec![noop("a")]).unwrap();
    assert!(matches!(seq.next_step_name("zzz"), Err(WorkflowError::UnknownStep(_))));
  }

  #[test]
  fn empty_sequence_has_no_first_step() {
    let seq = Updater::empty();
    assert!(seq.is_empty());
    assert_eq!(seq.first_step_name(), None);
  }
}
