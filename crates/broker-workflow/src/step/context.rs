use crate::errors::WorkflowError;
use broker_domain::{Instance, WorkflowType};
use broker_providers::ProviderError;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Contexto pasado a cada paso.
///
/// Lleva la identidad de la ejecucion, la instancia padre ya resuelta (si
/// la hay) y un token de cancelacion propio del paso: el motor lo cancela
/// cuando se cancela la ejecucion o vence el timeout del paso.
#[derive(Debug, Clone)]
pub struct StepContext {
  pub instance_id: String,
  pub workflow: WorkflowType,
  pub step_name: String,
  parent: Option<Arc<Instance>>,
  cancel: CancellationToken,
}

impl StepContext {
  pub fn new(instance_id: &str, workflow: WorkflowType, step_name: &str) -> Self {
    Self { instance_id: instance_id.to_string(),
           workflow,
           step_name: step_name.to_string(),
           parent: None,
           cancel: CancellationToken::new() }
  }

  pub fn with_parent(mut self, parent: Option<Arc<Instance>>) -> Self {
    self.parent = parent;
    self
  }

  pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
    self.cancel = cancel;
    self
  }

  /// Instancia padre resuelta, si la instancia declara `parent_alias`.
  pub fn parent(&self) -> Option<&Instance> {
    self.parent.as_deref()
  }

  /// Igual que [`parent`](Self::parent) pero falla si no hay padre.
  pub fn require_parent(&self) -> Result<&Instance, WorkflowError> {
    self.parent().ok_or_else(|| WorkflowError::step(&self.step_name, "la instancia no tiene padre resuelto"))
  }

  pub fn cancellation_token(&self) -> &CancellationToken {
    &self.cancel
  }

  pub fn is_canceled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Ejecuta una llamada externa abandonandola si el token se cancela.
  pub async fn call<T, F>(&self, fut: F) -> Result<T, WorkflowError>
    where F: Future<Output = Result<T, ProviderError>> + Send
  {
    tokio::select! {
      _ = self.cancel.cancelled() => Err(WorkflowError::Canceled { step: self.step_name.clone() }),
      res = fut => res.map_err(WorkflowError::from),
    }
  }
}
