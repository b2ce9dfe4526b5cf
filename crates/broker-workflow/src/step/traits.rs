use crate::errors::WorkflowError;
use crate::step::StepContext;
use async_trait::async_trait;
use broker_domain::{Facet, Instance};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Identidad de un paso dentro de su secuencia.
pub trait Step: Send + Sync {
  /// Nombre del paso; unico dentro de la secuencia.
  fn name(&self) -> &str;
}

/// Paso de aprovisionamiento o actualizacion.
///
/// Recibe una instantanea de la instancia y devuelve los nuevos `details`,
/// que reemplazan a los anteriores por completo. Debe ser idempotente: el
/// motor puede volver a ejecutarlo tras un fallo, y "ya existe" cuenta
/// como exito.
#[async_trait]
pub trait ProvisioningStep: Step {
  async fn execute(&self, ctx: &StepContext, instance: &Instance) -> Result<Facet, WorkflowError>;
}

/// Paso de desaprovisionamiento: devuelve los nuevos `details` y
/// `secure_details` (`None` los elimina). "Ya borrado" cuenta como exito.
#[async_trait]
pub trait DeprovisioningStep: Step {
  async fn execute(&self, ctx: &StepContext, instance: &Instance) -> Result<(Facet, Option<Facet>), WorkflowError>;
}

/// Adaptador de clausura a `ProvisioningStep`. La clausura no puede retener
/// referencias a sus argumentos dentro del futuro devuelto.
pub struct FnStep<F, Fut> {
  name: String,
  f: F,
  _fut: PhantomData<fn() -> Fut>,
}

impl<F, Fut> Step for FnStep<F, Fut> where F: Send + Sync
{
  fn name(&self) -> &str {
    &self.name
  }
}

#[async_trait]
impl<F, Fut> ProvisioningStep for FnStep<F, Fut>
  where F: Fn(&StepContext, &Instance) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Facet, WorkflowError>> + Send + 'static
{
  async fn execute(&self, ctx: &StepContext, instance: &Instance) -> Result<Facet, WorkflowError> {
    (self.f)(ctx, instance).await
  }
}

/// Adaptador de clausura a `DeprovisioningStep`.
pub struct FnDeprovisionStep<F, Fut> {
  name: String,
  f: F,
  _fut: PhantomData<fn() -> Fut>,
}

impl<F, Fut> Step for FnDeprovisionStep<F, Fut> where F: Send + Sync
{
  fn name(&self) -> &str {
    &self.name
  }
}

#[async_trait]
impl<F, Fut> DeprovisioningStep for FnDeprovisionStep<F, Fut>
  where F: Fn(&StepContext, &Instance) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(Facet, Option<Facet>), WorkflowError>> + Send + 'static
{
  async fn execute(&self, ctx: &StepContext, instance: &Instance) -> Result<(Facet, Option<Facet>), WorkflowError> {
    (self.f)(ctx, instance).await
  }
}

/// Crea un paso de aprovisionamiento a partir de una clausura.
pub fn step_fn<F, Fut>(name: &str, f: F) -> Arc<dyn ProvisioningStep>
  where F: Fn(&StepContext, &Instance) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Facet, WorkflowError>> + Send + 'static
{
  Arc::new(FnStep { name: name.to_string(), f, _fut: PhantomData })
}

/// Crea un paso de desaprovisionamiento a partir de una clausura.
pub fn deprovision_step_fn<F, Fut>(name: &str, f: F) -> Arc<dyn DeprovisioningStep>
  where F: Fn(&StepContext, &Instance) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(Facet, Option<Facet>), WorkflowError>> + Send + 'static
{
  Arc::new(FnDeprovisionStep { name: name.to_string(), f, _fut: PhantomData })
}
