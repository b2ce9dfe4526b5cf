use crate::engine::EngineConfig;
use crate::errors::WorkflowError;
use crate::step::{Deprovisioner, DeprovisioningStep, Provisioner, ProvisioningStep, Step, StepContext, StepSequence,
                  Updater};
use async_trait::async_trait;
use broker_domain::{Codec, DomainError, Facet, Instance, InstanceLookup, InstanceStatus, WorkflowProgress, WorkflowType};
use chrono::Utc;
use flow::{FlowError, InstanceRepository};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Resultado de una ejecucion del motor.
///
/// Los errores de la propia maquinaria (persistencia agotada, secuencia
/// mal formada, codec) se devuelven como `Err`; el fallo de un paso es un
/// resultado normal y queda registrado en la instancia.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Todos los pasos terminaron; la instancia quedo en su estado de exito.
    Completed,
    /// Un paso fallo; la instancia quedo en `Failed` con el motivo.
    Failed { step: String, reason: String },
    /// Se observo la cancelacion antes de ejecutar `step`.
    Canceled { step: String },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }
}

enum SecureUpdate {
    Keep,
    Replace(Option<Facet>),
}

struct StepOutcome {
    details: Facet,
    secure_details: SecureUpdate,
}

/// Vista uniforme de los dos tipos de paso para el bucle del motor.
#[async_trait]
trait ApplyStep: Step {
    async fn apply(&self, ctx: &StepContext, instance: &Instance) -> Result<StepOutcome, WorkflowError>;
}

#[async_trait]
impl ApplyStep for dyn ProvisioningStep {
    async fn apply(&self, ctx: &StepContext, instance: &Instance) -> Result<StepOutcome, WorkflowError> {
        let details = self.execute(ctx, instance).await?;
        Ok(StepOutcome { details, secure_details: SecureUpdate::Keep })
    }
}

#[async_trait]
impl ApplyStep for dyn DeprovisioningStep {
    async fn apply(&self, ctx: &StepContext, instance: &Instance) -> Result<StepOutcome, WorkflowError> {
        let (details, secure_details) = self.execute(ctx, instance).await?;
        Ok(StepOutcome { details, secure_details: SecureUpdate::Replace(secure_details) })
    }
}

/// Motor que recorre la secuencia de pasos de una instancia.
///
/// Tras cada paso exitoso persiste la instancia con el marcador de
/// progreso, de modo que una nueva ejecucion del mismo workflow retoma en
/// el paso siguiente al ultimo completado. El marcador existe desde el
/// arranque del workflow, asi que un fallo en el primer paso tambien se
/// puede retomar. Las escrituras fallidas por errores transitorios se
/// reintentan segun `EngineConfig::retry`; el repositorio es bloqueante y
/// se invoca en el pool de `spawn_blocking`.
pub struct InstanceEngine {
    repo: Arc<dyn InstanceRepository>,
    codec: Arc<dyn Codec>,
    config: EngineConfig,
    lookup: Option<Arc<dyn InstanceLookup>>,
}

impl std::fmt::Debug for InstanceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceEngine")
         .field("config", &self.config)
         .field("parent_lookup", &self.lookup.is_some())
         .finish()
    }
}

impl InstanceEngine {
    pub fn new(repo: Arc<dyn InstanceRepository>, codec: Arc<dyn Codec>, config: EngineConfig) -> Self {
        Self { repo, codec, config, lookup: None }
    }

    /// Habilita la resolucion de la instancia padre antes del primer paso.
    pub fn with_parent_lookup(mut self, lookup: Arc<dyn InstanceLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn provision(&self,
                           instance: &mut Instance,
                           provisioner: &Provisioner,
                           cancel: &CancellationToken)
                           -> Result<RunOutcome, WorkflowError> {
        self.run(WorkflowType::Provision, instance, provisioner, cancel).await
    }

    pub async fn update(&self,
                        instance: &mut Instance,
                        updater: &Updater,
                        cancel: &CancellationToken)
                        -> Result<RunOutcome, WorkflowError> {
        self.run(WorkflowType::Update, instance, updater, cancel).await
    }

    /// Igual que los otros workflows, pero al completarse borra el registro
    /// en lugar de guardarlo.
    pub async fn deprovision(&self,
                             instance: &mut Instance,
                             deprovisioner: &Deprovisioner,
                             cancel: &CancellationToken)
                             -> Result<RunOutcome, WorkflowError> {
        self.run(WorkflowType::Deprovision, instance, deprovisioner, cancel).await
    }

    /// Persiste la instancia aplicando la politica de reintento. `step`
    /// identifica la escritura en los errores.
    pub async fn save(&self, step: &str, instance: &Instance) -> Result<(), WorkflowError> {
        let bytes = instance.to_persisted_form(self.codec.as_ref())?;
        let id = instance.instance_id.clone();
        self.retrying(step, move |repo| repo.save(&id, &bytes)).await
    }

    async fn run<S>(&self,
                    workflow: WorkflowType,
                    instance: &mut Instance,
                    steps: &StepSequence<S>,
                    cancel: &CancellationToken)
                    -> Result<RunOutcome, WorkflowError>
        where S: ApplyStep + ?Sized
    {
        let start = starting_step(workflow, instance, steps)?;
        let resumed = instance.progress
                              .take()
                              .filter(|p| p.workflow == workflow)
                              .and_then(|p| p.last_completed_step);
        instance.progress = Some(WorkflowProgress { workflow, last_completed_step: resumed });
        instance.status = workflow.in_progress_status();
        instance.status_reason.clear();
        let parent = self.resolve_parent(workflow, instance).await?;

        let Some(mut step_name) = start else {
            log::info!("{} de {}: no quedan pasos pendientes", workflow, instance.instance_id);
            return self.finish(workflow, instance, "-").await;
        };
        log::info!("{} de {}: inicio en el paso {}", workflow, instance.instance_id, step_name);

        loop {
            if cancel.is_cancelled() {
                log::warn!("{} de {}: cancelado antes de {}", workflow, instance.instance_id, step_name);
                return Ok(RunOutcome::Canceled { step: step_name });
            }
            let step = steps.step(&step_name)
                            .cloned()
                            .ok_or_else(|| WorkflowError::UnknownStep(step_name.clone()))?;
            let ctx = StepContext::new(&instance.instance_id, workflow, &step_name).with_parent(parent.clone())
                                                                                    .with_cancellation(cancel.child_token());

            log::debug!("paso {} de {} iniciado", step_name, instance.instance_id);
            match self.invoke(step.as_ref(), &ctx, instance).await {
                Err(err) => {
                    if cancel.is_cancelled() {
                        log::warn!("{} de {}: cancelado durante {}", workflow, instance.instance_id, step_name);
                        return Ok(RunOutcome::Canceled { step: step_name });
                    }
                    let reason = format!("{}: {}", step_name, failure_message(&err));
                    log::error!("{} de {} fallo: {}", workflow, instance.instance_id, reason);
                    instance.status = InstanceStatus::Failed;
                    instance.status_reason = reason.clone();
                    self.save(&step_name, instance).await?;
                    return Ok(RunOutcome::Failed { step: step_name, reason });
                }
                Ok(outcome) => {
                    instance.details = Some(outcome.details);
                    if let SecureUpdate::Replace(secure_details) = outcome.secure_details {
                        instance.secure_details = secure_details;
                    }
                    if workflow == WorkflowType::Provision && instance.created.is_none() {
                        instance.created = Some(Utc::now());
                    }
                    log::info!("paso {} de {} completado", step_name, instance.instance_id);

                    match steps.next_step_name(&step_name)?.map(str::to_string) {
                        None => return self.finish(workflow, instance, &step_name).await,
                        Some(next) => {
                            instance.progress = Some(WorkflowProgress::after(workflow, &step_name));
                            self.save(&step_name, instance).await?;
                            step_name = next;
                        }
                    }
                }
            }
        }
    }

    async fn invoke<S>(&self, step: &S, ctx: &StepContext, instance: &Instance) -> Result<StepOutcome, WorkflowError>
        where S: ApplyStep + ?Sized
    {
        match self.config.step_timeout {
            None => step.apply(ctx, instance).await,
            Some(limit) => match tokio::time::timeout(limit, step.apply(ctx, instance)).await {
                Ok(result) => result,
                Err(_) => {
                    ctx.cancellation_token().cancel();
                    Err(WorkflowError::Timeout { step: ctx.step_name.clone(), after: limit })
                }
            },
        }
    }

    async fn finish(&self,
                    workflow: WorkflowType,
                    instance: &mut Instance,
                    last_step: &str)
                    -> Result<RunOutcome, WorkflowError> {
        instance.status = workflow.success_status();
        instance.status_reason.clear();
        instance.progress = None;
        if workflow == WorkflowType::Deprovision {
            let id = instance.instance_id.clone();
            self.retrying(last_step, move |repo| repo.delete(&id)).await?;
        } else {
            self.save(last_step, instance).await?;
        }
        log::info!("{} de {} completado: {}", workflow, instance.instance_id, instance.status);
        Ok(RunOutcome::Completed)
    }

    async fn resolve_parent(&self,
                            workflow: WorkflowType,
                            instance: &mut Instance)
                            -> Result<Option<Arc<Instance>>, WorkflowError> {
        let Some(lookup) = self.lookup.clone() else {
            return Ok(None);
        };
        if instance.parent_alias.as_deref().map_or(true, str::is_empty) {
            return Ok(None);
        }
        let child = instance.clone();
        let found = tokio::task::spawn_blocking(move || child.resolve_parent(lookup.as_ref()))
                        .await
                        .map_err(|e| WorkflowError::Flow(FlowError::Other(format!("busqueda del padre: {}", e))))?;
        match found {
            Ok(Some(parent)) => {
                instance.attach_parent(&parent);
                Ok(Some(Arc::new(parent)))
            }
            Ok(None) => Ok(None),
            // el padre pudo borrarse antes que el hijo
            Err(DomainError::NotFound(msg)) if workflow == WorkflowType::Deprovision => {
                log::warn!("{}: padre no encontrado ({}), se continua sin el", instance.instance_id, msg);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn retrying<F>(&self, step: &str, op: F) -> Result<(), WorkflowError>
        where F: Fn(&dyn InstanceRepository) -> flow::Result<()> + Send + Sync + 'static
    {
        let policy = self.config.retry;
        let op = Arc::new(op);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let repo = self.repo.clone();
            let op = op.clone();
            let result = tokio::task::spawn_blocking(move || (*op)(repo.as_ref()))
                             .await
                             .unwrap_or_else(|e| Err(FlowError::Other(format!("escritura interrumpida: {}", e))));
            match result {
                Ok(()) => return Ok(()),
                Err(err) if policy.should_retry(attempt, &err) => {
                    let delay = policy.backoff_for(attempt);
                    log::warn!("escritura tras {} fallida (intento {}), reintento en {:?}: {}",
                               step,
                               attempt,
                               delay,
                               err);
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_transient() => {
                    return Err(WorkflowError::PersistenceExhausted { step: step.to_string(),
                                                                     attempts: attempt,
                                                                     source: err })
                }
                Err(err) => return Err(WorkflowError::Flow(err)),
            }
        }
    }
}

fn starting_step<S>(workflow: WorkflowType,
                    instance: &Instance,
                    steps: &StepSequence<S>)
                    -> Result<Option<String>, WorkflowError>
    where S: Step + ?Sized
{
    let last = instance.progress
                       .as_ref()
                       .filter(|p| p.workflow == workflow)
                       .and_then(|p| p.last_completed_step.as_deref());
    match last {
        Some(last) => Ok(steps.next_step_name(last)?.map(str::to_string)),
        None => Ok(steps.first_step_name().map(str::to_string)),
    }
}

fn failure_message(err: &WorkflowError) -> String {
    match err {
        WorkflowError::Step { message, .. } => message.clone(),
        WorkflowError::Timeout { after, .. } => format!("tiempo agotado tras {:?}", after),
        other => other.to_string(),
    }
}
