use crate::errors::WorkflowError;
use flow::RetryPolicy;
use std::time::Duration;

/// Timeout opcional por paso, en segundos (`0` o vacio lo desactiva).
pub const STEP_TIMEOUT_ENV: &str = "BROKER_STEP_TIMEOUT_SECS";
/// Intentos totales de cada escritura tras un paso.
pub const PERSIST_MAX_ATTEMPTS_ENV: &str = "BROKER_PERSIST_MAX_ATTEMPTS";
/// Espera inicial del backoff exponencial, en milisegundos.
pub const PERSIST_BACKOFF_MS_ENV: &str = "BROKER_PERSIST_BACKOFF_MS";

/// Configuracion del motor de ejecucion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineConfig {
  pub step_timeout: Option<Duration>,
  pub retry: RetryPolicy,
}

impl EngineConfig {
  pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
    self.step_timeout = Some(timeout);
    self
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  /// Lee la configuracion del entorno (y de `.env` si existe).
  pub fn from_env() -> Result<Self, WorkflowError> {
    dotenvy::dotenv().ok();
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Igual que [`from_env`](Self::from_env) pero con una funcion de
  /// busqueda arbitraria.
  pub fn from_lookup<F>(get: F) -> Result<Self, WorkflowError>
    where F: Fn(&str) -> Option<String>
  {
    let mut config = EngineConfig::default();
    if let Some(secs) = parse::<u64>(&get, STEP_TIMEOUT_ENV)? {
      config.step_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if let Some(attempts) = parse::<u32>(&get, PERSIST_MAX_ATTEMPTS_ENV)? {
      config.retry.max_attempts = attempts.max(1);
    }
    if let Some(ms) = parse::<u64>(&get, PERSIST_BACKOFF_MS_ENV)? {
      config.retry.initial_backoff = Duration::from_millis(ms);
    }
    Ok(config)
  }
}

fn parse<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, WorkflowError> {
  match get(key).map(|v| v.trim().to_string()) {
    None => Ok(None),
    Some(v) if v.is_empty() => Ok(None),
    Some(v) => v.parse::<T>()
                .map(Some)
                .map_err(|_| WorkflowError::Validation(format!("{} no es un valor valido: {:?}", key, v))),
  }
}
