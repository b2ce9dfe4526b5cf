// Archivo: retry.rs
// Propósito: política de reintento con backoff exponencial acotado para las
// escrituras posteriores a cada paso. Sólo calcula esperas; quien reintenta
// decide cómo dormir (sync o async).
use crate::errors::FlowError;
use std::time::Duration;

/// Política de reintento para errores transitorios de almacenamiento.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Intentos totales (incluye el primero). Siempre >= 1.
    pub max_attempts: u32,
    /// Espera tras el primer fallo.
    pub initial_backoff: Duration,
    /// Tope de la espera entre intentos.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5,
               initial_backoff: Duration::from_millis(50),
               max_backoff: Duration::from_secs(2) }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1),
               initial_backoff,
               ..Self::default() }
    }

    /// Política sin reintentos: un único intento.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Espera antes del intento `attempt + 1`, con `attempt` contando desde 1
    /// el intento que acaba de fallar. Duplica en cada fallo hasta
    /// `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let delay = self.initial_backoff.saturating_mul(1u32 << shift);
        delay.min(self.max_backoff)
    }

    /// `true` si tras fallar el intento `attempt` con `err` debe reintentarse.
    pub fn should_retry(&self, attempt: u32, err: &FlowError) -> bool {
        err.is_transient() && attempt < self.max_attempts
    }

    /// Ejecuta `op` de forma síncrona aplicando la política. Devuelve el
    /// último error junto con los intentos realizados si se agotan.
    pub fn run_blocking<T, F>(&self, mut op: F) -> std::result::Result<T, (FlowError, u32)>
        where F: FnMut() -> crate::Result<T>
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if self.should_retry(attempt, &e) => {
                    log::warn!("intento {} fallido, reintentando: {}", attempt, e);
                    std::thread::sleep(self.backoff_for(attempt));
                }
                Err(e) => return Err((e, attempt)),
            }
        }
    }
}
