// Archivo: stubs.rs
// Propósito: implementación en memoria del almacenamiento de instancias para
// pruebas y wiring rápido. No es durable.
//
// Además de guardar los bytes, cuenta las escrituras/borrados y permite
// inyectar fallos transitorios para ejercitar la política de reintento.
use crate::errors::{FlowError, Result};
use crate::repository::InstanceRepository;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Repositorio mínimo en memoria (no durable).
#[derive(Debug, Default)]
pub struct InMemoryInstanceRepository {
    /// Registros persistidos indexados por `instance_id`.
    records: Mutex<BTreeMap<String, Vec<u8>>>,
    /// Fallos a devolver en las próximas llamadas a `save`, en orden.
    save_failures: Mutex<VecDeque<FlowError>>,
    save_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl InMemoryInstanceRepository {
    /// Crea una nueva instancia del repositorio en memoria.
    pub fn new() -> Self {
        Self::default()
    }

    /// Helper para mapear `Mutex::lock()` en un `Result` con
    /// `FlowError::Storage`.
    fn lock<'a, T>(&'a self, m: &'a Mutex<T>) -> std::result::Result<MutexGuard<'a, T>, FlowError> {
        m.lock().map_err(|e| FlowError::Storage(format!("mutex poisoned: {:?}", e)))
    }

    /// Hace que las próximas `n` llamadas a `save` fallen con un error de
    /// almacenamiento transitorio.
    pub fn fail_next_saves(&self, n: usize) {
        let mut failures = self.save_failures.lock().unwrap_or_else(|e| e.into_inner());
        for i in 0..n {
            failures.push_back(FlowError::Storage(format!("fallo inyectado #{}", i + 1)));
        }
    }

    /// Encola un error concreto para la próxima llamada a `save`.
    pub fn push_save_failure(&self, err: FlowError) {
        self.save_failures.lock().unwrap_or_else(|e| e.into_inner()).push_back(err);
    }

    /// Número de llamadas a `save` (incluidas las fallidas).
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    /// Número de llamadas a `delete`.
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Número de registros almacenados.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InstanceRepository for InMemoryInstanceRepository {
    fn load(&self, instance_id: &str) -> Result<Vec<u8>> {
        let records = self.lock(&self.records)?;
        records.get(instance_id)
               .cloned()
               .ok_or_else(|| FlowError::NotFound(format!("instancia {}", instance_id)))
    }

    /// Upsert en memoria. Consume primero los fallos inyectados.
    fn save(&self, instance_id: &str, bytes: &[u8]) -> Result<()> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.lock(&self.save_failures)?.pop_front() {
            return Err(err);
        }
        self.lock(&self.records)?.insert(instance_id.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, instance_id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.lock(&self.records)?.remove(instance_id);
        Ok(())
    }

    fn list_ids(&self) -> Result<Vec<String>> {
        Ok(self.lock(&self.records)?.keys().cloned().collect())
    }
}
