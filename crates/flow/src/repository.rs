// Archivo: repository.rs
// Propósito: definir el trait `InstanceRepository`, el contrato que deben
// implementar las persistencias de instancias (Diesel, in-memory, etc.).
use crate::errors::Result;

/// Contrato mínimo del almacenamiento de instancias.
///
/// El repositorio guarda la forma persistida de cada instancia como bytes
/// opacos indexados por `instance_id`. No interpreta el contenido: el
/// cifrado de los facets sensibles ocurre antes de llegar aquí.
pub trait InstanceRepository: Send + Sync {
    /// Carga los bytes persistidos. `FlowError::NotFound` si no existe.
    fn load(&self, instance_id: &str) -> Result<Vec<u8>>;

    /// Inserta o reemplaza el registro completo (upsert).
    fn save(&self, instance_id: &str, bytes: &[u8]) -> Result<()>;

    /// Elimina el registro. Borrar un id inexistente no es un error.
    fn delete(&self, instance_id: &str) -> Result<()>;

    /// Lista los ids guardados, ordenados.
    fn list_ids(&self) -> Result<Vec<String>>;

    /// Verifica si existe un registro con el id dado.
    fn exists(&self, instance_id: &str) -> Result<bool> {
        match self.load(instance_id) {
            Ok(_) => Ok(true),
            Err(crate::FlowError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl<T: InstanceRepository + ?Sized> InstanceRepository for std::sync::Arc<T> {
    fn load(&self, instance_id: &str) -> Result<Vec<u8>> {
        (**self).load(instance_id)
    }

    fn save(&self, instance_id: &str, bytes: &[u8]) -> Result<()> {
        (**self).save(instance_id, bytes)
    }

    fn delete(&self, instance_id: &str) -> Result<()> {
        (**self).delete(instance_id)
    }

    fn list_ids(&self) -> Result<Vec<String>> {
        (**self).list_ids()
    }
}
