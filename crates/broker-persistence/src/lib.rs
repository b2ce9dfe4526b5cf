//! Persistencia Diesel para el trait `flow::InstanceRepository`.
//! Este archivo expone el módulo `schema` y reexporta el repositorio Diesel
//! (SQLite por defecto, Postgres con la feature `pg`). La implementación
//! detallada está en `instance_persistence.rs`.

mod instance_persistence;
pub mod schema;

pub use instance_persistence::{new_from_env, DieselInstanceRepository, DB_URL_ENV, DEFAULT_SQLITE_URL, MIGRATIONS};
