use crate::schema::instances::dsl::*;
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::Error as DieselError;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use flow::{FlowError, InstanceRepository, Result};
use std::sync::Arc;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

/// Variable de entorno preferida para la URL de la base de datos.
pub const DB_URL_ENV: &str = "BROKER_DB_URL";
/// URL por defecto (SQLite en memoria compartida) cuando no se usa Postgres.
pub const DEFAULT_SQLITE_URL: &str = "file:brokerdb?mode=memory&cache=shared";

#[cfg(feature = "pg")]
type DbConn = diesel::pg::PgConnection;
#[cfg(not(feature = "pg"))]
type DbConn = diesel::sqlite::SqliteConnection;
type DbPool = Pool<ConnectionManager<DbConn>>;

/// Repo Diesel que implementa `flow::InstanceRepository`.
///
/// Una fila por instancia: `payload` guarda la forma persistida completa y
/// cada `save` es un upsert sobre `instance_id`.
#[derive(Clone)]
pub struct DieselInstanceRepository {
  pool: Arc<DbPool>,
}

impl std::fmt::Debug for DieselInstanceRepository {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DieselInstanceRepository").field("pool_size", &self.pool.max_size()).finish()
  }
}

impl DieselInstanceRepository {
  /// Abre el pool y aplica las migraciones pendientes.
  pub fn new(database_url: &str) -> Result<Self> {
    let manager = ConnectionManager::<DbConn>::new(database_url);
    let pool = Pool::builder().max_size(4)
                              .build(manager)
                              .map_err(|e| FlowError::Storage(format!("no se pudo crear el pool de conexiones: {}", e)))?;
    let repo = DieselInstanceRepository { pool: Arc::new(pool) };
    let mut c = repo.conn()?;
    #[cfg(not(feature = "pg"))]
    {
      let _ = diesel::sql_query("PRAGMA journal_mode = WAL;").execute(&mut c);
      let _ = diesel::sql_query("PRAGMA busy_timeout = 5000;").execute(&mut c);
    }
    let applied = c.run_pending_migrations(MIGRATIONS)
                   .map_err(|e| FlowError::Storage(format!("migraciones: {}", e)))?;
    log::info!("broker-persistence: {} migraciones aplicadas", applied.len());
    drop(c);
    Ok(repo)
  }

  fn conn(&self) -> Result<PooledConnection<ConnectionManager<DbConn>>> {
    self.pool.get().map_err(|e| FlowError::Storage(format!("pool: {}", e)))
  }
}

fn map_db_err<T>(res: std::result::Result<T, DieselError>) -> Result<T> {
  res.map_err(|e| FlowError::Storage(format!("db: {}", e)))
}

impl InstanceRepository for DieselInstanceRepository {
  fn load(&self, id: &str) -> Result<Vec<u8>> {
    let mut conn = self.conn()?;
    let row = map_db_err(instances.filter(instance_id.eq(id))
                                  .select(payload)
                                  .first::<String>(&mut conn)
                                  .optional())?;
    row.map(String::into_bytes)
       .ok_or_else(|| FlowError::NotFound(format!("instancia {}", id)))
  }

  fn save(&self, id: &str, bytes: &[u8]) -> Result<()> {
    let text = std::str::from_utf8(bytes).map_err(|e| FlowError::Other(format!("payload no es UTF-8: {}", e)))?;
    let now = Utc::now().timestamp_millis();
    let mut conn = self.conn()?;
    map_db_err(diesel::insert_into(instances).values((instance_id.eq(id), payload.eq(text), updated_at_ts.eq(now)))
                                             .on_conflict(instance_id)
                                             .do_update()
                                             .set((payload.eq(text), updated_at_ts.eq(now)))
                                             .execute(&mut conn))?;
    log::debug!("instancia {} guardada ({} bytes)", id, bytes.len());
    Ok(())
  }

  fn delete(&self, id: &str) -> Result<()> {
    let mut conn = self.conn()?;
    let n = map_db_err(diesel::delete(instances.filter(instance_id.eq(id))).execute(&mut conn))?;
    log::debug!("instancia {} eliminada ({} filas)", id, n);
    Ok(())
  }

  fn list_ids(&self) -> Result<Vec<String>> {
    let mut conn = self.conn()?;
    map_db_err(instances.select(instance_id).order(instance_id.asc()).load::<String>(&mut conn))
  }
}

/// Construye el repositorio a partir del entorno.
///
/// Lee `BROKER_DB_URL` (o `DATABASE_URL`). Compilado con `pg` exige una URL
/// de Postgres; sin `pg` usa SQLite y, si no hay URL, la base en memoria
/// compartida.
#[cfg(feature = "pg")]
pub fn new_from_env() -> Result<DieselInstanceRepository> {
  dotenvy::dotenv().ok();
  let url = std::env::var(DB_URL_ENV).or_else(|_| std::env::var("DATABASE_URL"))
                                     .map_err(|_| FlowError::Other("BROKER_DB_URL / DATABASE_URL no definida".into()))?;
  let l = url.to_lowercase();
  if !(l.starts_with("postgres") || url.contains('@')) {
    return Err(FlowError::Other("BROKER_DB_URL no parece una URL de Postgres".into()));
  }
  DieselInstanceRepository::new(&url)
}

#[cfg(not(feature = "pg"))]
pub fn new_from_env() -> Result<DieselInstanceRepository> {
  dotenvy::dotenv().ok();
  let url = std::env::var(DB_URL_ENV).or_else(|_| std::env::var("DATABASE_URL"))
                                     .unwrap_or_else(|_| DEFAULT_SQLITE_URL.into());
  if url.to_lowercase().starts_with("postgres") {
    return Err(FlowError::Other("broker-persistence se compiló sin la feature 'pg'; habilítela para usar Postgres"
                                                                                                          .into()));
  }
  DieselInstanceRepository::new(&url)
}
