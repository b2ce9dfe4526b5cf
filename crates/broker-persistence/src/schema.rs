// Esquema Diesel de la tabla de instancias (SQLite por defecto, Postgres con
// la feature `pg`). El payload es la forma persistida JSON de la instancia,
// con los facets sensibles ya cifrados.
diesel::table! {
    instances (instance_id) {
        instance_id -> Text,
        payload -> Text,
        updated_at_ts -> BigInt,
    }
}
