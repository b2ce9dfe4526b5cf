use broker_persistence::new_from_env;
use flow::InstanceRepository;

fn main() {
  // El ejemplo usa BROKER_DB_URL (o DATABASE_URL). Para demos locales:
  //   export BROKER_DB_URL="file:brokerdb?mode=memory&cache=shared"
  // Sin variable definida se usa la base SQLite en memoria compartida.
  let repo = new_from_env().expect("no se pudo inicializar el repositorio");

  for i in 1..=3 {
    let id = format!("instance-{}", i);
    let body = format!(r#"{{"instanceId":"{}","status":"provisioning"}}"#, id);
    repo.save(&id, body.as_bytes()).expect("save");
  }
  println!("ids: {:?}", repo.list_ids().expect("list"));

  repo.save("instance-2", br#"{"instanceId":"instance-2","status":"provisioned"}"#).expect("upsert");
  println!("instance-2: {}", String::from_utf8_lossy(&repo.load("instance-2").expect("load")));

  repo.delete("instance-1").expect("delete");
  println!("ids after delete: {:?}", repo.list_ids().expect("list"));
}
