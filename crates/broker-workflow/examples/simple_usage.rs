// Ejemplo local: repositorio en memoria y nube simulada, sin servicios externos
use broker_domain::Aes256GcmCodec;
use broker_providers::FakeCloud;
use broker_workflow::flows::{default_registry, DbmsInstanceDetails, ProviderClients};
use broker_workflow::{CancellationToken, EngineConfig, InstanceService, ProvisionRequest};
use flow::InMemoryInstanceRepository;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cloud = Arc::new(FakeCloud::new());
    let registry = default_registry(&ProviderClients::from_fake(cloud.clone())).expect("registry");
    let repo = Arc::new(InMemoryInstanceRepository::new());
    let codec = Arc::new(Aes256GcmCodec::new(&[42u8; 32]).expect("codec"));
    let service = InstanceService::new(Arc::new(registry), repo, codec, EngineConfig::default());
    let cancel = CancellationToken::new();

    let request = ProvisionRequest::new("mysql-dbms", "basic").with_alias("shared-mysql")
                                                              .with_placement("eastus", "rg-demo")
                                                              .with_parameter("sslEnforcement", "enabled");
    let (dbms, outcome) = service.provision(request, &cancel).await.expect("provision dbms");
    println!("DBMS {}: {:?} status={}", dbms.instance_id, outcome, dbms.status);
    if let Ok(dt) = dbms.details_as::<DbmsInstanceDetails>() {
        println!("  server={} fqdn={}", dt.server_name, dt.fully_qualified_domain_name);
    }

    // la base hereda región y grupo de recursos del DBMS
    let request = ProvisionRequest::new("mysql-database", "database").with_parent_alias("shared-mysql");
    let (db, outcome) = service.provision(request, &cancel).await.expect("provision database");
    println!("Database {}: {:?} rg={}", db.instance_id, outcome, db.resource_group);

    for id in [db.instance_id.as_str(), dbms.instance_id.as_str()] {
        let (_, outcome) = service.deprovision(id, &cancel).await.expect("deprovision");
        println!("Deprovision {}: {:?}", id, outcome);
    }
    println!("Instancias restantes: {}", service.list().expect("list").len());
}
