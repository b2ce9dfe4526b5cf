use broker_domain::{codec_from_env, Codec, FacetValue, Instance, ParameterMap};
use broker_providers::FakeCloud;
use broker_workflow::flows::{default_registry, ProviderClients};
use broker_workflow::{CancellationToken, EngineConfig, InstanceService, ProvisionRequest, RunOutcome, WorkflowError};
use flow::InstanceRepository;
use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Pequeño menú interactivo para administrar instancias con el broker.
///
/// Usa el repositorio de `broker-persistence` (SQLite por defecto, Postgres
/// con la feature `pg`) y una nube simulada en memoria.
///
/// Opciones soportadas:
/// 1) Listar instancias
/// 2) Aprovisionar
/// 3) Actualizar
/// 4) Desaprovisionar
/// 5) Ver instancia
/// 6) Reconciliar
/// 7) Salir
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let codec = Arc::new(codec_from_env()?);
    let config = EngineConfig::from_env()?;
    // Inicializar repo (aplica migraciones embebidas si procede)
    let repo = Arc::new(broker_persistence::new_from_env()?);
    let cloud = Arc::new(FakeCloud::new());
    let service = build_service(&cloud, repo, codec, config)?;
    let cancel = CancellationToken::new();

    let resumed = reconcile_pending(&service, &cancel).await?;
    if resumed > 0 {
        log::info!("{} ejecuciones pendientes retomadas", resumed);
    }

    loop {
        println!("\n== Broker CLI menu ==");
        println!("1) Listar instancias");
        println!("2) Aprovisionar");
        println!("3) Actualizar");
        println!("4) Desaprovisionar");
        println!("5) Ver instancia");
        println!("6) Reconciliar");
        println!("7) Salir");
        print!("Elige una opción: ");
        io::stdout().flush().ok();

        let mut choice = String::new();
        io::stdin().read_line(&mut choice)?;
        match choice.trim() {
            "1" => match service.list() {
                Ok(instances) => {
                    println!("\nID                                   | SERVICIO                 | ALIAS        | ESTADO");
                    println!("-------------------------------------------------------------------------------------------");
                    for i in instances {
                        let alias = if i.alias.is_empty() { "-" } else { i.alias.as_str() };
                        println!("{} | {:<24} | {:<12} | {}", i.instance_id, i.service_id, alias, i.status);
                    }
                }
                Err(e) => eprintln!("Error listando instancias: {}", e),
            },
            "2" => {
                for s in service.registry().catalog().services() {
                    let plans: Vec<&str> = s.plans.iter().map(|p| p.id.as_str()).collect();
                    println!("  {} [{}]", s.id, plans.join(", "));
                }
                let service_id = prompt("Servicio: ")?;
                let plan_id = prompt("Plan: ")?;
                let alias = prompt("Alias (enter para vacío): ")?;
                let parent = prompt("Alias del padre (enter para ninguno): ")?;
                let location = prompt("Región: ")?;
                let rg = prompt("Grupo de recursos: ")?;
                let raw = prompt("Parámetros (JSON, enter para vacío): ")?;
                let parameters = match parse_parameters(&raw) {
                    Ok(p) => p,
                    Err(e) => { eprintln!("{}", e); continue; }
                };
                let mut request = ProvisionRequest::new(service_id.trim(), plan_id.trim()).with_alias(alias.trim())
                                                                                        .with_placement(location.trim(),
                                                                                                        rg.trim());
                if !parent.trim().is_empty() {
                    request = request.with_parent_alias(parent.trim());
                }
                request.parameters = parameters;
                match service.provision(request, &cancel).await {
                    Ok((instance, outcome)) => report(&instance, &outcome),
                    Err(e) => eprintln!("Error aprovisionando: {}", e),
                }
            }
            "3" => {
                let id = prompt("Instancia a actualizar: ")?;
                let raw = prompt("Parámetros (JSON): ")?;
                let parameters = match parse_parameters(&raw) {
                    Ok(p) => p,
                    Err(e) => { eprintln!("{}", e); continue; }
                };
                match service.update(id.trim(), &parameters, &cancel).await {
                    Ok((instance, outcome)) => report(&instance, &outcome),
                    Err(e) => eprintln!("Error actualizando: {}", e),
                }
            }
            "4" => {
                let id = prompt("Instancia a desaprovisionar: ")?;
                let confirm = prompt(&format!("Confirma borrado de {}? escribir 'yes' para confirmar: ", id.trim()))?;
                if confirm.trim().to_lowercase() != "yes" {
                    println!("Borrado cancelado");
                    continue;
                }
                match service.deprovision(id.trim(), &cancel).await {
                    Ok((instance, outcome)) => report(&instance, &outcome),
                    Err(e) => eprintln!("Error desaprovisionando: {}", e),
                }
            }
            "5" => {
                let id = prompt("Instancia: ")?;
                match service.get(id.trim()) {
                    Ok(Some(instance)) => show(&instance),
                    Ok(None) => println!("No existe la instancia {}", id.trim()),
                    Err(e) => eprintln!("Error leyendo la instancia: {}", e),
                }
            }
            "6" => {
                let id = prompt("Instancia a reconciliar: ")?;
                match service.reconcile(id.trim(), &cancel).await {
                    Ok(Some(outcome)) => println!("Resultado: {:?}", outcome),
                    Ok(None) => println!("Nada pendiente"),
                    Err(e) => eprintln!("Error reconciliando: {}", e),
                }
            }
            "7" => {
                println!("Saliendo...");
                break;
            }
            other => {
                println!("Opción inválida: {}", other);
            }
        }
    }

    Ok(())
}

fn build_service(cloud: &Arc<FakeCloud>,
                 repo: Arc<dyn InstanceRepository>,
                 codec: Arc<dyn Codec>,
                 config: EngineConfig)
                 -> Result<InstanceService, WorkflowError> {
    let registry = default_registry(&ProviderClients::from_fake(cloud.clone()))?;
    Ok(InstanceService::new(Arc::new(registry), repo, codec, config))
}

/// Retoma las instancias que quedaron con un workflow en curso (por
/// ejemplo tras una caída). Las fallidas se dejan para reconciliar a mano.
async fn reconcile_pending(service: &InstanceService, cancel: &CancellationToken) -> Result<usize, WorkflowError> {
    let mut resumed = 0;
    for instance in service.list()? {
        if instance.status.is_terminal() {
            continue;
        }
        if let Some(outcome) = service.reconcile(&instance.instance_id, cancel).await? {
            log::info!("{}: {:?}", instance.instance_id, outcome);
            resumed += 1;
        }
    }
    Ok(resumed)
}

fn parse_parameters(raw: &str) -> Result<ParameterMap, String> {
    if raw.trim().is_empty() {
        return Ok(ParameterMap::new());
    }
    match serde_json::from_str::<serde_json::Value>(raw.trim()) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err("Los parámetros deben ser un objeto JSON".into()),
        Err(e) => Err(format!("JSON inválido: {}", e)),
    }
}

fn report(instance: &Instance, outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed => println!("Instancia {}: {}", instance.instance_id, instance.status),
        RunOutcome::Failed { step, reason } => println!("Instancia {} falló en {}: {}", instance.instance_id, step, reason),
        RunOutcome::Canceled { step } => println!("Instancia {} cancelada antes de {}", instance.instance_id, step),
    }
}

fn show(instance: &Instance) {
    println!("id:        {}", instance.instance_id);
    println!("servicio:  {}/{}", instance.service_id, instance.plan_id);
    println!("alias:     {}", instance.alias);
    println!("padre:     {}", instance.parent_alias.as_deref().unwrap_or("-"));
    println!("ubicación: {} / {}", instance.location, instance.resource_group);
    println!("estado:    {} {}", instance.status, instance.status_reason);
    if let Some(progress) = &instance.progress {
        match &progress.last_completed_step {
            Some(step) => println!("progreso:  {} tras {}", progress.workflow, step),
            None => println!("progreso:  {} sin pasos completados", progress.workflow),
        }
    }
    // los facets sensibles no se muestran
    let details = instance.details
                          .as_ref()
                          .and_then(|d| d.to_json().ok())
                          .unwrap_or(serde_json::Value::Null);
    println!("detalles:  {}", details);
}

fn prompt(msg: &str) -> io::Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s)
}
