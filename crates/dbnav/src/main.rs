mod cli;
mod render;

use dbnav_core::{
    ConnectionGroupStore, JsonFileSettingsStore, NavConfigStore, NavError, SessionOutcome,
    TreeSessionCoordinator,
};
use dbnav_ipc::{FramedMetadataService, ServiceProcess, pump};
use log::{error, info, warn};
use std::sync::Arc;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = match cli::parse(&raw) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}\n\n{}", message, cli::USAGE);
            std::process::exit(2);
        }
    };

    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: cli::Args) -> Result<(), NavError> {
    let config_store = match &args.config {
        Some(path) => NavConfigStore::from_path(path),
        None => NavConfigStore::new()?,
    };
    let config = config_store.load()?;

    let service_config = config.service.clone().ok_or_else(|| {
        NavError::Storage(format!(
            "No metadata service configured in {}",
            config_store.path().display()
        ))
    })?;

    let (process, requests, notifications) = ServiceProcess::spawn(&service_config)?;

    let groups = ConnectionGroupStore::new(Arc::new(JsonFileSettingsStore::new()?));
    let service = Arc::new(FramedMetadataService::new(requests));
    let coordinator = Arc::new(TreeSessionCoordinator::with_config(service, groups, &config));

    let pump = {
        let coordinator = coordinator.clone();
        std::thread::spawn(move || pump::run(notifications, &coordinator))
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let result = runtime.block_on(explore(&coordinator, &args));

    info!("Shutting down metadata service (pid={})", process.id());
    drop(process);

    match pump.join() {
        Ok(Ok(matched)) => info!("Notification pump finished after {} notifications", matched),
        Ok(Err(e)) => warn!("Notification pump failed: {}", e),
        Err(_) => warn!("Notification pump panicked"),
    }

    result
}

async fn explore(coordinator: &TreeSessionCoordinator, args: &cli::Args) -> Result<(), NavError> {
    if let Some(group_id) = &args.group {
        coordinator
            .move_connection_to_group(&args.profile, Some(group_id))
            .await?;
    }

    let connected = coordinator.connect(args.profile.clone()).await?;
    match &connected.outcome {
        SessionOutcome::Created(_) => {}
        SessionOutcome::Failed(message) => return Err(NavError::RemoteFailure(message.clone())),
        SessionOutcome::Cancelled => return Err(NavError::Cancelled),
    }

    let mut out = std::io::stdout().lock();
    let printed = render::print_tree(coordinator, connected.node, args.depth, &mut out).await?;
    info!("Printed {} nodes", printed);

    coordinator.disconnect(connected.node).await
}
