use anyhow::Context;
use mangashelf::modules::jobs::{
    BackgroundWorker, HandlerRegistry, JobRepositoryImpl, JobType, Scheduler,
    handlers::LibraryScanHandler,
};
use mangashelf::modules::library::{FilesystemLibraryImporter, LibraryPathRepositoryImpl};
use mangashelf::shared::utils::logger::init_logger;
use mangashelf::shared::{AppConfig, Database};
use mangashelf::{log_error, log_info};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logger();

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    let db = Arc::new(Database::new(&config.database).context("Failed to connect to database")?);
    let applied = db.run_migrations().context("Failed to run migrations")?;
    log_info!("Database ready ({} migrations applied)", applied);

    let job_repository = Arc::new(JobRepositoryImpl::new(db.clone()));
    let library_paths = Arc::new(LibraryPathRepositoryImpl::new(db.clone()));

    let scheduler = Arc::new(Scheduler::new(
        job_repository.clone(),
        library_paths.clone(),
        config.scheduler.clone(),
    ));

    let mut handlers = HandlerRegistry::new();
    handlers.register(
        JobType::LibraryScan,
        Arc::new(LibraryScanHandler::new(
            library_paths.clone(),
            Arc::new(FilesystemLibraryImporter::new()),
        )),
    );
    log_info!("Registered handlers: {:?}", handlers.job_types());

    // Download and chapter update jobs stay queued for a runner that has those handlers
    let worker = Arc::new(
        BackgroundWorker::new(job_repository.clone(), handlers, config.worker.clone())
            .with_listener(scheduler.clone()),
    );
    worker.start().await;

    let cancel = CancellationToken::new();
    let periodic = scheduler.spawn_periodic(
        config.scheduler.scan_check_interval,
        config.job_retention_days,
        cancel.clone(),
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    log_info!("Shutdown signal received");

    cancel.cancel();
    if let Err(e) = periodic.await {
        log_error!("Periodic scheduler ended abnormally: {}", e);
    }
    worker.stop().await;

    log_info!("Shutdown complete");
    Ok(())
}
