use std::{process, sync::Arc};

use thiserror::Error;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

use stampa::{
    application::{AdmissionScheduler, CommandEngine, RenderOrchestrator, WorkspaceStore},
    config,
    infra::{
        http::{self, AppState},
        telemetry,
    },
};

#[derive(Debug, Error)]
enum StartupError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::LoadError),
    #[error(transparent)]
    Telemetry(#[from] telemetry::TelemetryError),
    #[error("failed to initialise workspace root: {0}")]
    Workspace(std::io::Error),
    #[error("failed to bind listener: {0}")]
    Bind(std::io::Error),
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_startup_error(&error);
        process::exit(1);
    }
}

fn report_startup_error(error: &StartupError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), StartupError> {
    let (_cli, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let workspaces =
        WorkspaceStore::new(settings.workspace.root.clone()).map_err(StartupError::Workspace)?;
    let engine = Arc::new(CommandEngine::new(settings.engine.command.clone()));
    let scheduler = Arc::new(AdmissionScheduler::new(
        engine,
        settings.engine.concurrency,
        settings.engine.queue_capacity,
    ));
    let orchestrator = Arc::new(RenderOrchestrator::new(
        workspaces,
        scheduler,
        settings.engine.render_deadline,
    ));

    let router = http::build_router(
        AppState { orchestrator },
        settings.server.max_request_bytes as usize,
    );

    let listener = tokio::net::TcpListener::bind(settings.server.listen_addr)
        .await
        .map_err(StartupError::Bind)?;

    info!(
        target = "stampa::serve",
        addr = %settings.server.listen_addr,
        engine = %settings.engine.command.display(),
        concurrency = settings.engine.concurrency.get(),
        queue_capacity = settings.engine.queue_capacity,
        "stampa render service listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(StartupError::Serve)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!(target = "stampa::serve", "shutdown signal received");
}
