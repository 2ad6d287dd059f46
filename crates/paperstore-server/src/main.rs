mod error;
mod routes;
mod state;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use paperstore::config::load_config_or_default;
use paperstore::error::{ConfigError, PaperstoreError};

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "paperstore", version, about = "Personal research paper library")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default).
    Serve,
    /// Authorize Google Drive access from the terminal.
    AuthorizeDrive,
    /// Import every PDF under a directory.
    Import { dir: PathBuf },
}

fn init_logging(format: LogFormat) {
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to bridge log records: {}", e);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
        LogFormat::Pretty => {
            tracing::subscriber::set_global_default(builder.with_target(false).finish())
        }
    };
    if let Err(e) = result {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "paperstore failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), PaperstoreError> {
    let config = load_config_or_default(cli.config.as_deref())?;
    let state = AppState::build(&config)?;

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            serve(
                &state,
                &config.server.listen_addr,
                config.server.cors_allow_any_origin,
            )
            .await
        }
        Command::AuthorizeDrive => authorize_drive(&state).await,
        Command::Import { dir } => import(&state, &dir).await,
    };

    state.worker.shutdown();
    result
}

async fn serve(state: &AppState, listen_addr: &str, cors: bool) -> Result<(), PaperstoreError> {
    match state.supervisor.resume() {
        Ok(0) => {}
        Ok(jobs) => tracing::info!(jobs, "Resuming batch jobs from a previous run"),
        Err(e) => tracing::warn!(error = %e, "Failed to resume batch jobs"),
    }

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = %listen_addr, "Listening");

    let app = routes::router(state.clone(), cors);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.supervisor.stop();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "Failed to capture Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to capture SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = sigterm => tracing::info!("Received SIGTERM, shutting down"),
    }
}

async fn authorize_drive(state: &AppState) -> Result<(), PaperstoreError> {
    let Some(provider) = state.drive_auth.as_ref() else {
        return Err(PaperstoreError::Config(ConfigError::Validation {
            message: "storage.backend must be 'drive' to authorize Drive access".to_string(),
        }));
    };

    provider
        .authorize_interactive(|code| {
            let url = code
                .verification_uri_complete
                .as_deref()
                .unwrap_or(&code.verification_uri);
            println!("Open {} and enter the code {}", url, code.user_code);
            println!("Waiting for approval...");
        })
        .await?;
    println!("Drive access granted.");
    Ok(())
}

async fn import(state: &AppState, dir: &std::path::Path) -> Result<(), PaperstoreError> {
    let report = state.ingest.import_directory(dir).await?;
    println!(
        "Imported {}, duplicates {}, failed {}",
        report.imported.len(),
        report.duplicates.len(),
        report.failed.len()
    );
    for (path, reason) in &report.failed {
        println!("  {}: {}", path.display(), reason);
    }
    Ok(())
}
