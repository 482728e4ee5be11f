//! Outreach sequencer entry point
//!
//! Starts the HTTP API and the periodic tick loop against shared in-memory
//! stores. Delivery credentials are read from the environment before
//! anything binds, so a misconfigured deployment fails fast.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tokio::signal;
use tracing::error;

use sequencer::services::{
    InMemoryEnrollmentStore, InMemorySequenceStore, SendGridConfig, SendGridEmailSender,
    TwilioConfig, TwilioMessageSender,
};
use sequencer::{EngineConfig, SequencerEngine, TickRunner};
use webserver::{web, AppState, WebServerError, WebServerResult};

#[derive(Parser, Debug)]
#[command(name = "webserver")]
#[command(about = "Outreach sequencer API and tick loop")]
struct Args {
    /// Port for the HTTP API
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Seconds between evaluation ticks
    #[arg(long, default_value = "30")]
    tick_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> WebServerResult<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    shared::logging::init_tracing_with_level(Some(&args.log_level));
    shared::logging::log_startup(
        "webserver",
        &format!("outreach sequencer on port {}", args.port),
    );

    // Fail fast on missing delivery credentials
    let email = SendGridEmailSender::new(SendGridConfig::from_env()?);
    let messenger = TwilioMessageSender::new(TwilioConfig::from_env()?);

    let sequences = InMemorySequenceStore::new();
    let enrollments = InMemoryEnrollmentStore::new();

    let engine = SequencerEngine::new(
        email,
        messenger,
        sequences.clone(),
        enrollments.clone(),
        EngineConfig::default(),
    );
    let runner = TickRunner::new(engine);

    let state = AppState::new(Arc::new(sequences), Arc::new(enrollments));
    let router = web::build_router(state);

    let addr: SocketAddr = format!("127.0.0.1:{}", args.port)
        .parse()
        .map_err(|err| WebServerError::config(format!("Invalid port: {err}")))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|_| WebServerError::ServerStartupFailed { port: args.port })?;

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router).await {
            error!(error = %err, "HTTP server stopped");
        }
    });

    let mut interval = tokio::time::interval(Duration::from_secs(args.tick_interval_secs));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(err) = runner.run_tick(Utc::now()).await {
                    error!(error = %err, "Tick aborted: due-fetch failed");
                }
            }
            _ = signal::ctrl_c() => {
                shared::logging::log_shutdown("webserver", "received Ctrl+C");
                break;
            }
        }
    }

    Ok(())
}
