use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use deck_core::{dispatcher::HttpCommandTransport, polling::HttpStatusSource, ActionRouter};
use shared::{
    error::ProtocolError,
    protocol::{decode_event, encode_feedback, Feedback},
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::broadcast::{self, error::RecvError},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::load_settings;

/// How long feedback already queued is given to reach stdout after input ends.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Bridges device events (JSON lines on stdin) to a Moonraker printer
/// controller and writes button feedback as JSON lines on stdout.
#[derive(Parser, Debug)]
#[command(name = "deck-bridge", version)]
struct Args {
    /// Settings file; defaults to ./bridge.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the configured tracing filter, e.g. "deck_core=debug".
    #[arg(long)]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(filter) = args.log_filter {
        settings.log_filter = filter;
    }

    let filter =
        EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let http = reqwest::Client::builder()
        .user_agent(settings.user_agent.clone())
        .build()
        .context("failed to build http client")?;
    let router = ActionRouter::new_with_dependencies(
        Arc::new(HttpCommandTransport::new(http.clone())),
        Arc::new(HttpStatusSource::new(http)),
        settings.feedback_capacity,
    );

    let writer = tokio::spawn(forward_feedback(
        router.subscribe_feedback(),
        tokio::io::stdout(),
    ));
    info!(feedback_capacity = settings.feedback_capacity, "bridge ready");

    run_events(&router, BufReader::new(tokio::io::stdin())).await?;

    info!("input closed; shutting down");
    router.shutdown().await;
    drop(router);
    if tokio::time::timeout(SHUTDOWN_GRACE, writer).await.is_err() {
        warn!("feedback writer did not finish before shutdown");
    }
    Ok(())
}

/// Feeds every event line to the router in arrival order until EOF.
async fn run_events<R>(router: &ActionRouter, reader: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines
        .next_line()
        .await
        .context("failed to read event stream")?
    {
        match decode_event(&line) {
            Ok(event) => router.handle(event).await,
            Err(ProtocolError::Empty) => {}
            Err(error) => warn!(%error, "ignoring malformed event"),
        }
    }
    Ok(())
}

async fn forward_feedback<W>(mut feedback: broadcast::Receiver<Feedback>, mut out: W)
where
    W: AsyncWrite + Unpin,
{
    loop {
        let item = match feedback.recv().await {
            Ok(item) => item,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "feedback writer lagged; messages dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let line = match encode_feedback(&item) {
            Ok(line) => line,
            Err(error) => {
                error!(instance_id = %item.instance_id(), %error, "failed to encode feedback");
                continue;
            }
        };
        if let Err(error) = write_line(&mut out, &line).await {
            error!(%error, "failed to write feedback; stopping writer");
            break;
        }
    }
}

async fn write_line<W>(out: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(line.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}
