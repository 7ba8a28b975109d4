use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notigate_gateway::protocol::{self, Reply};
use notigate_gateway::{GatewayConfig, NotificationGateway};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    // stdout carries the protocol, so logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notigate_gateway=debug,notigate_authority=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // --- Configuration ---
    let config = GatewayConfig::from_env().expect("Invalid gateway configuration");
    tracing::info!(
        authority = %config.authority.base_url,
        pool_size = config.authority.pool_size,
        encoding = ?config.key_encoding,
        legacy_parse = config.legacy_parse,
        "Loaded gateway configuration"
    );

    // --- Authority session pool ---
    let gateway =
        NotificationGateway::connect(&config).expect("Failed to create authority session pool");
    if config.warm_up {
        gateway.queue().warm_up().await;
    }

    // --- Shutdown ---
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    // --- Command loop ---
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_replies(reply_rx));
    let tracker = TaskTracker::new();

    tracing::info!("Gateway ready, reading commands from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::info!("Input closed, shutting down");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read command");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match protocol::parse_line(&line) {
            Ok(envelope) => {
                let gateway = gateway.clone();
                let reply_tx = reply_tx.clone();
                tracker.spawn(async move {
                    let reply = protocol::handle(&gateway, envelope).await;
                    let _ = reply_tx.send(reply);
                });
            }
            Err(e) => {
                tracing::debug!(error = %e, "Malformed command line");
                let _ = reply_tx.send(Reply::malformed(&e));
            }
        }
    }

    // --- Drain ---
    tracker.close();
    tracing::info!(pending = tracker.len(), "Waiting for in-flight commands");
    tracker.wait().await;
    drop(reply_tx);
    if let Err(e) = writer.await {
        tracing::error!(error = %e, "Reply writer failed");
    }

    tracing::info!("Gateway stopped");
}

/// Write replies to stdout, one JSON document per line.
async fn write_replies(mut replies: mpsc::UnboundedReceiver<Reply>) {
    let mut stdout = tokio::io::stdout();
    while let Some(reply) = replies.recv().await {
        let mut line = match serde_json::to_vec(&reply) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize reply");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = stdout.write_all(&line).await {
            tracing::error!(error = %e, "Failed to write reply, stopping output");
            break;
        }
        let _ = stdout.flush().await;
    }
}

/// Wait for SIGINT or (on Unix) SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
