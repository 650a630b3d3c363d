use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{debug, error, info, warn};
use verso_core::app::Verso;
use verso_core::protocol::{HostRequest, HostResponse};

pub async fn handle_serve(app: &Arc<Verso>) -> bool {
    if let Err(e) = app.initialize().await {
        error!("Initialization failed: {}", e);
        eprintln!("{}", e);
        return false;
    }
    info!("Serving requests on stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let ok = loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = &mut shutdown => break true,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break true,
            Err(e) => {
                error!("Failed to read request: {}", e);
                break false;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<HostRequest>(&line) {
            Ok(request) => {
                debug!("Request: {:?}", request);
                app.handle(request).await
            }
            Err(e) => {
                warn!("Malformed request: {}", e);
                HostResponse::error(format!("invalid request: {e}"))
            }
        };
        if let Err(e) = write_response(&mut stdout, &response).await {
            error!("Failed to write response: {}", e);
            break false;
        }
    };

    app.shutdown();
    info!("Stopped serving");
    ok
}

async fn write_response(
    stdout: &mut tokio::io::Stdout,
    response: &HostResponse,
) -> std::io::Result<()> {
    let mut json = serde_json::to_string(response)?;
    json.push('\n');
    stdout.write_all(json.as_bytes()).await?;
    stdout.flush().await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
