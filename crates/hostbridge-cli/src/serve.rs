//! stdio MCP server loop
//!
//! Reads one JSON-RPC message per stdin line. Every request runs in its own
//! task so a slow host command never blocks the others; responses funnel
//! through a channel into a single stdout writer.

use hostbridge_core::{CommandGateway, McpServer};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Serve MCP over stdin/stdout until stdin closes
pub async fn run_stdio_server(gateway: Arc<CommandGateway>) -> Result<(), String> {
    let server = Arc::new(McpServer::new(gateway.clone()));
    let (responses, mut outgoing) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = outgoing.recv().await {
            if let Err(e) = stdout.write_all(line.as_bytes()).await {
                tracing::error!("Failed to write to stdout: {}", e);
                break;
            }
            if let Err(e) = stdout.write_all(b"\n").await {
                tracing::error!("Failed to write newline to stdout: {}", e);
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    tracing::info!("MCP server ready on stdio");
    let mut stdin_reader = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight = Vec::new();
    let mut failure = None;

    loop {
        match stdin_reader.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let server = server.clone();
                let responses = responses.clone();
                in_flight.retain(|task: &tokio::task::JoinHandle<()>| !task.is_finished());
                in_flight.push(tokio::spawn(async move {
                    if let Some(response) = server.handle_line(&line).await {
                        let _ = responses.send(response);
                    }
                }));
            }
            Ok(None) => {
                tracing::info!("stdin closed");
                break;
            }
            Err(e) => {
                tracing::error!("Error reading stdin: {}", e);
                failure = Some(format!("Error reading stdin: {e}"));
                break;
            }
        }
    }

    // Let requests already accepted finish and be written out
    for task in in_flight {
        if let Err(e) = task.await {
            tracing::error!("Request task failed: {}", e);
        }
    }
    drop(responses);
    if let Err(e) = writer.await {
        tracing::error!("stdout writer failed: {}", e);
    }

    gateway.disconnect().await;
    failure.map_or(Ok(()), Err)
}
