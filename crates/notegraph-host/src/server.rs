//! Unix-socket server: length-delimited JSON frames, one `Msg` per frame.
//! Outbound hook calls are broadcast so multiple viewers can subscribe.

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use notegraph_core::Msg;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::bridge::Inbound;

pub async fn run(
    sock_path: &str,
    outbound: broadcast::Sender<Msg>,
    inbound: mpsc::UnboundedSender<Inbound>,
) -> Result<()> {
    // Clean stale socket
    let _ = std::fs::remove_file(sock_path);
    let listener = UnixListener::bind(sock_path)?;
    tracing::info!(sock_path, "notegraph-host listening");

    loop {
        let (stream, _addr) = listener.accept().await?;
        tracing::info!("viewer connected");
        let rx = outbound.subscribe();
        let inbound = inbound.clone();
        tokio::spawn(async move {
            if let Err(e) = serve(stream, rx, inbound).await {
                tracing::debug!(error = %e, "viewer connection closed");
            }
        });
    }
}

async fn serve(
    stream: UnixStream,
    mut outbound: broadcast::Receiver<Msg>,
    inbound: mpsc::UnboundedSender<Inbound>,
) -> Result<()> {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());

    let hello = Msg::Hello {
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    framed.send(serde_json::to_vec(&hello)?.into()).await?;

    loop {
        tokio::select! {
            frame = framed.next() => {
                let Some(frame) = frame else { break };
                let bytes = frame?;
                match serde_json::from_slice::<Msg>(&bytes) {
                    Ok(Msg::Command { line }) => {
                        let _ = inbound.send(Inbound::Command(line));
                    }
                    Ok(Msg::RequestGraph) => {
                        let _ = inbound.send(Inbound::RequestGraph);
                    }
                    Ok(Msg::Ping) => {
                        framed.send(serde_json::to_vec(&Msg::Pong)?.into()).await?;
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "undecodable frame"),
                }
            }
            out = outbound.recv() => match out {
                Ok(msg) => framed.send(serde_json::to_vec(&msg)?.into()).await?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "viewer lagging behind hook stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    tracing::info!("viewer disconnected");
    Ok(())
}
