use crate::net::Incoming;
use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use futures_util::{SinkExt, StreamExt};
use notegraph_core::Msg;
use std::time::Duration;
use tokio::net::UnixStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Socket I/O runs on its own thread with its own runtime; the UI side talks
/// to it through a pair of crossbeam channels. Reconnects with backoff so the
/// viewer can outlive host restarts.
pub fn spawn_io(sock_path: String, tx: Sender<Incoming>, commands: Receiver<String>) {
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
        rt.block_on(async move {
            loop {
                if let Err(e) = run(&sock_path, &tx, &commands).await {
                    let _ = tx.send(Incoming::error(sock_path.clone(), format!("{e:?}")));
                }
                if tx.send(Incoming::disconnected(sock_path.clone())).is_err() {
                    return; // UI gone
                }
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        });
    });
}

async fn run(sock_path: &str, tx: &Sender<Incoming>, commands: &Receiver<String>) -> Result<()> {
    let stream = UnixStream::connect(sock_path)
        .await
        .with_context(|| format!("connect UDS {sock_path}"))?;

    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());

    let _ = tx.send(Incoming::connected(sock_path.to_string()));

    let hello = Msg::Hello {
        version: env!("CARGO_PKG_VERSION").into(),
    };
    framed.send(serde_json::to_vec(&hello)?.into()).await?;
    framed
        .send(serde_json::to_vec(&Msg::RequestGraph)?.into())
        .await?;

    // Outgoing commands are pumped on a short interval; the UI thread never
    // blocks on the socket.
    let mut pump = tokio::time::interval(Duration::from_millis(25));

    loop {
        tokio::select! {
            frame = framed.next() => {
                let Some(frame) = frame else { break };
                let bytes = frame?;
                match serde_json::from_slice::<Msg>(&bytes) {
                    Ok(Msg::Hook { hook, payload }) => {
                        let _ = tx.send(Incoming::hook(sock_path.to_string(), hook, payload));
                    }
                    Ok(Msg::Ping) => {
                        framed.send(serde_json::to_vec(&Msg::Pong)?.into()).await?;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = tx.send(Incoming::error(
                            sock_path.to_string(),
                            format!("decode error: {e}"),
                        ));
                    }
                }
            }
            _ = pump.tick() => {
                while let Ok(line) = commands.try_recv() {
                    let msg = Msg::Command { line };
                    framed.send(serde_json::to_vec(&msg)?.into()).await?;
                }
            }
        }
    }

    Ok(())
}
