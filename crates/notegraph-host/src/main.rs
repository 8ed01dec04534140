use anyhow::Result;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, mpsc};

use notegraph_host::bridge::Bridge;
use notegraph_host::config::ConfigStore;
use notegraph_host::provider::{LogEditorHost, MemProvider};
use notegraph_host::server;

fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

fn runtime_sock_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        format!("{dir}/notegraph.sock")
    } else {
        "/tmp/notegraph.sock".to_string()
    }
}

/// The config record lives next to the host binary unless overridden.
fn default_config_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|d| d.join("graph_config.json")))
        .unwrap_or_else(|| PathBuf::from("graph_config.json"))
}

struct Args {
    collection: Option<PathBuf>,
    config: PathBuf,
    sock: String,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        collection: None,
        config: default_config_path(),
        sock: runtime_sock_path(),
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--collection" => {
                args.collection = Some(PathBuf::from(
                    iter.next()
                        .ok_or_else(|| anyhow::anyhow!("--collection needs a path"))?,
                ));
            }
            "--config" => {
                args.config = PathBuf::from(
                    iter.next()
                        .ok_or_else(|| anyhow::anyhow!("--config needs a path"))?,
                );
            }
            "--sock" => {
                args.sock = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--sock needs a path"))?;
            }
            other => anyhow::bail!("unknown argument `{other}`"),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = parse_args()?;

    let store = ConfigStore::load(&args.config);

    let (provider, changes_rx) = match &args.collection {
        Some(path) => {
            let mut provider = MemProvider::load_json(path)?;
            tracing::info!(
                collection = %path.display(),
                notes = provider.note_count(),
                "collection loaded"
            );
            let rx = provider.subscribe();
            (Some(Arc::new(RwLock::new(provider))), rx)
        }
        None => {
            tracing::warn!("no collection given; serving missing_tools_config until one appears");
            // Keep the channel shape; nothing will ever arrive.
            let (_tx, rx) = mpsc::unbounded_channel();
            (None, rx)
        }
    };

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (broadcast_tx, _) = broadcast::channel(256);

    let bridge = Bridge::new(store, provider, Arc::new(LogEditorHost), outbound_tx);
    tokio::spawn(bridge.run(inbound_rx, changes_rx));

    // Fan the bridge's hook stream out to every connected viewer.
    let fanout = broadcast_tx.clone();
    tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let _ = fanout.send(msg);
        }
    });

    server::run(&args.sock, broadcast_tx, inbound_tx).await
}
