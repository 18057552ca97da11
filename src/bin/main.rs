//! Headless peer node.
//!
//! Serves the document over TCP, optionally joins an existing peer, and
//! relays everything it hears. No interactive editing surface: front-ends
//! embed the library directly; this binary exists to seed and bridge
//! sessions (and to host a document from a file).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;

use tandem::config::{resolve_color, PeerConfig};
use tandem::replica::{PeerListener, Replica, ReplicaEvent};
use tandem::users::UserRegistry;
use tandem::{telemetry, Document, NodeId};

#[derive(Parser, Debug)]
#[command(name = "tandem", about = "Decentralized collaborative text editing peer")]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = tandem::config::DEFAULT_PORT)]
    port: u16,

    /// Node id (0 picks a random one).
    #[arg(long, default_value_t = 0)]
    node: u64,

    /// Address of a peer to join (host:port).
    #[arg(long)]
    join: Option<String>,

    /// Text file to load at startup and save on shutdown.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Display name for presence.
    #[arg(long)]
    user: Option<String>,

    /// Presence color (blue, green, red, yellow, cyan, magenta).
    #[arg(long, default_value = tandem::config::DEFAULT_COLOR)]
    color: String,

    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);

    if let Err(err) = run(cli) {
        tracing::error!("fatal: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> tandem::Result<()> {
    let mut config = PeerConfig {
        port: cli.port,
        node_id: NodeId(cli.node),
        join: cli.join,
        file: cli.file,
        user_name: cli.user,
        color: cli.color,
    };
    config.apply_env_overrides()?;

    let node_id = config.resolved_node_id();
    let document = load_document(config.file.as_deref(), node_id);

    let replica = Replica::with_document(document, node_id);
    replica.set_presence(
        Some(config.display_name(node_id)),
        Some(resolve_color(&config.color).to_string()),
    );

    let listener = PeerListener::bind(&config.listen_addr(), replica.clone())?;
    let handle = listener.start()?;
    tracing::info!(addr = %handle.local_addr(), node = %node_id, "listening for peers");

    if let Some(join_addr) = &config.join {
        match replica.join(join_addr) {
            Ok(addr) => tracing::info!(%addr, "joined peer"),
            Err(err) => tracing::warn!(addr = %join_addr, error = %err, "join failed"),
        }
    }

    spawn_event_logger(&replica);

    wait_for_shutdown();
    tracing::info!("shutting down");

    handle.shutdown();
    replica.shutdown();

    if let Some(path) = &config.file {
        match std::fs::write(path, replica.text()) {
            Ok(()) => tracing::info!(path = %path.display(), "document saved"),
            Err(err) => tracing::error!(path = %path.display(), error = %err, "document save failed"),
        }
    }
    Ok(())
}

fn load_document(path: Option<&std::path::Path>, node_id: NodeId) -> Document {
    let Some(path) = path else {
        return Document::new();
    };
    match std::fs::read_to_string(path) {
        Ok(text) => {
            tracing::info!(path = %path.display(), "document loaded");
            Document::from_text(&text, node_id)
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "load failed; starting empty");
            Document::new()
        }
    }
}

/// Log replica traffic and keep the collaborator roster warm.
fn spawn_event_logger(replica: &Replica) {
    let users = UserRegistry::new();
    replica.add_listener(move |event| match event {
        ReplicaEvent::OperationApplied { operation } => {
            tracing::debug!(user = %operation.user_id(), clock = operation.clock(), "operation applied");
        }
        ReplicaEvent::DocumentReplaced { user_id } => {
            tracing::info!(user = %user_id, "document synced from peer");
        }
        ReplicaEvent::CursorMoved { cursor } => {
            let user = users.observe(
                cursor.user_id,
                cursor.user_name.as_deref(),
                cursor.color.as_deref(),
            );
            tracing::debug!(user = %user.name, "cursor moved");
        }
        ReplicaEvent::SelectionChanged { selection } => {
            users.observe(
                selection.user_id,
                selection.user_name.as_deref(),
                selection.color.as_deref(),
            );
        }
        ReplicaEvent::PeerConnected { addr } => {
            tracing::info!(%addr, "peer connected");
        }
        ReplicaEvent::PeerDisconnected { addr } => {
            tracing::info!(%addr, "peer disconnected");
        }
    });
}

/// Block until SIGINT/SIGTERM.
fn wait_for_shutdown() {
    let shutdown = Arc::new(AtomicBool::new(false));
    let _ = signal_hook::flag::register(signal_hook::consts::SIGTERM, shutdown.clone());
    let _ = signal_hook::flag::register(signal_hook::consts::SIGINT, shutdown.clone());

    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }
}
