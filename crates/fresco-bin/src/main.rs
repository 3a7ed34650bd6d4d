//! Fresco entrypoint.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Once;

use anyhow::Result;
use clap::Parser;
use core_config::load_from;
use core_server::Server;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// CLI arguments. The server needs none; both flags are overrides.
#[derive(Parser, Debug)]
#[command(name = "fresco", version, about = "Collaborative canvas server")]
struct Args {
    /// Optional configuration file path (overrides discovery of `fresco.toml`).
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// Optional persistence document path (overrides the configured one).
    #[arg(long = "doc")]
    doc: Option<PathBuf>,
}

fn configure_logging() -> Option<WorkerGuard> {
    let log_dir = Path::new(".");
    let log_path = log_dir.join("fresco.log");
    if log_path.exists() {
        let _ = std::fs::remove_file(&log_path);
    }

    let file_appender = tracing_appender::rolling::never(log_dir, "fresco.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .try_init()
    {
        Ok(_) => Some(guard),
        Err(_) => {
            // Global subscriber already installed; drop the guard so the
            // writer shuts down.
            None
        }
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

fn main() -> Result<()> {
    let _log_guard = configure_logging();
    install_panic_hook();
    info!(target: "runtime", "startup");

    let args = Args::parse();
    let config = load_from(args.config.clone())?;
    let doc_path = args
        .doc
        .clone()
        .unwrap_or_else(|| config.document_path().clone());
    let interval = config.autosave_interval();
    info!(
        target: "runtime.startup",
        doc = %doc_path.display(),
        tcp_port = config.tcp_port(),
        bind = config.bind_addr(),
        config_override = args.config.is_some(),
        "bootstrap"
    );

    let (save_tx, save_rx) = crossbeam_channel::bounded(4);
    let server = Arc::new(Server::new(config, save_tx));

    match core_persist::load(server.registry(), &doc_path) {
        Ok(canvases) => {
            info!(target: "runtime.startup", canvases, "document loaded")
        }
        Err(e) => {
            warn!(target: "runtime.startup", error = %e, "document load failed; starting empty")
        }
    }

    let _save_loop = core_persist::spawn_save_loop(
        Arc::clone(server.registry()),
        doc_path,
        interval,
        save_rx,
    )?;

    // Blocks for the life of the process; only a bind failure returns.
    server.run()
}
