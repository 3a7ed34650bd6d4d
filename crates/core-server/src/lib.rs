//! The server value and its reliable acceptor.
//!
//! `Server` owns everything the protocol needs (the room registry, the
//! brush catalog, the configuration, and the save-nudge channel) and is
//! shared by reference into the acceptor, every session thread, and, via
//! the registry, the persistence loop. Nothing here is a process global.

use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use anyhow::{Context, Result};
use core_brush::BrushCatalog;
use core_canvas::{ConnId, RoomRegistry};
use core_config::Config;
use core_persist::SaveSignal;
use crossbeam_channel::Sender;
use tracing::{info, warn};

mod session;

pub struct Server {
    registry: Arc<RoomRegistry>,
    brushes: Arc<BrushCatalog>,
    config: Config,
    save_tx: Sender<SaveSignal>,
    next_conn: AtomicU64,
}

impl Server {
    pub fn new(config: Config, save_tx: Sender<SaveSignal>) -> Self {
        Self {
            registry: Arc::new(RoomRegistry::new()),
            brushes: Arc::new(BrushCatalog::standard()),
            config,
            save_tx,
            next_conn: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn brushes(&self) -> &Arc<BrushCatalog> {
        &self.brushes
    }

    pub(crate) fn save_tx(&self) -> &Sender<SaveSignal> {
        &self.save_tx
    }

    /// Bind the reliable port and serve forever. A bind failure is the one
    /// startup error that aborts the process.
    pub fn run(self: Arc<Self>) -> Result<()> {
        let bind = (self.config.bind_addr(), self.config.tcp_port());
        let listener = TcpListener::bind(bind)
            .with_context(|| format!("bind reliable port {}:{}", bind.0, bind.1))?;
        self.serve(listener)
    }

    /// Accept loop over an already-bound listener (tests bind their own).
    pub fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!(
            target: "runtime",
            addr = ?listener.local_addr().ok(),
            "reliable listener up"
        );
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let conn: ConnId = self.next_conn.fetch_add(1, Ordering::Relaxed);
                    let server = Arc::clone(&self);
                    let spawned = thread::Builder::new()
                        .name(format!("session-{conn}"))
                        .spawn(move || session::run_session(server, stream, conn));
                    if let Err(e) = spawned {
                        warn!(target: "runtime", error = %e, "session thread spawn failed");
                    }
                }
                Err(e) => warn!(target: "runtime", error = %e, "accept failed"),
            }
        }
        Ok(())
    }
}
