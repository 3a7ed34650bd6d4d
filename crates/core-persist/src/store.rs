//! The save pass, the startup load, and the dirty-driven save loop.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use core_canvas::RoomRegistry;
use core_pixel::{CANVAS_HEIGHT, CANVAS_WIDTH};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{info, warn};

use crate::document::{CanvasDoc, DOC_VERSION, Document, LayerDoc};
use crate::{PersistError, blob};

/// Well-known document filename in the server's working directory.
pub const DEFAULT_DOCUMENT: &str = "fresco-canvases.json";

/// Wakes the save loop ahead of its next tick (sent on an explicit SAVE).
#[derive(Debug, Clone, Copy)]
pub enum SaveSignal {
    Nudge,
}

/// Assemble the document for every room, reusing cached layer blobs and
/// warming the cache of any dirty layer it encodes.
pub fn build_document(registry: &RoomRegistry) -> Document {
    let mut canvases = Vec::new();
    for room in registry.snapshot() {
        let layers: Vec<LayerDoc> = room
            .encode_drawables_with(blob::encode_layer)
            .into_iter()
            .map(|(index, data)| LayerDoc { index, data })
            .collect();
        canvases.push(CanvasDoc {
            id: room.canvas_id(),
            layer_count: layers.len() as u8,
            layers,
        });
    }
    Document {
        version: DOC_VERSION,
        width: CANVAS_WIDTH as u32,
        height: CANVAS_HEIGHT as u32,
        canvases,
    }
}

/// Unconditionally serialize every room and replace the document on disk,
/// write-then-rename. Room dirty flags are left alone; callers that want
/// the dirty-driven behavior use [`save_if_dirty`].
pub fn write_document(registry: &RoomRegistry, path: &Path) -> Result<(), PersistError> {
    let doc = build_document(registry);
    let text = serde_json::to_string(&doc)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &text)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// The persistence pass: silently return when no room is dirty, otherwise
/// emit the document and mark the written rooms clean. On a write failure
/// every room keeps its dirty flag for the next tick.
pub fn save_if_dirty(registry: &RoomRegistry, path: &Path) -> Result<bool, PersistError> {
    let dirty: Vec<_> = registry
        .snapshot()
        .into_iter()
        .filter(|room| room.is_dirty())
        .collect();
    if dirty.is_empty() {
        return Ok(false);
    }
    write_document(registry, path)?;
    for room in &dirty {
        room.mark_clean();
    }
    Ok(true)
}

/// Recreate rooms from the document, if one exists. Returns the number of
/// canvases loaded; a missing file is an empty start, not an error.
pub fn load(registry: &RoomRegistry, path: &Path) -> Result<usize, PersistError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let doc: Document = serde_json::from_str(&text)?;
    if doc.version != DOC_VERSION {
        return Err(PersistError::Version(doc.version));
    }
    let (src_w, src_h) = (doc.width as usize, doc.height as usize);
    if src_w != CANVAS_WIDTH || src_h != CANVAS_HEIGHT {
        warn!(
            target: "persist",
            stored_w = src_w,
            stored_h = src_h,
            "document dimensions differ from the canvas; layers will be clipped"
        );
    }

    let mut loaded = 0;
    for canvas in doc.canvases {
        let room = registry.get_or_create(canvas.id);
        let mut layers = canvas.layers;
        layers.sort_by_key(|l| l.index);
        let mut entries = Vec::with_capacity(layers.len());
        for layer in layers {
            match blob::decode_layer(&layer.data, src_w, src_h) {
                Ok(decoded) => {
                    let blob = decoded.exact.then_some(layer.data);
                    entries.push((blob, decoded.pixels));
                }
                Err(e) => {
                    warn!(
                        target: "persist",
                        canvas = canvas.id,
                        index = layer.index,
                        error = %e,
                        "skipping undecodable layer"
                    );
                }
            }
        }
        room.load_drawables(entries);
        loaded += 1;
    }
    info!(target: "persist", canvases = loaded, path = %path.display(), "document loaded");
    Ok(loaded)
}

/// Spawn the persistence loop: wake every `interval` or on an explicit
/// nudge, run the dirty-driven save pass, and log (but survive) failures.
/// The loop exits when every nudge sender is gone.
pub fn spawn_save_loop(
    registry: Arc<RoomRegistry>,
    path: PathBuf,
    interval: Duration,
    signals: Receiver<SaveSignal>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new().name("persist".to_string()).spawn(move || {
        info!(
            target: "persist",
            path = %path.display(),
            interval_secs = interval.as_secs(),
            "save loop running"
        );
        loop {
            match signals.recv_timeout(interval) {
                Ok(SaveSignal::Nudge) | Err(RecvTimeoutError::Timeout) => {
                    match save_if_dirty(&registry, &path) {
                        Ok(true) => info!(target: "persist", path = %path.display(), "document saved"),
                        Ok(false) => {}
                        Err(e) => {
                            warn!(target: "persist", error = %e, "save failed; rooms stay dirty")
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    })
}
