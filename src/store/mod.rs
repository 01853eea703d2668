use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Result};
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

use crate::error::StoreOpenError;

pub mod helpers;
mod migrations;
pub mod models;
pub mod repositories;

pub use migrations::SCHEMA_VERSION;
pub use repositories::{MetadataStore, SegmentStore, VisitStore};

use migrations::run_migrations;

/// Which record collection a store holds. Selects the on-disk file name, the
/// worker thread name, and the migration set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Visits,
    Metadata,
    Segments,
}

impl StoreKind {
    pub fn file_name(self) -> &'static str {
        match self {
            StoreKind::Visits => "visits.sqlite3",
            StoreKind::Metadata => "website-metadata.sqlite3",
            StoreKind::Segments => "time-segments.sqlite3",
        }
    }

    fn thread_name(self) -> &'static str {
        match self {
            StoreKind::Visits => "tidemark-visits",
            StoreKind::Metadata => "tidemark-metadata",
            StoreKind::Segments => "tidemark-segments",
        }
    }
}

type StoreTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum StoreCommand {
    Execute(StoreTask),
    Shutdown,
}

struct StoreInner {
    sender: mpsc::Sender<StoreCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(StoreCommand::Shutdown) {
                error!("Failed to send shutdown to store thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join store thread: {join_err:?}");
            }
        }
    }
}

/// Handle to one record collection backed by a SQLite file.
///
/// All access runs on a dedicated worker thread; the single thread serializes
/// every read and write, so the last committed write to a key wins. Dropping
/// the final clone shuts the worker down and joins it.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
    path: Arc<PathBuf>,
    kind: StoreKind,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Store {
    /// Opens (or creates) the store file, applies pragmas, and brings the
    /// schema up to [`SCHEMA_VERSION`] before returning. Does not return a
    /// handle for a store that is not fully ready.
    pub fn open(path: PathBuf, kind: StoreKind) -> Result<Self, StoreOpenError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let (command_tx, command_rx) = mpsc::channel::<StoreCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), StoreOpenError>>();
        let path_for_thread = path.clone();

        let worker = thread::Builder::new()
            .name(kind.thread_name().into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(StoreOpenError::from(err)));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    error!("Failed to enable foreign keys: {err}");
                }

                if let Err(err) = run_migrations(&mut conn, kind) {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
                if ready_tx.send(Ok(())).is_err() {
                    error!("Store open receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        StoreCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        StoreCommand::Shutdown => break,
                    }
                }

                info!("{kind:?} store worker shutting down");
            })?;

        ready_rx
            .recv()
            .map_err(|_| StoreOpenError::Worker("worker exited before signaling readiness".into()))??;

        info!("{kind:?} store opened at {}", path.display());

        Ok(Self {
            inner: Arc::new(StoreInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            path: Arc::new(path),
            kind,
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    /// Ships `task` to the worker thread and awaits its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = StoreCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("Store caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to store thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("store thread terminated unexpectedly"))?
    }
}

/// The three opened collections. Handed out only by the readiness gate and
/// cheap to clone; dropping the last bundle clone closes the stores.
#[derive(Clone)]
pub struct StoreBundle {
    pub visits: VisitStore,
    pub metadata: MetadataStore,
    pub segments: SegmentStore,
}

impl std::fmt::Debug for StoreBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreBundle").finish_non_exhaustive()
    }
}

impl StoreBundle {
    /// Opens all three collections under `data_dir`. Any single failure fails
    /// the bundle as a whole.
    pub fn open(data_dir: &Path) -> Result<Self, StoreOpenError> {
        Ok(Self {
            visits: VisitStore::open(data_dir.join(StoreKind::Visits.file_name()))?,
            metadata: MetadataStore::open(data_dir.join(StoreKind::Metadata.file_name()))?,
            segments: SegmentStore::open(data_dir.join(StoreKind::Segments.file_name()))?,
        })
    }
}
