use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::{Connection, OpenFlags};
use tokio::sync::oneshot;

mod migrations;

pub mod helpers;
pub mod models;
mod repositories;

use migrations::run_migrations;

pub use models::{Reading, RetentionTier};
pub use repositories::readings::CompactionStats;

/// Read-only connections opened alongside the writer. Scans and window
/// queries are dispatched here so they never queue behind appends or a
/// running compaction pass.
const READ_POOL_SIZE: usize = 2;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type WriteTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;
type ReadTask = Box<dyn FnOnce(&Connection) + Send + 'static>;

enum WriteCommand {
    Execute(WriteTask),
    Shutdown,
}

enum ReadCommand {
    Execute(ReadTask),
    Shutdown,
}

struct DatabaseInner {
    write_tx: mpsc::Sender<WriteCommand>,
    read_tx: mpsc::Sender<ReadCommand>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.workers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if guard.is_empty() {
            return;
        }

        if let Err(err) = self.write_tx.send(WriteCommand::Shutdown) {
            error!("Failed to send shutdown to writer thread: {err}");
        }
        for _ in 0..READ_POOL_SIZE {
            if let Err(err) = self.read_tx.send(ReadCommand::Shutdown) {
                error!("Failed to send shutdown to reader thread: {err}");
                break;
            }
        }

        for handle in guard.drain(..) {
            if let Err(join_err) = handle.join() {
                error!("Failed to join database thread: {join_err:?}");
            }
        }
    }
}

/// Handle to the durable reading set.
///
/// One writer thread owns the sole writable connection; every append and
/// every compaction pass runs there in FIFO order, so a device's writes
/// are never reordered or dropped and compaction's read-modify-write
/// cannot race another mutation. A small pool of read-only connections
/// serves scans concurrently; with WAL journaling each read statement
/// observes a consistent snapshot, so a scan sees a compaction pass
/// either entirely applied or not at all.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (write_tx, write_rx) = mpsc::channel::<WriteCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_writer = db_path.clone();

        let mut workers = Vec::with_capacity(READ_POOL_SIZE + 1);

        let writer = thread::Builder::new()
            .name("soilstore-writer".into())
            .spawn(move || {
                let mut conn = match open_writer(&path_for_writer) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = write_rx.recv() {
                    match command {
                        WriteCommand::Execute(task) => task(&mut conn),
                        WriteCommand::Shutdown => break,
                    }
                }

                info!("Writer thread shutting down");
            })
            .context("failed to spawn writer thread")?;
        workers.push(writer);

        ready_rx
            .recv()
            .context("writer thread exited before signaling readiness")??;

        // Readers open after migrations so the schema is in place. Each
        // connection is owned by exactly one thread for its lifetime.
        let (read_tx, read_rx) = mpsc::channel::<ReadCommand>();
        let shared_rx = Arc::new(Mutex::new(read_rx));
        for index in 0..READ_POOL_SIZE {
            let conn = open_reader(&db_path)
                .with_context(|| format!("failed to open reader connection {index}"))?;
            let rx = Arc::clone(&shared_rx);
            let reader = thread::Builder::new()
                .name(format!("soilstore-reader-{index}"))
                .spawn(move || reader_loop(conn, rx))
                .context("failed to spawn reader thread")?;
            workers.push(reader);
        }

        info!("Database initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                write_tx,
                read_tx,
                workers: Mutex::new(workers),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    /// Run a mutating task on the writer thread. Resolves once the task
    /// has committed, so an acknowledged write is durable.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = WriteCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            // A send failure means the caller went away; nothing to do.
            let _ = reply_tx.send(result);
        }));

        self.inner
            .write_tx
            .send(command)
            .map_err(|err| anyhow!("failed to send command to writer thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("writer thread terminated unexpectedly"))?
    }

    /// Run a read-only task on the next free reader connection.
    pub async fn execute_read<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = ReadCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            let _ = reply_tx.send(result);
        }));

        self.inner
            .read_tx
            .send(command)
            .map_err(|err| anyhow!("failed to send command to reader pool: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("reader thread terminated unexpectedly"))?
    }
}

fn open_writer(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).context("failed to open SQLite database")?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .context("failed to enable WAL mode")?;
    // NORMAL would let a power loss drop an acknowledged append.
    conn.pragma_update(None, "synchronous", "FULL")
        .context("failed to set synchronous mode")?;
    if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
        error!("Failed to enable foreign keys: {err}");
    }
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;

    Ok(conn)
}

fn open_reader(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI,
    )
    .context("failed to open read-only connection")?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;
    Ok(conn)
}

fn reader_loop(conn: Connection, rx: Arc<Mutex<mpsc::Receiver<ReadCommand>>>) {
    loop {
        // Hold the lock only while waiting; release it before running the
        // task so the other readers keep draining the queue.
        let command = {
            let guard = match rx.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.recv()
        };

        match command {
            Ok(ReadCommand::Execute(task)) => task(&conn),
            Ok(ReadCommand::Shutdown) | Err(_) => break,
        }
    }

    info!("Reader thread shutting down");
}
