use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

pub mod helpers;
mod migrations;
mod repositories;

use migrations::run_migrations;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Message {
    Run(Job),
    Close,
}

enum Source {
    File(PathBuf),
    Memory,
}

impl Source {
    fn open(&self) -> Result<Connection> {
        let conn = match self {
            Source::File(path) => Connection::open(path)
                .with_context(|| format!("failed to open SQLite database {}", path.display()))?,
            Source::Memory => {
                Connection::open_in_memory().context("failed to open in-memory SQLite database")?
            }
        };
        Ok(conn)
    }
}

/// Owns the connection thread. Dropping the last handle closes the queue and
/// waits for queued jobs to drain.
struct Worker {
    queue: mpsc::Sender<Message>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        if self.queue.send(Message::Close).is_err() {
            warn!("DB thread already gone at shutdown");
        }
        if let Err(err) = thread.join() {
            error!("DB thread panicked: {err:?}");
        }
    }
}

/// SQLite handle for the app. Statements run on a single thread; async
/// callers ship closures to it and await the reply.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    location: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let database = Self::start(Source::File(db_path.clone()), db_path)?;
        info!("Database ready at {}", database.path().display());
        Ok(database)
    }

    /// Private in-memory database, discarded with the last handle.
    pub fn open_in_memory() -> Result<Self> {
        Self::start(Source::Memory, PathBuf::from(":memory:"))
    }

    fn start(source: Source, location: PathBuf) -> Result<Self> {
        let (queue, inbox) = mpsc::channel::<Message>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        let thread = thread::Builder::new()
            .name("limber-db".into())
            .spawn(move || {
                let mut conn = match prepare(&source) {
                    Ok(conn) => {
                        let _ = ready_tx.send(Ok(()));
                        conn
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                serve(&mut conn, inbox);
            })
            .context("failed to spawn database thread")?;

        ready_rx
            .recv()
            .context("database thread exited during startup")??;

        Ok(Self {
            worker: Arc::new(Worker {
                queue,
                thread: Some(thread),
            }),
            location: Arc::new(location),
        })
    }

    pub fn path(&self) -> &Path {
        self.location.as_path()
    }

    /// Run `job` on the database thread.
    pub async fn execute<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let wrapped: Job = Box::new(move |conn| {
            // The caller may have given up waiting.
            let _ = reply_tx.send(job(conn));
        });

        self.worker
            .queue
            .send(Message::Run(wrapped))
            .map_err(|_| anyhow!("database thread is not running"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread dropped the request"))?
    }
}

fn prepare(source: &Source) -> Result<Connection> {
    let mut conn = source.open()?;
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("WAL journal mode unavailable: {err}");
    }
    run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}

fn serve(conn: &mut Connection, inbox: mpsc::Receiver<Message>) {
    for message in inbox {
        match message {
            Message::Run(job) => job(conn),
            Message::Close => break,
        }
    }
    info!("Database thread stopped");
}
