//! Single-worker queue for edits that touch source code.

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use rusqlite::Connection;

use crate::error::{HostError, HostResult};

pub(crate) enum EditJob {
    DeleteWithCode { feature_id: i64, lpq: String },
    /// Reply once every job queued before it has been applied.
    Flush(Sender<()>),
}

/// Jobs run in FIFO order on one worker thread. The thread exits once every
/// clone of the queue is dropped.
#[derive(Clone)]
pub(crate) struct EditQueue {
    sender: Sender<EditJob>,
}

impl EditQueue {
    pub(crate) fn start(conn: Arc<Mutex<Connection>>) -> HostResult<Self> {
        let (sender, receiver) = mpsc::channel::<EditJob>();

        thread::Builder::new()
            .name("feature-lens-edits".into())
            .spawn(move || {
                for job in receiver {
                    match job {
                        EditJob::DeleteWithCode { feature_id, lpq } => {
                            let conn = conn.lock().expect("database lock poisoned");
                            match super::delete_with_code(&conn, feature_id) {
                                Ok(true) => tracing::info!("Dropped {} with its code", lpq),
                                Ok(false) => {
                                    tracing::warn!("{} was gone before its drop ran", lpq)
                                }
                                Err(e) => tracing::error!("Failed to drop {}: {}", lpq, e),
                            }
                        }
                        EditJob::Flush(reply) => {
                            let _ = reply.send(());
                        }
                    }
                }
                tracing::debug!("Edit queue stopped");
            })?;

        Ok(Self { sender })
    }

    pub(crate) fn submit(&self, job: EditJob) -> HostResult<()> {
        self.sender.send(job).map_err(|_| HostError::QueueClosed)
    }

    /// Block until everything submitted so far has been applied.
    pub(crate) fn flush(&self) -> HostResult<()> {
        let (reply, done) = mpsc::channel();
        self.submit(EditJob::Flush(reply))?;
        done.recv().map_err(|_| HostError::QueueClosed)
    }
}
