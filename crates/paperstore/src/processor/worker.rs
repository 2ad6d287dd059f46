use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info};
use tokio::sync::oneshot;

use crate::error::ProcessError;
use crate::processor::pdf::{self, PdfInfo};

enum ExtractionTask {
    FirstPages {
        bytes: Vec<u8>,
        max_pages: usize,
        reply: oneshot::Sender<Result<String, ProcessError>>,
    },
    Info {
        bytes: Vec<u8>,
        reply: oneshot::Sender<Result<PdfInfo, ProcessError>>,
    },
}

/// The process-wide PDF extraction thread.
///
/// Every lopdf call in the process goes through this single OS thread, so
/// callers may download in parallel while extraction stays strictly
/// sequential. Async callers get their result over a oneshot channel.
pub struct ExtractionWorker {
    sender: Sender<ExtractionTask>,
    shutdown: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ExtractionWorker {
    pub fn spawn() -> Result<Self, ProcessError> {
        let (sender, receiver) = unbounded::<ExtractionTask>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("pdf-extraction".to_string())
            .spawn(move || run_worker(receiver, shutdown_flag))
            .map_err(|e| ProcessError::SpawnFailed(e.to_string()))?;

        info!("Started PDF extraction worker");

        Ok(Self {
            sender,
            shutdown,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Text of the first `max_pages` pages.
    pub async fn first_pages_text(
        &self,
        bytes: Vec<u8>,
        max_pages: usize,
    ) -> Result<String, ProcessError> {
        let (reply, response) = oneshot::channel();
        self.submit(ExtractionTask::FirstPages {
            bytes,
            max_pages,
            reply,
        })?;
        response.await.map_err(|_| ProcessError::WorkerUnavailable)?
    }

    /// Title and authors from the PDF info dictionary.
    pub async fn info(&self, bytes: Vec<u8>) -> Result<PdfInfo, ProcessError> {
        let (reply, response) = oneshot::channel();
        self.submit(ExtractionTask::Info { bytes, reply })?;
        response.await.map_err(|_| ProcessError::WorkerUnavailable)?
    }

    fn submit(&self, task: ExtractionTask) -> Result<(), ProcessError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(ProcessError::WorkerUnavailable);
        }
        self.sender
            .send(task)
            .map_err(|_| ProcessError::WorkerUnavailable)
    }

    /// Stops accepting work and joins the thread after the current task.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("PDF extraction worker panicked");
            } else {
                debug!("PDF extraction worker finished");
            }
        }
    }
}

impl Drop for ExtractionWorker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

fn run_worker(receiver: Receiver<ExtractionTask>, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("PDF extraction worker received shutdown signal");
            break;
        }

        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(ExtractionTask::FirstPages {
                bytes,
                max_pages,
                reply,
            }) => {
                let result = guarded(|| pdf::extract_first_pages(&bytes, max_pages));
                // The caller may have gone away; nothing to do then.
                let _ = reply.send(result);
            }
            Ok(ExtractionTask::Info { bytes, reply }) => {
                let result = guarded(|| pdf::read_info(&bytes));
                let _ = reply.send(result);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Runs one extraction, turning a lopdf panic on malformed input into an
/// error so the worker survives.
fn guarded<T>(f: impl FnOnce() -> Result<T, ProcessError>) -> Result<T, ProcessError> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        Err(ProcessError::PdfProcessing(
            "PDF parser panicked on malformed input".to_string(),
        ))
    })
}
