//! Single-consumer serialized task queues.
//!
//! A [`Lane`] owns a piece of mutable state on a dedicated worker thread and
//! runs submitted closures against it one at a time, in submission order.
//! Submitting never blocks; the result comes back through a [`Ticket`].

use crate::errors::SessionError;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

enum Message<S> {
    Run(Job<S>),
    Stop,
}

/// Pending result of a lane task.
///
/// Dropping a ticket does not cancel the task.
#[must_use = "a ticket can be dropped, but then the task's result is lost"]
pub struct Ticket<T> {
    lane: Arc<str>,
    rx: oneshot::Receiver<Result<T, SessionError>>,
}

impl<T> Ticket<T> {
    fn closed(lane: &Arc<str>) -> SessionError {
        SessionError::LaneClosed(format!("{} lane stopped before the task completed", lane))
    }

    /// Wait for the task to finish.
    pub async fn wait(self) -> Result<T, SessionError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(Self::closed(&self.lane)),
        }
    }

    /// Wait for the task from synchronous code.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait_blocking(self) -> Result<T, SessionError> {
        match self.rx.blocking_recv() {
            Ok(result) => result,
            Err(_) => Err(Self::closed(&self.lane)),
        }
    }

    /// The result, if the task already finished.
    pub fn try_result(&mut self) -> Option<Result<T, SessionError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(Self::closed(&self.lane))),
        }
    }
}

/// Cloneable submission handle of a lane.
pub struct LaneHandle<S> {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Message<S>>,
}

impl<S> Clone for LaneHandle<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<S: 'static> LaneHandle<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue `task` and return a ticket for its result.
    pub fn submit<T, F>(&self, task: F) -> Ticket<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> Result<T, SessionError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job<S> = Box::new(move |state| {
            let _ = tx.send(task(state));
        });
        if self.tx.send(Message::Run(job)).is_err() {
            log::warn!("[{}] Lane is closed, task dropped", self.name);
        }
        Ticket {
            lane: self.name.clone(),
            rx,
        }
    }

    /// Queue `task` without tracking its result. Returns false if the lane is closed.
    pub fn enqueue<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        let sent = self.tx.send(Message::Run(Box::new(task))).is_ok();
        if !sent {
            log::debug!("[{}] Lane is closed, event dropped", self.name);
        }
        sent
    }
}

/// A worker thread owning state of type `S`.
pub struct Lane<S> {
    handle: LaneHandle<S>,
    thread: Option<JoinHandle<()>>,
}

impl<S: Send + 'static> Lane<S> {
    /// Spawn a lane whose state is built by `init`.
    ///
    /// `init` receives the lane's own handle so the state can enqueue follow-up
    /// work onto itself.
    pub fn spawn_with<F>(name: &str, init: F) -> Result<Self, SessionError>
    where
        F: FnOnce(LaneHandle<S>) -> S,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message<S>>();
        let handle = LaneHandle {
            name: Arc::from(name),
            tx,
        };
        let mut state = init(handle.clone());
        let lane_name = handle.name.clone();

        let thread = thread::Builder::new()
            .name(format!("castlane-{}", name))
            .spawn(move || {
                log::debug!("[{}] Lane started", lane_name);
                while let Some(message) = rx.blocking_recv() {
                    match message {
                        Message::Run(job) => {
                            let outcome =
                                panic::catch_unwind(AssertUnwindSafe(|| job(&mut state)));
                            if outcome.is_err() {
                                log::error!("[{}] Lane task panicked", lane_name);
                            }
                        }
                        Message::Stop => break,
                    }
                }
                log::debug!("[{}] Lane stopped", lane_name);
            })
            .map_err(|e| {
                SessionError::LaneClosed(format!("Failed to spawn {} lane: {}", name, e))
            })?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> &LaneHandle<S> {
        &self.handle
    }

    /// Stop the worker after the tasks already queued, and join it.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.handle.tx.send(Message::Stop);
        if thread.thread().id() == thread::current().id() {
            log::warn!("[{}] Lane asked to stop itself, not joining", self.handle.name);
            return;
        }
        if thread.join().is_err() {
            log::error!("[{}] Lane thread panicked", self.handle.name);
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }
}

impl<S> Drop for Lane<S> {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.handle.tx.send(Message::Stop);
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}
