//! Single-writer actor owning a tree state
//!
//! Every mutation of a tree is a closure sent to the tree's scheduler, which runs the
//! closures one at a time on its own task. Async I/O happens outside the scheduler and
//! its results are marshaled back as further closures.

use crate::model::TreeNodeModel;
use crate::tree::FileSystemTree;
use duplex_types::{Error, Result};
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

/// State that can undo the changes made by one scheduled job
pub trait Transactional {
    /// What [`rollback`](Self::rollback) needs to restore the state
    type Checkpoint: Send;

    /// Mark the state before a job runs
    fn begin(&mut self) -> Self::Checkpoint;

    /// Keep the job's changes
    fn commit(&mut self, checkpoint: Self::Checkpoint);

    /// Discard the job's changes
    fn rollback(&mut self, checkpoint: Self::Checkpoint);
}

impl<M: TreeNodeModel> Transactional for FileSystemTree<M> {
    type Checkpoint = ();

    fn begin(&mut self) {
        self.begin_transaction();
    }

    fn commit(&mut self, (): ()) {
        self.commit_transaction();
    }

    fn rollback(&mut self, (): ()) {
        self.rollback_transaction();
    }
}

/// Handle to a serial scheduler. Clones share the same state and queue.
pub struct SerialScheduler<S> {
    name: &'static str,
    sender: mpsc::Sender<Job<S>>,
}

impl<S> Clone for SerialScheduler<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            sender: self.sender.clone(),
        }
    }
}

impl<S> fmt::Debug for SerialScheduler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialScheduler")
            .field("name", &self.name)
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl<S: Send + 'static> SerialScheduler<S> {
    /// Spawn the actor task owning `state`. Must be called within a Tokio runtime.
    pub fn spawn(name: &'static str, state: S, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Job<S>>(capacity.max(1));
        tokio::spawn(async move {
            let mut state = state;
            while let Some(job) = receiver.recv().await {
                job(&mut state);
            }
            debug!("{}: scheduler stopped", name);
        });
        Self { name, sender }
    }

    /// Name used in log messages
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run `job` against the state once every previously scheduled job has finished
    pub async fn schedule<R, F>(&self, job: F) -> Result<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        let job: Job<S> = Box::new(move |state| {
            // The caller may have stopped waiting
            let _ = reply.send(job(state));
        });
        self.sender
            .send(job)
            .await
            .map_err(|_| Error::scheduler(format!("{} scheduler is stopped", self.name)))?;
        response
            .await
            .map_err(|_| Error::scheduler(format!("{} scheduler dropped a job", self.name)))
    }

    /// Run `job` as a transaction: when it returns `Err`, every change it made to the
    /// state is rolled back before the next job runs
    pub async fn schedule_and_commit<R, E, F>(&self, job: F) -> Result<std::result::Result<R, E>>
    where
        S: Transactional,
        F: FnOnce(&mut S) -> std::result::Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
    {
        let name = self.name;
        self.schedule(move |state| {
            let checkpoint = state.begin();
            let result = job(state);
            if result.is_err() {
                debug!("{}: rolling back", name);
                state.rollback(checkpoint);
            } else {
                state.commit(checkpoint);
            }
            result
        })
        .await
    }
}
