//! Single-consumer queue worker shared by the services
//!
//! Producers enqueue from any thread; one tokio task drains the queue in
//! arrival order and hands each datagram to a [`DatagramHandler`].

use async_trait::async_trait;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{Service, ServiceError, ServiceResult};
use crate::network::{Datagram, Port};
use crate::router::Router;

/// Protocol logic run by a [`QueueWorker`] for each queued datagram
pub trait DatagramHandler: Send + Sync + 'static {
    /// Name used in logs
    const NAME: &'static str;

    /// Handle one datagram. Malformed input is dropped, never reported.
    fn handle(&self, router: &dyn Router, datagram: Datagram, rx_port: Arc<dyn Port>);
}

/// Queue element
pub enum Work {
    Datagram {
        datagram: Datagram,
        rx_port: Arc<dyn Port>,
    },
    /// Nothing queued after this is processed
    Shutdown,
}

/// Lifecycle of a queue worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

struct WorkerState {
    lifecycle: LifecycleState,
    queue_rx: Option<mpsc::UnboundedReceiver<Work>>,
    stopped_rx: Option<oneshot::Receiver<()>>,
    handle: Option<JoinHandle<()>>,
}

/// A service backed by one worker task and one FIFO queue
pub struct QueueWorker<H> {
    handler: Arc<H>,
    queue_tx: mpsc::UnboundedSender<Work>,
    state: Mutex<WorkerState>,
}

impl<H: DatagramHandler> QueueWorker<H> {
    /// Create the service; its queue accepts datagrams right away
    pub fn new(handler: H) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            handler: Arc::new(handler),
            queue_tx,
            state: Mutex::new(WorkerState {
                lifecycle: LifecycleState::NotStarted,
                queue_rx: Some(queue_rx),
                stopped_rx: None,
                handle: None,
            }),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> LifecycleState {
        self.lock().lifecycle
    }

    fn lock(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run<H: DatagramHandler>(
    handler: Arc<H>,
    router: Arc<dyn Router>,
    mut queue_rx: mpsc::UnboundedReceiver<Work>,
    started_tx: oneshot::Sender<()>,
    stopped_tx: oneshot::Sender<()>,
) {
    let _ = started_tx.send(());
    tracing::debug!("{} worker started", H::NAME);

    while let Some(work) = queue_rx.recv().await {
        let (datagram, rx_port) = match work {
            Work::Shutdown => break,
            Work::Datagram { datagram, rx_port } => (datagram, rx_port),
        };

        // one bad datagram must not take the worker down with it
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            handler.handle(router.as_ref(), datagram, rx_port)
        }));
        if result.is_err() {
            tracing::error!("{} handler panicked, datagram dropped", H::NAME);
        }
    }

    tracing::debug!("{} worker stopped", H::NAME);
    let _ = stopped_tx.send(());
}

#[async_trait]
impl<H: DatagramHandler> Service for QueueWorker<H> {
    async fn start(&self, router: Arc<dyn Router>) -> ServiceResult<()> {
        let queue_rx = {
            let mut state = self.lock();
            if state.lifecycle != LifecycleState::NotStarted {
                return Err(ServiceError::AlreadyStarted);
            }
            state.queue_rx.take().ok_or(ServiceError::AlreadyStarted)?
        };

        let (started_tx, started_rx) = oneshot::channel();
        let (stopped_tx, stopped_rx) = oneshot::channel();
        let handle = tokio::spawn(run(
            Arc::clone(&self.handler),
            router,
            queue_rx,
            started_tx,
            stopped_tx,
        ));

        started_rx.await.map_err(|_| ServiceError::WorkerExited)?;

        let mut state = self.lock();
        state.lifecycle = LifecycleState::Running;
        state.stopped_rx = Some(stopped_rx);
        state.handle = Some(handle);
        tracing::info!("{} service started", H::NAME);
        Ok(())
    }

    async fn stop(&self) -> ServiceResult<()> {
        let (stopped_rx, handle) = {
            let mut state = self.lock();
            if state.lifecycle != LifecycleState::Running {
                return Err(ServiceError::NotRunning);
            }
            state.lifecycle = LifecycleState::Stopping;
            (state.stopped_rx.take(), state.handle.take())
        };

        self.queue_tx
            .send(Work::Shutdown)
            .map_err(|_| ServiceError::WorkerExited)?;

        if let Some(stopped_rx) = stopped_rx {
            stopped_rx.await.map_err(|_| ServiceError::WorkerExited)?;
        }
        if let Some(handle) = handle {
            handle.await?;
        }

        self.lock().lifecycle = LifecycleState::Stopped;
        tracing::info!("{} service stopped", H::NAME);
        Ok(())
    }

    fn inbound(&self, datagram: Datagram, rx_port: Arc<dyn Port>) {
        if self.queue_tx.send(Work::Datagram { datagram, rx_port }).is_err() {
            tracing::trace!("{} queue closed, dropping datagram", H::NAME);
        }
    }
}
