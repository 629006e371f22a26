//! Service module - Router-resident protocol responders
//!
//! A service lives on a router, listens on a static socket and answers the
//! datagrams the router delivers to it. Services in this crate share one
//! design: a single worker task draining an unbounded FIFO queue.

pub mod echo;
mod worker;
pub mod zip;

pub use worker::*;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::network::{Datagram, Port};
use crate::router::Router;

/// Service errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service already started")]
    AlreadyStarted,

    #[error("Service not running")]
    NotRunning,

    #[error("Service worker exited unexpectedly")]
    WorkerExited,

    #[error("Service worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// A service connected to a router
#[async_trait]
pub trait Service: Send + Sync {
    /// Start the service; returns once it is consuming its queue
    async fn start(&self, router: Arc<dyn Router>) -> ServiceResult<()>;

    /// Stop the service; returns once its worker has finished
    async fn stop(&self) -> ServiceResult<()>;

    /// Hand the service a datagram that arrived over `rx_port`
    ///
    /// Never blocks; the datagram is queued for the worker.
    fn inbound(&self, datagram: Datagram, rx_port: Arc<dyn Port>);
}
