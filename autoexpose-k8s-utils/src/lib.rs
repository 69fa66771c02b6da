mod event;
mod informer;

use std::time::Duration;

use thiserror::Error;

pub use event::{EventHandler, ResourceEvent};
pub use informer::{Informer, InformerConfig, wait_for_sync};

#[derive(Error, Debug)]
pub enum Error {
    #[error("timed out after {0:?} waiting for caches to sync")]
    SyncTimeout(Duration),

    #[error("watch stream for {0} ended unexpectedly")]
    StreamEnded(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
