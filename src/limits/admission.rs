//! Admission Controller
//!
//! Caps the number of connection handlers doing work at the same time.
//! A handler holds an [`AdmissionPermit`] for its whole lifetime; dropping
//! the permit frees the slot and wakes at most one waiter.

use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default number of concurrently admitted connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 100;

/// Where the listener waits for an admission slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionMode {
    /// The accept loop takes a slot before spawning a handler, so excess
    /// connections wait in the listen backlog
    #[default]
    Accept,
    /// Every accepted connection gets a task that waits for a slot itself
    Handler,
}

/// The underlying semaphore was closed; no further slots will be handed out.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("admission controller closed")]
pub struct AdmissionClosed;

/// A counting gate in front of the connection handlers.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    sem: Arc<Semaphore>,
    max: usize,
}

/// One unit of admitted capacity. Released on drop.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionController {
    pub fn new(max: usize) -> Self {
        Self {
            sem: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Waits until a slot is free. There is no timeout.
    pub async fn acquire(&self) -> Result<AdmissionPermit, AdmissionClosed> {
        let permit = Arc::clone(&self.sem)
            .acquire_owned()
            .await
            .map_err(|_| AdmissionClosed)?;
        Ok(AdmissionPermit { _permit: permit })
    }

    /// Takes a slot if one is free right now.
    pub fn try_acquire(&self) -> Option<AdmissionPermit> {
        Arc::clone(&self.sem)
            .try_acquire_owned()
            .ok()
            .map(|permit| AdmissionPermit { _permit: permit })
    }

    /// Slots currently held.
    pub fn active(&self) -> usize {
        self.max - self.sem.available_permits()
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.sem.available_permits()
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONNECTIONS)
    }
}
