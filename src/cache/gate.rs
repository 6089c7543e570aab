//! Runs the post-clone callback exactly once.

use super::CloneCallback;
use crate::error::{Error, Result};
use crate::server::ConnectionOpener;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum CallbackState {
    Unregistered = 0,
    Pending = 1,
    Consumed = 2,
}

impl CallbackState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unregistered,
            1 => Self::Pending,
            _ => Self::Consumed,
        }
    }
}

pub(crate) struct CallbackGate {
    callback: Option<Arc<dyn CloneCallback>>,
    state: AtomicU8,
    lock: Mutex<()>,
}

impl CallbackGate {
    pub(crate) fn new(callback: Option<Arc<dyn CloneCallback>>) -> Self {
        let state = if callback.is_some() {
            CallbackState::Pending
        } else {
            CallbackState::Unregistered
        };
        Self {
            callback,
            state: AtomicU8::new(state as u8),
            lock: Mutex::new(()),
        }
    }

    pub(crate) fn state(&self) -> CallbackState {
        CallbackState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Run the callback against the database at `connection_string` if it is
    /// still pending. The gate is consumed even when the callback fails.
    pub(crate) async fn run(
        &self,
        opener: &dyn ConnectionOpener,
        connection_string: &str,
    ) -> Result<()> {
        if self.state() != CallbackState::Pending {
            return Ok(());
        }

        let _guard = self.lock.lock().await;
        if self.state() != CallbackState::Pending {
            return Ok(());
        }
        let Some(callback) = &self.callback else {
            return Ok(());
        };

        debug!(connection_string, "running clone callback");
        let result: Result<()> = async {
            let mut connection = opener.open(connection_string).await?;
            callback.on_clone(connection.as_mut()).await
        }
        .await;
        self.state
            .store(CallbackState::Consumed as u8, Ordering::Release);

        result.map_err(|e| Error::Callback(Box::new(e)))
    }
}
