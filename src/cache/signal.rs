//! Single-assignment "template ready" signal shared by every clone request.

use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::sync::watch;

type Outcome = std::result::Result<(), Arc<Error>>;

/// Receiving side. Cheap to clone; every clone observes the same outcome.
#[derive(Clone)]
pub(crate) struct BuildSignal {
    rx: watch::Receiver<Option<Outcome>>,
}

/// Sending side, consumed by the one completion.
pub(crate) struct BuildCompleter {
    tx: watch::Sender<Option<Outcome>>,
}

impl BuildSignal {
    pub(crate) fn new() -> (BuildCompleter, BuildSignal) {
        let (tx, rx) = watch::channel(None);
        (BuildCompleter { tx }, BuildSignal { rx })
    }

    /// Wait for the build to finish. A failed build yields the shared error.
    pub(crate) async fn wait(&self) -> Result<()> {
        let mut rx = self.rx.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            // sender dropped without an outcome
            Err(_) => None,
        };
        match outcome {
            Some(Ok(())) => Ok(()),
            Some(Err(shared)) => Err(Error::Template(shared)),
            None => Err(Error::BuildAbandoned),
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

impl BuildCompleter {
    pub(crate) fn complete(self, outcome: Result<()>) {
        self.tx.send_replace(Some(outcome.map_err(Arc::new)));
    }

    /// Resolve with a failure that is already shared with someone else.
    pub(crate) fn fail_shared(self, shared: Arc<Error>) {
        self.tx.send_replace(Some(Err(shared)));
    }
}
