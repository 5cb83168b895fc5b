use serde::de::DeserializeOwned;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::events::{ChangeEvent, ChangeKind, ClassifyError, RawChange};

pub type SnapshotHandler<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;
pub type UpdateHandler<T> = Arc<dyn Fn(&T, &T) -> anyhow::Result<()> + Send + Sync>;

/// What happened to one routed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler for this kind ran and returned `Ok`.
    Dispatched(ChangeKind),
    /// Valid event, but no handler registered for its kind.
    Unhandled(ChangeKind),
    /// Unknown kind or malformed snapshots; nothing was called.
    Dropped,
    /// The handler returned an error or panicked.
    HandlerFailed(ChangeKind),
}

/// Classifies change notifications and calls the handler registered for
/// each kind. Failures never escape [`ChangeRouter::route`].
pub struct ChangeRouter<T> {
    name: String,
    on_insert: Option<SnapshotHandler<T>>,
    on_update: Option<UpdateHandler<T>>,
    on_delete: Option<SnapshotHandler<T>>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl<T: DeserializeOwned> ChangeRouter<T> {
    pub fn new(name: &str) -> Self {
        ChangeRouter {
            name: name.to_string(),
            on_insert: None,
            on_update: None,
            on_delete: None,
        }
    }

    /// Handler receiving the inserted row.
    pub fn on_insert<F>(mut self, handler: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_insert = Some(Arc::new(handler));
        self
    }

    /// Handler receiving the row before and after the change.
    pub fn on_update<F>(mut self, handler: F) -> Self
    where
        F: Fn(&T, &T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_update = Some(Arc::new(handler));
        self
    }

    /// Handler receiving the deleted row.
    pub fn on_delete<F>(mut self, handler: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_delete = Some(Arc::new(handler));
        self
    }

    pub fn route(&self, raw: &RawChange) -> DispatchOutcome {
        let event = match ChangeEvent::<T>::classify(raw) {
            Ok(event) => event,
            Err(ClassifyError::UnknownKind(kind)) => {
                info!("[{}] Unknown event type: {}", self.name, kind);
                return DispatchOutcome::Dropped;
            }
            Err(e) => {
                warn!(
                    "[{}] Dropping {} change on {}.{}: {}",
                    self.name, raw.event_type, raw.schema, raw.table, e
                );
                return DispatchOutcome::Dropped;
            }
        };
        self.dispatch(event)
    }

    pub fn dispatch(&self, event: ChangeEvent<T>) -> DispatchOutcome {
        let kind = event.kind();
        let result = match &event {
            ChangeEvent::Insert { after } => self
                .on_insert
                .as_ref()
                .map(|h| catch_unwind(AssertUnwindSafe(|| h(after)))),
            ChangeEvent::Update { before, after } => self
                .on_update
                .as_ref()
                .map(|h| catch_unwind(AssertUnwindSafe(|| h(before, after)))),
            ChangeEvent::Delete { before } => self
                .on_delete
                .as_ref()
                .map(|h| catch_unwind(AssertUnwindSafe(|| h(before)))),
        };

        match result {
            None => {
                info!("[{}] No handler registered for {} events", self.name, kind);
                DispatchOutcome::Unhandled(kind)
            }
            Some(Ok(Ok(()))) => DispatchOutcome::Dispatched(kind),
            Some(Ok(Err(e))) => {
                error!("[{}] {} handler failed: {:#}", self.name, kind, e);
                DispatchOutcome::HandlerFailed(kind)
            }
            Some(Err(payload)) => {
                error!(
                    "[{}] {} handler panicked: {}",
                    self.name,
                    kind,
                    panic_message(payload.as_ref())
                );
                DispatchOutcome::HandlerFailed(kind)
            }
        }
    }
}
