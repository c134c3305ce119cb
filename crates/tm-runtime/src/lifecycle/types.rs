use tokio::task::JoinHandle;

use orion_error::prelude::*;

use crate::error::{RuntimeReason, RuntimeResult};

// ---------------------------------------------------------------------------
// TaskGroup
// ---------------------------------------------------------------------------

/// Named tasks that are joined together.
///
/// Groups are started consumer-first and joined in reverse (LIFO):
///
///   start:  emitter → workers → ingest
///   join:   ingest → workers → emitter
///
/// Each stage exits when its input channel closes, so joining in this order
/// waits for the drain to ripple through the pipeline.
pub(super) struct TaskGroup {
    pub(super) name: &'static str,
    handles: Vec<JoinHandle<RuntimeResult<()>>>,
}

impl TaskGroup {
    pub(super) fn new(name: &'static str) -> Self {
        Self {
            name,
            handles: Vec::new(),
        }
    }

    pub(super) fn push(&mut self, handle: JoinHandle<RuntimeResult<()>>) {
        self.handles.push(handle);
    }

    /// Join all tasks in this group, returning the first error.
    pub(super) async fn wait(self) -> RuntimeResult<()> {
        let mut first_err = None;
        for handle in self.handles {
            let outcome = handle.await.map_err(|e| {
                StructError::from(RuntimeReason::Shutdown)
                    .with_detail(format!("task join error: {e}"))
            });
            if let Err(e) = outcome.and_then(|r| r) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
