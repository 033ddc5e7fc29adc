use std::sync::Arc;

use tokio::sync::broadcast;

use pigeon_core::Entity;
use pigeon_db::StoreChange;

use crate::error::SyncError;
use crate::local::LocalCollection;
use crate::pager::{PageOutcome, Pager};
use crate::Result;

/// A lazy, restartable paged view over one collection.
///
/// Snapshots come straight from the local store; `load_more` extends the
/// chain through the pager; `next` waits for the next committed mutation of
/// this collection and re-emits, so consumers see live merges without
/// re-querying from page one. Dropping the stream detaches it.
pub struct PagedStream<T: Entity> {
    local: Arc<dyn LocalCollection<T>>,
    pager: Arc<Pager<T>>,
    changes: broadcast::Receiver<StoreChange>,
}

impl<T: Entity> PagedStream<T> {
    pub(crate) fn new(
        local: Arc<dyn LocalCollection<T>>,
        pager: Arc<Pager<T>>,
        changes: broadcast::Receiver<StoreChange>,
    ) -> Self {
        Self {
            local,
            pager,
            changes,
        }
    }

    /// Current window, loading the first page when the cache is cold.
    pub async fn snapshot(&self) -> Result<Vec<T>> {
        self.pager.ensure_initial().await?;
        self.local.snapshot().await
    }

    /// Extend the window one page toward the old end.
    pub async fn load_more(&self) -> Result<PageOutcome> {
        self.pager.load_older().await
    }

    pub fn end_reached(&self) -> bool {
        self.pager.end_reached()
    }

    /// Wait for the next committed mutation of this collection, then return
    /// the fresh window. A lagged receiver just re-reads; only a closed
    /// store ends the stream.
    pub async fn next(&mut self) -> Result<Vec<T>> {
        let topic = self.local.topic();
        loop {
            match self.changes.recv().await {
                Ok(change) if change == topic => return self.local.snapshot().await,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    return self.local.snapshot().await;
                }
                Err(broadcast::error::RecvError::Closed) => return Err(SyncError::ChannelClosed),
            }
        }
    }
}
