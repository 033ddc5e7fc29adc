use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use pigeon_core::{Direction, Entity, PAGE_SIZE};
use pigeon_remote::RemoteCollection;

use crate::Result;
use crate::local::LocalCollection;

/// Result of a page request against the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Fetched and linked this many new items.
    Loaded(usize),
    /// Served from the warm cache; nothing was fetched.
    Cached(usize),
    /// The collection is exhausted in this direction. Terminal, not an
    /// error: the flag sticks and later calls return it immediately.
    End,
}

/// Remote-key pagination engine for one collection: turns "the consumer
/// wants more" into bounded remote fetches and keeps the local chain linked.
pub struct Pager<T: Entity> {
    local: Arc<dyn LocalCollection<T>>,
    remote: Arc<dyn RemoteCollection<T>>,
    page_size: usize,
    end_reached: AtomicBool,
}

impl<T: Entity> Pager<T> {
    pub fn new(local: Arc<dyn LocalCollection<T>>, remote: Arc<dyn RemoteCollection<T>>) -> Self {
        Self::with_page_size(local, remote, PAGE_SIZE)
    }

    pub fn with_page_size(
        local: Arc<dyn LocalCollection<T>>,
        remote: Arc<dyn RemoteCollection<T>>,
        page_size: usize,
    ) -> Self {
        Self {
            local,
            remote,
            page_size,
            end_reached: AtomicBool::new(false),
        }
    }

    pub fn end_reached(&self) -> bool {
        self.end_reached.load(Ordering::SeqCst)
    }

    /// Load the newest page if the local chain is empty; a warm cache is
    /// served as-is.
    pub async fn ensure_initial(&self) -> Result<PageOutcome> {
        let count = self.local.count().await?;
        if count > 0 {
            return Ok(PageOutcome::Cached(count as usize));
        }

        let page = self
            .remote
            .fetch_page(None, self.page_size, Direction::Older)
            .await?;
        if page.is_empty() {
            self.end_reached.store(true, Ordering::SeqCst);
            return Ok(PageOutcome::End);
        }

        let fetched = page.len();
        if !self.local.insert_page(&page, None).await? {
            // A live add built the chain while the fetch was in flight; the
            // fetched page is discarded and will re-anchor on the next call.
            let count = self.local.count().await?;
            return Ok(PageOutcome::Cached(count as usize));
        }

        Ok(PageOutcome::Loaded(fetched))
    }

    /// Extend the chain below its tail.
    pub async fn load_older(&self) -> Result<PageOutcome> {
        if self.end_reached() {
            return Ok(PageOutcome::End);
        }

        if self.local.count().await? == 0 {
            return self.ensure_initial().await;
        }

        let tail = match self.local.chain_tail().await? {
            Some(tail) => tail,
            None => {
                // Every candidate tail carries a dead older cursor (its
                // neighbour was removed): end-of-chain, not an error.
                self.end_reached.store(true, Ordering::SeqCst);
                return Ok(PageOutcome::End);
            }
        };

        let anchor = match self.local.get(&tail.id).await? {
            Some(entity) => entity.cursor(),
            None => {
                // A key without its entity cannot anchor a fetch.
                tracing::warn!("remote key {} has no entity row, treating as end of chain", tail.id);
                self.end_reached.store(true, Ordering::SeqCst);
                return Ok(PageOutcome::End);
            }
        };

        let page = self
            .remote
            .fetch_page(Some(anchor), self.page_size, Direction::Older)
            .await?;
        if page.is_empty() {
            self.end_reached.store(true, Ordering::SeqCst);
            return Ok(PageOutcome::End);
        }

        let fetched = page.len();
        if !self.local.insert_page(&page, Some(&tail.id)).await? {
            // The anchor stopped being the tail while the fetch was in
            // flight (competing load or removal); discard this page.
            let count = self.local.count().await?;
            return Ok(PageOutcome::Cached(count as usize));
        }

        Ok(PageOutcome::Loaded(fetched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::ChatStore;
    use pigeon_core::{ChatData, MessageContent};
    use pigeon_db::PigeonDb;
    use pigeon_remote::memory::MemoryCollection;

    fn chat(id: &str, ts: i64) -> ChatData {
        ChatData {
            chat_id: id.to_string(),
            title: None,
            photo_url: None,
            last_message: Some(MessageContent::text("hello")),
            last_message_timestamp: ts,
            members: vec!["u1".into()],
        }
    }

    async fn setup(
        seed: Vec<ChatData>,
        page_size: usize,
    ) -> (
        Arc<PigeonDb>,
        Arc<MemoryCollection<ChatData>>,
        Pager<ChatData>,
    ) {
        let db = Arc::new(PigeonDb::in_memory().await.unwrap());
        let remote = Arc::new(MemoryCollection::new());
        remote.seed(seed).await;
        let local: Arc<dyn LocalCollection<ChatData>> = Arc::new(ChatStore::new(db.clone()));
        let pager = Pager::with_page_size(local, remote.clone(), page_size);
        (db, remote, pager)
    }

    #[tokio::test]
    async fn initial_page_then_live_add_then_older_page() {
        let (db, _remote, pager) = setup(
            vec![chat("c1", 100), chat("c2", 200), chat("c3", 300)],
            2,
        )
        .await;

        // Initial page: [c3, c2], c3 head, c2 tail.
        assert_eq!(pager.ensure_initial().await.unwrap(), PageOutcome::Loaded(2));
        let c3 = db.chat_remote_key("c3").await.unwrap().unwrap();
        assert_eq!(c3.next_cursor, None);
        assert_eq!(c3.previous_cursor.as_deref(), Some("c2"));
        let c2 = db.chat_remote_key("c2").await.unwrap().unwrap();
        assert_eq!(c2.previous_cursor, None);
        assert_eq!(c2.next_cursor.as_deref(), Some("c3"));

        // Live add c4: new chain head, regardless of page boundaries.
        assert!(db.prepend_chat(&chat("c4", 400)).await.unwrap());
        let c4 = db.chat_remote_key("c4").await.unwrap().unwrap();
        assert_eq!(c4.previous_cursor.as_deref(), Some("c3"));
        assert_eq!(
            db.chat_remote_key("c3")
                .await
                .unwrap()
                .unwrap()
                .next_cursor
                .as_deref(),
            Some("c4")
        );

        // Older page anchored below c2 picks up c1 as the new tail.
        assert_eq!(pager.load_older().await.unwrap(), PageOutcome::Loaded(1));
        let c1 = db.chat_remote_key("c1").await.unwrap().unwrap();
        assert_eq!(c1.previous_cursor, None);
        assert_eq!(c1.next_cursor.as_deref(), Some("c2"));

        let ids: Vec<String> = db
            .all_chats()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.chat_id)
            .collect();
        assert_eq!(ids, ["c4", "c3", "c2", "c1"]);
        assert_eq!(db.chat_chain_head().await.unwrap().unwrap().id, "c4");

        // Nothing older remains: terminal, and it sticks.
        assert_eq!(pager.load_older().await.unwrap(), PageOutcome::End);
        assert!(pager.end_reached());
        assert_eq!(pager.load_older().await.unwrap(), PageOutcome::End);
    }

    #[tokio::test]
    async fn repeated_loads_never_duplicate() {
        let seed: Vec<ChatData> = (1..=5).map(|i| chat(&format!("c{i}"), i * 100)).collect();
        let (db, _remote, pager) = setup(seed, 2).await;

        assert_eq!(pager.ensure_initial().await.unwrap(), PageOutcome::Loaded(2));
        assert_eq!(pager.load_older().await.unwrap(), PageOutcome::Loaded(2));
        assert_eq!(pager.load_older().await.unwrap(), PageOutcome::Loaded(1));
        assert_eq!(pager.load_older().await.unwrap(), PageOutcome::End);

        let mut ids: Vec<String> = db
            .all_chats()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.chat_id)
            .collect();
        assert_eq!(ids.len(), 5);
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }

    #[tokio::test]
    async fn warm_cache_is_served_without_fetching() {
        let (_db, remote, pager) = setup(vec![chat("c1", 100), chat("c2", 200)], 2).await;
        assert_eq!(pager.ensure_initial().await.unwrap(), PageOutcome::Loaded(2));

        // A failure on the next remote call proves the cache path never
        // touches the network.
        remote.inject_failure();
        assert_eq!(pager.ensure_initial().await.unwrap(), PageOutcome::Cached(2));
    }

    #[tokio::test]
    async fn empty_collection_is_terminal() {
        let (_db, _remote, pager) = setup(vec![], 2).await;
        assert_eq!(pager.ensure_initial().await.unwrap(), PageOutcome::End);
        assert!(pager.end_reached());
    }

    #[tokio::test]
    async fn dead_cursor_reads_as_end_of_chain() {
        let (db, _remote, pager) = setup(
            vec![chat("c1", 100), chat("c2", 200), chat("c3", 300)],
            2,
        )
        .await;
        pager.ensure_initial().await.unwrap();

        // The tail is removed; c3's previous cursor now dangles.
        assert!(db.remove_chat("c2").await.unwrap());
        let c3 = db.chat_remote_key("c3").await.unwrap().unwrap();
        assert_eq!(c3.previous_cursor.as_deref(), Some("c2"));

        assert_eq!(pager.load_older().await.unwrap(), PageOutcome::End);
    }

    #[tokio::test]
    async fn fetch_failure_is_retryable_and_leaves_pages_intact() {
        let (db, remote, pager) = setup(
            vec![chat("c1", 100), chat("c2", 200), chat("c3", 300)],
            2,
        )
        .await;
        pager.ensure_initial().await.unwrap();

        remote.inject_failure();
        let err = pager.load_older().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(db.chat_count().await.unwrap(), 2);
        assert!(!pager.end_reached());

        // Same boundary, second try.
        assert_eq!(pager.load_older().await.unwrap(), PageOutcome::Loaded(1));
        assert_eq!(db.chat_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn tie_broken_pages_stay_deterministic() {
        // c2 and c3 share a timestamp; id order decides the boundary.
        let (db, _remote, pager) = setup(
            vec![
                chat("c1", 100),
                chat("c2", 200),
                chat("c3", 200),
                chat("c4", 400),
            ],
            2,
        )
        .await;

        pager.ensure_initial().await.unwrap();
        pager.load_older().await.unwrap();

        let ids: Vec<String> = db
            .all_chats()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.chat_id)
            .collect();
        assert_eq!(ids, ["c4", "c3", "c2", "c1"]);
    }
}
