use tokio::sync::broadcast;

/// Committed mutation to one of the paged collections. Paged views listen
/// for these and re-emit their window instead of re-querying from page one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Chats,
    Friends,
    Messages { chat_id: String },
}

#[derive(Debug, Clone)]
pub(crate) struct StoreNotifier {
    tx: broadcast::Sender<StoreChange>,
}

impl StoreNotifier {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.tx.subscribe()
    }

    /// Fired after a transaction commits, never inside one.
    pub(crate) fn notify(&self, change: StoreChange) {
        // No receivers is fine; views come and go.
        let _ = self.tx.send(change);
    }
}
