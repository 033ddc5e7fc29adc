use serde::{Deserialize, Serialize};

/// Number of items fetched per remote page.
pub const PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Older,
    Newer,
}

/// Position of an item in a collection's total order.
///
/// Collections sort newest-first on the ordering key; ties break on the
/// entity id so two items sharing a timestamp still have a deterministic
/// order across page boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub ordering_key: i64,
    pub id: String,
}

impl Cursor {
    pub fn new(ordering_key: i64, id: impl Into<String>) -> Self {
        Self {
            ordering_key,
            id: id.into(),
        }
    }

    /// True when `self` sorts strictly older than `other`.
    pub fn is_older_than(&self, other: &Cursor) -> bool {
        (self.ordering_key, self.id.as_str()) < (other.ordering_key, other.id.as_str())
    }

    /// True when `self` sorts strictly newer than `other`.
    pub fn is_newer_than(&self, other: &Cursor) -> bool {
        (self.ordering_key, self.id.as_str()) > (other.ordering_key, other.id.as_str())
    }
}

/// A cached record of a remote item: chats, friends and messages all expose
/// a stable id and the server-assigned ordering key their collection sorts on.
pub trait Entity: Clone + Send + Sync + 'static {
    fn entity_id(&self) -> &str;

    fn ordering_key(&self) -> i64;

    fn cursor(&self) -> Cursor {
        Cursor::new(self.ordering_key(), self.entity_id())
    }
}

/// Sort a slice newest-first (ordering key descending, id descending on ties).
pub fn sort_newest_first<T: Entity>(items: &mut [T]) {
    items.sort_by(|a, b| {
        (b.ordering_key(), b.entity_id()).cmp(&(a.ordering_key(), a.entity_id()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_orders_by_key_then_id() {
        let a = Cursor::new(100, "m1");
        let b = Cursor::new(200, "m2");
        assert!(a.is_older_than(&b));
        assert!(b.is_newer_than(&a));

        // Same timestamp: the id decides.
        let c = Cursor::new(200, "m1");
        assert!(c.is_older_than(&b));
        assert!(!b.is_older_than(&c));
    }
}
