use std::collections::HashMap;

/// Outstanding queries, by transaction ID.
///
/// IDs are handed out sequentially and wrap at 65536.  Nothing stops
/// a wrapped ID from colliding with a query which never got an
/// answer: the later registration wins.  Entries which are never
/// answered are never removed.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct TransactionTracker {
    last_id: u16,
    pending: HashMap<u16, String>,
}

impl TransactionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next transaction ID.  The first is 1.
    pub fn next_id(&mut self) -> u16 {
        self.last_id = self.last_id.wrapping_add(1);
        self.last_id
    }

    pub fn register(&mut self, id: u16, hostname: &str) {
        self.pending.insert(id, hostname.to_string());
    }

    /// Accept a reply: if `id` is outstanding and its hostname occurs
    /// somewhere in `candidate`, forget it and return the hostname.
    ///
    /// This is a substring check, not an equality check, so a reply
    /// for `example.com.` is accepted for a query for `example.com`,
    /// but so is a reply for `www.example.com.`.
    pub fn resolve_and_remove(&mut self, id: u16, candidate: &str) -> Option<String> {
        let matches = self
            .pending
            .get(&id)
            .is_some_and(|hostname| candidate.contains(hostname.as_str()));

        if matches {
            self.pending.remove(&id)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
