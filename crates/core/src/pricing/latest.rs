use std::collections::HashMap;
use std::hash::Hash;

/// Token handed out when an asynchronous request is issued for a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

impl Ticket {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Per-key supersede tracker: only the most recently issued ticket for a key
/// may be settled. Results carrying an older ticket are stale and must be
/// dropped by the caller.
///
/// Tickets come from one counter shared by all keys, so a ticket is never
/// reissued even after its key is forgotten.
#[derive(Debug)]
pub struct LatestOnly<K> {
    issued: HashMap<K, Ticket>,
    counter: u64,
}

impl<K> Default for LatestOnly<K> {
    fn default() -> Self {
        Self { issued: HashMap::new(), counter: 0 }
    }
}

impl<K: Eq + Hash> LatestOnly<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a new ticket for `key`, superseding any ticket still in flight.
    pub fn issue(&mut self, key: K) -> Ticket {
        self.counter += 1;
        let ticket = Ticket(self.counter);
        self.issued.insert(key, ticket);
        ticket
    }

    pub fn is_current(&self, key: &K, ticket: Ticket) -> bool {
        self.issued.get(key) == Some(&ticket)
    }

    /// Consumes `ticket` if it is the newest one for `key`. Returns whether the
    /// caller may apply its result.
    pub fn settle(&mut self, key: &K, ticket: Ticket) -> bool {
        if self.is_current(key, ticket) {
            self.issued.remove(key);
            true
        } else {
            false
        }
    }

    pub fn in_flight(&self, key: &K) -> bool {
        self.issued.contains_key(key)
    }

    pub fn forget(&mut self, key: &K) {
        self.issued.remove(key);
    }

    pub fn pending(&self) -> usize {
        self.issued.len()
    }
}

#[cfg(test)]
mod tests {
    use super::LatestOnly;

    #[test]
    fn newer_ticket_supersedes_older_one() {
        let mut latest = LatestOnly::new();
        let first = latest.issue("line-1");
        let second = latest.issue("line-1");

        assert!(!latest.is_current(&"line-1", first));
        assert!(latest.settle(&"line-1", second));
        assert!(!latest.settle(&"line-1", first));
    }

    #[test]
    fn keys_are_tracked_independently() {
        let mut latest = LatestOnly::new();
        let a = latest.issue("a");
        let b = latest.issue("b");

        assert!(latest.settle(&"b", b));
        assert!(latest.settle(&"a", a));
        assert_eq!(latest.pending(), 0);
    }

    #[test]
    fn settling_consumes_the_ticket() {
        let mut latest = LatestOnly::new();
        let ticket = latest.issue(7_u64);

        assert!(latest.in_flight(&7));
        assert!(latest.settle(&7, ticket));
        assert!(!latest.in_flight(&7));
        assert!(!latest.settle(&7, ticket));
    }

    #[test]
    fn forgotten_key_rejects_late_results() {
        let mut latest = LatestOnly::new();
        let ticket = latest.issue(3_u64);
        latest.forget(&3);

        assert!(!latest.settle(&3, ticket));
        let reissued = latest.issue(3);
        assert!(reissued > ticket);
    }
}
