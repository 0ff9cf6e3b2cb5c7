//! Ephemeral user-facing notifications.
//!
//! Entries expire after a fixed display time. Expiry is an explicit sweep
//! against a caller-supplied clock instead of a fire-and-forget timer, so
//! tests can drive time deterministically.

use std::time::{Duration, Instant};

/// How long a notification stays visible, matching the original client's
/// 4 second toast duration.
pub const DISPLAY_TIME: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub id: u64,
    pub message: String,
    pub severity: Severity,
    pub created_at: Instant,
}

#[derive(Debug)]
pub struct NotificationQueue {
    next_id: u64,
    ttl: Duration,
    entries: Vec<Notification>,
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::with_ttl(DISPLAY_TIME)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        NotificationQueue {
            next_id: 0,
            ttl,
            entries: Vec::new(),
        }
    }

    /// Appends a notification and returns its id. Ids increase monotonically
    /// for the lifetime of the queue.
    pub fn push(&mut self, message: impl Into<String>, severity: Severity) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.push(Notification {
            id,
            message: message.into(),
            severity,
            created_at: Instant::now(),
        });
        id
    }

    /// Removes a notification before its display time is up.
    pub fn dismiss(&mut self, id: u64) {
        self.entries.retain(|n| n.id != id);
    }

    /// Drops every entry older than the display time as of `now`.
    pub fn sweep_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|n| now.duration_since(n.created_at) < ttl);
    }

    pub fn entries(&self) -> &[Notification] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_assigns_increasing_ids() {
        let mut queue = NotificationQueue::new();
        let first = queue.push("one", Severity::Info);
        let second = queue.push("two", Severity::Error);
        assert!(second > first);
        assert_eq!(queue.entries().len(), 2);
        assert_eq!(queue.entries()[0].message, "one");
    }

    #[test]
    fn test_dismiss_removes_single_entry() {
        let mut queue = NotificationQueue::new();
        let id = queue.push("gone", Severity::Info);
        queue.push("stays", Severity::Success);
        queue.dismiss(id);
        assert_eq!(queue.entries().len(), 1);
        assert_eq!(queue.entries()[0].message, "stays");
    }

    #[test]
    fn test_sweep_expires_old_entries_only() {
        let mut queue = NotificationQueue::with_ttl(Duration::from_secs(4));
        queue.push("old", Severity::Info);

        let now = Instant::now();
        queue.sweep_expired(now + Duration::from_secs(5));
        assert!(queue.is_empty());

        queue.push("fresh", Severity::Info);
        queue.sweep_expired(Instant::now());
        assert_eq!(queue.entries().len(), 1);
    }
}
