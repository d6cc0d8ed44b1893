//! Append-only event logs feeding the replay engine.
//!
//! Neither log orders anything; ordering happens per stroke at render time.
//! Each mutation bumps a revision counter so consumers can tell cheaply
//! whether a replay is due.

use crate::event::DrawingEvent;
use std::collections::HashSet;

/// Events received from other clients, plus the history backlog.
#[derive(Debug, Clone)]
pub struct RemoteEventLog {
    events: Vec<DrawingEvent>,
    seen: HashSet<String>,
    dedup: bool,
    revision: u64,
}

impl Default for RemoteEventLog {
    fn default() -> Self {
        Self::new(true)
    }
}

impl RemoteEventLog {
    /// `dedup` drops events whose id was already accepted.
    pub fn new(dedup: bool) -> Self {
        Self {
            events: Vec::new(),
            seen: HashSet::new(),
            dedup,
            revision: 0,
        }
    }

    /// Append a live event. Returns false if it was a duplicate.
    pub fn push(&mut self, event: DrawingEvent) -> bool {
        if self.dedup && !self.seen.insert(event.id.clone()) {
            log::debug!("Ignoring duplicate remote event {}", event.id);
            return false;
        }
        self.events.push(event);
        self.revision += 1;
        true
    }

    /// Insert a history backlog ahead of everything received so far.
    ///
    /// Returns how many events were accepted.
    pub fn load_backlog(&mut self, backlog: impl IntoIterator<Item = DrawingEvent>) -> usize {
        let mut prefix = Vec::new();
        for event in backlog {
            if self.dedup && !self.seen.insert(event.id.clone()) {
                continue;
            }
            prefix.push(event);
        }
        let accepted = prefix.len();
        if accepted > 0 {
            prefix.append(&mut self.events);
            self.events = prefix;
            self.revision += 1;
        }
        log::debug!("Loaded {} backlog events", accepted);
        accepted
    }

    pub fn events(&self) -> &[DrawingEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn dedup_enabled(&self) -> bool {
        self.dedup
    }
}

/// Events produced on this client.
#[derive(Debug, Clone, Default)]
pub struct LocalEventLog {
    events: Vec<DrawingEvent>,
    ids: HashSet<String>,
    revision: u64,
}

impl LocalEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: DrawingEvent) {
        self.ids.insert(event.id.clone());
        self.events.push(event);
        self.revision += 1;
    }

    /// Whether an event with this id was produced locally.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn events(&self) -> &[DrawingEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::event::fixtures::sample;

    #[test]
    fn test_push_appends_in_arrival_order() {
        let mut log = RemoteEventLog::default();
        let a = sample(EventKind::Start, "s", 2, 0.0, 0.0);
        let b = sample(EventKind::Draw, "s", 1, 1.0, 1.0);
        assert!(log.push(a.clone()));
        assert!(log.push(b.clone()));
        assert_eq!(log.events(), &[a, b]);
        assert_eq!(log.revision(), 2);
    }

    #[test]
    fn test_duplicate_ids_dropped() {
        let mut log = RemoteEventLog::new(true);
        let event = sample(EventKind::Start, "s", 1, 0.0, 0.0);
        assert!(log.push(event.clone()));
        assert!(!log.push(event));
        assert_eq!(log.len(), 1);
        assert_eq!(log.revision(), 1);
    }

    #[test]
    fn test_duplicates_kept_without_dedup() {
        let mut log = RemoteEventLog::new(false);
        let event = sample(EventKind::Start, "s", 1, 0.0, 0.0);
        log.push(event.clone());
        log.push(event);
        assert_eq!(log.len(), 2);
        assert!(!log.dedup_enabled());
    }

    #[test]
    fn test_backlog_is_prefix() {
        let mut log = RemoteEventLog::default();
        let live = sample(EventKind::Draw, "s", 30, 3.0, 3.0);
        log.push(live.clone());

        let history = vec![
            sample(EventKind::Start, "s", 10, 1.0, 1.0),
            sample(EventKind::Draw, "s", 20, 2.0, 2.0),
        ];
        assert_eq!(log.load_backlog(history.clone()), 2);
        assert_eq!(log.events(), &[history[0].clone(), history[1].clone(), live]);
    }

    #[test]
    fn test_backlog_overlapping_live_stream() {
        let mut log = RemoteEventLog::default();
        let shared = sample(EventKind::Start, "s", 10, 1.0, 1.0);
        log.push(shared.clone());
        let history = vec![shared, sample(EventKind::End, "s", 20, 1.0, 1.0)];
        assert_eq!(log.load_backlog(history), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_empty_backlog_keeps_revision() {
        let mut log = RemoteEventLog::default();
        assert_eq!(log.load_backlog(Vec::new()), 0);
        assert_eq!(log.revision(), 0);
        assert!(log.is_empty());
    }

    #[test]
    fn test_local_log_tracks_ids() {
        let mut log = LocalEventLog::new();
        let event = sample(EventKind::Start, "s", 1, 0.0, 0.0);
        let id = event.id.clone();
        log.push(event);
        assert!(log.contains(&id));
        assert!(!log.contains("other"));
        assert_eq!(log.len(), 1);
        assert_eq!(log.revision(), 1);
    }
}
