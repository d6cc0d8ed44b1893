//! Remote cursor presence.
//!
//! Last-write-wins per display name. The viewer's own cursor is never kept
//! and never rendered.

use crate::event::CursorUpdate;
use kurbo::Point;
use std::collections::HashMap;

/// Cursor colors, picked per display name.
pub const CURSOR_PALETTE: [&str; 10] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F", "#BB8FCE",
    "#85C1E9",
];

/// Label shown next to a remote cursor.
pub fn cursor_label(display_name: &str) -> String {
    if display_name.is_empty() {
        "Unknown User".to_string()
    } else {
        display_name.replacen("user-", "User ", 1)
    }
}

/// Stable palette color for a display name (FNV-1a over the bytes).
pub fn cursor_color(display_name: &str) -> &'static str {
    let hash = display_name
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| (h ^ b as u64).wrapping_mul(0x0100_0000_01b3));
    CURSOR_PALETTE[(hash % CURSOR_PALETTE.len() as u64) as usize]
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    update: CursorUpdate,
    seen_at: u64,
}

/// Renderable remote cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorView {
    pub display_name: String,
    pub label: String,
    pub photo_ref: Option<String>,
    pub position: Point,
    pub color: &'static str,
}

impl CursorView {
    fn of(update: &CursorUpdate) -> Self {
        Self {
            display_name: update.display_name.clone(),
            label: cursor_label(&update.display_name),
            photo_ref: update.photo_ref.clone(),
            position: update.position(),
            color: cursor_color(&update.display_name),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    local_name: Option<String>,
    cursors: HashMap<String, Entry>,
    /// Entries older than this are dropped; `None` keeps them forever.
    ttl_ms: Option<u64>,
}

impl PresenceTracker {
    pub fn new(local_name: Option<String>, ttl_ms: Option<u64>) -> Self {
        Self {
            local_name,
            cursors: HashMap::new(),
            ttl_ms,
        }
    }

    /// Change who the viewer is. Any cursor already stored for the new
    /// identity is dropped.
    pub fn set_local_name(&mut self, local_name: Option<String>) {
        if let Some(name) = &local_name {
            self.cursors.remove(name);
        }
        self.local_name = local_name;
    }

    fn is_local(&self, display_name: &str) -> bool {
        self.local_name.as_deref() == Some(display_name)
    }

    /// Record an update. Returns false if it was the viewer's own cursor.
    pub fn apply(&mut self, update: CursorUpdate, now: u64) -> bool {
        if self.is_local(&update.display_name) {
            return false;
        }
        self.cursors.insert(
            update.display_name.clone(),
            Entry {
                update,
                seen_at: now,
            },
        );
        true
    }

    /// Drop stale entries. Returns how many were removed.
    pub fn expire(&mut self, now: u64) -> usize {
        let Some(ttl) = self.ttl_ms else {
            return 0;
        };
        let before = self.cursors.len();
        self.cursors.retain(|_, e| now.saturating_sub(e.seen_at) <= ttl);
        let removed = before - self.cursors.len();
        if removed > 0 {
            log::debug!("Expired {} idle cursors", removed);
        }
        removed
    }

    pub fn remove(&mut self, display_name: &str) -> bool {
        self.cursors.remove(display_name).is_some()
    }

    pub fn clear(&mut self) {
        self.cursors.clear();
    }

    pub fn get(&self, display_name: &str) -> Option<&CursorUpdate> {
        self.cursors.get(display_name).map(|e| &e.update)
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    /// Remote cursors to draw, sorted by display name.
    pub fn views(&self) -> Vec<CursorView> {
        let mut views: Vec<CursorView> = self
            .cursors
            .values()
            .filter(|e| !self.is_local(&e.update.display_name))
            .map(|e| CursorView::of(&e.update))
            .collect();
        views.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        views
    }
}
