//! Typed annotations pinned to token positions.
//!
//! A bookmark is keyed by the Rust type of its payload, so one position can
//! carry at most one bookmark per payload type. Lookups match the concrete
//! type exactly. The table lives in the document state and is kept in step
//! with every structural or character mutation.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::store::{Position, Site, TokenId};

/// Payload slot. Bookmarks are shared out to callers, so the value is
/// reference counted and type erased.
pub(crate) type BookmarkValue = Arc<dyn std::any::Any + Send + Sync>;

#[derive(Clone)]
pub(crate) struct BookmarkEntry {
    pub site: Site,
    pub key: TypeId,
    pub value: BookmarkValue,
}

#[derive(Default)]
pub(crate) struct BookmarkTable {
    by_token: HashMap<TokenId, Vec<BookmarkEntry>>,
}

impl BookmarkTable {
    /// Install `value` at (`token`, `site`), replacing any bookmark of the
    /// same payload type already present there.
    pub fn set(&mut self, token: TokenId, site: Site, key: TypeId, value: BookmarkValue) {
        let entries = self.by_token.entry(token).or_default();
        if let Some(entry) = entries.iter_mut().find(|e| e.site == site && e.key == key) {
            entry.value = value;
        } else {
            entries.push(BookmarkEntry { site, key, value });
        }
    }

    pub fn get(&self, token: TokenId, site: Site, key: TypeId) -> Option<BookmarkValue> {
        let entries = self.by_token.get(&token)?;
        entries
            .iter()
            .find(|e| e.site == site && e.key == key)
            .map(|e| Arc::clone(&e.value))
    }

    /// Remove the bookmark of payload type `key` at (`token`, `site`).
    /// Returns whether one was present.
    pub fn clear(&mut self, token: TokenId, site: Site, key: TypeId) -> bool {
        let Some(entries) = self.by_token.get_mut(&token) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| !(e.site == site && e.key == key));
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.by_token.remove(&token);
        }
        removed
    }

    /// Drop every bookmark anchored on `token`.
    pub fn remove_token(&mut self, token: TokenId) {
        self.by_token.remove(&token);
    }

    /// Detach every bookmark anchored on `token`, handing the entries to the
    /// caller. Used when tokens migrate to another document.
    pub fn take_token(&mut self, token: TokenId) -> Vec<BookmarkEntry> {
        self.by_token.remove(&token).unwrap_or_default()
    }

    pub fn insert_entries(&mut self, token: TokenId, entries: Vec<BookmarkEntry>) {
        if entries.is_empty() {
            return;
        }
        self.by_token.entry(token).or_default().extend(entries);
    }

    /// Every position carrying a bookmark of payload type `key`, in no
    /// particular order.
    pub fn positions_with_key(&self, key: TypeId) -> Vec<Position> {
        let mut out = Vec::new();
        for (&token, entries) in &self.by_token {
            for entry in entries {
                if entry.key == key {
                    out.push(Position {
                        token,
                        site: entry.site,
                    });
                }
            }
        }
        out
    }

    /// Characters inserted into `token`'s run at byte `at`. Bookmarks at or
    /// past the insertion point stay anchored to the characters they were
    /// set against, so their offsets grow by `n`.
    pub fn shift_for_insert(&mut self, token: TokenId, at: usize, n: usize) {
        let Some(entries) = self.by_token.get_mut(&token) else {
            return;
        };
        for entry in entries {
            if let Some(off) = text_offset(entry.site) {
                if off >= at {
                    entry.site = text_site(off + n);
                }
            }
        }
    }

    /// Characters removed from `token`'s run at bytes [`at`, `at + n`).
    /// Bookmarks strictly inside the removed span are destroyed, bookmarks
    /// past it shift left.
    pub fn fix_for_remove(&mut self, token: TokenId, at: usize, n: usize) {
        let Some(entries) = self.by_token.get_mut(&token) else {
            return;
        };
        entries.retain_mut(|entry| {
            let Some(off) = text_offset(entry.site) else {
                return true;
            };
            if off <= at {
                true
            } else if off >= at + n {
                entry.site = text_site(off - n);
                true
            } else {
                false
            }
        });
        if entries.is_empty() {
            self.by_token.remove(&token);
        }
    }

    /// `token`'s run was split at byte `at`; the suffix now lives on
    /// `suffix`. Bookmarks at or past the split move with their characters.
    pub fn rekey_split(&mut self, token: TokenId, at: usize, suffix: TokenId) {
        let Some(entries) = self.by_token.get_mut(&token) else {
            return;
        };
        let mut moved = Vec::new();
        entries.retain_mut(|entry| {
            let Some(off) = text_offset(entry.site) else {
                return true;
            };
            if off < at {
                return true;
            }
            let mut entry = entry.clone();
            entry.site = text_site(off - at);
            moved.push(entry);
            false
        });
        if entries.is_empty() {
            self.by_token.remove(&token);
        }
        self.insert_entries(suffix, moved);
    }

    /// `absorbed`'s run was appended onto `into`, whose original length was
    /// `base`. Bookmarks follow their characters into the merged token.
    pub fn rekey_merge(&mut self, absorbed: TokenId, into: TokenId, base: usize) {
        let mut moved = self.take_token(absorbed);
        for entry in &mut moved {
            let off = text_offset(entry.site).unwrap_or(0);
            entry.site = text_site(base + off);
        }
        self.insert_entries(into, moved);
    }

    /// Text sites are interior only; entries left at offset `len` after a
    /// tail removal move to `after`, the position just past the run.
    pub fn renormalize_tail(&mut self, token: TokenId, len: usize, after: Position) {
        if len == 0 {
            return;
        }
        let Some(entries) = self.by_token.get_mut(&token) else {
            return;
        };
        let mut moved = Vec::new();
        entries.retain(|entry| {
            if text_offset(entry.site) == Some(len) {
                moved.push(entry.clone());
                false
            } else {
                true
            }
        });
        if entries.is_empty() {
            self.by_token.remove(&token);
        }
        for entry in moved {
            self.set(after.token, after.site, entry.key, entry.value);
        }
    }
}

/// Byte offset a site stands for within a token's run, when it stands for
/// one at all. End sites do not address characters.
pub(crate) fn text_offset(site: Site) -> Option<usize> {
    match site {
        Site::Token => Some(0),
        Site::Text(off) => Some(off),
        Site::End => None,
    }
}

/// Canonical site for a byte offset; offset zero is the token site itself.
pub(crate) fn text_site(off: usize) -> Site {
    if off == 0 {
        Site::Token
    } else {
        Site::Text(off)
    }
}

// ===== Tests =====
