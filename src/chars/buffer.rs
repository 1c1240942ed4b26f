//! Shared append buffer for interactively accumulated text
//!
//! Runs handed out by `append` reference (offset, length) ranges of the
//! buffer. The buffer only ever grows, so committed ranges stay valid for
//! the life of the buffer and many runs can share one allocation.

use std::sync::{Arc, Mutex};

use super::{join, CharRun, CharSource};

/// Append-only text buffer shared by every run that points into it.
#[derive(Debug, Default)]
pub struct CharBuffer {
    text: Mutex<String>,
}

impl CharBuffer {
    pub fn new() -> Arc<CharBuffer> {
        Arc::new(CharBuffer::default())
    }

    /// Committed length in bytes.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `text`, combining it with `prev` when given.
    ///
    /// When `prev` is the current tail of this same buffer the run is
    /// extended in place instead of creating a join, so text accumulated one
    /// keystroke at a time stays a single contiguous range.
    pub fn append(self: &Arc<Self>, prev: Option<CharRun>, text: &str) -> CharRun {
        let mut guard = self.lock();
        let end = guard.len();

        if let Some(prev_run) = &prev {
            if let CharSource::Buf(owner) = &prev_run.src {
                if Arc::ptr_eq(owner, self) && prev_run.off + prev_run.len == end {
                    guard.push_str(text);
                    return CharRun {
                        src: prev_run.src.clone(),
                        off: prev_run.off,
                        len: prev_run.len + text.len(),
                    };
                }
            }
        }

        guard.push_str(text);
        // join() may read back through this buffer while flattening, so the
        // guard must be released first
        drop(guard);

        let fresh = CharRun {
            src: CharSource::Buf(Arc::clone(self)),
            off: end,
            len: text.len(),
        };
        match prev {
            Some(prev_run) if prev_run.len > 0 => join(prev_run, fresh),
            _ => fresh,
        }
    }

    /// Run `f` on the requested committed range while the buffer is held.
    pub(super) fn with_slice<F: FnMut(&str) -> bool>(
        &self,
        off: usize,
        len: usize,
        f: &mut F,
    ) -> bool {
        let guard = self.lock();
        f(&guard[off..off + len])
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, String> {
        self.text.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
