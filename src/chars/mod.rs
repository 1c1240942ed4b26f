//! Character storage: structurally-shared text with cheap splice/remove
//!
//! Text lives in three source shapes:
//! - `Str`: immutable shared string (parsed input, flattened results)
//! - `Buf`: shared append buffer for freshly typed text
//! - `Join`: two concatenated ranges, sharing both operands
//!
//! A `CharRun` is an (offset, length) view of one source. Splicing and
//! removing build new runs in O(1) by composing joins instead of copying;
//! reads walk the join tree with an explicit worklist, never recursion, and
//! join depth is capped at `MAX_JOIN_DEPTH` by flattening, so repeated tiny
//! edits cannot build a pathologically deep tree.
//!
//! Offsets are byte offsets into UTF-8 text and always sit on `char`
//! boundaries; the cursor layer guarantees this by moving in whole chars.

mod buffer;

pub use buffer::CharBuffer;

use std::sync::Arc;

/// Join trees deeper than this are flattened into a single `Str` source.
pub const MAX_JOIN_DEPTH: u16 = 32;

/// One of the three storage shapes text can live in.
#[derive(Debug, Clone)]
pub enum CharSource {
    /// Immutable shared text
    Str(Arc<str>),
    /// Shared append buffer (grows, never shrinks)
    Buf(Arc<CharBuffer>),
    /// Concatenation of two ranges
    Join(Arc<JoinNode>),
}

/// Binary concatenation node; both sides are full runs of their own sources.
#[derive(Debug)]
pub struct JoinNode {
    pub left: CharRun,
    pub right: CharRun,
    /// 1 + max depth of the two sides
    pub depth: u16,
}

/// An (offset, length) view of a character source.
#[derive(Debug, Clone)]
pub struct CharRun {
    pub src: CharSource,
    pub off: usize,
    pub len: usize,
}

impl CharSource {
    /// Total addressable length of this source in bytes.
    pub fn total_len(&self) -> usize {
        match self {
            CharSource::Str(s) => s.len(),
            CharSource::Buf(b) => b.len(),
            CharSource::Join(j) => j.left.len + j.right.len,
        }
    }

    #[inline]
    fn depth(&self) -> u16 {
        match self {
            CharSource::Str(_) | CharSource::Buf(_) => 0,
            CharSource::Join(j) => j.depth,
        }
    }

    /// Identity comparison: same allocation, not same content.
    pub fn same_as(&self, other: &CharSource) -> bool {
        match (self, other) {
            (CharSource::Str(a), CharSource::Str(b)) => Arc::ptr_eq(a, b),
            (CharSource::Buf(a), CharSource::Buf(b)) => Arc::ptr_eq(a, b),
            (CharSource::Join(a), CharSource::Join(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Join two runs, flattening when the result would exceed `MAX_JOIN_DEPTH`.
///
/// Zero-length sides never produce a join node.
pub fn join(left: CharRun, right: CharRun) -> CharRun {
    if left.len == 0 {
        return right;
    }
    if right.len == 0 {
        return left;
    }
    let depth = left.depth().max(right.depth()) + 1;
    let len = left.len + right.len;
    if depth > MAX_JOIN_DEPTH {
        let mut flat = String::with_capacity(len);
        left.write_to(&mut flat);
        right.write_to(&mut flat);
        return CharRun::from(flat);
    }
    CharRun {
        src: CharSource::Join(Arc::new(JoinNode { left, right, depth })),
        off: 0,
        len,
    }
}

/// Commit freshly-typed text into `buffer`, combined with prior accumulated
/// content. Adjacent tail ranges of the same buffer coalesce into one
/// contiguous range instead of a join.
pub fn save(buffer: &Arc<CharBuffer>, prev: Option<CharRun>, text: &str) -> CharRun {
    buffer.append(prev, text)
}

impl CharRun {
    /// The canonical empty run.
    pub fn empty() -> CharRun {
        CharRun {
            src: CharSource::Str(Arc::from("")),
            off: 0,
            len: 0,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn depth(&self) -> u16 {
        self.src.depth()
    }

    /// Bounds check over the whole tree. Runs iteratively; every join's
    /// constituent runs are checked against their own sources.
    pub fn is_valid(&self) -> bool {
        let mut stack: Vec<CharRun> = vec![self.clone()];
        while let Some(run) = stack.pop() {
            if run.off + run.len > run.src.total_len() {
                return false;
            }
            if let CharSource::Join(j) = &run.src {
                stack.push(j.left.clone());
                stack.push(j.right.clone());
            }
        }
        true
    }

    /// Narrow this view. No node is created; only the bounds change.
    pub fn substr(&self, off: usize, len: usize) -> CharRun {
        debug_assert!(off + len <= self.len);
        CharRun {
            src: self.src.clone(),
            off: self.off + off,
            len,
        }
    }

    /// Visit the text of this run left to right as string segments.
    /// The callback returns `false` to stop early.
    pub fn visit_segments<F: FnMut(&str) -> bool>(&self, mut f: F) {
        debug_assert!(self.is_valid());
        let mut stack: Vec<CharRun> = vec![self.clone()];
        while let Some(run) = stack.pop() {
            if run.len == 0 {
                continue;
            }
            match &run.src {
                CharSource::Str(s) => {
                    if !f(&s[run.off..run.off + run.len]) {
                        return;
                    }
                }
                CharSource::Buf(b) => {
                    if !b.with_slice(run.off, run.len, &mut f) {
                        return;
                    }
                }
                CharSource::Join(j) => {
                    // narrow the view onto the two sides; right is pushed
                    // first so left pops first
                    let left_len = j.left.len;
                    if run.off + run.len <= left_len {
                        stack.push(j.left.substr(run.off, run.len));
                    } else if run.off >= left_len {
                        stack.push(j.right.substr(run.off - left_len, run.len));
                    } else {
                        let take_left = left_len - run.off;
                        stack.push(j.right.substr(0, run.len - take_left));
                        stack.push(j.left.substr(run.off, take_left));
                    }
                }
            }
        }
    }

    /// Append the full text of this run to `out`.
    pub fn write_to(&self, out: &mut String) {
        self.visit_segments(|seg| {
            out.push_str(seg);
            true
        });
    }

    /// Materialize the full text of this run.
    pub fn to_string_value(&self) -> String {
        let mut out = String::with_capacity(self.len);
        self.write_to(&mut out);
        out
    }

    /// Number of `char`s in this run.
    pub fn count_chars(&self) -> usize {
        let mut n = 0;
        self.visit_segments(|seg| {
            n += seg.chars().count();
            true
        });
        n
    }

    /// Move forward from byte offset `from` by up to `want` chars.
    /// Returns the new byte offset and the chars actually moved.
    pub fn advance_chars(&self, from: usize, want: usize) -> (usize, usize) {
        debug_assert!(from <= self.len);
        if want == 0 || from >= self.len {
            return (from, 0);
        }
        let mut moved = 0;
        let mut byte = from;
        self.substr(from, self.len - from).visit_segments(|seg| {
            for c in seg.chars() {
                if moved == want {
                    return false;
                }
                moved += 1;
                byte += c.len_utf8();
            }
            moved < want
        });
        (byte, moved)
    }

    /// Move backward from byte offset `from` by up to `want` chars.
    /// Returns the new byte offset and the chars actually moved.
    pub fn retreat_chars(&self, from: usize, want: usize) -> (usize, usize) {
        debug_assert!(from <= self.len);
        if want == 0 || from == 0 {
            return (from, 0);
        }
        let prefix = self.substr(0, from).to_string_value();
        let mut moved = 0;
        let mut byte = from;
        for c in prefix.chars().rev() {
            if moved == want {
                break;
            }
            moved += 1;
            byte -= c.len_utf8();
        }
        (byte, moved)
    }

    /// Splice `ins` into this run at byte offset `at`.
    ///
    /// Zero-length insert returns the original unchanged; edge positions
    /// build a single join; interior positions build join(join(left, ins),
    /// right). All O(1) short of a depth-triggered flatten.
    pub fn splice(&self, at: usize, ins: &CharRun) -> CharRun {
        debug_assert!(self.is_valid() && ins.is_valid());
        debug_assert!(at <= self.len);
        if ins.len == 0 {
            return self.clone();
        }
        if self.len == 0 {
            return ins.clone();
        }
        if at == 0 {
            return ins.concat(self);
        }
        if at == self.len {
            return self.concat(ins);
        }
        let left = self.substr(0, at);
        let right = self.substr(at, self.len - at);
        join(join(left, ins.clone()), right)
    }

    /// Remove `n` bytes at byte offset `at`.
    ///
    /// Full removal yields the empty run; prefix/suffix removal yields a
    /// trimmed view of the same source; interior removal joins the two
    /// remaining parts.
    pub fn remove_range(&self, at: usize, n: usize) -> CharRun {
        debug_assert!(self.is_valid());
        debug_assert!(at + n <= self.len);
        if n == 0 {
            return self.clone();
        }
        if n == self.len {
            return CharRun::empty();
        }
        if at == 0 {
            return self.substr(n, self.len - n);
        }
        if at + n == self.len {
            return self.substr(0, at);
        }
        join(self.substr(0, at), self.substr(at + n, self.len - at - n))
    }

    /// Extend this view over `next` when the two are adjacent ranges of the
    /// same source; otherwise `None`.
    pub fn followed_by(&self, next: &CharRun) -> Option<CharRun> {
        if self.src.same_as(&next.src) && self.off + self.len == next.off {
            return Some(CharRun {
                src: self.src.clone(),
                off: self.off,
                len: self.len + next.len,
            });
        }
        None
    }

    /// Concatenate two runs, preferring view extension over a join node.
    pub fn concat(&self, next: &CharRun) -> CharRun {
        if let Some(merged) = self.followed_by(next) {
            return merged;
        }
        join(self.clone(), next.clone())
    }
}

impl From<&str> for CharRun {
    fn from(s: &str) -> CharRun {
        CharRun {
            off: 0,
            len: s.len(),
            src: CharSource::Str(Arc::from(s)),
        }
    }
}

impl From<String> for CharRun {
    fn from(s: String) -> CharRun {
        CharRun {
            off: 0,
            len: s.len(),
            src: CharSource::Str(Arc::from(s)),
        }
    }
}
