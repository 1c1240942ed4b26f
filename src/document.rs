//! Document handles and shared per-document state.
//!
//! A `Document` is a cheap cloneable handle onto one shared store: the token
//! arena, the append buffer for typed text, the registries of live cursors
//! and bookmarks, and a change counter. Every entry point funnels through the
//! per-document monitor, so callers serialize on the whole document rather
//! than on individual tokens. Documents built in no-sync mode skip blocking
//! and treat contention as a caller bug.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use tracing::debug;

use lru::LruCache;

use crate::chars::CharBuffer;
use crate::cursor::bookmark::{text_offset, text_site, BookmarkTable};
use crate::cursor::selection::SelectionSet;
use crate::cursor::Cursor;
use crate::error::{CursorError, CursorResult, ParseError};
use crate::path::PathExpr;
use crate::store::{Position, QName, TokenArena, TokenId, TokenKind};

static NEXT_DOC_UID: AtomicU64 = AtomicU64::new(1);

fn next_uid() -> u64 {
    NEXT_DOC_UID.fetch_add(1, AtomicOrdering::Relaxed)
}

/// How a document guards its shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Every entry locks the document monitor; safe for concurrent use.
    #[default]
    Sync,
    /// Entries never block. Two threads entering at once panics instead of
    /// corrupting the store.
    NoSync,
}

/// Construction-time settings for a document.
#[derive(Debug, Clone)]
pub struct DocumentOptions {
    pub sync: SyncMode,
    /// Allow multiple top level elements and bare top level text.
    pub fragment: bool,
    /// Keep namespace declarations ahead of attributes when inserting into
    /// the attribute area.
    pub ns_decls_first: bool,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        DocumentOptions {
            sync: SyncMode::Sync,
            fragment: false,
            ns_decls_first: true,
        }
    }
}

// ===== Shared state =====

/// State behind the document monitor.
pub(crate) struct DocState {
    pub arena: TokenArena,
    /// Append buffer for text entered through the API, shared by every run
    /// it produced.
    pub buffer: Arc<CharBuffer>,
    /// Monotonic mutation counter backing change stamps.
    pub version: u64,
    pub cursors: CursorTable,
    pub bookmarks: BookmarkTable,
    /// Parsed path expressions, keyed by expression text.
    pub path_cache: LruCache<String, Arc<PathExpr>>,
    pub fragment: bool,
    pub ns_decls_first: bool,
}

impl DocState {
    fn new(arena: TokenArena, options: &DocumentOptions) -> DocState {
        DocState {
            arena,
            buffer: CharBuffer::new(),
            version: 0,
            cursors: CursorTable::default(),
            bookmarks: BookmarkTable::default(),
            path_cache: crate::path::new_expr_cache(),
            fragment: options.fragment,
            ns_decls_first: options.ns_decls_first,
        }
    }

    /// Record one mutation.
    pub fn bump(&mut self) {
        self.version += 1;
    }

    /// Tokens in `removed` have been unlinked; every position referring to
    /// them floats to `landing`, the spot the removed range used to occupy.
    /// Bookmarks on removed tokens are destroyed.
    pub fn on_removed(&mut self, removed: &HashSet<TokenId>, landing: Position) {
        for rec in self.cursors.iter_mut() {
            for pos in rec.positions_mut() {
                if removed.contains(&pos.token) {
                    *pos = landing;
                }
            }
        }
        for &id in removed {
            self.bookmarks.remove_token(id);
        }
    }

    /// `n` bytes were inserted into `token`'s run at byte `at`. Positions at
    /// or past the insertion point stay anchored to the characters they were
    /// set against, so their offsets grow.
    pub fn on_text_inserted(&mut self, token: TokenId, at: usize, n: usize) {
        if n == 0 {
            return;
        }
        for rec in self.cursors.iter_mut() {
            for pos in rec.positions_mut() {
                if pos.token != token {
                    continue;
                }
                if let Some(off) = text_offset(pos.site) {
                    if off >= at {
                        pos.site = text_site(off + n);
                    }
                }
            }
        }
        self.bookmarks.shift_for_insert(token, at, n);
    }

    /// Bytes [`at`, `at + n`) were removed from `token`'s run, which still
    /// exists. Positions inside the removed span collapse to the removal
    /// point; positions past it shift left. A position left at the new end
    /// of the run renormalizes to the spot just past the token, since text
    /// sites are interior only.
    pub fn on_text_removed(&mut self, token: TokenId, at: usize, n: usize) {
        if n == 0 {
            return;
        }
        let end = self.arena.value(token).map_or(0, |run| run.len);
        let after = self
            .arena
            .after_subtree(token)
            .unwrap_or_else(Position::end_doc);
        for rec in self.cursors.iter_mut() {
            for pos in rec.positions_mut() {
                if pos.token != token {
                    continue;
                }
                let Some(off) = text_offset(pos.site) else {
                    continue;
                };
                let new = if off >= at + n {
                    off - n
                } else if off > at {
                    at
                } else {
                    off
                };
                if new == end {
                    *pos = after;
                } else if new != off {
                    pos.site = text_site(new);
                }
            }
        }
        self.bookmarks.fix_for_remove(token, at, n);
        self.bookmarks.renormalize_tail(token, end, after);
    }

    /// `token`'s run was split at byte `at` and the suffix now lives on
    /// `suffix`. Positions at or past the split follow their characters.
    pub fn on_text_split(&mut self, token: TokenId, at: usize, suffix: TokenId) {
        for rec in self.cursors.iter_mut() {
            for pos in rec.positions_mut() {
                if pos.token != token {
                    continue;
                }
                if let Some(off) = text_offset(pos.site) {
                    if off >= at {
                        pos.token = suffix;
                        pos.site = text_site(off - at);
                    }
                }
            }
        }
        self.bookmarks.rekey_split(token, at, suffix);
    }

    /// `absorbed`'s run was appended onto `into`, whose length was `base`
    /// beforehand. Positions on the absorbed token follow their characters.
    pub fn on_text_merged(&mut self, absorbed: TokenId, into: TokenId, base: usize) {
        for rec in self.cursors.iter_mut() {
            for pos in rec.positions_mut() {
                if pos.token != absorbed {
                    continue;
                }
                let off = text_offset(pos.site).unwrap_or(0);
                pos.token = into;
                pos.site = text_site(base + off);
            }
        }
        self.bookmarks.rekey_merge(absorbed, into, base);
    }
}

/// The store one or more `Document` handles point at.
pub(crate) struct DocShared {
    pub uid: u64,
    mode: SyncMode,
    state: Mutex<DocState>,
}

impl DocShared {
    /// Enter the document monitor.
    pub fn enter(&self) -> MutexGuard<'_, DocState> {
        match self.mode {
            SyncMode::Sync => self.state.lock().unwrap_or_else(|e| e.into_inner()),
            SyncMode::NoSync => match self.state.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::WouldBlock) => {
                    panic!("no-sync document entered from two threads at once")
                }
                Err(TryLockError::Poisoned(e)) => e.into_inner(),
            },
        }
    }
}

/// Enter two documents' monitors without risking deadlock against a caller
/// doing the same in the opposite order. Guards come back in argument order.
pub(crate) fn enter_pair<'a>(
    a: &'a DocShared,
    b: &'a DocShared,
) -> (MutexGuard<'a, DocState>, MutexGuard<'a, DocState>) {
    debug_assert_ne!(a.uid, b.uid);
    if a.uid < b.uid {
        let ga = a.enter();
        let gb = b.enter();
        (ga, gb)
    } else {
        let gb = b.enter();
        let ga = a.enter();
        (ga, gb)
    }
}

// ===== Cursor registry =====

/// Per-cursor state held inside the document, so that mutations made through
/// any handle can fix up every live cursor in one pass.
pub(crate) struct CursorRecord {
    pub pos: Position,
    pub stack: Vec<Position>,
    pub selection: SelectionSet,
}

impl CursorRecord {
    pub fn at(pos: Position) -> CursorRecord {
        CursorRecord {
            pos,
            stack: Vec::new(),
            selection: SelectionSet::default(),
        }
    }

    /// Every position this cursor holds: its own, its saved stack, and its
    /// selection (including a pending select's origin).
    pub fn positions_mut(&mut self) -> impl Iterator<Item = &mut Position> {
        std::iter::once(&mut self.pos)
            .chain(self.stack.iter_mut())
            .chain(self.selection.positions_mut())
    }
}

/// Slot table of live cursors. Slots are reused; a cursor handle owns its
/// slot until disposed, so stale indexes cannot occur.
#[derive(Default)]
pub(crate) struct CursorTable {
    slots: Vec<Option<CursorRecord>>,
    free: Vec<u32>,
}

impl CursorTable {
    pub fn insert(&mut self, rec: CursorRecord) -> u32 {
        if let Some(slot) = self.free.pop() {
            self.slots[slot as usize] = Some(rec);
            slot
        } else {
            self.slots.push(Some(rec));
            (self.slots.len() - 1) as u32
        }
    }

    pub fn remove(&mut self, slot: u32) -> Option<CursorRecord> {
        let rec = self.slots.get_mut(slot as usize)?.take();
        if rec.is_some() {
            self.free.push(slot);
        }
        rec
    }

    pub fn get(&self, slot: u32) -> Option<&CursorRecord> {
        self.slots.get(slot as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, slot: u32) -> Option<&mut CursorRecord> {
        self.slots.get_mut(slot as usize)?.as_mut()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CursorRecord> {
        self.slots.iter_mut().filter_map(|s| s.as_mut())
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

// ===== Public handles =====

/// Handle onto one shared document store. Clones observe and mutate the same
/// tokens.
#[derive(Clone)]
pub struct Document {
    pub(crate) shared: Arc<DocShared>,
}

impl Document {
    /// An empty synchronized document holding only its start token.
    pub fn new() -> Document {
        Document::with_options(DocumentOptions::default())
    }

    pub fn with_options(options: DocumentOptions) -> Document {
        Document::assemble(TokenArena::new(), &options)
    }

    /// Parse `text` into a fresh synchronized document.
    pub fn parse(text: &str) -> Result<Document, ParseError> {
        Document::parse_with(text, DocumentOptions::default())
    }

    pub fn parse_with(text: &str, options: DocumentOptions) -> Result<Document, ParseError> {
        let arena = crate::parse::parse_document(text, options.fragment)?;
        let doc = Document::assemble(arena, &options);
        debug!(
            uid = doc.shared.uid,
            bytes = text.len(),
            tokens = doc.shared.enter().arena.live_count(),
            "parsed document"
        );
        Ok(doc)
    }

    fn assemble(arena: TokenArena, options: &DocumentOptions) -> Document {
        Document {
            shared: Arc::new(DocShared {
                uid: next_uid(),
                mode: options.sync,
                state: Mutex::new(DocState::new(arena, options)),
            }),
        }
    }

    /// Open a new cursor at the document start.
    pub fn cursor(&self) -> Cursor {
        Cursor::open(Arc::clone(&self.shared))
    }

    /// Capture the document's current change stamp.
    pub fn change_stamp(&self) -> ChangeStamp {
        let value = self.shared.enter().version;
        ChangeStamp {
            shared: Arc::clone(&self.shared),
            value,
        }
    }

    /// Serialize the whole document.
    pub fn xml_text(&self) -> String {
        let state = self.shared.enter();
        crate::serialize::save_document(&state.arena)
    }

    /// Whether `other` is a handle onto the same store.
    pub fn same_document(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("uid", &self.shared.uid)
            .field("mode", &self.shared.mode)
            .finish()
    }
}

/// Point-in-time marker for one document. `has_changed` reports whether any
/// mutation landed after the stamp was taken.
#[derive(Clone)]
pub struct ChangeStamp {
    shared: Arc<DocShared>,
    value: u64,
}

impl ChangeStamp {
    pub(crate) fn capture(shared: &Arc<DocShared>, value: u64) -> ChangeStamp {
        ChangeStamp {
            shared: Arc::clone(shared),
            value,
        }
    }

    pub fn has_changed(&self) -> bool {
        self.shared.enter().version != self.value
    }
}

impl fmt::Debug for ChangeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeStamp")
            .field("doc", &self.shared.uid)
            .field("value", &self.value)
            .finish()
    }
}

/// Pinned reference to one token's value, handed out to typed consumers.
/// The handle goes stale the moment its token leaves the document; stale
/// reads fail with a disconnected error rather than seeing ghost content.
pub struct ValueHandle {
    shared: Arc<DocShared>,
    token: TokenId,
    gen: u32,
}

impl ValueHandle {
    pub(crate) fn pin(shared: Arc<DocShared>, token: TokenId, gen: u32) -> ValueHandle {
        ValueHandle { shared, token, gen }
    }

    pub fn is_connected(&self) -> bool {
        let state = self.shared.enter();
        state.arena.is_live(self.token) && state.arena.generation(self.token) == self.gen
    }

    fn entered(&self) -> CursorResult<MutexGuard<'_, DocState>> {
        let state = self.shared.enter();
        if state.arena.is_live(self.token) && state.arena.generation(self.token) == self.gen {
            Ok(state)
        } else {
            Err(CursorError::Disconnected)
        }
    }

    pub fn kind(&self) -> CursorResult<TokenKind> {
        Ok(self.entered()?.arena.kind(self.token))
    }

    pub fn name(&self) -> CursorResult<Option<QName>> {
        Ok(self.entered()?.arena.name(self.token).cloned())
    }

    /// Logical text of the pinned token, per the container value rules.
    pub fn text(&self) -> CursorResult<String> {
        Ok(self.entered()?.arena.collect_text(self.token))
    }
}

impl fmt::Debug for ValueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueHandle")
            .field("doc", &self.shared.uid)
            .field("token", &self.token)
            .finish()
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chars::CharRun;
    use crate::store::{Site, TokenData, ROOT};
    use std::thread;

    fn seeded_doc() -> (Document, TokenId, TokenId) {
        let doc = Document::new();
        let (elem, text) = {
            let mut state = doc.shared.enter();
            let elem = state.arena.alloc(TokenData::element(QName::local_only("a")));
            state.arena.link_before(ROOT, None, elem);
            let text = state.arena.alloc(TokenData::text(CharRun::from("hello")));
            state.arena.link_before(elem, None, text);
            (elem, text)
        };
        (doc, elem, text)
    }

    #[test]
    fn test_documents_get_distinct_uids() {
        let a = Document::new();
        let b = Document::new();
        assert_ne!(a.shared.uid, b.shared.uid);
        assert!(a.same_document(&a.clone()));
        assert!(!a.same_document(&b));
    }

    #[test]
    fn test_change_stamp_tracks_mutations() {
        let doc = Document::new();
        let stamp = doc.change_stamp();
        assert!(!stamp.has_changed());
        doc.shared.enter().bump();
        assert!(stamp.has_changed());

        let later = doc.change_stamp();
        assert!(!later.has_changed());
    }

    #[test]
    fn test_cursor_table_reuses_slots() {
        let mut table = CursorTable::default();
        let a = table.insert(CursorRecord::at(Position::start_doc()));
        let b = table.insert(CursorRecord::at(Position::start_doc()));
        assert_ne!(a, b);
        assert_eq!(table.live_count(), 2);

        assert!(table.remove(a).is_some());
        assert!(table.remove(a).is_none());
        let c = table.insert(CursorRecord::at(Position::start_doc()));
        assert_eq!(c, a);
        assert_eq!(table.live_count(), 2);
    }

    #[test]
    fn test_value_handle_disconnects() {
        let (doc, elem, text) = seeded_doc();
        let gen = doc.shared.enter().arena.generation(text);
        let handle = ValueHandle::pin(Arc::clone(&doc.shared), text, gen);

        assert!(handle.is_connected());
        assert_eq!(handle.text().unwrap(), "hello");
        assert_eq!(handle.kind().unwrap(), TokenKind::Text);

        {
            let mut state = doc.shared.enter();
            state.arena.unlink(text);
            state.arena.free_token(text);
            state.bump();
        }
        assert!(!handle.is_connected());
        assert_eq!(handle.text(), Err(CursorError::Disconnected));

        // Reusing the slot for a fresh token must not resurrect the handle.
        {
            let mut state = doc.shared.enter();
            let again = state.arena.alloc(TokenData::text(CharRun::from("other")));
            assert_eq!(again, text);
            state.arena.link_before(elem, None, again);
        }
        assert!(!handle.is_connected());
        assert_eq!(handle.name(), Err(CursorError::Disconnected));
    }

    #[test]
    fn test_text_insert_keeps_positions_anchored_to_content() {
        let (doc, _, text) = seeded_doc();
        let mut state = doc.shared.enter();
        let slot = state.cursors.insert(CursorRecord::at(Position::at(text)));
        state.cursors.get_mut(slot).unwrap().stack.push(Position {
            token: text,
            site: Site::Text(2),
        });

        state.on_text_inserted(text, 0, 3);
        let rec = state.cursors.get(slot).unwrap();
        assert_eq!(rec.pos.site, Site::Text(3));
        assert_eq!(rec.stack[0].site, Site::Text(5));

        // Insertions past a position leave it alone.
        state.on_text_inserted(text, 7, 2);
        assert_eq!(state.cursors.get(slot).unwrap().pos.site, Site::Text(3));
    }

    #[test]
    fn test_text_remove_collapses_interior_positions() {
        let (doc, _, text) = seeded_doc();
        let mut state = doc.shared.enter();
        let inside = state.cursors.insert(CursorRecord::at(Position {
            token: text,
            site: Site::Text(4),
        }));
        let past = state.cursors.insert(CursorRecord::at(Position {
            token: text,
            site: Site::Text(8),
        }));
        let before = state.cursors.insert(CursorRecord::at(Position::at(text)));

        state.on_text_removed(text, 2, 4);
        assert_eq!(state.cursors.get(inside).unwrap().pos.site, Site::Text(2));
        assert_eq!(state.cursors.get(past).unwrap().pos.site, Site::Text(4));
        assert_eq!(state.cursors.get(before).unwrap().pos.site, Site::Token);
    }

    #[test]
    fn test_removed_tokens_float_to_landing() {
        let (doc, elem, text) = seeded_doc();
        let mut state = doc.shared.enter();
        let slot = state.cursors.insert(CursorRecord::at(Position {
            token: text,
            site: Site::Text(3),
        }));
        state
            .bookmarks
            .set(text, Site::Token, std::any::TypeId::of::<u8>(), Arc::new(1u8));

        let landing = Position::end_of(elem);
        let removed: HashSet<TokenId> = [text].into_iter().collect();
        state.arena.unlink(text);
        state.on_removed(&removed, landing);
        state.arena.free_token(text);

        assert_eq!(state.cursors.get(slot).unwrap().pos, landing);
        assert!(state
            .bookmarks
            .positions_with_key(std::any::TypeId::of::<u8>())
            .is_empty());
    }

    #[test]
    fn test_split_and_merge_move_positions_with_characters() {
        let (doc, _, text) = seeded_doc();
        let mut state = doc.shared.enter();
        let slot = state.cursors.insert(CursorRecord::at(Position {
            token: text,
            site: Site::Text(3),
        }));

        let suffix = state.arena.split_text(text, 2);
        state.on_text_split(text, 2, suffix);
        let rec = state.cursors.get(slot).unwrap();
        assert_eq!(rec.pos.token, suffix);
        assert_eq!(rec.pos.site, Site::Text(1));

        state.on_text_merged(suffix, text, 2);
        let rec = state.cursors.get(slot).unwrap();
        assert_eq!(rec.pos.token, text);
        assert_eq!(rec.pos.site, Site::Text(3));
    }

    #[test]
    fn test_sync_document_serializes_threads() {
        let doc = Document::new();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let doc = doc.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..250 {
                    doc.shared.enter().bump();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(doc.shared.enter().version, 1000);
    }

    #[test]
    fn test_no_sync_contention_panics() {
        let doc = Document::with_options(DocumentOptions {
            sync: SyncMode::NoSync,
            ..Default::default()
        });

        // Sequential reentry is fine.
        drop(doc.shared.enter());
        drop(doc.shared.enter());

        let guard = doc.shared.enter();
        let other = doc.clone();
        let outcome = thread::spawn(move || {
            drop(other.shared.enter());
        })
        .join();
        assert!(outcome.is_err());
        drop(guard);
    }

    #[test]
    fn test_enter_pair_orders_by_uid() {
        let a = Document::new();
        let b = Document::new();

        let t1 = {
            let (a, b) = (a.clone(), b.clone());
            thread::spawn(move || {
                for _ in 0..200 {
                    let (mut ga, _gb) = enter_pair(&a.shared, &b.shared);
                    ga.bump();
                }
            })
        };
        let t2 = {
            let (a, b) = (a.clone(), b.clone());
            thread::spawn(move || {
                for _ in 0..200 {
                    let (mut gb, _ga) = enter_pair(&b.shared, &a.shared);
                    gb.bump();
                }
            })
        };
        t1.join().unwrap();
        t2.join().unwrap();
        assert_eq!(a.shared.enter().version, 200);
        assert_eq!(b.shared.enter().version, 200);
    }
}
