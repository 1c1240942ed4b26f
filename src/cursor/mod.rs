//! Cursors: movable positions inside one document.
//!
//! A cursor is a small handle; its actual position lives in the document's
//! cursor registry so every mutation can fix up every live cursor in one
//! pass. Reads are permissive (wrong-kind queries return empty or false),
//! mutations are strict (wrong-kind writes fail), and a disposed cursor
//! fails everything. Dropping a cursor disposes it.
//!
//! Position model: a position is a token plus a site. `Site::Token` is the
//! spot immediately before the token, `Site::Text(n)` is between characters
//! of a Text token, and `Site::End` is the virtual close of a container.
//! Every `insert_*` places new content immediately before the current
//! position and leaves the cursor after it.

pub(crate) mod bookmark;
mod edit;
pub(crate) mod selection;

use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, MutexGuard};

use crate::document::{ChangeStamp, CursorRecord, DocShared, DocState, Document, ValueHandle};
use crate::error::{CursorError, CursorResult};
use crate::store::namespace;
use crate::store::{Position, QName, Site, TokenKind, ROOT};

/// A movable position in a document. Obtained from [`Document::cursor`].
pub struct Cursor {
    pub(crate) shared: Arc<DocShared>,
    pub(crate) slot: u32,
}

impl Cursor {
    /// Register a new cursor at the document start.
    pub(crate) fn open(shared: Arc<DocShared>) -> Cursor {
        let slot = shared
            .enter()
            .cursors
            .insert(CursorRecord::at(Position::start_doc()));
        Cursor { shared, slot }
    }

    fn entered(&self) -> MutexGuard<'_, DocState> {
        self.shared.enter()
    }

    /// Current position, or the disposed error.
    pub(crate) fn pos_in(&self, state: &DocState) -> CursorResult<Position> {
        state
            .cursors
            .get(self.slot)
            .map(|rec| rec.pos)
            .ok_or(CursorError::Disposed)
    }

    pub(crate) fn move_to(state: &mut DocState, slot: u32, pos: Position) {
        if let Some(rec) = state.cursors.get_mut(slot) {
            rec.pos = pos;
        }
    }

    // ===== Lifecycle =====

    /// Release this cursor's registry slot. Safe to call twice; every
    /// operation after disposal fails with [`CursorError::Disposed`].
    pub fn dispose(&self) {
        self.entered().cursors.remove(self.slot);
    }

    /// Handle onto the owning document.
    pub fn document(&self) -> Document {
        Document {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Open an independent cursor at this cursor's position.
    pub fn new_cursor(&self) -> CursorResult<Cursor> {
        let slot = {
            let mut state = self.entered();
            let pos = self.pos_in(&state)?;
            state.cursors.insert(CursorRecord::at(pos))
        };
        Ok(Cursor {
            shared: Arc::clone(&self.shared),
            slot,
        })
    }

    /// Capture the owning document's change stamp.
    pub fn change_stamp(&self) -> CursorResult<ChangeStamp> {
        let state = self.entered();
        self.pos_in(&state)?;
        let version = state.version;
        drop(state);
        Ok(ChangeStamp::capture(&self.shared, version))
    }

    /// Pin the current token for typed consumers.
    pub fn value_handle(&self) -> CursorResult<ValueHandle> {
        let state = self.entered();
        let pos = self.pos_in(&state)?;
        let gen = state.arena.generation(pos.token);
        Ok(ValueHandle::pin(Arc::clone(&self.shared), pos.token, gen))
    }

    // ===== Kind queries =====

    /// Kind of the token at the current position.
    pub fn token_kind(&self) -> CursorResult<TokenKind> {
        let state = self.entered();
        let pos = self.pos_in(&state)?;
        Ok(state.arena.position_kind(pos))
    }

    #[inline]
    pub fn is_startdoc(&self) -> CursorResult<bool> {
        Ok(self.token_kind()? == TokenKind::StartDoc)
    }

    #[inline]
    pub fn is_enddoc(&self) -> CursorResult<bool> {
        Ok(self.token_kind()? == TokenKind::EndDoc)
    }

    #[inline]
    pub fn is_start(&self) -> CursorResult<bool> {
        Ok(self.token_kind()? == TokenKind::Start)
    }

    #[inline]
    pub fn is_end(&self) -> CursorResult<bool> {
        Ok(self.token_kind()? == TokenKind::End)
    }

    #[inline]
    pub fn is_text(&self) -> CursorResult<bool> {
        Ok(self.token_kind()? == TokenKind::Text)
    }

    #[inline]
    pub fn is_attr(&self) -> CursorResult<bool> {
        Ok(self.token_kind()? == TokenKind::Attr)
    }

    #[inline]
    pub fn is_namespace(&self) -> CursorResult<bool> {
        Ok(self.token_kind()? == TokenKind::Namespace)
    }

    #[inline]
    pub fn is_comment(&self) -> CursorResult<bool> {
        Ok(self.token_kind()? == TokenKind::Comment)
    }

    #[inline]
    pub fn is_procinst(&self) -> CursorResult<bool> {
        Ok(self.token_kind()? == TokenKind::ProcInst)
    }

    #[inline]
    pub fn is_container(&self) -> CursorResult<bool> {
        Ok(self.token_kind()?.is_container())
    }

    // ===== Token navigation =====

    /// Step to the next token position. Returns the kind landed on, or
    /// `TokenKind::None` (without moving) when already at the document end.
    pub fn to_next_token(&self) -> CursorResult<TokenKind> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        match state.arena.next_position(pos) {
            Some(next) => {
                let kind = state.arena.position_kind(next);
                Self::move_to(&mut state, self.slot, next);
                Ok(kind)
            }
            None => Ok(TokenKind::None),
        }
    }

    /// Step to the previous token position. From inside a Text run this
    /// lands on the run's start.
    pub fn to_prev_token(&self) -> CursorResult<TokenKind> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        match state.arena.prev_position(pos) {
            Some(prev) => {
                let kind = state.arena.position_kind(prev);
                Self::move_to(&mut state, self.slot, prev);
                Ok(kind)
            }
            None => Ok(TokenKind::None),
        }
    }

    /// From a container, move past the attribute area to the first content
    /// token (or the container's End when it has no content). Returns
    /// `TokenKind::None` without moving from non-container positions.
    pub fn to_first_content_token(&self) -> CursorResult<TokenKind> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        if pos.site != Site::Token || !state.arena.kind(pos.token).is_container() {
            return Ok(TokenKind::None);
        }
        let next = match state.arena.first_content_child(pos.token) {
            Some(child) => Position::at(child),
            None => Position::end_of(pos.token),
        };
        let kind = state.arena.position_kind(next);
        Self::move_to(&mut state, self.slot, next);
        Ok(kind)
    }

    /// From a container, jump to its End (EndDoc for the document itself).
    pub fn to_end_token(&self) -> CursorResult<TokenKind> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        if pos.site != Site::Token || !state.arena.kind(pos.token).is_container() {
            return Ok(TokenKind::None);
        }
        let next = Position::end_of(pos.token);
        let kind = state.arena.position_kind(next);
        Self::move_to(&mut state, self.slot, next);
        Ok(kind)
    }

    pub fn to_start_doc(&self) -> CursorResult<()> {
        let mut state = self.entered();
        self.pos_in(&state)?;
        Self::move_to(&mut state, self.slot, Position::start_doc());
        Ok(())
    }

    pub fn to_end_doc(&self) -> CursorResult<()> {
        let mut state = self.entered();
        self.pos_in(&state)?;
        Self::move_to(&mut state, self.slot, Position::end_doc());
        Ok(())
    }

    /// Move to the containing position: the container itself from an End
    /// site or from inside it, the owning element from an attribute, the
    /// document start from a top-level element.
    pub fn to_parent(&self) -> CursorResult<bool> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        let target = match pos.site {
            Site::End => Position::at(pos.token),
            Site::Token | Site::Text(_) => {
                if pos.token == ROOT {
                    return Ok(false);
                }
                Position::at(state.arena.parent(pos.token).unwrap_or(ROOT))
            }
        };
        Self::move_to(&mut state, self.slot, target);
        Ok(true)
    }

    /// First child element of the current container. Fails quietly from
    /// non-container positions.
    pub fn to_first_child(&self) -> CursorResult<bool> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        let Some(container) = container_at(&state, pos) else {
            return Ok(false);
        };
        let found = state
            .arena
            .children(container)
            .find(|&c| state.arena.kind(c) == TokenKind::Start);
        match found {
            Some(child) => {
                Self::move_to(&mut state, self.slot, Position::at(child));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Last child element of the current container.
    pub fn to_last_child(&self) -> CursorResult<bool> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        let Some(container) = container_at(&state, pos) else {
            return Ok(false);
        };
        let mut cur = state.arena.last_child(container);
        while let Some(c) = cur {
            if state.arena.kind(c) == TokenKind::Start {
                Self::move_to(&mut state, self.slot, Position::at(c));
                return Ok(true);
            }
            cur = state.arena.prev_sibling(c);
        }
        Ok(false)
    }

    /// First child element with the given name. A bare local name never
    /// matches a namespaced child.
    pub fn to_child_named(&self, name: &QName) -> CursorResult<bool> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        let Some(container) = container_at(&state, pos) else {
            return Ok(false);
        };
        let found = state.arena.children(container).find(|&c| {
            state.arena.kind(c) == TokenKind::Start && state.arena.name(c) == Some(name)
        });
        match found {
            Some(child) => {
                Self::move_to(&mut state, self.slot, Position::at(child));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Next sibling element of the current element (the owning element when
    /// positioned on an attribute).
    pub fn to_next_sibling(&self) -> CursorResult<bool> {
        self.sibling_step(true, None)
    }

    pub fn to_prev_sibling(&self) -> CursorResult<bool> {
        self.sibling_step(false, None)
    }

    /// Next sibling element matching `name`, skipping others.
    pub fn to_next_sibling_named(&self, name: &QName) -> CursorResult<bool> {
        self.sibling_step(true, Some(name))
    }

    fn sibling_step(&self, forward: bool, name: Option<&QName>) -> CursorResult<bool> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        if pos.token == ROOT {
            return Ok(false);
        }
        let anchor = match pos.site {
            Site::End => pos.token,
            Site::Token | Site::Text(_) => {
                if state.arena.kind(pos.token).is_attr_like() {
                    state.arena.parent(pos.token).unwrap_or(ROOT)
                } else {
                    pos.token
                }
            }
        };
        let mut cur = if forward {
            state.arena.next_sibling(anchor)
        } else {
            state.arena.prev_sibling(anchor)
        };
        while let Some(c) = cur {
            if state.arena.kind(c) == TokenKind::Start
                && name.is_none_or(|n| state.arena.name(c) == Some(n))
            {
                Self::move_to(&mut state, self.slot, Position::at(c));
                return Ok(true);
            }
            cur = if forward {
                state.arena.next_sibling(c)
            } else {
                state.arena.prev_sibling(c)
            };
        }
        Ok(false)
    }

    /// Reposition onto `other`'s position. Both cursors must belong to the
    /// same document.
    pub fn to_cursor(&self, other: &Cursor) -> CursorResult<()> {
        if !Arc::ptr_eq(&self.shared, &other.shared) {
            return Err(CursorError::cross_document());
        }
        let mut state = self.entered();
        self.pos_in(&state)?;
        let target = other.pos_in(&state)?;
        Self::move_to(&mut state, self.slot, target);
        Ok(())
    }

    // ===== Attribute navigation =====

    pub fn to_first_attribute(&self) -> CursorResult<bool> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        let Some(owner) = attr_owner(&state, pos) else {
            return Ok(false);
        };
        let found = first_attr_from(&state, state.arena.first_child(owner));
        match found {
            Some(attr) => {
                Self::move_to(&mut state, self.slot, Position::at(attr));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn to_last_attribute(&self) -> CursorResult<bool> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        let Some(owner) = attr_owner(&state, pos) else {
            return Ok(false);
        };
        let mut found = None;
        for child in state.arena.children(owner) {
            if !state.arena.kind(child).is_attr_like() {
                break;
            }
            if state.arena.kind(child) == TokenKind::Attr {
                found = Some(child);
            }
        }
        match found {
            Some(attr) => {
                Self::move_to(&mut state, self.slot, Position::at(attr));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// From an attribute, step to the next Attr token (namespace
    /// declarations are skipped as destinations).
    pub fn to_next_attribute(&self) -> CursorResult<bool> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        if pos.site != Site::Token || !state.arena.kind(pos.token).is_attr_like() {
            return Ok(false);
        }
        let found = first_attr_from(&state, state.arena.next_sibling(pos.token));
        match found {
            Some(attr) => {
                Self::move_to(&mut state, self.slot, Position::at(attr));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn to_prev_attribute(&self) -> CursorResult<bool> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        if pos.site != Site::Token || !state.arena.kind(pos.token).is_attr_like() {
            return Ok(false);
        }
        let mut cur = state.arena.prev_sibling(pos.token);
        while let Some(c) = cur {
            if state.arena.kind(c) == TokenKind::Attr {
                Self::move_to(&mut state, self.slot, Position::at(c));
                return Ok(true);
            }
            cur = state.arena.prev_sibling(c);
        }
        Ok(false)
    }

    pub fn to_attribute_named(&self, name: &QName) -> CursorResult<bool> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        let Some(owner) = attr_owner(&state, pos) else {
            return Ok(false);
        };
        match state.arena.find_attr(owner, name) {
            Some(attr) => {
                Self::move_to(&mut state, self.slot, Position::at(attr));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ===== Character navigation =====

    /// Advance up to `n` characters within the current Text run; stepping
    /// past the last character lands on the following token position.
    /// Returns characters actually moved, 0 from non-Text positions.
    pub fn to_next_char(&self, n: usize) -> CursorResult<usize> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        if state.arena.kind(pos.token) != TokenKind::Text {
            return Ok(0);
        }
        let run = match state.arena.value(pos.token) {
            Some(run) => run.clone(),
            None => return Ok(0),
        };
        let off = pos.text_offset();
        let (byte, moved) = run.advance_chars(off, n);
        if moved == 0 {
            return Ok(0);
        }
        let next = if byte >= run.len {
            state
                .arena
                .after_subtree(pos.token)
                .unwrap_or(Position::end_doc())
        } else {
            Position {
                token: pos.token,
                site: Site::Text(byte),
            }
        };
        Self::move_to(&mut state, self.slot, next);
        Ok(moved)
    }

    /// Retreat up to `n` characters within the current Text run, stopping at
    /// the run's start.
    pub fn to_prev_char(&self, n: usize) -> CursorResult<usize> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        if state.arena.kind(pos.token) != TokenKind::Text {
            return Ok(0);
        }
        let run = match state.arena.value(pos.token) {
            Some(run) => run.clone(),
            None => return Ok(0),
        };
        let off = pos.text_offset();
        let (byte, moved) = run.retreat_chars(off, n);
        if moved == 0 {
            return Ok(0);
        }
        let site = if byte == 0 { Site::Token } else { Site::Text(byte) };
        Self::move_to(
            &mut state,
            self.slot,
            Position {
                token: pos.token,
                site,
            },
        );
        Ok(moved)
    }

    // ===== Reads =====

    /// Remaining characters of the current Text run, empty from any other
    /// kind. Attr and Comment values are reachable through `text_value`,
    /// not here.
    pub fn chars(&self) -> CursorResult<String> {
        self.chars_limited(usize::MAX)
    }

    /// Like `chars` but at most `max` characters.
    pub fn chars_limited(&self, max: usize) -> CursorResult<String> {
        let state = self.entered();
        let pos = self.pos_in(&state)?;
        if state.arena.kind(pos.token) != TokenKind::Text {
            return Ok(String::new());
        }
        let Some(run) = state.arena.value(pos.token) else {
            return Ok(String::new());
        };
        let off = pos.text_offset();
        let (end, _) = run.advance_chars(off, max);
        Ok(run.substr(off, end - off).to_string_value())
    }

    /// Logical value at the current position: concatenated descendant text
    /// for containers (from either their Start or End), the literal value
    /// for Attr/Namespace/Comment/ProcInst, the remaining run from inside a
    /// Text token.
    pub fn text_value(&self) -> CursorResult<String> {
        let state = self.entered();
        let pos = self.pos_in(&state)?;
        let out = match state.arena.position_kind(pos) {
            TokenKind::Text => {
                let off = pos.text_offset();
                state
                    .arena
                    .value(pos.token)
                    .map(|run| run.substr(off, run.len - off).to_string_value())
                    .unwrap_or_default()
            }
            TokenKind::Attr | TokenKind::Namespace | TokenKind::Comment | TokenKind::ProcInst => {
                state
                    .arena
                    .value(pos.token)
                    .map(|run| run.to_string_value())
                    .unwrap_or_default()
            }
            TokenKind::Start | TokenKind::StartDoc | TokenKind::End | TokenKind::EndDoc => {
                state.arena.collect_text(pos.token)
            }
            TokenKind::None => String::new(),
        };
        Ok(out)
    }

    /// Name of the current token (Start, Attr, ProcInst; the declared prefix
    /// for Namespace). None elsewhere.
    pub fn name(&self) -> CursorResult<Option<QName>> {
        let state = self.entered();
        let pos = self.pos_in(&state)?;
        if pos.site != Site::Token {
            return Ok(None);
        }
        Ok(state.arena.name(pos.token).cloned())
    }

    /// Value of the named attribute on the current Start token. None when
    /// not at a Start or the attribute is absent.
    pub fn attribute_text(&self, name: &QName) -> CursorResult<Option<String>> {
        let state = self.entered();
        let pos = self.pos_in(&state)?;
        if pos.site != Site::Token || state.arena.kind(pos.token) != TokenKind::Start {
            return Ok(None);
        }
        let out = state
            .arena
            .find_attr(pos.token, name)
            .and_then(|attr| state.arena.value(attr))
            .map(|run| run.to_string_value());
        Ok(out)
    }

    /// Resolve `prefix` in the scope of the current position. An empty
    /// result string means the prefix is explicitly undeclared here.
    pub fn namespace_for_prefix(&self, prefix: &str) -> CursorResult<Option<String>> {
        let state = self.entered();
        let pos = self.pos_in(&state)?;
        Ok(namespace::namespace_for_prefix(
            &state.arena,
            pos.token,
            prefix,
        ))
    }

    /// Find a prefix bound to `uri` in the scope of the current position.
    pub fn prefix_for_namespace(&self, uri: &str) -> CursorResult<Option<String>> {
        let state = self.entered();
        let pos = self.pos_in(&state)?;
        Ok(namespace::prefix_for_namespace(&state.arena, pos.token, uri))
    }

    /// Serialize the content at the current position. Non-element positions
    /// and multi-root content come back wrapped in `<xml-fragment>`.
    pub fn xml_text(&self) -> CursorResult<String> {
        let state = self.entered();
        let pos = self.pos_in(&state)?;
        Ok(crate::serialize::save_position(&state.arena, pos))
    }

    // ===== Relations =====

    /// Total order over positions of one document. Cross-document
    /// comparison is an error.
    pub fn compare_position(&self, other: &Cursor) -> CursorResult<Ordering> {
        if !Arc::ptr_eq(&self.shared, &other.shared) {
            return Err(CursorError::cross_document());
        }
        let state = self.entered();
        let a = self.pos_in(&state)?;
        let b = other.pos_in(&state)?;
        Ok(state.arena.compare_positions(a, b))
    }

    pub fn is_at_same_position_as(&self, other: &Cursor) -> CursorResult<bool> {
        if !Arc::ptr_eq(&self.shared, &other.shared) {
            return Err(CursorError::cross_document());
        }
        let state = self.entered();
        let a = self.pos_in(&state)?;
        let b = other.pos_in(&state)?;
        Ok(a == b)
    }

    /// Whether both cursors hang off the same document store. Tolerant:
    /// works even on disposed cursors.
    #[inline]
    pub fn is_in_same_document_as(&self, other: &Cursor) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    // ===== Position stack =====

    /// Save the current position on this cursor's private stack.
    pub fn push(&self) -> CursorResult<()> {
        let mut state = self.entered();
        let rec = state
            .cursors
            .get_mut(self.slot)
            .ok_or(CursorError::Disposed)?;
        let pos = rec.pos;
        rec.stack.push(pos);
        Ok(())
    }

    /// Restore the most recently pushed position. On an empty stack this is
    /// a no-op returning false.
    pub fn pop(&self) -> CursorResult<bool> {
        let mut state = self.entered();
        let rec = state
            .cursors
            .get_mut(self.slot)
            .ok_or(CursorError::Disposed)?;
        match rec.stack.pop() {
            Some(pos) => {
                rec.pos = pos;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ===== Bookmarks =====

    /// Pin `value` to the current position, keyed by its concrete type.
    /// A second bookmark of the same type at the same position replaces the
    /// first.
    pub fn set_bookmark<T: Any + Send + Sync>(&self, value: T) -> CursorResult<()> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        state
            .bookmarks
            .set(pos.token, pos.site, TypeId::of::<T>(), Arc::new(value));
        Ok(())
    }

    /// The bookmark of type `T` at the current position, if any. Lookup is
    /// by exact type, never by supertype or trait.
    pub fn bookmark<T: Any + Send + Sync>(&self) -> CursorResult<Option<Arc<T>>> {
        let state = self.entered();
        let pos = self.pos_in(&state)?;
        Ok(state
            .bookmarks
            .get(pos.token, pos.site, TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok()))
    }

    pub fn clear_bookmark<T: Any + Send + Sync>(&self) -> CursorResult<bool> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        Ok(state
            .bookmarks
            .clear(pos.token, pos.site, TypeId::of::<T>()))
    }

    /// Move to the nearest following position holding a bookmark of type
    /// `T`, returning its value. The cursor stays put when there is none.
    pub fn to_next_bookmark<T: Any + Send + Sync>(&self) -> CursorResult<Option<Arc<T>>> {
        self.bookmark_step::<T>(Ordering::Greater)
    }

    /// Move to the nearest preceding position holding a bookmark of type `T`.
    pub fn to_prev_bookmark<T: Any + Send + Sync>(&self) -> CursorResult<Option<Arc<T>>> {
        self.bookmark_step::<T>(Ordering::Less)
    }

    fn bookmark_step<T: Any + Send + Sync>(
        &self,
        direction: Ordering,
    ) -> CursorResult<Option<Arc<T>>> {
        let mut state = self.entered();
        let cur = self.pos_in(&state)?;
        let key = TypeId::of::<T>();
        let mut best: Option<Position> = None;
        for cand in state.bookmarks.positions_with_key(key) {
            if state.arena.compare_positions(cand, cur) != direction {
                continue;
            }
            let closer = match best {
                None => true,
                // the nearest candidate in the travel direction wins
                Some(b) => state.arena.compare_positions(cand, b) != direction,
            };
            if closer {
                best = Some(cand);
            }
        }
        let Some(target) = best else {
            return Ok(None);
        };
        let value = state
            .bookmarks
            .get(target.token, target.site, key)
            .and_then(|v| v.downcast::<T>().ok());
        Self::move_to(&mut state, self.slot, target);
        Ok(value)
    }

    // ===== Selections =====

    /// Record a path expression for later evaluation. Nothing is parsed or
    /// evaluated here; a bad expression surfaces at the first call that
    /// needs the results.
    pub fn select_path(&self, expr: &str) -> CursorResult<()> {
        self.select_many(std::slice::from_ref(&expr))
    }

    /// Record several path expressions; results are the concatenated
    /// matches of each, evaluated together on first use.
    pub fn select_paths(&self, exprs: &[&str]) -> CursorResult<()> {
        self.select_many(exprs)
    }

    fn select_many(&self, exprs: &[&str]) -> CursorResult<()> {
        let mut state = self.entered();
        let rec = state
            .cursors
            .get_mut(self.slot)
            .ok_or(CursorError::Disposed)?;
        let origin = rec.pos;
        rec.selection
            .begin(exprs.iter().map(|e| e.to_string()).collect(), origin);
        Ok(())
    }

    /// Append the current position to the selection.
    pub fn add_to_selection(&self) -> CursorResult<()> {
        let mut state = self.entered();
        resolve_selection(&mut state, self.slot)?;
        let rec = state
            .cursors
            .get_mut(self.slot)
            .ok_or(CursorError::Disposed)?;
        let pos = rec.pos;
        rec.selection.push(pos);
        Ok(())
    }

    /// Move to the next unvisited selection entry. Returns false (without
    /// moving) once the selection is exhausted.
    pub fn to_next_selection(&self) -> CursorResult<bool> {
        let mut state = self.entered();
        resolve_selection(&mut state, self.slot)?;
        let rec = state
            .cursors
            .get_mut(self.slot)
            .ok_or(CursorError::Disposed)?;
        match rec.selection.advance() {
            Some(pos) => {
                rec.pos = pos;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Move to selection entry `i`; iteration continues after it.
    pub fn to_selection(&self, i: usize) -> CursorResult<bool> {
        let mut state = self.entered();
        resolve_selection(&mut state, self.slot)?;
        let rec = state
            .cursors
            .get_mut(self.slot)
            .ok_or(CursorError::Disposed)?;
        match rec.selection.jump(i) {
            Some(pos) => {
                rec.pos = pos;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn selection_count(&self) -> CursorResult<usize> {
        let mut state = self.entered();
        resolve_selection(&mut state, self.slot)?;
        let rec = state.cursors.get(self.slot).ok_or(CursorError::Disposed)?;
        Ok(rec.selection.len())
    }

    /// Drop the selection without moving the cursor.
    pub fn clear_selections(&self) -> CursorResult<()> {
        let mut state = self.entered();
        let rec = state
            .cursors
            .get_mut(self.slot)
            .ok_or(CursorError::Disposed)?;
        rec.selection.clear();
        Ok(())
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("doc", &self.shared.uid)
            .field("slot", &self.slot)
            .finish()
    }
}

// ===== Shared position helpers =====

/// Container whose child list the position addresses, for child navigation.
/// Only a Start/StartDoc at its Token site qualifies.
fn container_at(state: &DocState, pos: Position) -> Option<crate::store::TokenId> {
    if pos.site == Site::Token && state.arena.kind(pos.token).is_container() {
        Some(pos.token)
    } else {
        None
    }
}

/// Element owning the attribute area the position may address: a Start
/// itself, or the parent of an Attr/Namespace.
fn attr_owner(state: &DocState, pos: Position) -> Option<crate::store::TokenId> {
    if pos.site != Site::Token {
        return None;
    }
    let kind = state.arena.kind(pos.token);
    if kind == TokenKind::Start {
        Some(pos.token)
    } else if kind.is_attr_like() {
        state.arena.parent(pos.token)
    } else {
        None
    }
}

/// First Attr token at or after `from` within the attribute area.
fn first_attr_from(state: &DocState, from: Option<crate::store::TokenId>) -> Option<crate::store::TokenId> {
    let mut cur = from;
    while let Some(c) = cur {
        let kind = state.arena.kind(c);
        if !kind.is_attr_like() {
            return None;
        }
        if kind == TokenKind::Attr {
            return Some(c);
        }
        cur = state.arena.next_sibling(c);
    }
    None
}

/// Evaluate a pending path select, if any, installing its results.
fn resolve_selection(state: &mut DocState, slot: u32) -> CursorResult<()> {
    let DocState {
        arena,
        cursors,
        path_cache,
        ..
    } = state;
    let rec = cursors.get_mut(slot).ok_or(CursorError::Disposed)?;
    if let Some(pending) = rec.selection.take_pending() {
        let items = crate::path::evaluate_batch(arena, path_cache, pending.origin, &pending.exprs)?;
        rec.selection.install(items);
    }
    Ok(())
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    /// `<foo><b>0</b><b>1</b></foo>` built through the cursor API.
    fn two_b_doc() -> Document {
        let doc = Document::new();
        let c = doc.cursor();
        c.to_end_doc().unwrap();
        c.begin_element(&QName::local_only("foo")).unwrap();
        c.begin_element(&QName::local_only("b")).unwrap();
        c.insert_chars("0").unwrap();
        c.to_next_token().unwrap();
        c.begin_element(&QName::local_only("b")).unwrap();
        c.insert_chars("1").unwrap();
        doc
    }

    #[test]
    fn test_token_walk_visits_every_kind_in_order() {
        let doc = two_b_doc();
        let c = doc.cursor();
        assert_eq!(c.token_kind().unwrap(), TokenKind::StartDoc);

        let mut kinds = Vec::new();
        loop {
            let kind = c.to_next_token().unwrap();
            if kind == TokenKind::None {
                break;
            }
            kinds.push(kind);
        }
        use TokenKind::*;
        assert_eq!(
            kinds,
            vec![Start, Start, Text, End, Start, Text, End, End, EndDoc]
        );
        // still parked at EndDoc after the refusal to move
        assert_eq!(c.token_kind().unwrap(), TokenKind::EndDoc);
    }

    #[test]
    fn test_walk_is_reversible() {
        let doc = two_b_doc();
        let c = doc.cursor();
        let mut forward = vec![c.token_kind().unwrap()];
        while c.to_next_token().unwrap() != TokenKind::None {
            forward.push(c.token_kind().unwrap());
        }
        let mut backward = vec![c.token_kind().unwrap()];
        while c.to_prev_token().unwrap() != TokenKind::None {
            backward.push(c.token_kind().unwrap());
        }
        backward.reverse();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_child_and_sibling_navigation() {
        let doc = two_b_doc();
        let c = doc.cursor();
        assert!(c.to_first_child().unwrap());
        assert_eq!(c.name().unwrap().unwrap().local.as_ref(), "foo");
        assert!(c.to_first_child().unwrap());
        assert_eq!(c.text_value().unwrap(), "0");
        assert!(c.to_next_sibling().unwrap());
        assert_eq!(c.text_value().unwrap(), "1");
        assert!(!c.to_next_sibling().unwrap());
        assert!(c.to_prev_sibling().unwrap());
        assert_eq!(c.text_value().unwrap(), "0");
        assert!(c.to_parent().unwrap());
        assert_eq!(c.name().unwrap().unwrap().local.as_ref(), "foo");

        // named lookups; a bare name never matches a namespaced element
        assert!(c.to_child_named(&QName::local_only("b")).unwrap());
        assert!(!c
            .to_next_sibling_named(&QName::new("urn:x", "b"))
            .unwrap());
    }

    #[test]
    fn test_first_content_token_skips_attribute_area() {
        let doc = Document::new();
        let c = doc.cursor();
        c.to_end_doc().unwrap();
        c.begin_element(&QName::local_only("e")).unwrap();
        c.insert_attribute_with_value(&QName::local_only("a"), "1")
            .unwrap();
        c.insert_chars("body").unwrap();

        c.to_start_doc().unwrap();
        assert!(c.to_first_child().unwrap());
        assert_eq!(c.to_first_content_token().unwrap(), TokenKind::Text);
        assert_eq!(c.chars().unwrap(), "body");

        assert!(c.to_parent().unwrap());
        assert_eq!(c.to_end_token().unwrap(), TokenKind::End);
    }

    #[test]
    fn test_char_navigation_clamps_and_crosses_out() {
        let doc = Document::new();
        let c = doc.cursor();
        c.to_end_doc().unwrap();
        c.begin_element(&QName::local_only("e")).unwrap();
        c.insert_chars("héllo").unwrap();

        c.to_start_doc().unwrap();
        c.to_first_child().unwrap();
        assert_eq!(c.to_first_content_token().unwrap(), TokenKind::Text);

        assert_eq!(c.to_next_char(2).unwrap(), 2);
        assert_eq!(c.chars().unwrap(), "llo");
        assert_eq!(c.to_prev_char(10).unwrap(), 2);
        assert_eq!(c.chars().unwrap(), "héllo");

        // stepping past the end lands after the run
        assert_eq!(c.to_next_char(99).unwrap(), 5);
        assert_eq!(c.token_kind().unwrap(), TokenKind::End);
        assert_eq!(c.to_next_char(1).unwrap(), 0);
    }

    #[test]
    fn test_pop_empty_stack_is_noop() {
        let doc = two_b_doc();
        let c = doc.cursor();
        assert!(!c.pop().unwrap());
        assert_eq!(c.token_kind().unwrap(), TokenKind::StartDoc);

        c.push().unwrap();
        c.to_end_doc().unwrap();
        assert!(c.pop().unwrap());
        assert_eq!(c.token_kind().unwrap(), TokenKind::StartDoc);
        assert!(!c.pop().unwrap());
        assert_eq!(c.token_kind().unwrap(), TokenKind::StartDoc);
    }

    #[test]
    fn test_cursor_floats_to_removal_point() {
        let doc = two_b_doc();
        let inside = doc.cursor();
        inside.to_first_child().unwrap();
        inside.to_first_child().unwrap();
        inside.to_first_content_token().unwrap();
        assert_eq!(inside.chars().unwrap(), "0");

        let remover = doc.cursor();
        remover.to_first_child().unwrap();
        remover.to_first_child().unwrap();
        remover.remove_xml().unwrap();

        // both cursors land where the removed element used to start
        assert!(inside.is_at_same_position_as(&remover).unwrap());
        assert_eq!(inside.token_kind().unwrap(), TokenKind::Start);
        assert_eq!(inside.text_value().unwrap(), "1");
    }

    #[test]
    fn test_dispose_is_idempotent_and_poisons_operations() {
        let doc = two_b_doc();
        let c = doc.cursor();
        c.dispose();
        c.dispose();
        assert_matches!(c.token_kind(), Err(CursorError::Disposed));
        assert_matches!(c.to_next_token(), Err(CursorError::Disposed));
        assert_matches!(c.push(), Err(CursorError::Disposed));

        // other cursors over the same document are unaffected
        let other = doc.cursor();
        assert_eq!(other.token_kind().unwrap(), TokenKind::StartDoc);
    }

    #[test]
    fn test_compare_position_total_order() {
        let doc = two_b_doc();
        let a = doc.cursor();
        let b = doc.cursor();
        assert_eq!(a.compare_position(&b).unwrap(), Ordering::Equal);
        assert!(a.is_at_same_position_as(&b).unwrap());

        b.to_first_child().unwrap();
        assert_eq!(a.compare_position(&b).unwrap(), Ordering::Less);
        assert_eq!(b.compare_position(&a).unwrap(), Ordering::Greater);

        a.to_end_doc().unwrap();
        assert_eq!(a.compare_position(&b).unwrap(), Ordering::Greater);

        let foreign = Document::new();
        let f = foreign.cursor();
        assert_matches!(a.compare_position(&f), Err(CursorError::IllegalArgument(_)));
        assert_matches!(
            a.is_at_same_position_as(&f),
            Err(CursorError::IllegalArgument(_))
        );
        assert!(!a.is_in_same_document_as(&f));
        assert!(a.is_in_same_document_as(&b));
    }

    #[test]
    fn test_to_cursor_and_new_cursor() {
        let doc = two_b_doc();
        let a = doc.cursor();
        a.to_first_child().unwrap();

        let twin = a.new_cursor().unwrap();
        assert!(twin.is_at_same_position_as(&a).unwrap());

        let b = doc.cursor();
        b.to_cursor(&a).unwrap();
        assert!(b.is_at_same_position_as(&a).unwrap());

        let foreign = Document::new();
        assert_matches!(
            foreign.cursor().to_cursor(&a),
            Err(CursorError::IllegalArgument(_))
        );
    }

    #[test]
    fn test_bookmarks_round_trip_and_navigate() {
        #[derive(Debug, PartialEq)]
        struct Marker(&'static str);
        struct Unrelated;

        let doc = two_b_doc();
        let c = doc.cursor();
        c.to_first_child().unwrap();
        c.set_bookmark(Marker("on-foo")).unwrap();
        c.to_first_child().unwrap();
        c.to_next_sibling().unwrap();
        c.set_bookmark(Marker("on-second-b")).unwrap();

        // exact type match only
        assert!(c.bookmark::<Unrelated>().unwrap().is_none());
        assert_eq!(c.bookmark::<Marker>().unwrap().unwrap().0, "on-second-b");

        c.to_start_doc().unwrap();
        let hit = c.to_next_bookmark::<Marker>().unwrap().unwrap();
        assert_eq!(hit.0, "on-foo");
        let hit = c.to_next_bookmark::<Marker>().unwrap().unwrap();
        assert_eq!(hit.0, "on-second-b");
        assert!(c.to_next_bookmark::<Marker>().unwrap().is_none());
        assert_eq!(c.bookmark::<Marker>().unwrap().unwrap().0, "on-second-b");

        let hit = c.to_prev_bookmark::<Marker>().unwrap().unwrap();
        assert_eq!(hit.0, "on-foo");

        assert!(c.clear_bookmark::<Marker>().unwrap());
        assert!(!c.clear_bookmark::<Marker>().unwrap());
        c.to_start_doc().unwrap();
        let hit = c.to_next_bookmark::<Marker>().unwrap().unwrap();
        assert_eq!(hit.0, "on-second-b");
    }

    #[test]
    fn test_manual_selection_keeps_bag_semantics() {
        let doc = two_b_doc();
        let c = doc.cursor();
        for _ in 0..3 {
            c.add_to_selection().unwrap();
        }
        c.to_first_child().unwrap();
        c.add_to_selection().unwrap();
        assert_eq!(c.selection_count().unwrap(), 4);

        c.to_end_doc().unwrap();
        assert!(c.to_next_selection().unwrap());
        assert_eq!(c.token_kind().unwrap(), TokenKind::StartDoc);
        assert!(c.to_selection(3).unwrap());
        assert_eq!(c.token_kind().unwrap(), TokenKind::Start);
        assert!(!c.to_next_selection().unwrap());

        // selections are per cursor
        let other = doc.cursor();
        assert_eq!(other.selection_count().unwrap(), 0);

        c.clear_selections().unwrap();
        assert_eq!(c.selection_count().unwrap(), 0);
    }

    #[test]
    fn test_change_stamp_observes_other_cursors() {
        let doc = two_b_doc();
        let a = doc.cursor();
        let stamp = a.change_stamp().unwrap();
        assert!(!stamp.has_changed());

        let b = doc.cursor();
        b.to_end_doc().unwrap();
        b.insert_comment("touched").unwrap();
        assert!(stamp.has_changed());
    }
}
