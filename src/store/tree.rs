//! Token arena and position machinery
//!
//! The tree is a `Vec` of slots indexed by `TokenId`, with freed slots on
//! an intrusive free list and a generation counter per slot so stale ids
//! are detectable. Slot 0 is always the StartDoc token.
//!
//! Positions are (token, site) pairs. End and EndDoc are virtual sites on
//! their container token, so the arena never stores close tokens and the
//! start/end pairing cannot be broken by mutation.

use std::cmp::Ordering;

use super::token::{QName, TokenData, TokenId, TokenKind};
use crate::chars::CharRun;

/// The StartDoc token's id.
pub const ROOT: TokenId = 0;

/// Sub-token component of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    /// At the token itself (the Start of a container, offset 0 of a Text)
    Token,
    /// Inside a Text token at this byte offset (1..len)
    Text(usize),
    /// At the virtual end of a container; on ROOT this is EndDoc
    End,
}

impl Site {
    fn rank(self) -> (u8, usize) {
        match self {
            Site::Token => (0, 0),
            Site::Text(off) => (1, off),
            Site::End => (2, 0),
        }
    }
}

/// A place in the document: token plus site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub token: TokenId,
    pub site: Site,
}

impl Position {
    #[inline]
    pub fn at(token: TokenId) -> Position {
        Position {
            token,
            site: Site::Token,
        }
    }

    #[inline]
    pub fn end_of(token: TokenId) -> Position {
        Position {
            token,
            site: Site::End,
        }
    }

    /// The StartDoc position.
    #[inline]
    pub fn start_doc() -> Position {
        Position::at(ROOT)
    }

    /// The EndDoc position.
    #[inline]
    pub fn end_doc() -> Position {
        Position::end_of(ROOT)
    }

    /// Byte offset into the token's text run (0 for the Token site).
    #[inline]
    pub fn text_offset(&self) -> usize {
        match self.site {
            Site::Text(off) => off,
            Site::Token | Site::End => 0,
        }
    }
}

#[derive(Debug)]
enum Slot {
    Occupied(TokenData),
    Free { next: Option<TokenId> },
}

/// Arena of tokens plus free list and per-slot generations.
#[derive(Debug)]
pub struct TokenArena {
    slots: Vec<Slot>,
    gens: Vec<u32>,
    free_head: Option<TokenId>,
    live: usize,
}

impl TokenArena {
    pub fn new() -> TokenArena {
        TokenArena {
            slots: vec![Slot::Occupied(TokenData::start_doc())],
            gens: vec![0],
            free_head: None,
            live: 1,
        }
    }

    /// Number of live tokens (including StartDoc).
    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn is_live(&self, id: TokenId) -> bool {
        matches!(self.slots.get(id as usize), Some(Slot::Occupied(_)))
    }

    pub fn generation(&self, id: TokenId) -> u32 {
        self.gens[id as usize]
    }

    pub fn get(&self, id: TokenId) -> Option<&TokenData> {
        match self.slots.get(id as usize) {
            Some(Slot::Occupied(data)) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn data(&self, id: TokenId) -> &TokenData {
        match &self.slots[id as usize] {
            Slot::Occupied(data) => data,
            Slot::Free { .. } => unreachable!("token {id} is not live"),
        }
    }

    pub(crate) fn data_mut(&mut self, id: TokenId) -> &mut TokenData {
        match &mut self.slots[id as usize] {
            Slot::Occupied(data) => data,
            Slot::Free { .. } => unreachable!("token {id} is not live"),
        }
    }

    /// Allocate an unlinked token.
    pub fn alloc(&mut self, data: TokenData) -> TokenId {
        debug_assert_ne!(data.kind, TokenKind::StartDoc);
        self.live += 1;
        match self.free_head {
            Some(id) => {
                self.free_head = match self.slots[id as usize] {
                    Slot::Free { next } => next,
                    Slot::Occupied(_) => unreachable!("free list points at a live slot"),
                };
                self.slots[id as usize] = Slot::Occupied(data);
                id
            }
            None => {
                let id = self.slots.len() as TokenId;
                self.slots.push(Slot::Occupied(data));
                self.gens.push(0);
                id
            }
        }
    }

    /// Free a single unlinked token. The generation bump disconnects any
    /// value handle still pointing here.
    pub fn free_token(&mut self, id: TokenId) {
        debug_assert_ne!(id, ROOT);
        debug_assert!(self.is_live(id));
        self.slots[id as usize] = Slot::Free {
            next: self.free_head,
        };
        self.gens[id as usize] = self.gens[id as usize].wrapping_add(1);
        self.free_head = Some(id);
        self.live -= 1;
    }

    // ===== accessors =====

    #[inline]
    pub fn kind(&self, id: TokenId) -> TokenKind {
        self.data(id).kind
    }

    #[inline]
    pub fn parent(&self, id: TokenId) -> Option<TokenId> {
        self.data(id).parent
    }

    #[inline]
    pub fn first_child(&self, id: TokenId) -> Option<TokenId> {
        self.data(id).first_child
    }

    #[inline]
    pub fn last_child(&self, id: TokenId) -> Option<TokenId> {
        self.data(id).last_child
    }

    #[inline]
    pub fn next_sibling(&self, id: TokenId) -> Option<TokenId> {
        self.data(id).next_sibling
    }

    #[inline]
    pub fn prev_sibling(&self, id: TokenId) -> Option<TokenId> {
        self.data(id).prev_sibling
    }

    pub fn name(&self, id: TokenId) -> Option<&QName> {
        self.data(id).name.as_ref()
    }

    pub fn value(&self, id: TokenId) -> Option<&CharRun> {
        self.data(id).value.as_ref()
    }

    /// Logical text of a token: its own value for valued kinds, the
    /// concatenated descendant Text runs for containers.
    pub fn collect_text(&self, id: TokenId) -> String {
        if let Some(run) = self.value(id) {
            return run.to_string_value();
        }
        let mut out = String::new();
        for node in self.collect_subtree(id) {
            let data = self.data(node);
            if data.kind == TokenKind::Text {
                if let Some(run) = &data.value {
                    run.write_to(&mut out);
                }
            }
        }
        out
    }

    /// Iterate the children of `id` front to back.
    pub fn children(&self, id: TokenId) -> ChildIter<'_> {
        ChildIter {
            arena: self,
            next: self.data(id).first_child,
        }
    }

    /// First child past the attribute area, if any.
    pub fn first_content_child(&self, id: TokenId) -> Option<TokenId> {
        self.children(id).find(|&c| !self.kind(c).is_attr_like())
    }

    /// First token of the attribute area, if any.
    pub fn first_attr_child(&self, id: TokenId) -> Option<TokenId> {
        let first = self.first_child(id)?;
        if self.kind(first).is_attr_like() {
            Some(first)
        } else {
            None
        }
    }

    /// Last token of the attribute area, if any.
    pub fn last_attr_child(&self, id: TokenId) -> Option<TokenId> {
        let mut found = None;
        for child in self.children(id) {
            if !self.kind(child).is_attr_like() {
                break;
            }
            found = Some(child);
        }
        found
    }

    /// Find an Attr child (not Namespace) matching `name`.
    pub fn find_attr(&self, id: TokenId, name: &QName) -> Option<TokenId> {
        for child in self.children(id) {
            let data = self.data(child);
            if !data.kind.is_attr_like() {
                break;
            }
            if data.kind == TokenKind::Attr && data.name.as_ref() == Some(name) {
                return Some(child);
            }
        }
        None
    }

    /// True when `anc` is `id` or an ancestor of `id`.
    pub fn is_ancestor_or_self(&self, anc: TokenId, id: TokenId) -> bool {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == anc {
                return true;
            }
            cur = self.parent(c);
        }
        false
    }

    // ===== link manipulation =====

    /// Link an unlinked token as a child of `parent`, immediately before
    /// `anchor` (or as the last child when `anchor` is None).
    pub fn link_before(&mut self, parent: TokenId, anchor: Option<TokenId>, id: TokenId) {
        debug_assert!(self.kind(parent).is_container());
        debug_assert!(self.data(id).parent.is_none());
        debug_assert!(anchor.map_or(true, |a| self.parent(a) == Some(parent)));

        let prev = match anchor {
            Some(a) => self.data(a).prev_sibling,
            None => self.data(parent).last_child,
        };

        {
            let data = self.data_mut(id);
            data.parent = Some(parent);
            data.prev_sibling = prev;
            data.next_sibling = anchor;
        }
        match prev {
            Some(p) => self.data_mut(p).next_sibling = Some(id),
            None => self.data_mut(parent).first_child = Some(id),
        }
        match anchor {
            Some(a) => self.data_mut(a).prev_sibling = Some(id),
            None => self.data_mut(parent).last_child = Some(id),
        }
    }

    /// Detach `id` from its parent and siblings. The subtree under `id`
    /// stays intact.
    pub fn unlink(&mut self, id: TokenId) {
        debug_assert_ne!(id, ROOT);
        let (parent, prev, next) = {
            let data = self.data(id);
            (data.parent, data.prev_sibling, data.next_sibling)
        };
        match prev {
            Some(p) => self.data_mut(p).next_sibling = next,
            None => {
                if let Some(par) = parent {
                    self.data_mut(par).first_child = next;
                }
            }
        }
        match next {
            Some(n) => self.data_mut(n).prev_sibling = prev,
            None => {
                if let Some(par) = parent {
                    self.data_mut(par).last_child = prev;
                }
            }
        }
        let data = self.data_mut(id);
        data.parent = None;
        data.prev_sibling = None;
        data.next_sibling = None;
    }

    /// Collect `id` and every descendant, preorder.
    pub fn collect_subtree(&self, id: TokenId) -> Vec<TokenId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            // push children in reverse so the first child pops first
            let mut child = self.last_child(cur);
            while let Some(c) = child {
                stack.push(c);
                child = self.prev_sibling(c);
            }
        }
        out
    }

    /// Collect every token of the sibling range [first..=last] and their
    /// descendants, preorder.
    pub fn collect_range(&self, first: TokenId, last: TokenId) -> Vec<TokenId> {
        let mut out = Vec::new();
        let mut cur = Some(first);
        while let Some(c) = cur {
            out.extend(self.collect_subtree(c));
            if c == last {
                break;
            }
            cur = self.next_sibling(c);
        }
        out
    }

    /// Free an already-unlinked subtree.
    pub fn free_subtree(&mut self, root: TokenId) {
        for id in self.collect_subtree(root) {
            self.free_token(id);
        }
    }

    /// Split a Text token at byte offset `at` (0 < at < len) into two text
    /// tokens; returns the id of the new token carrying the suffix run.
    pub fn split_text(&mut self, id: TokenId, at: usize) -> TokenId {
        let (prefix, suffix) = {
            let data = self.data(id);
            debug_assert_eq!(data.kind, TokenKind::Text);
            let run = data.value.as_ref().map_or_else(CharRun::empty, |r| r.clone());
            debug_assert!(at > 0 && at < run.len);
            (run.substr(0, at), run.substr(at, run.len - at))
        };
        let (parent, next) = {
            let data = self.data(id);
            (data.parent, data.next_sibling)
        };
        self.data_mut(id).value = Some(prefix);
        let new_id = self.alloc(TokenData::text(suffix));
        if let Some(parent) = parent {
            self.link_before(parent, next, new_id);
        }
        new_id
    }

    // ===== position walk =====

    /// Kind reported at a position.
    pub fn position_kind(&self, pos: Position) -> TokenKind {
        match pos.site {
            Site::Token => self.kind(pos.token),
            Site::Text(_) => TokenKind::Text,
            Site::End => {
                if pos.token == ROOT {
                    TokenKind::EndDoc
                } else {
                    TokenKind::End
                }
            }
        }
    }

    /// The next position in the token walk, or None from EndDoc.
    pub fn next_position(&self, pos: Position) -> Option<Position> {
        match pos.site {
            Site::Token if self.kind(pos.token).is_container() => {
                match self.first_child(pos.token) {
                    Some(child) => Some(Position::at(child)),
                    None => Some(Position::end_of(pos.token)),
                }
            }
            Site::Token | Site::Text(_) => self.after_subtree(pos.token),
            Site::End => {
                if pos.token == ROOT {
                    None
                } else {
                    self.after_subtree(pos.token)
                }
            }
        }
    }

    /// The position just after `id`'s subtree: its next sibling, or the
    /// parent's End site.
    pub fn after_subtree(&self, id: TokenId) -> Option<Position> {
        match self.next_sibling(id) {
            Some(sib) => Some(Position::at(sib)),
            None => self.parent(id).map(Position::end_of),
        }
    }

    /// The previous position in the token walk, or None from StartDoc.
    pub fn prev_position(&self, pos: Position) -> Option<Position> {
        match pos.site {
            Site::Text(_) => Some(Position::at(pos.token)),
            Site::Token => {
                if pos.token == ROOT {
                    return None;
                }
                match self.prev_sibling(pos.token) {
                    Some(sib) => {
                        if self.kind(sib).is_container() {
                            Some(Position::end_of(sib))
                        } else {
                            Some(Position::at(sib))
                        }
                    }
                    None => self.parent(pos.token).map(Position::at),
                }
            }
            Site::End => match self.last_child(pos.token) {
                Some(child) => {
                    if self.kind(child).is_container() {
                        Some(Position::end_of(child))
                    } else {
                        Some(Position::at(child))
                    }
                }
                None => Some(Position::at(pos.token)),
            },
        }
    }

    /// Child index path from ROOT down to `id`.
    fn path_from_root(&self, id: TokenId) -> Vec<u32> {
        let mut path = Vec::new();
        let mut cur = id;
        while let Some(parent) = self.parent(cur) {
            let mut index = 0u32;
            let mut sib = self.prev_sibling(cur);
            while let Some(s) = sib {
                index += 1;
                sib = self.prev_sibling(s);
            }
            path.push(index);
            cur = parent;
        }
        path.reverse();
        path
    }

    /// Total document order over positions. Containers order before their
    /// content at the Token site and after it at the End site.
    pub fn compare_positions(&self, a: Position, b: Position) -> Ordering {
        if a.token == b.token {
            return a.site.rank().cmp(&b.site.rank());
        }
        let pa = self.path_from_root(a.token);
        let pb = self.path_from_root(b.token);
        let shared = pa.len().min(pb.len());
        for i in 0..shared {
            match pa[i].cmp(&pb[i]) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        // one token is an ancestor of the other; the ancestor's site decides
        if pa.len() < pb.len() {
            match a.site {
                Site::Token => Ordering::Less,
                Site::End => Ordering::Greater,
                // Text tokens have no children, so this cannot be an ancestor
                Site::Text(_) => Ordering::Less,
            }
        } else {
            match b.site {
                Site::Token => Ordering::Greater,
                Site::End => Ordering::Less,
                Site::Text(_) => Ordering::Greater,
            }
        }
    }

    // ===== fragments =====

    /// Copy the sibling range [first..=last] with all descendants into a
    /// detached fragment. Character runs and names share storage with the
    /// originals.
    pub fn extract_fragment(&self, first: TokenId, last: TokenId) -> Fragment {
        debug_assert_eq!(self.parent(first), self.parent(last));
        let ordered = self.collect_range(first, last);
        let mut map = std::collections::HashMap::with_capacity(ordered.len());
        for (i, &id) in ordered.iter().enumerate() {
            map.insert(id, i as TokenId);
        }
        let mut nodes = Vec::with_capacity(ordered.len());
        let mut roots = Vec::new();
        for &id in &ordered {
            let src = self.data(id);
            let remap = |link: Option<TokenId>| link.and_then(|t| map.get(&t).copied());
            let in_range_parent = remap(src.parent);
            if in_range_parent.is_none() {
                roots.push(map[&id]);
            }
            nodes.push(TokenData {
                kind: src.kind,
                name: src.name.clone(),
                value: src.value.clone(),
                parent: in_range_parent,
                first_child: remap(src.first_child),
                last_child: remap(src.last_child),
                prev_sibling: remap(src.prev_sibling),
                next_sibling: remap(src.next_sibling),
            });
        }
        Fragment {
            nodes,
            roots,
            source_ids: ordered,
        }
    }

    /// Materialize `frag` in this arena, linked under `parent` before
    /// `anchor`. Returns the new id for every fragment node, in fragment
    /// order (so `frag.source_ids[i]` maps to `result[i]`).
    pub fn implant_fragment(
        &mut self,
        frag: &Fragment,
        parent: TokenId,
        anchor: Option<TokenId>,
    ) -> Vec<TokenId> {
        let mut new_ids = Vec::with_capacity(frag.nodes.len());
        for node in &frag.nodes {
            new_ids.push(self.alloc(node.clone()));
        }
        for (i, node) in frag.nodes.iter().enumerate() {
            let remap = |link: Option<TokenId>| link.map(|f| new_ids[f as usize]);
            let data = self.data_mut(new_ids[i]);
            data.parent = remap(node.parent);
            data.first_child = remap(node.first_child);
            data.last_child = remap(node.last_child);
            data.prev_sibling = remap(node.prev_sibling);
            data.next_sibling = remap(node.next_sibling);
        }
        // fragment roots keep sibling links among themselves; clear the
        // boundary links then insert each in order
        for &root in &frag.roots {
            let data = self.data_mut(new_ids[root as usize]);
            data.prev_sibling = None;
            data.next_sibling = None;
        }
        for &root in &frag.roots {
            self.link_before(parent, anchor, new_ids[root as usize]);
        }
        new_ids
    }
}

impl Default for TokenArena {
    fn default() -> Self {
        TokenArena::new()
    }
}

/// Detached copy of a sibling range, links expressed fragment-locally.
pub struct Fragment {
    nodes: Vec<TokenData>,
    roots: Vec<TokenId>,
    /// Arena ids the nodes were copied from, parallel to `nodes`
    pub source_ids: Vec<TokenId>,
}

impl Fragment {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Fragment-local indices of the top-level nodes.
    pub fn roots(&self) -> &[TokenId] {
        &self.roots
    }
}

/// Iterator over a token's children.
pub struct ChildIter<'a> {
    arena: &'a TokenArena,
    next: Option<TokenId>,
}

impl<'a> Iterator for ChildIter<'a> {
    type Item = TokenId;

    fn next(&mut self) -> Option<TokenId> {
        let cur = self.next?;
        self.next = self.arena.next_sibling(cur);
        Some(cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// <foo><b>0</b><b>1</b></foo> built by hand.
    fn sample_tree() -> (TokenArena, TokenId, TokenId, TokenId) {
        let mut arena = TokenArena::new();
        let foo = arena.alloc(TokenData::element(QName::local_only("foo")));
        arena.link_before(ROOT, None, foo);
        let b0 = arena.alloc(TokenData::element(QName::local_only("b")));
        arena.link_before(foo, None, b0);
        let t0 = arena.alloc(TokenData::text(CharRun::from("0")));
        arena.link_before(b0, None, t0);
        let b1 = arena.alloc(TokenData::element(QName::local_only("b")));
        arena.link_before(foo, None, b1);
        let t1 = arena.alloc(TokenData::text(CharRun::from("1")));
        arena.link_before(b1, None, t1);
        (arena, foo, b0, b1)
    }

    #[test]
    fn test_walk_order() {
        let (arena, _, _, _) = sample_tree();
        let mut kinds = Vec::new();
        let mut pos = Position::start_doc();
        kinds.push(arena.position_kind(pos));
        while let Some(next) = arena.next_position(pos) {
            pos = next;
            kinds.push(arena.position_kind(pos));
        }
        assert_eq!(
            kinds,
            vec![
                TokenKind::StartDoc,
                TokenKind::Start,
                TokenKind::Start,
                TokenKind::Text,
                TokenKind::End,
                TokenKind::Start,
                TokenKind::Text,
                TokenKind::End,
                TokenKind::End,
                TokenKind::EndDoc,
            ]
        );
        assert_eq!(arena.next_position(pos), None);
    }

    #[test]
    fn test_walk_is_reversible() {
        let (arena, _, _, _) = sample_tree();
        let mut forward = vec![Position::start_doc()];
        while let Some(next) = arena.next_position(*forward.last().unwrap()) {
            forward.push(next);
        }
        let mut pos = *forward.last().unwrap();
        for expected in forward.iter().rev().skip(1) {
            pos = arena.prev_position(pos).unwrap();
            assert_eq!(pos, *expected);
        }
        assert_eq!(arena.prev_position(pos), None);
    }

    #[test]
    fn test_unlink_and_relink() {
        let (mut arena, foo, b0, b1) = sample_tree();
        arena.unlink(b0);
        assert_eq!(arena.first_child(foo), Some(b1));
        assert_eq!(arena.prev_sibling(b1), None);
        // put it back at the end
        arena.link_before(foo, None, b0);
        let children: Vec<_> = arena.children(foo).collect();
        assert_eq!(children, vec![b1, b0]);
    }

    #[test]
    fn test_compare_positions_total_order() {
        let (arena, foo, b0, b1) = sample_tree();
        let start = Position::start_doc();
        let at_foo = Position::at(foo);
        let at_b0 = Position::at(b0);
        let end_b0 = Position::end_of(b0);
        let at_b1 = Position::at(b1);
        let end_foo = Position::end_of(foo);
        let end_doc = Position::end_doc();

        let ordered = [start, at_foo, at_b0, end_b0, at_b1, end_foo, end_doc];
        for i in 0..ordered.len() {
            for j in 0..ordered.len() {
                assert_eq!(
                    arena.compare_positions(ordered[i], ordered[j]),
                    i.cmp(&j),
                    "positions {i} vs {j}"
                );
            }
        }
    }

    #[test]
    fn test_compare_mid_text_sites() {
        let (arena, _, b0, _) = sample_tree();
        let t0 = arena.first_child(b0).unwrap();
        let at = Position::at(t0);
        let mid = Position {
            token: t0,
            site: Site::Text(1),
        };
        assert_eq!(arena.compare_positions(at, mid), Ordering::Less);
        assert_eq!(arena.compare_positions(mid, Position::end_of(b0)), Ordering::Less);
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let (mut arena, _, b0, _) = sample_tree();
        let gen_before = arena.generation(b0);
        arena.unlink(b0);
        arena.free_subtree(b0);
        assert!(!arena.is_live(b0));
        let recycled = arena.alloc(TokenData::text(CharRun::from("x")));
        // free list hands back the most recently freed slot
        assert!(arena.is_live(recycled));
        assert_ne!(arena.generation(b0), gen_before);
    }

    #[test]
    fn test_extract_and_implant_fragment() {
        let (mut arena, foo, b0, b1) = sample_tree();
        let frag = arena.extract_fragment(b0, b1);
        assert_eq!(frag.len(), 4);
        assert_eq!(frag.roots().len(), 2);

        // implant a second copy at the front of foo
        let new_ids = arena.implant_fragment(&frag, foo, Some(b0));
        assert_eq!(new_ids.len(), 4);
        let children: Vec<_> = arena.children(foo).collect();
        assert_eq!(children.len(), 4);
        assert_eq!(children[2], b0);
        assert_eq!(children[3], b1);
        // the copies carry their text
        let copy_text = arena.first_child(children[0]).unwrap();
        assert_eq!(arena.value(copy_text).unwrap().to_string_value(), "0");
    }

    #[test]
    fn test_split_text() {
        let mut arena = TokenArena::new();
        let foo = arena.alloc(TokenData::element(QName::local_only("foo")));
        arena.link_before(ROOT, None, foo);
        let t = arena.alloc(TokenData::text(CharRun::from("hello")));
        arena.link_before(foo, None, t);

        let tail = arena.split_text(t, 2);
        assert_eq!(arena.value(t).unwrap().to_string_value(), "he");
        assert_eq!(arena.value(tail).unwrap().to_string_value(), "llo");
        assert_eq!(arena.next_sibling(t), Some(tail));
        assert_eq!(arena.parent(tail), Some(foo));
    }

    #[test]
    fn test_first_content_child_skips_attr_area() {
        let mut arena = TokenArena::new();
        let foo = arena.alloc(TokenData::element(QName::local_only("foo")));
        arena.link_before(ROOT, None, foo);
        let ns = arena.alloc(TokenData::namespace("p", CharRun::from("urn:x")));
        arena.link_before(foo, None, ns);
        let attr = arena.alloc(TokenData::attr(QName::local_only("a"), CharRun::from("v")));
        arena.link_before(foo, None, attr);
        let text = arena.alloc(TokenData::text(CharRun::from("body")));
        arena.link_before(foo, None, text);

        assert_eq!(arena.first_attr_child(foo), Some(ns));
        assert_eq!(arena.last_attr_child(foo), Some(attr));
        assert_eq!(arena.first_content_child(foo), Some(text));
        assert_eq!(arena.find_attr(foo, &QName::local_only("a")), Some(attr));
        assert_eq!(arena.find_attr(foo, &QName::local_only("b")), None);
    }
}
