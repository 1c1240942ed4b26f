//! Cursor mutations: inserts, removals, value writes, and transfers.
//!
//! Every mutation validates before it touches the tree, so a rejected call
//! leaves the document unchanged. Inserted content lands immediately before
//! the cursor; registry fixups then carry every affected cursor and
//! bookmark to its content-anchored home, which is what leaves the acting
//! cursor just after the new content without any special casing.

use std::collections::HashSet;
use std::sync::Arc;

use crate::chars::{save, CharRun};
use crate::document::{enter_pair, DocState};
use crate::error::{CursorError, CursorResult};
use crate::store::name::{
    defuse_comment_text, defuse_proc_inst_text, validate_local_name, validate_pi_target,
    validate_prefix,
};
use crate::store::namespace::{self, ns};
use crate::store::{Position, QName, Site, TokenData, TokenId, TokenKind, ROOT};

use super::Cursor;

impl Cursor {
    // ===== Character writes =====

    /// Insert `text` immediately before the cursor. Fails at attribute,
    /// namespace, and value-token positions; extending an existing run
    /// keeps the token count stable.
    pub fn insert_chars(&self, text: &str) -> CursorResult<()> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        check_chars_insert(&state, pos)?;
        if text.is_empty() {
            return Ok(());
        }
        let run = save(&state.buffer, None, text);
        insert_run(&mut state, pos, &run);
        state.bump();
        Ok(())
    }

    /// Remove up to `n` characters after the cursor within the current Text
    /// run. Returns characters actually removed; 0 from non-Text positions.
    pub fn remove_chars(&self, n: usize) -> CursorResult<usize> {
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
        let (end, moved) = run.advance_chars(off, n);
        if moved == 0 {
            return Ok(0);
        }
        if off == 0 && end == run.len {
            remove_tree(&mut state, pos.token);
        } else {
            state.arena.data_mut(pos.token).value = Some(run.remove_range(off, end - off));
            state.on_text_removed(pos.token, off, end - off);
        }
        state.bump();
        Ok(moved)
    }

    // ===== Structural inserts =====

    /// Insert an empty element before the cursor.
    pub fn insert_element(&self, name: &QName) -> CursorResult<()> {
        self.insert_element_impl(name, None).map(|_| ())
    }

    /// Insert `<name>text</name>` before the cursor.
    pub fn insert_element_with_text(&self, name: &QName, text: &str) -> CursorResult<()> {
        self.insert_element_impl(name, Some(text)).map(|_| ())
    }

    /// Insert an empty element and park the cursor inside it, just before
    /// its close. Follow-up inserts land inside the new element.
    pub fn begin_element(&self, name: &QName) -> CursorResult<()> {
        let elem = self.insert_element_impl(name, None)?;
        let mut state = self.entered();
        Self::move_to(&mut state, self.slot, Position::end_of(elem));
        Ok(())
    }

    fn insert_element_impl(&self, name: &QName, text: Option<&str>) -> CursorResult<TokenId> {
        validate_element_name(name)?;
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        structural_target(&state, pos)?;
        check_element_at_top(&state, target_parent(&state, pos), None)?;
        let (parent, anchor) = content_anchor(&mut state, pos);
        let elem = state.arena.alloc(TokenData::element(name.clone()));
        state.arena.link_before(parent, anchor, elem);
        if let Some(text) = text {
            if !text.is_empty() {
                let run = save(&state.buffer, None, text);
                let t = state.arena.alloc(TokenData::text(run));
                state.arena.link_before(elem, None, t);
            }
        }
        namespace::carry_over_declarations(&mut state.arena, &[elem]);
        state.bump();
        Ok(elem)
    }

    /// Insert a comment before the cursor. Runs of `-` in `text` are
    /// defused so the result stays serializable.
    pub fn insert_comment(&self, text: &str) -> CursorResult<()> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        structural_target(&state, pos)?;
        let safe = defuse_comment_text(text);
        let run = save(&state.buffer, None, &safe);
        let (parent, anchor) = content_anchor(&mut state, pos);
        let tok = state.arena.alloc(TokenData::comment(run));
        state.arena.link_before(parent, anchor, tok);
        state.bump();
        Ok(())
    }

    /// Insert a processing instruction before the cursor.
    pub fn insert_proc_inst(&self, target: &str, text: &str) -> CursorResult<()> {
        validate_pi_target(target)?;
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        structural_target(&state, pos)?;
        let safe = defuse_proc_inst_text(text);
        let run = save(&state.buffer, None, &safe);
        let (parent, anchor) = content_anchor(&mut state, pos);
        let tok = state
            .arena
            .alloc(TokenData::proc_inst(QName::local_only(target), run));
        state.arena.link_before(parent, anchor, tok);
        state.bump();
        Ok(())
    }

    /// Insert an attribute with an empty value. See
    /// [`insert_attribute_with_value`](Self::insert_attribute_with_value).
    pub fn insert_attribute(&self, name: &QName) -> CursorResult<()> {
        self.insert_attribute_with_value(name, "")
    }

    /// Insert an attribute before the cursor's spot in the attribute area:
    /// before the current attribute, at the front when on the element start,
    /// at the back when just past the attribute area.
    pub fn insert_attribute_with_value(&self, name: &QName, value: &str) -> CursorResult<()> {
        validate_attr_name(name)?;
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        let (owner, anchor) = attr_anchor(&state, pos)?;
        if state.arena.find_attr(owner, name).is_some() {
            return Err(CursorError::IllegalArgument(format!(
                "duplicate attribute {}",
                name.qualified()
            )));
        }
        let run = save(&state.buffer, None, value);
        let attr = state.arena.alloc(TokenData::attr(name.clone(), run));
        state.arena.link_before(owner, anchor, attr);
        state.bump();
        Ok(())
    }

    /// Declare a namespace on the current element. An existing declaration
    /// for the same prefix is updated in place. The empty prefix declares
    /// the default namespace; an empty uri then undeclares it.
    pub fn insert_namespace(&self, prefix: &str, uri: &str) -> CursorResult<()> {
        if prefix == ns::XMLNS_PREFIX {
            return Err(CursorError::IllegalArgument(
                "the xmlns prefix cannot be declared".to_string(),
            ));
        }
        if prefix == ns::XML_PREFIX && uri != ns::XML_URI {
            return Err(CursorError::IllegalArgument(format!(
                "the xml prefix is reserved for {}",
                ns::XML_URI
            )));
        }
        if !prefix.is_empty() {
            validate_prefix(prefix)?;
            if uri.is_empty() {
                return Err(CursorError::IllegalArgument(
                    "a bound prefix requires a namespace uri".to_string(),
                ));
            }
        }
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        let (owner, _) = attr_anchor(&state, pos)?;

        let existing = state.arena.children(owner).take_while(|&c| state.arena.kind(c).is_attr_like()).find(|&c| {
            state.arena.kind(c) == TokenKind::Namespace && state.arena.data(c).ns_prefix() == prefix
        });
        let run = save(&state.buffer, None, uri);
        match existing {
            Some(decl) => {
                state.arena.data_mut(decl).value = Some(run);
            }
            None => {
                let anchor = if state.ns_decls_first {
                    state.arena.first_child(owner)
                } else {
                    state.arena.first_content_child(owner)
                };
                let decl = state.arena.alloc(TokenData::namespace(prefix, run));
                state.arena.link_before(owner, anchor, decl);
            }
        }
        state.bump();
        Ok(())
    }

    // ===== Value writes =====

    /// Rename the current element, attribute, or processing instruction.
    pub fn set_name(&self, name: &QName) -> CursorResult<()> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        if pos.site != Site::Token {
            return Err(CursorError::IllegalState(
                "only elements, attributes, and processing instructions can be renamed",
            ));
        }
        match state.arena.kind(pos.token) {
            TokenKind::Start => validate_element_name(name)?,
            TokenKind::Attr => validate_attr_name(name)?,
            TokenKind::ProcInst => {
                if name.has_uri() || !name.prefix.is_empty() {
                    return Err(CursorError::IllegalArgument(
                        "a processing instruction target has no namespace".to_string(),
                    ));
                }
                validate_pi_target(&name.local)?;
            }
            _ => {
                return Err(CursorError::IllegalState(
                    "only elements, attributes, and processing instructions can be renamed",
                ))
            }
        }
        state.arena.data_mut(pos.token).name = Some(name.clone());
        state.bump();
        Ok(())
    }

    /// Replace the logical value at the cursor: the whole content of a
    /// container, or the literal value of an Attr/Namespace/Comment/ProcInst.
    /// Fails from Text and End positions.
    pub fn set_text_value(&self, text: &str) -> CursorResult<()> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        match state.arena.position_kind(pos) {
            TokenKind::Text => Err(CursorError::IllegalState(
                "a text run cannot be set; set the value on its container",
            )),
            TokenKind::End | TokenKind::EndDoc => Err(CursorError::IllegalState(
                "end tokens carry no settable value",
            )),
            TokenKind::Attr | TokenKind::Namespace => {
                let run = save(&state.buffer, None, text);
                state.arena.data_mut(pos.token).value = Some(run);
                state.bump();
                Ok(())
            }
            TokenKind::Comment => {
                let safe = defuse_comment_text(text);
                let run = save(&state.buffer, None, &safe);
                state.arena.data_mut(pos.token).value = Some(run);
                state.bump();
                Ok(())
            }
            TokenKind::ProcInst => {
                let safe = defuse_proc_inst_text(text);
                let run = save(&state.buffer, None, &safe);
                state.arena.data_mut(pos.token).value = Some(run);
                state.bump();
                Ok(())
            }
            TokenKind::Start | TokenKind::StartDoc => {
                let container = pos.token;
                if !text.is_empty() {
                    check_text_at_top(&state, container)?;
                }
                let roots = content_roots(&state, container);
                remove_range_trees(&mut state, &roots, Position::end_of(container));
                if !text.is_empty() {
                    insert_text_run(&mut state, container, None, text);
                }
                state.bump();
                Ok(())
            }
            TokenKind::None => Ok(()),
        }
    }

    /// Create or overwrite the named attribute on the current element.
    pub fn set_attribute_text(&self, name: &QName, value: &str) -> CursorResult<()> {
        validate_attr_name(name)?;
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        if pos.site != Site::Token || state.arena.kind(pos.token) != TokenKind::Start {
            return Err(CursorError::IllegalState(
                "attributes live on element starts",
            ));
        }
        let run = save(&state.buffer, None, value);
        match state.arena.find_attr(pos.token, name) {
            Some(attr) => {
                state.arena.data_mut(attr).value = Some(run);
            }
            None => {
                let anchor = state.arena.first_content_child(pos.token);
                let attr = state.arena.alloc(TokenData::attr(name.clone(), run));
                state.arena.link_before(pos.token, anchor, attr);
            }
        }
        state.bump();
        Ok(())
    }

    /// Remove the named attribute from the current element. Returns whether
    /// anything was removed.
    pub fn remove_attribute(&self, name: &QName) -> CursorResult<bool> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        if pos.site != Site::Token || state.arena.kind(pos.token) != TokenKind::Start {
            return Err(CursorError::IllegalState(
                "attributes live on element starts",
            ));
        }
        match state.arena.find_attr(pos.token, name) {
            Some(attr) => {
                remove_tree(&mut state, attr);
                state.bump();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ===== Removals =====

    /// Remove the token at the cursor with its whole subtree. Cursors inside
    /// float to the removal point; text runs split by the removed token
    /// merge back together.
    pub fn remove_xml(&self) -> CursorResult<()> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        let target = removable_token(&state, pos)?;
        remove_tree(&mut state, target);
        state.bump();
        Ok(())
    }

    /// Remove everything between the current container's start and end,
    /// keeping its attribute area.
    pub fn remove_xml_contents(&self) -> CursorResult<()> {
        let mut state = self.entered();
        let pos = self.pos_in(&state)?;
        if pos.site != Site::Token || !state.arena.kind(pos.token).is_container() {
            return Err(CursorError::IllegalState(
                "contents can only be removed from a container",
            ));
        }
        let roots = content_roots(&state, pos.token);
        if remove_range_trees(&mut state, &roots, Position::end_of(pos.token)) {
            state.bump();
        }
        Ok(())
    }

    // ===== Transfers =====

    /// Move the token at this cursor (with its subtree) to just before
    /// `dest`, which may live in another document. Bookmarks travel with
    /// the content; cursors inside float to the removal point.
    pub fn move_xml(&self, dest: &Cursor) -> CursorResult<()> {
        self.transfer_xml(dest, true)
    }

    /// Copy the token at this cursor to just before `dest`. The source
    /// document is left untouched.
    pub fn copy_xml(&self, dest: &Cursor) -> CursorResult<()> {
        self.transfer_xml(dest, false)
    }

    /// Move the contents of the current container to just before `dest`.
    pub fn move_xml_contents(&self, dest: &Cursor) -> CursorResult<()> {
        self.transfer_contents(dest, true)
    }

    /// Copy the contents of the current container to just before `dest`.
    pub fn copy_xml_contents(&self, dest: &Cursor) -> CursorResult<()> {
        self.transfer_contents(dest, false)
    }

    /// Move up to `n` characters from this Text position to just before
    /// `dest`. Returns characters actually moved; 0 from non-Text sources.
    pub fn move_chars(&self, n: usize, dest: &Cursor) -> CursorResult<usize> {
        self.transfer_chars(n, dest, true)
    }

    /// Copy up to `n` characters from this Text position to just before
    /// `dest`, leaving the source untouched.
    pub fn copy_chars(&self, n: usize, dest: &Cursor) -> CursorResult<usize> {
        self.transfer_chars(n, dest, false)
    }

    fn transfer_xml(&self, dest: &Cursor, take: bool) -> CursorResult<()> {
        if Arc::ptr_eq(&self.shared, &dest.shared) {
            return self.transfer_xml_local(dest, take);
        }
        let (mut src, mut dst) = enter_pair(&self.shared, &dest.shared);
        let src_pos = self.pos_in(&src)?;
        let dst_pos = dest.pos_in(&dst)?;
        let tok = movable_token(&src, src_pos)?;
        let kind = src.arena.kind(tok);

        let (parent, anchor) = if kind.is_attr_like() {
            let (owner, anchor) = attr_anchor(&dst, dst_pos)?;
            if kind == TokenKind::Attr {
                check_attr_free(&dst, owner, src.arena.name(tok), None)?;
            }
            (owner, anchor)
        } else {
            structural_target(&dst, dst_pos)?;
            if kind == TokenKind::Start {
                check_element_at_top(&dst, target_parent(&dst, dst_pos), None)?;
            }
            content_anchor(&mut dst, dst_pos)
        };

        let frag = src.arena.extract_fragment(tok, tok);
        let new_ids = dst.arena.implant_fragment(&frag, parent, anchor);
        if kind.is_attr_like() {
            namespace::carry_over_declarations(&mut dst.arena, &[parent]);
        } else {
            namespace::carry_over_declarations(&mut dst.arena, &[new_ids[0]]);
        }
        if take {
            for (i, &old) in frag.source_ids.iter().enumerate() {
                let entries = src.bookmarks.take_token(old);
                if !entries.is_empty() {
                    dst.bookmarks.insert_entries(new_ids[i], entries);
                }
            }
            remove_tree(&mut src, tok);
            src.bump();
        }
        dst.bump();
        Ok(())
    }

    fn transfer_xml_local(&self, dest: &Cursor, take: bool) -> CursorResult<()> {
        let mut state = self.entered();
        let src_pos = self.pos_in(&state)?;
        let dst_pos = dest.pos_in(&state)?;
        let tok = movable_token(&state, src_pos)?;
        let kind = state.arena.kind(tok);

        if take {
            if kind.is_attr_like() {
                let (owner, anchor) = attr_anchor(&state, dst_pos)?;
                if anchor == Some(tok) {
                    return Ok(());
                }
                if kind == TokenKind::Attr {
                    check_attr_free(&state, owner, state.arena.name(tok), Some(tok))?;
                }
                let prev = state.arena.prev_sibling(tok);
                let next = state.arena.next_sibling(tok);
                state.arena.unlink(tok);
                state.arena.link_before(owner, anchor, tok);
                coalesce_gap(&mut state, prev, next);
                namespace::carry_over_declarations(&mut state.arena, &[owner]);
            } else {
                structural_target(&state, dst_pos)?;
                let dparent = target_parent(&state, dst_pos);
                if state.arena.is_ancestor_or_self(tok, dparent) {
                    return Err(CursorError::Hierarchy(
                        "cannot move a node into its own subtree",
                    ));
                }
                if kind == TokenKind::Start {
                    check_element_at_top(&state, dparent, Some(tok))?;
                }
                let (parent, anchor) = content_anchor(&mut state, dst_pos);
                if anchor == Some(tok) {
                    return Ok(());
                }
                let prev = state.arena.prev_sibling(tok);
                let next = state.arena.next_sibling(tok);
                state.arena.unlink(tok);
                state.arena.link_before(parent, anchor, tok);
                coalesce_gap(&mut state, prev, next);
                namespace::carry_over_declarations(&mut state.arena, &[tok]);
            }
            state.bump();
            return Ok(());
        }

        // copy: snapshot first, so copying into one's own subtree is fine
        let (parent, anchor) = if kind.is_attr_like() {
            let (owner, anchor) = attr_anchor(&state, dst_pos)?;
            if kind == TokenKind::Attr {
                check_attr_free(&state, owner, state.arena.name(tok), None)?;
            }
            (owner, anchor)
        } else {
            structural_target(&state, dst_pos)?;
            if kind == TokenKind::Start {
                check_element_at_top(&state, target_parent(&state, dst_pos), None)?;
            }
            content_anchor(&mut state, dst_pos)
        };
        let frag = state.arena.extract_fragment(tok, tok);
        let new_ids = state.arena.implant_fragment(&frag, parent, anchor);
        if kind.is_attr_like() {
            namespace::carry_over_declarations(&mut state.arena, &[parent]);
        } else {
            namespace::carry_over_declarations(&mut state.arena, &[new_ids[0]]);
        }
        state.bump();
        Ok(())
    }

    fn transfer_contents(&self, dest: &Cursor, take: bool) -> CursorResult<()> {
        if Arc::ptr_eq(&self.shared, &dest.shared) {
            return self.transfer_contents_local(dest, take);
        }
        let (mut src, mut dst) = enter_pair(&self.shared, &dest.shared);
        let src_pos = self.pos_in(&src)?;
        let dst_pos = dest.pos_in(&dst)?;
        let container = container_of(&src, src_pos)?;
        let roots = content_roots(&src, container);
        if roots.is_empty() {
            return Ok(());
        }
        structural_target(&dst, dst_pos)?;
        let kinds: Vec<TokenKind> = roots.iter().map(|&r| src.arena.kind(r)).collect();
        check_kinds_at_top(&dst, target_parent(&dst, dst_pos), &kinds, &[])?;
        let (parent, anchor) = content_anchor(&mut dst, dst_pos);

        let first = roots[0];
        let last = *roots.last().unwrap_or(&first);
        let frag = src.arena.extract_fragment(first, last);
        let new_ids = dst.arena.implant_fragment(&frag, parent, anchor);
        let new_roots: Vec<TokenId> = frag
            .roots()
            .iter()
            .map(|&r| new_ids[r as usize])
            .collect();
        namespace::carry_over_declarations(&mut dst.arena, &new_roots);
        if take {
            for (i, &old) in frag.source_ids.iter().enumerate() {
                let entries = src.bookmarks.take_token(old);
                if !entries.is_empty() {
                    dst.bookmarks.insert_entries(new_ids[i], entries);
                }
            }
            remove_range_trees(&mut src, &roots, Position::end_of(container));
            src.bump();
        }
        coalesce_at(&mut dst, new_roots.first().copied());
        coalesce_at(&mut dst, anchor);
        dst.bump();
        Ok(())
    }

    fn transfer_contents_local(&self, dest: &Cursor, take: bool) -> CursorResult<()> {
        let mut state = self.entered();
        let src_pos = self.pos_in(&state)?;
        let dst_pos = dest.pos_in(&state)?;
        let container = container_of(&state, src_pos)?;
        let roots = content_roots(&state, container);
        if roots.is_empty() {
            return Ok(());
        }
        structural_target(&state, dst_pos)?;
        let dparent = target_parent(&state, dst_pos);
        let kinds: Vec<TokenKind> = roots.iter().map(|&r| state.arena.kind(r)).collect();

        if take {
            if state.arena.is_ancestor_or_self(container, dparent) {
                return Err(CursorError::Hierarchy(
                    "cannot move contents into themselves",
                ));
            }
            check_kinds_at_top(&state, dparent, &kinds, &roots)?;
            let (parent, anchor) = content_anchor(&mut state, dst_pos);
            for &root in &roots {
                state.arena.unlink(root);
                state.arena.link_before(parent, anchor, root);
            }
            namespace::carry_over_declarations(&mut state.arena, &roots);
            coalesce_at(&mut state, roots.first().copied());
            coalesce_at(&mut state, anchor);
            state.bump();
            return Ok(());
        }

        check_kinds_at_top(&state, dparent, &kinds, &[])?;
        let first = roots[0];
        let last = *roots.last().unwrap_or(&first);
        let frag = state.arena.extract_fragment(first, last);
        let (parent, anchor) = content_anchor(&mut state, dst_pos);
        let new_ids = state.arena.implant_fragment(&frag, parent, anchor);
        let new_roots: Vec<TokenId> = frag
            .roots()
            .iter()
            .map(|&r| new_ids[r as usize])
            .collect();
        namespace::carry_over_declarations(&mut state.arena, &new_roots);
        coalesce_at(&mut state, new_roots.first().copied());
        coalesce_at(&mut state, anchor);
        state.bump();
        Ok(())
    }

    fn transfer_chars(&self, n: usize, dest: &Cursor, take: bool) -> CursorResult<usize> {
        if Arc::ptr_eq(&self.shared, &dest.shared) {
            return self.transfer_chars_local(n, dest, take);
        }
        let (mut src, mut dst) = enter_pair(&self.shared, &dest.shared);
        let src_pos = self.pos_in(&src)?;
        let dst_pos = dest.pos_in(&dst)?;
        if src.arena.kind(src_pos.token) != TokenKind::Text {
            return Ok(0);
        }
        check_chars_insert(&dst, dst_pos)?;
        let run = match src.arena.value(src_pos.token) {
            Some(run) => run.clone(),
            None => return Ok(0),
        };
        let off = src_pos.text_offset();
        let (end, moved) = run.advance_chars(off, n);
        if moved == 0 {
            return Ok(0);
        }
        let piece = run.substr(off, end - off);
        if take {
            if off == 0 && end == run.len {
                remove_tree(&mut src, src_pos.token);
            } else {
                src.arena.data_mut(src_pos.token).value = Some(run.remove_range(off, end - off));
                src.on_text_removed(src_pos.token, off, end - off);
            }
            src.bump();
        }
        insert_run(&mut dst, dst_pos, &piece);
        dst.bump();
        Ok(moved)
    }

    fn transfer_chars_local(&self, n: usize, dest: &Cursor, take: bool) -> CursorResult<usize> {
        let mut state = self.entered();
        let src_pos = self.pos_in(&state)?;
        let dst_pos = dest.pos_in(&state)?;
        if state.arena.kind(src_pos.token) != TokenKind::Text {
            return Ok(0);
        }
        check_chars_insert(&state, dst_pos)?;
        let run = match state.arena.value(src_pos.token) {
            Some(run) => run.clone(),
            None => return Ok(0),
        };
        let off = src_pos.text_offset();
        let (end, moved) = run.advance_chars(off, n);
        if moved == 0 {
            return Ok(0);
        }
        let piece = run.substr(off, end - off);
        if !take {
            insert_run(&mut state, dst_pos, &piece);
            state.bump();
            return Ok(moved);
        }
        if off == 0 && end == run.len {
            remove_tree(&mut state, src_pos.token);
        } else {
            state.arena.data_mut(src_pos.token).value = Some(run.remove_range(off, end - off));
            state.on_text_removed(src_pos.token, off, end - off);
        }
        // the removal fixups may have carried the destination along
        let landed = dest.pos_in(&state)?;
        check_chars_insert(&state, landed)?;
        insert_run(&mut state, landed, &piece);
        state.bump();
        Ok(moved)
    }
}

// ===== Validation helpers =====

fn validate_element_name(name: &QName) -> CursorResult<()> {
    validate_local_name(&name.local)?;
    if !name.prefix.is_empty() {
        validate_prefix(&name.prefix)?;
    }
    Ok(())
}

fn validate_attr_name(name: &QName) -> CursorResult<()> {
    if name.local.as_ref() == ns::XMLNS_PREFIX || name.prefix.as_ref() == ns::XMLNS_PREFIX {
        return Err(CursorError::IllegalArgument(
            "use insert_namespace for namespace declarations".to_string(),
        ));
    }
    validate_local_name(&name.local)?;
    if !name.prefix.is_empty() {
        validate_prefix(&name.prefix)?;
    }
    Ok(())
}

/// Reject positions where no content may be inserted: before the document
/// start and inside the attribute area.
fn structural_target(state: &DocState, pos: Position) -> CursorResult<()> {
    match state.arena.position_kind(pos) {
        TokenKind::StartDoc => Err(CursorError::IllegalState(
            "cannot insert before the start of the document",
        )),
        TokenKind::Attr | TokenKind::Namespace => Err(CursorError::IllegalState(
            "cannot insert content in the attribute area",
        )),
        _ => Ok(()),
    }
}

/// Positions `insert_chars` accepts, which additionally exclude value
/// tokens. The document-level text rule is checked for non-Text targets.
fn check_chars_insert(state: &DocState, pos: Position) -> CursorResult<()> {
    match state.arena.position_kind(pos) {
        TokenKind::StartDoc => {
            return Err(CursorError::IllegalState(
                "cannot insert before the start of the document",
            ))
        }
        TokenKind::Attr | TokenKind::Namespace => {
            return Err(CursorError::IllegalState(
                "cannot insert characters in the attribute area",
            ))
        }
        TokenKind::Comment | TokenKind::ProcInst => {
            return Err(CursorError::IllegalState(
                "cannot insert characters into a value token",
            ))
        }
        _ => {}
    }
    if state.arena.kind(pos.token) != TokenKind::Text {
        check_text_at_top(state, target_parent(state, pos))?;
    }
    Ok(())
}

fn check_text_at_top(state: &DocState, parent: TokenId) -> CursorResult<()> {
    if parent == ROOT && !state.fragment {
        return Err(CursorError::Hierarchy(
            "text at the document level requires a fragment",
        ));
    }
    Ok(())
}

/// Enforce the single-root rule for one incoming element. `exclude` names a
/// token about to be relocated, so it does not count against itself.
fn check_element_at_top(
    state: &DocState,
    parent: TokenId,
    exclude: Option<TokenId>,
) -> CursorResult<()> {
    if parent != ROOT || state.fragment {
        return Ok(());
    }
    let clash = state
        .arena
        .children(ROOT)
        .any(|c| Some(c) != exclude && state.arena.kind(c) == TokenKind::Start);
    if clash {
        return Err(CursorError::Hierarchy(
            "a document may hold only one root element",
        ));
    }
    Ok(())
}

/// Document-level checks for a batch of incoming root kinds.
fn check_kinds_at_top(
    state: &DocState,
    parent: TokenId,
    kinds: &[TokenKind],
    exclude: &[TokenId],
) -> CursorResult<()> {
    if parent != ROOT || state.fragment {
        return Ok(());
    }
    if kinds.contains(&TokenKind::Text) {
        return Err(CursorError::Hierarchy(
            "text at the document level requires a fragment",
        ));
    }
    let incoming = kinds.iter().filter(|&&k| k == TokenKind::Start).count();
    if incoming == 0 {
        return Ok(());
    }
    let existing = state
        .arena
        .children(ROOT)
        .filter(|&c| !exclude.contains(&c) && state.arena.kind(c) == TokenKind::Start)
        .count();
    if existing + incoming > 1 {
        return Err(CursorError::Hierarchy(
            "a document may hold only one root element",
        ));
    }
    Ok(())
}

fn check_attr_free(
    state: &DocState,
    owner: TokenId,
    name: Option<&QName>,
    exclude: Option<TokenId>,
) -> CursorResult<()> {
    let Some(name) = name else { return Ok(()) };
    match state.arena.find_attr(owner, name) {
        Some(found) if Some(found) != exclude => Err(CursorError::IllegalArgument(format!(
            "duplicate attribute {}",
            name.qualified()
        ))),
        _ => Ok(()),
    }
}

// ===== Target resolution =====

/// Parent a before-the-cursor insert would link under, without mutating.
fn target_parent(state: &DocState, pos: Position) -> TokenId {
    match pos.site {
        Site::End => pos.token,
        _ => state.arena.parent(pos.token).unwrap_or(ROOT),
    }
}

/// Resolve the position to a (parent, link-before-anchor) pair, splitting
/// the run when the cursor sits mid-text. Callers validate first; the split
/// is the only mutation here and registry fixups keep positions aligned.
fn content_anchor(state: &mut DocState, pos: Position) -> (TokenId, Option<TokenId>) {
    match pos.site {
        Site::Token => (
            state.arena.parent(pos.token).unwrap_or(ROOT),
            Some(pos.token),
        ),
        Site::Text(at) => {
            let suffix = state.arena.split_text(pos.token, at);
            state.on_text_split(pos.token, at, suffix);
            (state.arena.parent(pos.token).unwrap_or(ROOT), Some(suffix))
        }
        Site::End => (pos.token, None),
    }
}

/// Attribute-area insertion point for the position, or the illegal-state
/// error. Legal spots: on an element start (front of the area), on an
/// attribute or namespace (before it), and on the boundary just past the
/// area (its back).
fn attr_anchor(state: &DocState, pos: Position) -> CursorResult<(TokenId, Option<TokenId>)> {
    const BAD: CursorError =
        CursorError::IllegalState("attributes may only be inserted in an element's attribute area");
    match pos.site {
        Site::Token => {
            let kind = state.arena.kind(pos.token);
            if kind == TokenKind::Start {
                return Ok((pos.token, state.arena.first_child(pos.token)));
            }
            if kind.is_attr_like() {
                let owner = state.arena.parent(pos.token).unwrap_or(ROOT);
                return Ok((owner, Some(pos.token)));
            }
            let Some(parent) = state.arena.parent(pos.token) else {
                return Err(BAD);
            };
            if state.arena.kind(parent) == TokenKind::Start
                && state.arena.first_content_child(parent) == Some(pos.token)
            {
                return Ok((parent, Some(pos.token)));
            }
            Err(BAD)
        }
        Site::End => {
            if state.arena.kind(pos.token) == TokenKind::Start
                && state.arena.first_content_child(pos.token).is_none()
            {
                return Ok((pos.token, None));
            }
            Err(BAD)
        }
        Site::Text(_) => Err(BAD),
    }
}

fn container_of(state: &DocState, pos: Position) -> CursorResult<TokenId> {
    if pos.site == Site::Token && state.arena.kind(pos.token).is_container() {
        Ok(pos.token)
    } else {
        Err(CursorError::IllegalState(
            "contents can only be transferred from a container",
        ))
    }
}

fn content_roots(state: &DocState, container: TokenId) -> Vec<TokenId> {
    let mut roots = Vec::new();
    let mut cur = state.arena.first_content_child(container);
    while let Some(c) = cur {
        roots.push(c);
        cur = state.arena.next_sibling(c);
    }
    roots
}

fn removable_token(state: &DocState, pos: Position) -> CursorResult<TokenId> {
    if pos.site != Site::Token {
        return Err(CursorError::IllegalState(
            "no removable token at this position",
        ));
    }
    match state.arena.kind(pos.token) {
        TokenKind::Start
        | TokenKind::Text
        | TokenKind::Comment
        | TokenKind::ProcInst
        | TokenKind::Attr
        | TokenKind::Namespace => Ok(pos.token),
        TokenKind::StartDoc => Err(CursorError::IllegalState(
            "cannot remove the document itself",
        )),
        _ => Err(CursorError::IllegalState(
            "no removable token at this position",
        )),
    }
}

fn movable_token(state: &DocState, pos: Position) -> CursorResult<TokenId> {
    if pos.site != Site::Token {
        return Err(CursorError::IllegalState(
            "no movable token at this position",
        ));
    }
    match state.arena.kind(pos.token) {
        TokenKind::Start
        | TokenKind::Comment
        | TokenKind::ProcInst
        | TokenKind::Attr
        | TokenKind::Namespace => Ok(pos.token),
        TokenKind::Text => Err(CursorError::IllegalState("use move_chars to transfer text")),
        TokenKind::StartDoc => Err(CursorError::IllegalState("cannot move the document itself")),
        _ => Err(CursorError::IllegalState(
            "no movable token at this position",
        )),
    }
}

// ===== Mutation primitives =====

/// Insert `run` before `pos`. Extends the run at a Text position, extends a
/// preceding sibling run otherwise, and only allocates a fresh Text token
/// when neither neighbor can absorb the characters.
fn insert_run(state: &mut DocState, pos: Position, run: &CharRun) {
    if state.arena.kind(pos.token) == TokenKind::Text && pos.site != Site::End {
        let at = pos.text_offset();
        let old = state
            .arena
            .value(pos.token)
            .cloned()
            .unwrap_or_else(CharRun::empty);
        state.arena.data_mut(pos.token).value = Some(old.splice(at, run));
        state.on_text_inserted(pos.token, at, run.len);
        return;
    }
    let (parent, anchor) = content_anchor(state, pos);
    let prev = match anchor {
        Some(a) => state.arena.prev_sibling(a),
        None => state.arena.last_child(parent),
    };
    if let Some(p) = prev {
        if state.arena.kind(p) == TokenKind::Text {
            let old = state.arena.value(p).cloned().unwrap_or_else(CharRun::empty);
            let base = old.len;
            state.arena.data_mut(p).value = Some(old.concat(run));
            state.on_text_inserted(p, base, run.len);
            return;
        }
    }
    let tok = state.arena.alloc(TokenData::text(run.clone()));
    state.arena.link_before(parent, anchor, tok);
}

fn insert_text_run(state: &mut DocState, parent: TokenId, anchor: Option<TokenId>, text: &str) {
    let run = save(&state.buffer, None, text);
    let pos = match anchor {
        Some(a) => Position::at(a),
        None => Position::end_of(parent),
    };
    insert_run(state, pos, &run);
}

/// Unlink and free the subtree at `tok`. Cursors and bookmarks inside float
/// to the position just past it; a text gap left behind is merged.
fn remove_tree(state: &mut DocState, tok: TokenId) {
    let prev = state.arena.prev_sibling(tok);
    let next = state.arena.next_sibling(tok);
    let landing = state
        .arena
        .after_subtree(tok)
        .unwrap_or_else(Position::end_doc);
    let removed: HashSet<TokenId> = state.arena.collect_subtree(tok).into_iter().collect();
    state.arena.unlink(tok);
    state.on_removed(&removed, landing);
    state.arena.free_subtree(tok);
    coalesce_gap(state, prev, next);
}

/// Remove several sibling subtrees at once, all landing at `landing`.
/// Returns whether anything was removed.
fn remove_range_trees(state: &mut DocState, roots: &[TokenId], landing: Position) -> bool {
    if roots.is_empty() {
        return false;
    }
    let mut removed = HashSet::new();
    for &root in roots {
        removed.extend(state.arena.collect_subtree(root));
    }
    for &root in roots {
        state.arena.unlink(root);
    }
    state.on_removed(&removed, landing);
    for &root in roots {
        state.arena.free_subtree(root);
    }
    true
}

/// Merge `prev` and `next` when a removal left two Text runs adjacent.
fn coalesce_gap(state: &mut DocState, prev: Option<TokenId>, next: Option<TokenId>) {
    let (Some(p), Some(n)) = (prev, next) else {
        return;
    };
    if state.arena.next_sibling(p) != Some(n) {
        return;
    }
    if state.arena.kind(p) != TokenKind::Text || state.arena.kind(n) != TokenKind::Text {
        return;
    }
    let base_run = state.arena.value(p).cloned().unwrap_or_else(CharRun::empty);
    let next_run = state.arena.value(n).cloned().unwrap_or_else(CharRun::empty);
    let base = base_run.len;
    state.arena.data_mut(p).value = Some(base_run.concat(&next_run));
    state.arena.unlink(n);
    state.on_text_merged(n, p, base);
    state.arena.free_token(n);
}

/// Merge `right` with the sibling before it, used on the seams of an
/// implanted fragment.
fn coalesce_at(state: &mut DocState, right: Option<TokenId>) {
    let Some(n) = right else { return };
    let prev = state.arena.prev_sibling(n);
    coalesce_gap(state, prev, Some(n));
}

// ===== Tests =====
