//! Namespace scope lookup over Namespace tokens
//!
//! Declarations live in the tree as Namespace tokens in each element's
//! attribute area; resolution climbs the ancestor chain. The `xml` and
//! `xmlns` prefixes are pre-bound per the W3C namespaces recommendation.

use super::token::{QName, TokenData, TokenId, TokenKind};
use super::tree::TokenArena;
use crate::chars::CharRun;

/// Well-known namespace constants
pub mod ns {
    pub const XML_PREFIX: &str = "xml";
    pub const XML_URI: &str = "http://www.w3.org/XML/1998/namespace";
    pub const XMLNS_PREFIX: &str = "xmlns";
    pub const XMLNS_URI: &str = "http://www.w3.org/2000/xmlns/";
}

/// Nearest element at or above `id` whose attribute area can hold
/// declarations (StartDoc counts, for fragment-level declarations).
fn scope_start(arena: &TokenArena, id: TokenId) -> TokenId {
    let mut cur = id;
    loop {
        if arena.kind(cur).is_container() {
            return cur;
        }
        match arena.parent(cur) {
            Some(p) => cur = p,
            None => return cur,
        }
    }
}

/// Resolve `prefix` ("" for the default namespace) at `from`.
///
/// Returns the bound URI; `Some("")` is an explicit un-declaration, `None`
/// means the prefix is unbound here.
pub fn namespace_for_prefix(arena: &TokenArena, from: TokenId, prefix: &str) -> Option<String> {
    if prefix == ns::XML_PREFIX {
        return Some(ns::XML_URI.to_string());
    }
    if prefix == ns::XMLNS_PREFIX {
        return Some(ns::XMLNS_URI.to_string());
    }
    let mut cur = Some(scope_start(arena, from));
    while let Some(elem) = cur {
        for child in arena.children(elem) {
            let data = arena.data(child);
            if !data.kind.is_attr_like() {
                break;
            }
            if data.kind == TokenKind::Namespace && data.ns_prefix() == prefix {
                return Some(data.value.as_ref().map_or_else(String::new, |r| r.to_string_value()));
            }
        }
        cur = arena.parent(elem);
    }
    None
}

/// Find a prefix bound to `uri` at `from`, skipping prefixes shadowed by a
/// nearer declaration.
pub fn prefix_for_namespace(arena: &TokenArena, from: TokenId, uri: &str) -> Option<String> {
    if uri == ns::XML_URI {
        return Some(ns::XML_PREFIX.to_string());
    }
    if uri == ns::XMLNS_URI {
        return Some(ns::XMLNS_PREFIX.to_string());
    }
    if uri.is_empty() {
        return None;
    }
    let mut shadowed: Vec<String> = Vec::new();
    let mut cur = Some(scope_start(arena, from));
    while let Some(elem) = cur {
        for child in arena.children(elem) {
            let data = arena.data(child);
            if !data.kind.is_attr_like() {
                break;
            }
            if data.kind != TokenKind::Namespace {
                continue;
            }
            let prefix = data.ns_prefix();
            if shadowed.iter().any(|s| s == prefix) {
                continue;
            }
            let bound = data.value.as_ref().map_or_else(String::new, |r| r.to_string_value());
            if bound == uri {
                return Some(prefix.to_string());
            }
            shadowed.push(prefix.to_string());
        }
        cur = arena.parent(elem);
    }
    None
}

/// Pick an unused prefix at `at` for a URI that has none.
fn invent_prefix(arena: &TokenArena, at: TokenId) -> String {
    for i in 1u32.. {
        let candidate = format!("ns{i}");
        if namespace_for_prefix(arena, at, &candidate).is_none() {
            return candidate;
        }
    }
    unreachable!("prefix space exhausted")
}

/// Declare `prefix` -> `uri` at the front of `elem`'s attribute area.
fn declare(arena: &mut TokenArena, elem: TokenId, prefix: &str, uri: &str) {
    let decl = arena.alloc(TokenData::namespace(prefix, CharRun::from(uri)));
    let anchor = arena.first_child(elem);
    arena.link_before(elem, anchor, decl);
}

/// Make every qualified name inside the freshly grafted `roots` resolve in
/// its new scope, adding declarations where the destination lacks them.
///
/// Copies never carry ambient declarations with them, so an element that
/// relied on an ancestor's declaration in its old home gets an explicit one
/// here. Elements in no namespace get an explicit un-declaration when the
/// destination has a default namespace that would capture them. Prefixless
/// attribute names in a namespace get an invented prefix.
///
/// Returns the number of declarations added.
pub fn carry_over_declarations(arena: &mut TokenArena, roots: &[TokenId]) -> usize {
    let mut added = 0;
    for &root in roots {
        // preorder, parents before children, so inherited fixes are seen
        let subtree = arena.collect_subtree(root);
        for id in subtree {
            if arena.kind(id) != TokenKind::Start {
                continue;
            }
            added += fix_element(arena, id);
        }
    }
    added
}

fn fix_element(arena: &mut TokenArena, elem: TokenId) -> usize {
    let mut added = 0;

    let name = arena.name(elem).cloned();
    if let Some(name) = name {
        let prefix = name.prefix.to_string();
        if name.has_uri() {
            let bound = namespace_for_prefix(arena, elem, &prefix);
            if bound.as_deref() != Some(&*name.uri) {
                declare(arena, elem, &prefix, &name.uri);
                added += 1;
            }
        } else if prefix.is_empty() {
            // no-namespace element under a live default declaration needs
            // an explicit un-declaration
            if matches!(namespace_for_prefix(arena, elem, ""), Some(uri) if !uri.is_empty()) {
                declare(arena, elem, "", "");
                added += 1;
            }
        }
    }

    let attrs: Vec<TokenId> = arena
        .children(elem)
        .take_while(|&c| arena.kind(c).is_attr_like())
        .filter(|&c| arena.kind(c) == TokenKind::Attr)
        .collect();
    for attr in attrs {
        let Some(name) = arena.name(attr).cloned() else {
            continue;
        };
        if !name.has_uri() {
            continue;
        }
        let mut prefix = name.prefix.to_string();
        if prefix.is_empty() {
            // unprefixed attributes are never in a namespace; give this one
            // a prefix so its URI survives serialization
            prefix = invent_prefix(arena, elem);
            if let Some(data_name) = &mut arena.data_mut(attr).name {
                *data_name = QName::with_prefix(&name.uri, &name.local, &prefix);
            }
        }
        let bound = namespace_for_prefix(arena, attr, &prefix);
        if bound.as_deref() != Some(&*name.uri) {
            declare(arena, elem, &prefix, &name.uri);
            added += 1;
        }
    }

    added
}
