//! Path expression evaluation
//!
//! Each step maps a context set to the next one. A plain step looks at a
//! context's content children; a `//` step looks at the whole content
//! subtree, and for attribute tests at the context's own attribute area as
//! well. Predicates filter the candidates one context produced, so `[n]`
//! counts that context's matches from 1.
//!
//! Every step and the final union come out sorted in document order with
//! duplicates removed. Evaluation cannot fail; all static checks happened
//! at compile time.

use crate::store::{Position, QName, TokenArena, TokenId, TokenKind, ROOT};

use super::parser::{NodeTest, PathExpr, Predicate, Step};

/// Evaluate a compiled expression from `origin`.
pub fn evaluate(arena: &TokenArena, origin: Position, expr: &PathExpr) -> Vec<Position> {
    let mut matches = Vec::new();
    for branch in &expr.branches {
        let start = if branch.absolute { ROOT } else { origin.token };
        let mut contexts = vec![start];
        for step in &branch.steps {
            contexts = apply_step(arena, &contexts, step);
        }
        matches.extend(contexts);
    }
    document_order(arena, &mut matches);
    matches.into_iter().map(Position::at).collect()
}

/// Apply one step to every context.
fn apply_step(arena: &TokenArena, contexts: &[TokenId], step: &Step) -> Vec<TokenId> {
    let mut out = Vec::new();
    for &ctx in contexts {
        let mut found = candidates(arena, ctx, step);
        for predicate in &step.predicates {
            filter_predicate(arena, &mut found, predicate);
        }
        out.extend(found);
    }
    document_order(arena, &mut out);
    out
}

/// The nodes one context contributes to a step, before predicates.
fn candidates(arena: &TokenArena, ctx: TokenId, step: &Step) -> Vec<TokenId> {
    match &step.test {
        NodeTest::SelfNode => scope(arena, ctx, step.descend),
        NodeTest::ParentNode => scope(arena, ctx, step.descend)
            .into_iter()
            .filter_map(|id| arena.parent(id))
            .collect(),
        NodeTest::Attribute { uri, local } => {
            let mut found = Vec::new();
            for owner in scope(arena, ctx, step.descend) {
                found.extend(attribute_axis(arena, owner, uri, local));
            }
            found
        }
        test => {
            let mut pool = Vec::new();
            if step.descend {
                content_descendants(arena, ctx, &mut pool);
            } else {
                pool.extend(content_children(arena, ctx));
            }
            pool.retain(|&id| content_test_matches(arena, id, test));
            pool
        }
    }
}

/// The context alone, or with every content descendant for `//` steps.
fn scope(arena: &TokenArena, ctx: TokenId, descend: bool) -> Vec<TokenId> {
    let mut pool = vec![ctx];
    if descend {
        content_descendants(arena, ctx, &mut pool);
    }
    pool
}

/// Content children of a container: the child list past the attribute area.
fn content_children(arena: &TokenArena, id: TokenId) -> Vec<TokenId> {
    arena
        .children(id)
        .skip_while(|&c| arena.kind(c).is_attr_like())
        .collect()
}

/// All content tokens strictly below `id`, depth first.
fn content_descendants(arena: &TokenArena, id: TokenId, out: &mut Vec<TokenId>) {
    for child in content_children(arena, id) {
        out.push(child);
        if arena.kind(child) == TokenKind::Start {
            content_descendants(arena, child, out);
        }
    }
}

/// Matching Attr tokens of one owner's attribute area.
fn attribute_axis(
    arena: &TokenArena,
    owner: TokenId,
    uri: &Option<String>,
    local: &Option<String>,
) -> Vec<TokenId> {
    arena
        .children(owner)
        .take_while(|&c| arena.kind(c).is_attr_like())
        .filter(|&c| {
            arena.kind(c) == TokenKind::Attr
                && arena
                    .name(c)
                    .is_some_and(|name| name_matches(name, uri, local))
        })
        .collect()
}

/// Check a content token against an element or kind test.
fn content_test_matches(arena: &TokenArena, id: TokenId, test: &NodeTest) -> bool {
    let kind = arena.kind(id);
    match test {
        NodeTest::Element { uri, local } => {
            kind == TokenKind::Start
                && arena
                    .name(id)
                    .is_some_and(|name| name_matches(name, uri, local))
        }
        NodeTest::Text => kind == TokenKind::Text,
        NodeTest::Comment => kind == TokenKind::Comment,
        NodeTest::AnyNode => matches!(
            kind,
            TokenKind::Start | TokenKind::Text | TokenKind::Comment | TokenKind::ProcInst
        ),
        _ => false,
    }
}

/// `None` parts are wildcards; a `Some` uri must match exactly, so bare
/// names only ever match no-namespace tokens.
fn name_matches(name: &QName, uri: &Option<String>, local: &Option<String>) -> bool {
    uri.as_deref().is_none_or(|u| &*name.uri == u)
        && local.as_deref().is_none_or(|l| &*name.local == l)
}

/// Filter one context's candidate list in place.
fn filter_predicate(arena: &TokenArena, found: &mut Vec<TokenId>, predicate: &Predicate) {
    match predicate {
        Predicate::Index(n) => {
            if *n <= found.len() {
                let keep = found[*n - 1];
                found.clear();
                found.push(keep);
            } else {
                found.clear();
            }
        }
        Predicate::AttrEquals { uri, local, value } => {
            found.retain(|&id| attr_equals(arena, id, uri, local, value));
        }
    }
}

/// True when `id` is an element carrying the named attribute with exactly
/// `value` as its text.
fn attr_equals(arena: &TokenArena, id: TokenId, uri: &str, local: &str, value: &str) -> bool {
    if arena.kind(id) != TokenKind::Start {
        return false;
    }
    arena
        .children(id)
        .take_while(|&c| arena.kind(c).is_attr_like())
        .any(|c| {
            arena.kind(c) == TokenKind::Attr
                && arena
                    .name(c)
                    .is_some_and(|name| &*name.uri == uri && &*name.local == local)
                && arena
                    .value(c)
                    .is_some_and(|run| run.to_string_value() == value)
        })
}

/// Sort into document order and drop duplicates.
fn document_order(arena: &TokenArena, ids: &mut Vec<TokenId>) {
    ids.sort_by(|&a, &b| arena.compare_positions(Position::at(a), Position::at(b)));
    ids.dedup();
}
