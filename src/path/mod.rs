//! Limited path expressions for cursor selections.
//!
//! The language is a small XPath subset: an optional run of
//! `declare namespace p='uri';` bindings, then a union (`|`) of relative or
//! absolute paths built from `/`, `//`, `.`, `..`, element and attribute
//! name tests (`name`, `p:name`, `*`, `p:*`, `@name`, `@p:name`, `@*`), the
//! kind tests `text()`, `comment()` and `node()`, and the predicates `[n]`
//! and `[@name='value']`.
//!
//! Compilation is cached per document; evaluation walks the token tree and
//! yields matches in document order. Both happen lazily at the first call
//! that needs selection results, never inside `select_path` itself.

mod eval;
mod lexer;
mod parser;

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use rayon::prelude::*;

use crate::error::PathError;
use crate::store::{Position, TokenArena};

pub use parser::PathExpr;

/// Compiled expressions kept per document.
const EXPR_CACHE_CAPACITY: usize = 128;

pub(crate) fn new_expr_cache() -> LruCache<String, Arc<PathExpr>> {
    LruCache::new(NonZeroUsize::new(EXPR_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN))
}

/// Compile every expression (through `cache`) and evaluate all of them from
/// `origin`. Results are concatenated per expression, each in document
/// order. Multi-expression batches evaluate in parallel.
pub(crate) fn evaluate_batch(
    arena: &TokenArena,
    cache: &mut LruCache<String, Arc<PathExpr>>,
    origin: Position,
    exprs: &[String],
) -> Result<Vec<Position>, PathError> {
    let mut compiled = Vec::with_capacity(exprs.len());
    for text in exprs {
        let expr = match cache.get(text) {
            Some(expr) => Arc::clone(expr),
            None => {
                let expr = Arc::new(PathExpr::compile(text)?);
                cache.put(text.clone(), Arc::clone(&expr));
                expr
            }
        };
        compiled.push(expr);
    }
    match compiled.as_slice() {
        [] => Ok(Vec::new()),
        [single] => Ok(eval::evaluate(arena, origin, single)),
        many => Ok(many
            .par_iter()
            .map(|expr| eval::evaluate(arena, origin, expr))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect()),
    }
}
