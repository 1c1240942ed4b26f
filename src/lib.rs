//! xmlcursor - an XML token store with stateful editing cursors
//!
//! Layers:
//! - chars: immutable shared text, runs over strings and append buffers
//! - store: token arena, positions, namespace scopes
//! - document: shared handle, monitor, change stamps, value handles
//! - cursor: navigation, char and token editing, bookmarks, selections
//! - path: compiled path expressions, cached and batch-evaluated
//! - parse / serialize: text in, text out

// The char and token layers carry more surface than the cursor exercises.
#![allow(dead_code)]

mod chars;
mod cursor;
mod document;
mod error;
mod parse;
mod path;
mod serialize;
mod store;

pub use cursor::Cursor;
pub use document::{ChangeStamp, Document, DocumentOptions, SyncMode, ValueHandle};
pub use error::{CursorError, CursorResult, ParseError, PathError};
pub use store::{QName, TokenKind};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;
