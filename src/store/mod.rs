//! Token tree: the document's structural skeleton
//!
//! - `token`: token kinds, arena entries, qualified names
//! - `tree`: the arena itself, links, positions, fragments
//! - `name`: name validation and reserved-sequence defusing
//! - `namespace`: declaration scope lookup and copy carry-over

pub mod name;
pub mod namespace;
pub mod token;
pub mod tree;

pub use token::{QName, TokenData, TokenId, TokenKind};
pub use tree::{Fragment, Position, Site, TokenArena, ROOT};
