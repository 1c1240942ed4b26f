//! Token representation
//!
//! Uses TokenId (u32) for compact, cache-friendly token references. The
//! arena stores only physical tokens (StartDoc, Start, Attr, Namespace,
//! Text, Comment, ProcInst); End and EndDoc are virtual sites on their
//! container and None is the walk sentinel, so those three kinds never
//! appear in a stored `TokenData`.

use std::fmt;
use std::sync::Arc;

use crate::chars::CharRun;

/// Compact token identifier (index into arena)
pub type TokenId = u32;

/// The ten token kinds a cursor can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Sentinel: no further token in the walk direction
    None,
    /// Document open
    StartDoc,
    /// Document close
    EndDoc,
    /// Element open
    Start,
    /// Element close
    End,
    /// Attribute
    Attr,
    /// Namespace declaration
    Namespace,
    /// Text run
    Text,
    /// Comment
    Comment,
    /// Processing instruction
    ProcInst,
}

impl TokenKind {
    /// Kinds that may own children.
    #[inline]
    pub fn is_container(self) -> bool {
        matches!(self, TokenKind::StartDoc | TokenKind::Start)
    }

    /// Kinds that live in the attribute area of a Start token.
    #[inline]
    pub fn is_attr_like(self) -> bool {
        matches!(self, TokenKind::Attr | TokenKind::Namespace)
    }

    /// Kinds that carry an attached character run.
    #[inline]
    pub fn has_value(self) -> bool {
        matches!(
            self,
            TokenKind::Text | TokenKind::Attr | TokenKind::Namespace | TokenKind::Comment | TokenKind::ProcInst
        )
    }
}

/// Qualified name: namespace URI + local name + prefix.
///
/// Equality and hashing cover (uri, local) only; the prefix is a
/// serialization detail and two names differing only by prefix are the same
/// name. An empty uri means "no namespace", which never matches a non-empty
/// one (bare local names do not match namespace-scoped candidates).
#[derive(Debug, Clone, Eq)]
pub struct QName {
    pub uri: Arc<str>,
    pub local: Arc<str>,
    pub prefix: Arc<str>,
}

impl QName {
    /// Name in no namespace, no prefix.
    pub fn local_only(local: &str) -> QName {
        QName {
            uri: Arc::from(""),
            local: Arc::from(local),
            prefix: Arc::from(""),
        }
    }

    /// Namespaced name with no preferred prefix.
    pub fn new(uri: &str, local: &str) -> QName {
        QName {
            uri: Arc::from(uri),
            local: Arc::from(local),
            prefix: Arc::from(""),
        }
    }

    /// Namespaced name with a preferred prefix.
    pub fn with_prefix(uri: &str, local: &str, prefix: &str) -> QName {
        QName {
            uri: Arc::from(uri),
            local: Arc::from(local),
            prefix: Arc::from(prefix),
        }
    }

    #[inline]
    pub fn has_uri(&self) -> bool {
        !self.uri.is_empty()
    }

    /// Rendered form: `prefix:local` or bare `local`.
    pub fn qualified(&self) -> String {
        if self.prefix.is_empty() {
            self.local.to_string()
        } else {
            format!("{}:{}", self.prefix, self.local)
        }
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &QName) -> bool {
        self.uri == other.uri && self.local == other.local
    }
}

impl std::hash::Hash for QName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
        self.local.hash(state);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "{}:{}", self.prefix, self.local)
        }
    }
}

/// A token in the arena.
#[derive(Debug, Clone)]
pub struct TokenData {
    /// Physical kind (never End, EndDoc, or None)
    pub kind: TokenKind,
    /// Qualified name for Start/Attr/ProcInst; for Namespace the declared
    /// prefix is stored in `local` (empty for the default declaration)
    pub name: Option<QName>,
    /// Attached character run for Text/Attr/Namespace/Comment/ProcInst
    pub value: Option<CharRun>,
    /// Owning container (None for the StartDoc token)
    pub parent: Option<TokenId>,
    /// First child token
    pub first_child: Option<TokenId>,
    /// Last child token
    pub last_child: Option<TokenId>,
    /// Previous sibling
    pub prev_sibling: Option<TokenId>,
    /// Next sibling
    pub next_sibling: Option<TokenId>,
}

impl TokenData {
    fn bare(kind: TokenKind) -> TokenData {
        TokenData {
            kind,
            name: None,
            value: None,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
        }
    }

    /// Create the document-open token.
    pub fn start_doc() -> TokenData {
        TokenData::bare(TokenKind::StartDoc)
    }

    /// Create an element-open token.
    pub fn element(name: QName) -> TokenData {
        TokenData {
            name: Some(name),
            ..TokenData::bare(TokenKind::Start)
        }
    }

    /// Create a text token over `run`.
    pub fn text(run: CharRun) -> TokenData {
        TokenData {
            value: Some(run),
            ..TokenData::bare(TokenKind::Text)
        }
    }

    /// Create an attribute token.
    pub fn attr(name: QName, value: CharRun) -> TokenData {
        TokenData {
            name: Some(name),
            value: Some(value),
            ..TokenData::bare(TokenKind::Attr)
        }
    }

    /// Create a namespace-declaration token binding `prefix` ("" for the
    /// default declaration) to the URI held in `uri_run`.
    pub fn namespace(prefix: &str, uri_run: CharRun) -> TokenData {
        TokenData {
            name: Some(QName::with_prefix("", prefix, "xmlns")),
            value: Some(uri_run),
            ..TokenData::bare(TokenKind::Namespace)
        }
    }

    /// Create a comment token (value must already be defused).
    pub fn comment(run: CharRun) -> TokenData {
        TokenData {
            value: Some(run),
            ..TokenData::bare(TokenKind::Comment)
        }
    }

    /// Create a processing-instruction token.
    pub fn proc_inst(target: QName, run: CharRun) -> TokenData {
        TokenData {
            name: Some(target),
            value: Some(run),
            ..TokenData::bare(TokenKind::ProcInst)
        }
    }

    /// Length in bytes of the attached run, 0 when absent.
    #[inline]
    pub fn value_len(&self) -> usize {
        self.value.as_ref().map_or(0, |run| run.len)
    }

    /// The declared prefix of a Namespace token.
    pub fn ns_prefix(&self) -> &str {
        debug_assert_eq!(self.kind, TokenKind::Namespace);
        self.name.as_ref().map_or("", |name| &name.local)
    }
}
