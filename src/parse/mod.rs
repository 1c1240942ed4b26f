//! Document parsing: raw text to token tree
//!
//! A single pass builds the arena directly, no intermediate event stream.
//! The whole input is shared as one immutable string, and unescaped
//! content becomes views of it: text, CDATA, attribute values, comments,
//! and processing-instruction data all parse without copying. Segments
//! that need reference decoding or line-end normalization become fresh
//! strings instead.
//!
//! The checks are the well-formedness set this store needs: tag matching,
//! namespace resolution and declaration rules, duplicate attributes,
//! reference syntax, and the single-root rule outside fragment mode.
//! Adjacent text never survives as separate tokens; seams left by CDATA
//! sections and references merge on the way in.

mod entities;
mod scanner;

use std::borrow::Cow;
use std::sync::Arc;

use crate::chars::{CharRun, CharSource};
use crate::error::ParseError;
use crate::store::name::is_whitespace;
use crate::store::namespace::ns;
use crate::store::{QName, TokenArena, TokenData, TokenId, TokenKind, ROOT};

use scanner::Scanner;

/// Parse `text` into a token tree. Fragment mode lifts the single-root
/// rule, keeps document-level text, and elides an `<xml-fragment>`
/// wrapper element when one encloses the whole input.
pub(crate) fn parse_document(text: &str, fragment: bool) -> Result<TokenArena, ParseError> {
    let input = text.strip_prefix('\u{feff}').unwrap_or(text);
    Parser::new(input, fragment).run()
}

/// One open element and the count of prefix bindings it introduced.
struct Frame {
    element: TokenId,
    decls: usize,
}

struct Parser<'a> {
    scanner: Scanner<'a>,
    source: Arc<str>,
    arena: TokenArena,
    fragment: bool,
    /// Open elements, outermost first.
    open: Vec<Frame>,
    /// In-scope prefix bindings, innermost last.
    bindings: Vec<(String, String)>,
    seen_root: bool,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, fragment: bool) -> Parser<'a> {
        Parser {
            scanner: Scanner::new(input),
            source: Arc::from(input),
            arena: TokenArena::new(),
            fragment,
            open: Vec::new(),
            bindings: Vec::new(),
            seen_root: false,
        }
    }

    fn run(mut self) -> Result<TokenArena, ParseError> {
        self.consume_xml_decl()?;
        loop {
            let start = self.scanner.position();
            match self.scanner.peek() {
                None => break,
                Some(b'<') => self.markup(start)?,
                Some(_) => self.text(start)?,
            }
        }
        if let Some(frame) = self.open.last() {
            let name = self
                .arena
                .name(frame.element)
                .map_or_else(String::new, QName::qualified);
            return Err(ParseError::new(
                format!("unclosed element <{name}>"),
                self.scanner.position(),
            ));
        }
        if !self.fragment && !self.seen_root {
            return Err(ParseError::new(
                "document has no root element",
                self.scanner.position(),
            ));
        }
        if self.fragment {
            self.elide_fragment_wrapper();
        }
        Ok(self.arena)
    }

    /// Consume a leading `<?xml ...?>` declaration. Nothing of it is
    /// kept; any encoding work already happened on the way to `&str`.
    fn consume_xml_decl(&mut self) -> Result<(), ParseError> {
        if !self.scanner.starts_with("<?xml") {
            return Ok(());
        }
        if !matches!(self.scanner.peek_at(5), Some(b) if is_whitespace(b) || b == b'?') {
            return Ok(());
        }
        match self.scanner.find_terminator("?>") {
            Some(end) => {
                self.scanner.set_position(end + 2);
                Ok(())
            }
            None => Err(ParseError::new("unterminated xml declaration", 0)),
        }
    }

    // ===== dispatch =====

    fn markup(&mut self, start: usize) -> Result<(), ParseError> {
        match self.scanner.peek_at(1) {
            Some(b'/') => self.end_tag(start),
            Some(b'!') => self.bang(start),
            Some(b'?') => self.proc_inst(start),
            _ => self.start_tag(start),
        }
    }

    fn bang(&mut self, start: usize) -> Result<(), ParseError> {
        if self.scanner.starts_with("<!--") {
            return self.comment(start);
        }
        if self.scanner.starts_with("<![CDATA[") {
            return self.cdata(start);
        }
        if self.scanner.starts_with("<!DOCTYPE") {
            return self.doctype(start);
        }
        Err(ParseError::new("unrecognized markup", start))
    }

    // ===== tags =====

    fn start_tag(&mut self, start: usize) -> Result<(), ParseError> {
        self.scanner.advance(1);
        let (eprefix, elocal) = self.qname("element name")?;

        let mut decls: Vec<(&'a str, String, CharRun)> = Vec::new();
        let mut plain: Vec<(Option<&'a str>, &'a str, CharRun, usize)> = Vec::new();
        let self_closing = loop {
            self.scanner.skip_whitespace();
            match self.scanner.peek() {
                None => return Err(ParseError::new("unterminated start tag", start)),
                Some(b'>') => {
                    self.scanner.advance(1);
                    break false;
                }
                Some(b'/') if self.scanner.peek_at(1) == Some(b'>') => {
                    self.scanner.advance(2);
                    break true;
                }
                Some(b'/') => {
                    return Err(ParseError::new("expected '/>'", self.scanner.position()));
                }
                Some(_) => {
                    let at = self.scanner.position();
                    let (aprefix, alocal) = self.qname("attribute name")?;
                    self.scanner.skip_whitespace();
                    if self.scanner.peek() != Some(b'=') {
                        return Err(ParseError::new(
                            "expected '=' after attribute name",
                            self.scanner.position(),
                        ));
                    }
                    self.scanner.advance(1);
                    self.scanner.skip_whitespace();
                    let (value, vstart, vend) = self.quoted_value()?;
                    let decl_prefix = match (aprefix, alocal) {
                        (Some("xmlns"), p) => Some(p),
                        (None, "xmlns") => Some(""),
                        _ => None,
                    };
                    match decl_prefix {
                        Some(prefix) => {
                            let uri = value.to_string();
                            check_declaration(prefix, &uri, at)?;
                            if decls.iter().any(|(p, ..)| *p == prefix) {
                                return Err(ParseError::new(
                                    format!("duplicate namespace declaration for {prefix:?}"),
                                    at,
                                ));
                            }
                            let run = self.run_from(value, vstart, vend);
                            decls.push((prefix, uri, run));
                        }
                        None => {
                            let run = self.run_from(value, vstart, vend);
                            plain.push((aprefix, alocal, run, at));
                        }
                    }
                }
            }
        };

        let parent = self.parent();
        if parent == ROOT {
            if self.seen_root && !self.fragment {
                return Err(ParseError::new(
                    "document has more than one root element",
                    start,
                ));
            }
            self.seen_root = true;
        }

        // Bindings go into scope before resolution so a tag can use the
        // prefixes it declares itself.
        for (prefix, uri, _) in &decls {
            self.bindings.push((prefix.to_string(), uri.clone()));
        }

        let euri = match eprefix {
            Some(p) => self.resolve(p).ok_or_else(|| {
                ParseError::new(format!("undeclared namespace prefix {p:?}"), start)
            })?,
            None => self.resolve("").unwrap_or_default(),
        };
        let elem = self
            .arena
            .alloc(TokenData::element(QName::with_prefix(
                &euri,
                elocal,
                eprefix.unwrap_or(""),
            )));
        self.arena.link_before(parent, None, elem);

        for (prefix, _, run) in &decls {
            let decl = self.arena.alloc(TokenData::namespace(prefix, run.clone()));
            self.arena.link_before(elem, None, decl);
        }

        let mut seen: Vec<QName> = Vec::with_capacity(plain.len());
        for (aprefix, alocal, run, at) in plain {
            let auri = match aprefix {
                Some(p) => self.resolve(p).ok_or_else(|| {
                    ParseError::new(format!("undeclared namespace prefix {p:?}"), at)
                })?,
                None => String::new(),
            };
            let aname = QName::with_prefix(&auri, alocal, aprefix.unwrap_or(""));
            if seen
                .iter()
                .any(|q| q.uri == aname.uri && q.local == aname.local)
            {
                return Err(ParseError::new(
                    format!("duplicate attribute {}", aname.qualified()),
                    at,
                ));
            }
            let attr = self.arena.alloc(TokenData::attr(aname.clone(), run));
            self.arena.link_before(elem, None, attr);
            seen.push(aname);
        }

        if self_closing {
            self.bindings.truncate(self.bindings.len() - decls.len());
        } else {
            self.open.push(Frame {
                element: elem,
                decls: decls.len(),
            });
        }
        Ok(())
    }

    fn end_tag(&mut self, start: usize) -> Result<(), ParseError> {
        self.scanner.advance(2);
        let (prefix, local) = self.qname("element name")?;
        self.scanner.skip_whitespace();
        if self.scanner.peek() != Some(b'>') {
            return Err(ParseError::new(
                "malformed end tag",
                self.scanner.position(),
            ));
        }
        self.scanner.advance(1);

        let found = match prefix {
            Some(p) => format!("{p}:{local}"),
            None => local.to_string(),
        };
        let Some(frame) = self.open.pop() else {
            return Err(ParseError::new(
                format!("unmatched end tag </{found}>"),
                start,
            ));
        };
        let matches = self.arena.name(frame.element).is_some_and(|q| {
            &*q.prefix == prefix.unwrap_or("") && &*q.local == local
        });
        if !matches {
            let expected = self
                .arena
                .name(frame.element)
                .map_or_else(String::new, QName::qualified);
            return Err(ParseError::new(
                format!("mismatched end tag: expected </{expected}>, found </{found}>"),
                start,
            ));
        }
        self.bindings.truncate(self.bindings.len() - frame.decls);
        Ok(())
    }

    // ===== character content =====

    fn text(&mut self, start: usize) -> Result<(), ParseError> {
        let end = self.scanner.find_markup().unwrap_or_else(|| self.scanner.end());
        let raw = self.scanner.slice(start, end);
        self.scanner.set_position(end);
        if let Some(bad) = raw.find("]]>") {
            return Err(ParseError::new(
                "']]>' is not allowed in text content",
                start + bad,
            ));
        }
        let parent = self.parent();
        if parent == ROOT && !self.fragment {
            if raw.bytes().all(is_whitespace) {
                return Ok(());
            }
            return Err(ParseError::new(
                "text is not allowed at the document level",
                start,
            ));
        }
        let decoded = entities::decode_text(raw, start)?;
        let run = self.run_from(decoded, start, end);
        self.append_text(parent, run);
        Ok(())
    }

    fn cdata(&mut self, start: usize) -> Result<(), ParseError> {
        self.scanner.advance(9);
        let from = self.scanner.position();
        let Some(end) = self.scanner.find_terminator("]]>") else {
            return Err(ParseError::new("unterminated CDATA section", start));
        };
        let raw = self.scanner.slice(from, end);
        self.scanner.set_position(end + 3);
        let parent = self.parent();
        if parent == ROOT && !self.fragment {
            return Err(ParseError::new(
                "CDATA is not allowed at the document level",
                start,
            ));
        }
        if raw.is_empty() {
            return Ok(());
        }
        let run = self.run_from(entities::normalize_line_ends(raw), from, end);
        self.append_text(parent, run);
        Ok(())
    }

    fn comment(&mut self, start: usize) -> Result<(), ParseError> {
        self.scanner.advance(4);
        let from = self.scanner.position();
        let Some(end) = self.scanner.find_terminator("-->") else {
            return Err(ParseError::new("unterminated comment", start));
        };
        let raw = self.scanner.slice(from, end);
        if let Some(bad) = raw.find("--") {
            return Err(ParseError::new(
                "'--' is not allowed in a comment",
                from + bad,
            ));
        }
        if raw.ends_with('-') {
            return Err(ParseError::new("a comment cannot end with '-'", end));
        }
        self.scanner.set_position(end + 3);
        let run = self.run_from(entities::normalize_line_ends(raw), from, end);
        let comment = self.arena.alloc(TokenData::comment(run));
        self.arena.link_before(self.parent(), None, comment);
        Ok(())
    }

    fn proc_inst(&mut self, start: usize) -> Result<(), ParseError> {
        self.scanner.advance(2);
        let Some(target) = self.scanner.read_name() else {
            return Err(ParseError::new(
                "expected a processing-instruction target",
                self.scanner.position(),
            ));
        };
        if self.scanner.peek() == Some(b':') {
            return Err(ParseError::new(
                "a processing-instruction target cannot carry a prefix",
                self.scanner.position(),
            ));
        }
        if target.eq_ignore_ascii_case("xml") {
            return Err(ParseError::new(
                "the processing-instruction target 'xml' is reserved",
                start,
            ));
        }
        let data_start = match self.scanner.peek() {
            Some(b) if is_whitespace(b) => {
                self.scanner.skip_whitespace();
                self.scanner.position()
            }
            Some(b'?') => self.scanner.position(),
            Some(_) => {
                return Err(ParseError::new(
                    "malformed processing instruction",
                    self.scanner.position(),
                ));
            }
            None => {
                return Err(ParseError::new("unterminated processing instruction", start));
            }
        };
        let Some(end) = self.scanner.find_terminator("?>") else {
            return Err(ParseError::new("unterminated processing instruction", start));
        };
        let raw = self.scanner.slice(data_start, end);
        self.scanner.set_position(end + 2);
        let run = self.run_from(entities::normalize_line_ends(raw), data_start, end);
        let pi = self
            .arena
            .alloc(TokenData::proc_inst(QName::local_only(target), run));
        self.arena.link_before(self.parent(), None, pi);
        Ok(())
    }

    /// Skip a DOCTYPE declaration. The internal subset and quoted
    /// identifiers may contain `>`, so the scan is quote and bracket
    /// aware. Nothing of it is kept.
    fn doctype(&mut self, start: usize) -> Result<(), ParseError> {
        if self.parent() != ROOT || self.seen_root {
            return Err(ParseError::new("misplaced DOCTYPE declaration", start));
        }
        self.scanner.advance(9);
        let mut in_subset = false;
        let mut quote: Option<u8> = None;
        loop {
            let Some(b) = self.scanner.peek() else {
                return Err(ParseError::new("unterminated DOCTYPE declaration", start));
            };
            self.scanner.advance(1);
            match b {
                _ if quote.is_some() => {
                    if Some(b) == quote {
                        quote = None;
                    }
                }
                b'"' | b'\'' => quote = Some(b),
                b'[' => in_subset = true,
                b']' => in_subset = false,
                b'>' if !in_subset => return Ok(()),
                _ => {}
            }
        }
    }

    // ===== pieces =====

    /// Read `local` or `prefix:local`.
    fn qname(&mut self, what: &str) -> Result<(Option<&'a str>, &'a str), ParseError> {
        let at = self.scanner.position();
        let Some(first) = self.scanner.read_name() else {
            return Err(ParseError::new(format!("expected an {what}"), at));
        };
        if self.scanner.peek() != Some(b':') {
            return Ok((None, first));
        }
        self.scanner.advance(1);
        let Some(local) = self.scanner.read_name() else {
            return Err(ParseError::new(
                format!("expected a local name after '{first}:'"),
                self.scanner.position(),
            ));
        };
        if self.scanner.peek() == Some(b':') {
            return Err(ParseError::new(format!("too many colons in {what}"), at));
        }
        Ok((Some(first), local))
    }

    /// Read a quoted attribute value. Returns the decoded value and the
    /// byte range of the raw content between the quotes.
    fn quoted_value(&mut self) -> Result<(Cow<'a, str>, usize, usize), ParseError> {
        let quote = match self.scanner.peek() {
            Some(b @ (b'"' | b'\'')) => b,
            _ => {
                return Err(ParseError::new(
                    "attribute value must be quoted",
                    self.scanner.position(),
                ));
            }
        };
        self.scanner.advance(1);
        let vstart = self.scanner.position();
        let Some(vend) = self.scanner.find_byte(quote) else {
            return Err(ParseError::new("unterminated attribute value", vstart));
        };
        self.scanner.set_position(vend + 1);
        let decoded = entities::decode_attr_value(self.scanner.slice(vstart, vend), vstart)?;
        Ok((decoded, vstart, vend))
    }

    /// Turn decoded content into a run: a view of the shared source when
    /// decoding changed nothing, an owned run otherwise.
    fn run_from(&self, decoded: Cow<'_, str>, start: usize, end: usize) -> CharRun {
        match decoded {
            Cow::Borrowed(_) => CharRun {
                src: CharSource::Str(self.source.clone()),
                off: start,
                len: end - start,
            },
            Cow::Owned(s) => CharRun::from(s),
        }
    }

    /// Link a text run under `parent`, merging into a trailing text token
    /// so the tree never holds adjacent runs.
    fn append_text(&mut self, parent: TokenId, run: CharRun) {
        if let Some(last) = self.arena.last_child(parent) {
            if self.arena.kind(last) == TokenKind::Text {
                let merged = match self.arena.value(last) {
                    Some(prev) => prev.concat(&run),
                    None => run,
                };
                self.arena.data_mut(last).value = Some(merged);
                return;
            }
        }
        let text = self.arena.alloc(TokenData::text(run));
        self.arena.link_before(parent, None, text);
    }

    #[inline]
    fn parent(&self) -> TokenId {
        self.open.last().map_or(ROOT, |frame| frame.element)
    }

    /// Look a prefix up in scope. The xml prefix is always bound; the
    /// empty prefix falls back to no namespace.
    fn resolve(&self, prefix: &str) -> Option<String> {
        if prefix == ns::XML_PREFIX {
            return Some(ns::XML_URI.to_string());
        }
        for (p, uri) in self.bindings.iter().rev() {
            if p == prefix {
                return Some(uri.clone());
            }
        }
        if prefix.is_empty() {
            Some(String::new())
        } else {
            None
        }
    }

    /// In fragment mode an outer `<xml-fragment>` element is transport
    /// wrapping, not content: its attribute area moves to the document
    /// container and its children become the top-level content.
    fn elide_fragment_wrapper(&mut self) {
        let content: Vec<TokenId> = self
            .arena
            .children(ROOT)
            .filter(|&id| !self.arena.kind(id).is_attr_like())
            .collect();
        let solid: Vec<TokenId> = content
            .iter()
            .copied()
            .filter(|&id| !self.is_ws_text(id))
            .collect();
        let &[wrapper] = solid.as_slice() else { return };
        if self.arena.kind(wrapper) != TokenKind::Start {
            return;
        }
        let wrapper_named = self
            .arena
            .name(wrapper)
            .is_some_and(|q| q.uri.is_empty() && &*q.local == "xml-fragment");
        if !wrapper_named {
            return;
        }
        for id in content {
            if id != wrapper {
                self.arena.unlink(id);
                self.arena.free_token(id);
            }
        }
        let moved: Vec<TokenId> = self.arena.children(wrapper).collect();
        for id in moved {
            self.arena.unlink(id);
            self.arena.link_before(ROOT, None, id);
        }
        self.arena.unlink(wrapper);
        self.arena.free_token(wrapper);
    }

    fn is_ws_text(&self, id: TokenId) -> bool {
        if self.arena.kind(id) != TokenKind::Text {
            return false;
        }
        self.arena
            .value(id)
            .is_some_and(|run| run.to_string_value().bytes().all(is_whitespace))
    }
}

/// Reject reserved and degenerate namespace declarations.
fn check_declaration(prefix: &str, uri: &str, at: usize) -> Result<(), ParseError> {
    if prefix == ns::XMLNS_PREFIX {
        return Err(ParseError::new("the xmlns prefix cannot be declared", at));
    }
    if prefix == ns::XML_PREFIX && uri != ns::XML_URI {
        return Err(ParseError::new(
            "the xml prefix is bound to its reserved namespace",
            at,
        ));
    }
    if prefix != ns::XML_PREFIX && uri == ns::XML_URI {
        return Err(ParseError::new(
            "the xml namespace cannot be bound to another prefix",
            at,
        ));
    }
    if uri == ns::XMLNS_URI {
        return Err(ParseError::new(
            "the xmlns namespace cannot be declared",
            at,
        ));
    }
    if !prefix.is_empty() && uri.is_empty() {
        return Err(ParseError::new(
            "a prefix cannot be bound to an empty uri",
            at,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Position;
    use assert_matches::assert_matches;

    fn kinds(arena: &TokenArena) -> Vec<TokenKind> {
        let mut out = vec![TokenKind::StartDoc];
        let mut pos = Position::start_doc();
        while let Some(next) = arena.next_position(pos) {
            pos = next;
            out.push(arena.position_kind(pos));
        }
        out
    }

    fn find(arena: &TokenArena, local: &str) -> TokenId {
        arena
            .collect_subtree(ROOT)
            .into_iter()
            .find(|&id| arena.name(id).is_some_and(|q| &*q.local == local))
            .unwrap()
    }

    fn text_of(arena: &TokenArena, id: TokenId) -> String {
        arena.value(id).map(CharRun::to_string_value).unwrap_or_default()
    }

    #[test]
    fn test_parse_builds_token_tree() {
        let arena = parse_document(
            "<?xml version=\"1.0\"?><po:order xmlns:po=\"urn:po\" id=\"7\"><item>text</item></po:order>",
            false,
        )
        .unwrap();
        assert_eq!(
            kinds(&arena),
            vec![
                TokenKind::StartDoc,
                TokenKind::Start,
                TokenKind::Namespace,
                TokenKind::Attr,
                TokenKind::Start,
                TokenKind::Text,
                TokenKind::End,
                TokenKind::End,
                TokenKind::EndDoc,
            ]
        );
        let order = find(&arena, "order");
        let name = arena.name(order).unwrap();
        assert_eq!(&*name.uri, "urn:po");
        assert_eq!(&*name.prefix, "po");
        let id = find(&arena, "id");
        assert_eq!(&*arena.name(id).unwrap().uri, "");
        assert_eq!(text_of(&arena, id), "7");
        assert_eq!(arena.collect_text(find(&arena, "item")), "text");
    }

    #[test]
    fn test_text_seams_merge_into_one_token() {
        let arena = parse_document("<a>x&lt;y<![CDATA[&raw]]>z</a>", false).unwrap();
        let a = find(&arena, "a");
        let children: Vec<TokenId> = arena.children(a).collect();
        assert_eq!(children.len(), 1);
        assert_eq!(arena.kind(children[0]), TokenKind::Text);
        assert_eq!(text_of(&arena, children[0]), "x<y&rawz");
    }

    #[test]
    fn test_attribute_value_normalization() {
        let arena = parse_document("<a b=\"1\n2&#9;3\"/>", false).unwrap();
        let b = find(&arena, "b");
        assert_eq!(text_of(&arena, b), "1 2\t3");
    }

    #[test]
    fn test_namespace_scoping() {
        let arena = parse_document(
            "<a xmlns=\"u1\"><b xmlns=\"\"><c/></b><p:d xmlns:p=\"u2\"/></a>",
            false,
        )
        .unwrap();
        assert_eq!(&*arena.name(find(&arena, "a")).unwrap().uri, "u1");
        assert_eq!(&*arena.name(find(&arena, "b")).unwrap().uri, "");
        assert_eq!(&*arena.name(find(&arena, "c")).unwrap().uri, "");
        assert_eq!(&*arena.name(find(&arena, "d")).unwrap().uri, "u2");
    }

    #[test]
    fn test_doctype_comment_and_pi() {
        let arena = parse_document(
            "<!DOCTYPE a [<!ENTITY x \"<y>\">]><a><!--note--><?app  run fast?></a>",
            false,
        )
        .unwrap();
        let a = find(&arena, "a");
        let children: Vec<TokenId> = arena.children(a).collect();
        assert_eq!(children.len(), 2);
        assert_eq!(arena.kind(children[0]), TokenKind::Comment);
        assert_eq!(text_of(&arena, children[0]), "note");
        assert_eq!(arena.kind(children[1]), TokenKind::ProcInst);
        assert_eq!(&*arena.name(children[1]).unwrap().local, "app");
        assert_eq!(text_of(&arena, children[1]), "run fast");
    }

    #[test]
    fn test_well_formedness_rejections() {
        assert_matches!(parse_document("<a><b></a>", false), Err(_));
        assert_matches!(parse_document("<a>text", false), Err(_));
        assert_matches!(parse_document("<a/><b/>", false), Err(_));
        assert_matches!(parse_document("<a/>junk", false), Err(_));
        assert_matches!(parse_document("junk", false), Err(_));
        assert_matches!(parse_document("", false), Err(_));
        assert_matches!(parse_document("<a x=\"1\" x=\"2\"/>", false), Err(_));
        assert_matches!(parse_document("<a>&foo;</a>", false), Err(_));
        assert_matches!(parse_document("<a>]]></a>", false), Err(_));
        assert_matches!(parse_document("<a><!--x--y--></a>", false), Err(_));
        assert_matches!(parse_document("<p:a/>", false), Err(_));
        assert_matches!(parse_document("<a b=unquoted/>", false), Err(_));
        assert_matches!(parse_document("<a xmlns:p=\"\"/>", false), Err(_));
        assert_matches!(parse_document("<a xmlns:xml=\"urn:no\"/>", false), Err(_));
    }

    #[test]
    fn test_duplicate_attribute_across_prefixes() {
        let input = "<a xmlns:p=\"u\" xmlns:q=\"u\" p:x=\"1\" q:x=\"2\"/>";
        let err = parse_document(input, false).unwrap_err();
        assert!(err.message.contains("duplicate attribute"));
    }

    #[test]
    fn test_error_positions_point_into_input() {
        let err = parse_document("<a><a $></a></a>", false).unwrap_err();
        assert_eq!(err.position, 6);
    }

    #[test]
    fn test_fragment_mode_keeps_loose_content() {
        let arena = parse_document("x<a/>y", true).unwrap();
        assert_eq!(
            kinds(&arena),
            vec![
                TokenKind::StartDoc,
                TokenKind::Text,
                TokenKind::Start,
                TokenKind::End,
                TokenKind::Text,
                TokenKind::EndDoc,
            ]
        );
    }

    #[test]
    fn test_fragment_wrapper_is_elided() {
        let arena = parse_document(
            "<xml-fragment n=\"1\" xmlns:p=\"u\"><a/>tail</xml-fragment>",
            true,
        )
        .unwrap();
        assert_eq!(
            kinds(&arena),
            vec![
                TokenKind::StartDoc,
                TokenKind::Namespace,
                TokenKind::Attr,
                TokenKind::Start,
                TokenKind::End,
                TokenKind::Text,
                TokenKind::EndDoc,
            ]
        );
        assert_eq!(text_of(&arena, find(&arena, "n")), "1");
    }

    #[test]
    fn test_fragment_wrapper_in_namespace_stays() {
        // only the no-namespace wrapper name is transport wrapping
        let arena = parse_document(
            "<xml-fragment xmlns=\"urn:real\"><a/></xml-fragment>",
            true,
        )
        .unwrap();
        assert_eq!(&*arena.name(find(&arena, "xml-fragment")).unwrap().uri, "urn:real");
    }

    #[test]
    fn test_bom_is_stripped() {
        let arena = parse_document("\u{feff}<a/>", false).unwrap();
        assert_eq!(&*arena.name(find(&arena, "a")).unwrap().local, "a");
    }
}
