//! Serialization: token tree back to text
//!
//! An explicit enter/close stack walks the tree, so depth is bounded by
//! memory rather than the call stack. Text escapes the markup characters;
//! comment and processing-instruction content was defused at insertion
//! and is emitted verbatim. A document without exactly one top-level
//! element, and any rendering that starts from a non-element position,
//! comes out wrapped in a synthetic `<xml-fragment>` root.

use crate::chars::CharRun;
use crate::store::{Position, QName, Site, TokenArena, TokenId, TokenKind, ROOT};

/// Serialize the whole document.
pub(crate) fn save_document(arena: &TokenArena) -> String {
    let children: Vec<TokenId> = arena.children(ROOT).collect();
    let has_area = children.iter().any(|&id| arena.kind(id).is_attr_like());
    let has_text = children.iter().any(|&id| arena.kind(id) == TokenKind::Text);
    let elements = children
        .iter()
        .filter(|&&id| arena.kind(id) == TokenKind::Start)
        .count();
    let mut out = String::new();
    if has_area || has_text || elements != 1 {
        write_wrapped(arena, &children, &mut out);
    } else {
        for &id in &children {
            write_subtree(arena, id, &mut out);
        }
    }
    out
}

/// Serialize the content at `pos`. Element positions render their
/// subtree plainly; everything else wraps.
pub(crate) fn save_position(arena: &TokenArena, pos: Position) -> String {
    let mut out = String::new();
    match pos.site {
        Site::Token => match arena.kind(pos.token) {
            TokenKind::StartDoc => return save_document(arena),
            TokenKind::Start => write_subtree(arena, pos.token, &mut out),
            TokenKind::Text | TokenKind::Comment | TokenKind::ProcInst => {
                write_wrapped(arena, &[pos.token], &mut out);
            }
            TokenKind::Attr | TokenKind::Namespace => {
                out.push_str("<xml-fragment>");
                if let Some(run) = arena.value(pos.token) {
                    push_escaped_text(&run.to_string_value(), &mut out);
                }
                out.push_str("</xml-fragment>");
            }
            _ => out.push_str("<xml-fragment/>"),
        },
        Site::Text(_) => {
            let off = pos.text_offset();
            let rest = arena
                .value(pos.token)
                .map(|run| run.substr(off, run.len - off).to_string_value())
                .unwrap_or_default();
            out.push_str("<xml-fragment>");
            push_escaped_text(&rest, &mut out);
            out.push_str("</xml-fragment>");
        }
        Site::End => out.push_str("<xml-fragment/>"),
    }
    out
}

// ===== tree walk =====

enum Entry {
    Enter(TokenId),
    Close(TokenId),
}

/// Write one subtree. Attribute-area tokens render inside their owner's
/// start tag and are skipped by the walk itself.
fn write_subtree(arena: &TokenArena, id: TokenId, out: &mut String) {
    let mut stack = vec![Entry::Enter(id)];
    while let Some(entry) = stack.pop() {
        match entry {
            Entry::Enter(id) => match arena.kind(id) {
                TokenKind::Start => {
                    out.push('<');
                    push_name(arena.name(id), out);
                    write_area(arena, id, out);
                    let content: Vec<TokenId> = arena
                        .children(id)
                        .skip_while(|&c| arena.kind(c).is_attr_like())
                        .collect();
                    if content.is_empty() {
                        out.push_str("/>");
                    } else {
                        out.push('>');
                        stack.push(Entry::Close(id));
                        for &child in content.iter().rev() {
                            stack.push(Entry::Enter(child));
                        }
                    }
                }
                TokenKind::Text => {
                    if let Some(run) = arena.value(id) {
                        push_escaped_text(&run.to_string_value(), out);
                    }
                }
                TokenKind::Comment => {
                    out.push_str("<!--");
                    push_value(arena, id, out);
                    out.push_str("-->");
                }
                TokenKind::ProcInst => {
                    out.push_str("<?");
                    push_name(arena.name(id), out);
                    let data = arena
                        .value(id)
                        .map(CharRun::to_string_value)
                        .unwrap_or_default();
                    if !data.is_empty() {
                        out.push(' ');
                        out.push_str(&data);
                    }
                    out.push_str("?>");
                }
                _ => {}
            },
            Entry::Close(id) => {
                out.push_str("</");
                push_name(arena.name(id), out);
                out.push('>');
            }
        }
    }
}

/// Write content wrapped in a synthetic root. Attribute-area tokens in
/// `items` become attributes of the wrapper.
fn write_wrapped(arena: &TokenArena, items: &[TokenId], out: &mut String) {
    out.push_str("<xml-fragment");
    for &id in items {
        match arena.kind(id) {
            TokenKind::Namespace => write_ns(arena, id, out),
            TokenKind::Attr => write_attr(arena, id, out),
            _ => {}
        }
    }
    let content: Vec<TokenId> = items
        .iter()
        .copied()
        .filter(|&id| !arena.kind(id).is_attr_like())
        .collect();
    if content.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for id in content {
        write_subtree(arena, id, out);
    }
    out.push_str("</xml-fragment>");
}

/// Write an element's attribute area in stored order.
fn write_area(arena: &TokenArena, id: TokenId, out: &mut String) {
    for child in arena.children(id) {
        match arena.kind(child) {
            TokenKind::Namespace => write_ns(arena, child, out),
            TokenKind::Attr => write_attr(arena, child, out),
            _ => break,
        }
    }
}

fn write_attr(arena: &TokenArena, id: TokenId, out: &mut String) {
    out.push(' ');
    push_name(arena.name(id), out);
    out.push_str("=\"");
    if let Some(run) = arena.value(id) {
        push_escaped_attr(&run.to_string_value(), out);
    }
    out.push('"');
}

/// A namespace token's local name is the declared prefix; empty means the
/// default declaration.
fn write_ns(arena: &TokenArena, id: TokenId, out: &mut String) {
    out.push(' ');
    match arena.name(id) {
        Some(q) if !q.local.is_empty() => {
            out.push_str("xmlns:");
            out.push_str(&q.local);
        }
        _ => out.push_str("xmlns"),
    }
    out.push_str("=\"");
    if let Some(run) = arena.value(id) {
        push_escaped_attr(&run.to_string_value(), out);
    }
    out.push('"');
}

// ===== text =====

fn push_name(name: Option<&QName>, out: &mut String) {
    if let Some(q) = name {
        if !q.prefix.is_empty() {
            out.push_str(&q.prefix);
            out.push(':');
        }
        out.push_str(&q.local);
    }
}

fn push_value(arena: &TokenArena, id: TokenId, out: &mut String) {
    if let Some(run) = arena.value(id) {
        run.write_to(out);
    }
}

fn push_escaped_text(text: &str, out: &mut String) {
    if !text.bytes().any(|b| matches!(b, b'&' | b'<' | b'>')) {
        out.push_str(text);
        return;
    }
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn push_escaped_attr(text: &str, out: &mut String) {
    if !text.bytes().any(|b| matches!(b, b'&' | b'<' | b'>' | b'"')) {
        out.push_str(text);
        return;
    }
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_document;
    use pretty_assertions::assert_eq;

    fn find(arena: &TokenArena, local: &str) -> TokenId {
        arena
            .collect_subtree(ROOT)
            .into_iter()
            .find(|&id| arena.name(id).is_some_and(|q| &*q.local == local))
            .unwrap()
    }

    #[test]
    fn test_document_round_trip() {
        let input =
            "<po:order xmlns:po=\"urn:po\" id=\"7\"><item>a&amp;b</item><!--n--></po:order>";
        let arena = parse_document(input, false).unwrap();
        assert_eq!(save_document(&arena), input);
    }

    #[test]
    fn test_empty_elements_self_close() {
        let arena = parse_document("<a><b></b><c/></a>", false).unwrap();
        assert_eq!(save_document(&arena), "<a><b/><c/></a>");
    }

    #[test]
    fn test_text_and_attr_escaping() {
        let input = "<a b=\"q&quot;x&lt;\">&amp;c&gt;</a>";
        let arena = parse_document(input, false).unwrap();
        assert_eq!(save_document(&arena), input);
    }

    #[test]
    fn test_pi_and_comment_round_trip() {
        let input = "<a><?go now?><!--note--><?bare?></a>";
        let arena = parse_document(input, false).unwrap();
        assert_eq!(save_document(&arena), input);
    }

    #[test]
    fn test_loose_content_wraps() {
        let arena = parse_document("x<a/>y", true).unwrap();
        assert_eq!(save_document(&arena), "<xml-fragment>x<a/>y</xml-fragment>");
        let empty = parse_document("", true).unwrap();
        assert_eq!(save_document(&empty), "<xml-fragment/>");
    }

    #[test]
    fn test_document_area_rides_the_wrapper() {
        let input = "<xml-fragment n=\"1\" xmlns:p=\"u\"><a/>tail</xml-fragment>";
        let arena = parse_document(input, true).unwrap();
        // declarations render before plain attributes in the stored area
        assert_eq!(
            save_document(&arena),
            "<xml-fragment xmlns:p=\"u\" n=\"1\"><a/>tail</xml-fragment>"
        );
    }

    #[test]
    fn test_position_rendering() {
        let arena = parse_document("<a id=\"7\"><item>text</item></a>", false).unwrap();
        let item = find(&arena, "item");
        assert_eq!(
            save_position(&arena, Position::at(item)),
            "<item>text</item>"
        );
        let text = arena.first_content_child(item).unwrap();
        assert_eq!(
            save_position(&arena, Position::at(text)),
            "<xml-fragment>text</xml-fragment>"
        );
        let mid = Position {
            token: text,
            site: Site::Text(2),
        };
        assert_eq!(
            save_position(&arena, mid),
            "<xml-fragment>xt</xml-fragment>"
        );
        let id = find(&arena, "id");
        assert_eq!(
            save_position(&arena, Position::at(id)),
            "<xml-fragment>7</xml-fragment>"
        );
        assert_eq!(
            save_position(&arena, Position::end_of(item)),
            "<xml-fragment/>"
        );
        assert_eq!(
            save_position(&arena, Position::start_doc()),
            "<a id=\"7\"><item>text</item></a>"
        );
    }
}
