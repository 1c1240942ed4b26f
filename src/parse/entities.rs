//! Reference decoding and line-end normalization
//!
//! Only the five predefined entities and numeric character references are
//! recognized; DTD-declared entities are out of scope for this store.
//! Content without references or carriage returns decodes borrowed, so it
//! can stay a view of the input.

use std::borrow::Cow;

use memchr::{memchr, memchr2};

use crate::error::ParseError;

/// Decode element text: references resolved, line ends normalized to `\n`.
/// `at` is the byte offset of `raw` in the input, for error positions.
pub fn decode_text(raw: &str, at: usize) -> Result<Cow<'_, str>, ParseError> {
    let Some(first) = memchr2(b'&', b'\r', raw.as_bytes()) else {
        return Ok(Cow::Borrowed(raw));
    };
    let mut out = String::with_capacity(raw.len());
    out.push_str(&raw[..first]);
    let mut pos = first;
    while pos < raw.len() {
        match raw.as_bytes()[pos] {
            b'&' => {
                let (c, used) = decode_reference(&raw[pos..], at + pos)?;
                out.push(c);
                pos += used;
            }
            b'\r' => {
                out.push('\n');
                pos += 1;
                if raw.as_bytes().get(pos) == Some(&b'\n') {
                    pos += 1;
                }
            }
            _ => {
                let next = memchr2(b'&', b'\r', &raw.as_bytes()[pos..]).unwrap_or(raw.len() - pos);
                out.push_str(&raw[pos..pos + next]);
                pos += next;
            }
        }
    }
    Ok(Cow::Owned(out))
}

/// Decode an attribute value: references resolved, then XML attribute-value
/// normalization. Literal tab/LF/CR become spaces (CRLF a single space);
/// characters that arrive as references keep their exact value.
pub fn decode_attr_value(raw: &str, at: usize) -> Result<Cow<'_, str>, ParseError> {
    if let Some(bad) = memchr(b'<', raw.as_bytes()) {
        return Err(ParseError::new(
            "'<' is not allowed in an attribute value",
            at + bad,
        ));
    }
    let dirty = |b: u8| matches!(b, b'&' | b'\t' | b'\n' | b'\r');
    let Some(first) = raw.bytes().position(dirty) else {
        return Ok(Cow::Borrowed(raw));
    };
    let mut out = String::with_capacity(raw.len());
    out.push_str(&raw[..first]);
    let mut pos = first;
    while pos < raw.len() {
        match raw.as_bytes()[pos] {
            b'&' => {
                let (c, used) = decode_reference(&raw[pos..], at + pos)?;
                out.push(c);
                pos += used;
            }
            b'\r' => {
                out.push(' ');
                pos += 1;
                if raw.as_bytes().get(pos) == Some(&b'\n') {
                    pos += 1;
                }
            }
            b'\t' | b'\n' => {
                out.push(' ');
                pos += 1;
            }
            _ => {
                let next = raw.bytes().skip(pos).position(dirty).unwrap_or(raw.len() - pos);
                out.push_str(&raw[pos..pos + next]);
                pos += next;
            }
        }
    }
    Ok(Cow::Owned(out))
}

/// Normalize line ends only, for content kinds that take no references
/// (CDATA, comments, processing-instruction data).
pub fn normalize_line_ends(raw: &str) -> Cow<'_, str> {
    let Some(first) = memchr(b'\r', raw.as_bytes()) else {
        return Cow::Borrowed(raw);
    };
    let mut out = String::with_capacity(raw.len());
    out.push_str(&raw[..first]);
    let mut pos = first;
    while pos < raw.len() {
        if raw.as_bytes()[pos] == b'\r' {
            out.push('\n');
            pos += 1;
            if raw.as_bytes().get(pos) == Some(&b'\n') {
                pos += 1;
            }
        } else {
            let next = memchr(b'\r', &raw.as_bytes()[pos..]).unwrap_or(raw.len() - pos);
            out.push_str(&raw[pos..pos + next]);
            pos += next;
        }
    }
    Cow::Owned(out)
}

/// Decode one reference starting at `&`. Returns the character and the
/// bytes consumed, terminator included.
fn decode_reference(raw: &str, at: usize) -> Result<(char, usize), ParseError> {
    let end = memchr(b';', raw.as_bytes())
        .ok_or_else(|| ParseError::new("unterminated reference", at))?;
    let body = &raw[1..end];
    let c = match body {
        "lt" => '<',
        "gt" => '>',
        "amp" => '&',
        "quot" => '"',
        "apos" => '\'',
        _ => match body.strip_prefix('#') {
            Some(num) => {
                let value = match num.strip_prefix('x') {
                    Some(hex) => u32::from_str_radix(hex, 16),
                    None => num.parse(),
                }
                .map_err(|_| ParseError::new("malformed character reference", at))?;
                char_for(value, at)?
            }
            None => {
                return Err(ParseError::new(format!("unknown entity &{body};"), at));
            }
        },
    };
    Ok((c, end + 1))
}

/// Map a character-reference value, enforcing the XML character range.
fn char_for(value: u32, at: usize) -> Result<char, ParseError> {
    let legal = matches!(
        value,
        0x9 | 0xA | 0xD | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x1_0000..=0x10_FFFF
    );
    if !legal {
        return Err(ParseError::new("character reference out of range", at));
    }
    char::from_u32(value).ok_or_else(|| ParseError::new("character reference out of range", at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_plain_text_borrows() {
        assert_matches!(decode_text("no refs here", 0), Ok(Cow::Borrowed(_)));
        assert_matches!(normalize_line_ends("clean"), Cow::Borrowed(_));
    }

    #[test]
    fn test_named_and_numeric_references() {
        assert_eq!(decode_text("a &lt; b &amp; c", 0).unwrap(), "a < b & c");
        assert_eq!(decode_text("&quot;&apos;&gt;", 0).unwrap(), "\"'>");
        assert_eq!(decode_text("&#65;&#x42;&#x1F600;", 0).unwrap(), "AB\u{1F600}");
    }

    #[test]
    fn test_line_end_normalization() {
        assert_eq!(decode_text("a\r\nb\rc\nd", 0).unwrap(), "a\nb\nc\nd");
        assert_eq!(normalize_line_ends("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_attr_value_normalization() {
        // literal whitespace becomes spaces, referenced whitespace survives
        assert_eq!(decode_attr_value("a\tb\r\nc", 0).unwrap(), "a b c");
        assert_eq!(decode_attr_value("a&#9;b&#10;c", 0).unwrap(), "a\tb\nc");
        assert_matches!(decode_attr_value("plain", 0), Ok(Cow::Borrowed(_)));
    }

    #[test]
    fn test_reference_errors_carry_positions() {
        let err = decode_text("ab &foo; cd", 10).unwrap_err();
        assert_eq!(err.position, 13);
        assert_matches!(decode_text("a & b", 0), Err(_));
        assert_matches!(decode_text("&#x0;", 0), Err(_));
        assert_matches!(decode_text("&#xD800;", 0), Err(_));
        assert_matches!(decode_text("&#zz;", 0), Err(_));
        let err = decode_attr_value("a<b", 4).unwrap_err();
        assert_eq!(err.position, 5);
    }
}
