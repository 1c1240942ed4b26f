//! Name validation and reserved-sequence defusing
//!
//! Element/attribute local names, namespace prefixes, and PI targets all
//! pass through here before a token is created. Comment and PI values are
//! rewritten ("defused") at insertion so serialization can never emit an
//! illegal `--` inside a comment or a premature `?>` inside a PI.

use std::borrow::Cow;

use memchr::memchr;

use crate::error::CursorError;

/// Check if byte can start an XML name (ASCII classes; non-ASCII accepted)
#[inline]
pub(crate) fn is_name_start_char(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'_') || b >= 0x80
}

/// Check if byte can continue an XML name
#[inline]
pub(crate) fn is_name_char(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'.') || b >= 0x80
}

/// Check if byte is XML whitespace
#[inline]
pub(crate) fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

/// The whole reserved word "xml", any case.
#[inline]
pub(crate) fn is_reserved_xml(name: &str) -> bool {
    name.eq_ignore_ascii_case("xml")
}

fn check_name_chars(name: &str, what: &str) -> Result<(), CursorError> {
    let bytes = name.as_bytes();
    if bytes.is_empty() {
        return Err(CursorError::IllegalArgument(format!("empty {what}")));
    }
    if !is_name_start_char(bytes[0]) {
        return Err(CursorError::IllegalArgument(format!(
            "{what} {name:?} starts with an illegal character"
        )));
    }
    for &b in &bytes[1..] {
        if !is_name_char(b) {
            return Err(CursorError::IllegalArgument(format!(
                "{what} {name:?} contains an illegal character"
            )));
        }
    }
    Ok(())
}

/// Validate an element or attribute local name.
pub fn validate_local_name(name: &str) -> Result<(), CursorError> {
    check_name_chars(name, "local name")?;
    if is_reserved_xml(name) {
        return Err(CursorError::IllegalArgument(format!(
            "local name {name:?} is reserved"
        )));
    }
    Ok(())
}

/// Validate a namespace prefix; empty means "no prefix" and is fine.
pub fn validate_prefix(prefix: &str) -> Result<(), CursorError> {
    if prefix.is_empty() {
        return Ok(());
    }
    check_name_chars(prefix, "prefix")
}

/// Validate a processing-instruction target.
pub fn validate_pi_target(target: &str) -> Result<(), CursorError> {
    check_name_chars(target, "processing-instruction target")?;
    if is_reserved_xml(target) {
        return Err(CursorError::IllegalArgument(format!(
            "processing-instruction target {target:?} is reserved"
        )));
    }
    Ok(())
}

/// Defuse comment text so it can always serialize legally: the second of
/// any two adjacent hyphens becomes a space, and a trailing hyphen gets a
/// space appended. `"--"` becomes `"- "`, which renders as `<!--- -->`.
pub fn defuse_comment_text(text: &str) -> Cow<'_, str> {
    let bytes = text.as_bytes();
    if memchr(b'-', bytes).is_none() {
        return Cow::Borrowed(text);
    }
    let needs_pad = bytes.last() == Some(&b'-');
    let mut has_pair = false;
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'-' && bytes[i + 1] == b'-' {
            has_pair = true;
            break;
        }
        i += 1;
    }
    if !has_pair && !needs_pad {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 1);
    let mut prev_dash = false;
    for c in text.chars() {
        if c == '-' && prev_dash {
            out.push(' ');
            prev_dash = false;
        } else {
            out.push(c);
            prev_dash = c == '-';
        }
    }
    if out.as_bytes().last() == Some(&b'-') {
        out.push(' ');
    }
    Cow::Owned(out)
}

/// Defuse processing-instruction text: every `?>` becomes `? >` so the
/// terminator cannot occur inside the value.
pub fn defuse_proc_inst_text(text: &str) -> Cow<'_, str> {
    let bytes = text.as_bytes();
    let mut from = 0;
    let mut found = false;
    while let Some(i) = memchr(b'?', &bytes[from..]) {
        let at = from + i;
        if bytes.get(at + 1) == Some(&b'>') {
            found = true;
            break;
        }
        from = at + 1;
    }
    if !found {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 2);
    let mut prev_q = false;
    for c in text.chars() {
        if c == '>' && prev_q {
            out.push(' ');
        }
        out.push(c);
        prev_q = c == '?';
    }
    Cow::Owned(out)
}
