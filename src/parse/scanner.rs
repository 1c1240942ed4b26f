//! Byte-level scanning over the input with memchr-backed searches

use memchr::memchr;

use crate::store::name::{is_name_char, is_name_start_char, is_whitespace};

/// Cursor over the raw input. All offsets are absolute byte positions,
/// which double as error positions and as view ranges into the shared
/// source string.
pub struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a str) -> Scanner<'a> {
        Scanner { input, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.input.len());
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.input.len()
    }

    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    #[inline]
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.as_bytes().get(self.pos + offset).copied()
    }

    #[inline]
    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    #[inline]
    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.input[start..end]
    }

    #[inline]
    pub fn starts_with(&self, needle: &str) -> bool {
        self.input[self.pos..].starts_with(needle)
    }

    pub fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(is_whitespace) {
            self.pos += 1;
        }
    }

    /// Absolute offset of the next `<`, if any.
    #[inline]
    pub fn find_markup(&self) -> Option<usize> {
        self.find_byte(b'<')
    }

    /// Absolute offset of the next occurrence of `byte`.
    #[inline]
    pub fn find_byte(&self, byte: u8) -> Option<usize> {
        memchr(byte, &self.input.as_bytes()[self.pos..]).map(|i| self.pos + i)
    }

    /// Absolute offset where `terminator` next begins, scanning by its
    /// lead byte. The position is left unchanged.
    pub fn find_terminator(&self, terminator: &str) -> Option<usize> {
        let lead = terminator.as_bytes()[0];
        let mut from = self.pos;
        while let Some(i) = memchr(lead, &self.input.as_bytes()[from..]) {
            let at = from + i;
            if self.input[at..].starts_with(terminator) {
                return Some(at);
            }
            from = at + 1;
        }
        None
    }

    /// Read an NCName. Returns `None` without moving when the head byte
    /// cannot start one.
    pub fn read_name(&mut self) -> Option<&'a str> {
        if !self.peek().is_some_and(is_name_start_char) {
            return None;
        }
        let start = self.pos;
        self.pos += 1;
        while self.peek().is_some_and(is_name_char) {
            self.pos += 1;
        }
        Some(&self.input[start..self.pos])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_name_stops_at_delimiters() {
        let mut s = Scanner::new("po:item attr");
        assert_eq!(s.read_name(), Some("po"));
        assert_eq!(s.peek(), Some(b':'));
        s.advance(1);
        assert_eq!(s.read_name(), Some("item"));
        s.skip_whitespace();
        assert_eq!(s.read_name(), Some("attr"));
        assert_eq!(s.read_name(), None);
    }

    #[test]
    fn test_read_name_rejects_bad_starts() {
        let mut s = Scanner::new("9abc");
        assert_eq!(s.read_name(), None);
        assert_eq!(s.position(), 0);
    }

    #[test]
    fn test_find_terminator_skips_partial_matches() {
        let s = Scanner::new("a - b -- c --> d");
        assert_eq!(s.find_terminator("-->"), Some(11));
        assert_eq!(s.find_terminator("?>"), None);
    }

    #[test]
    fn test_multibyte_names() {
        let mut s = Scanner::new("caf\u{e9}=\"1\"");
        assert_eq!(s.read_name(), Some("caf\u{e9}"));
        assert_eq!(s.peek(), Some(b'='));
    }
}
