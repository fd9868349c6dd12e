/*
 * scanner.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Depth-counted tag scanner.
//!
//! Both markup passes reason about a small fixed alphabet of tags (`w:t`,
//! `w:r`, `w:p`, `w:tbl`, `w:tr`, `w:trPr`) while leaving every byte they do
//! not touch exactly as it was. A full structural parse would be unnecessary
//! overhead and risks losing byte fidelity for untouched regions, so this
//! module provides a linear scanner instead: it yields tags one at a time
//! and matching is done by counting nesting depth for the one tag name that
//! matters.
//!
//! The scanner is quote-aware (a `>` inside an attribute value does not end
//! a tag) and skips comments and processing instructions.

use thiserror::Error;

/// The markup ends in the middle of a tag, comment, or processing
/// instruction.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("markup ends inside a tag starting at offset {offset}")]
pub struct UnterminatedTag {
    pub offset: usize,
}

/// Whether a tag opens, closes, or self-closes an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Open,
    Close,
    SelfClose,
}

/// A single tag in the markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag<'a> {
    /// Tag name, e.g. `w:tr`.
    pub name: &'a str,
    /// Byte offset of the `<`.
    pub start: usize,
    /// Byte offset one past the `>`.
    pub end: usize,
    pub kind: TagKind,
}

/// Linear iterator over the tags of a markup string.
#[derive(Debug, Clone)]
pub struct TagScanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> TagScanner<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    /// Start scanning at a byte offset instead of the beginning.
    pub fn starting_at(src: &'a str, pos: usize) -> Self {
        Self { src, pos }
    }
}

impl<'a> Iterator for TagScanner<'a> {
    type Item = Result<Tag<'a>, UnterminatedTag>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.src.as_bytes();

        loop {
            let rel = memchr::memchr(b'<', &bytes[self.pos..])?;
            let start = self.pos + rel;

            // Comments and processing instructions are skipped, not yielded.
            if self.src[start..].starts_with("<!--") {
                match self.src[start..].find("-->") {
                    Some(rel_end) => {
                        self.pos = start + rel_end + 3;
                        continue;
                    }
                    None => {
                        self.pos = self.src.len();
                        return Some(Err(UnterminatedTag { offset: start }));
                    }
                }
            }
            if self.src[start..].starts_with("<?") || self.src[start..].starts_with("<!") {
                match memchr::memchr(b'>', &bytes[start..]) {
                    Some(rel_end) => {
                        self.pos = start + rel_end + 1;
                        continue;
                    }
                    None => {
                        self.pos = self.src.len();
                        return Some(Err(UnterminatedTag { offset: start }));
                    }
                }
            }

            return Some(self.parse_tag(start));
        }
    }
}

impl<'a> TagScanner<'a> {
    fn parse_tag(&mut self, start: usize) -> Result<Tag<'a>, UnterminatedTag> {
        let bytes = self.src.as_bytes();
        let mut pos = start + 1;
        let closing = bytes.get(pos) == Some(&b'/');
        if closing {
            pos += 1;
        }

        let name_start = pos;
        while pos < bytes.len() && !matches!(bytes[pos], b' ' | b'\t' | b'\r' | b'\n' | b'>' | b'/')
        {
            pos += 1;
        }
        let name = &self.src[name_start..pos];

        // Attributes: a `>` inside a quoted value does not end the tag.
        let mut self_closing = false;
        loop {
            if pos >= bytes.len() {
                self.pos = self.src.len();
                return Err(UnterminatedTag { offset: start });
            }
            match bytes[pos] {
                b'>' => break,
                quote @ (b'"' | b'\'') => {
                    match memchr::memchr(quote, &bytes[pos + 1..]) {
                        Some(rel) => pos += rel + 2,
                        None => {
                            self.pos = self.src.len();
                            return Err(UnterminatedTag { offset: start });
                        }
                    }
                    self_closing = false;
                }
                b'/' => {
                    self_closing = true;
                    pos += 1;
                }
                _ => {
                    self_closing = false;
                    pos += 1;
                }
            }
        }

        let kind = if closing {
            TagKind::Close
        } else if self_closing {
            TagKind::SelfClose
        } else {
            TagKind::Open
        };
        self.pos = pos + 1;
        Ok(Tag {
            name,
            start,
            end: pos + 1,
            kind,
        })
    }
}

/// Find the close tag matching an already-consumed open tag of `name`,
/// counting nesting depth for that name only.
///
/// The search starts at `from`, which must point just past the open tag.
/// Returns `None` when the markup ends with the element still open.
pub fn find_matching_close<'a>(
    src: &'a str,
    name: &str,
    from: usize,
) -> Result<Option<Tag<'a>>, UnterminatedTag> {
    let mut depth = 0usize;
    for tag in TagScanner::starting_at(src, from) {
        let tag = tag?;
        if tag.name != name {
            continue;
        }
        match tag.kind {
            TagKind::Open => depth += 1,
            TagKind::SelfClose => {}
            TagKind::Close => {
                if depth == 0 {
                    return Ok(Some(tag));
                }
                depth -= 1;
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tags(src: &str) -> Vec<Tag<'_>> {
        TagScanner::new(src).collect::<Result<_, _>>().expect("scan succeeds")
    }

    #[test]
    fn test_basic_tags() {
        let src = "<w:p><w:r><w:t>hi</w:t></w:r></w:p>";
        let scanned = tags(src);
        assert_eq!(scanned.len(), 6);
        assert_eq!(scanned[0].name, "w:p");
        assert_eq!(scanned[0].kind, TagKind::Open);
        assert_eq!(scanned[3].name, "w:t");
        assert_eq!(scanned[3].kind, TagKind::Close);
    }

    #[test]
    fn test_self_closing() {
        let scanned = tags("<w:cantSplit/><w:b />");
        assert_eq!(scanned[0].kind, TagKind::SelfClose);
        assert_eq!(scanned[0].name, "w:cantSplit");
        assert_eq!(scanned[1].kind, TagKind::SelfClose);
    }

    #[test]
    fn test_attributes_with_angle_bracket() {
        let scanned = tags(r#"<w:t xml:space="preserve" data-x="a > b">x</w:t>"#);
        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned[0].name, "w:t");
        assert_eq!(scanned[0].kind, TagKind::Open);
    }

    #[test]
    fn test_offsets_are_byte_exact() {
        let src = "ab<w:t>c</w:t>";
        let scanned = tags(src);
        assert_eq!(&src[scanned[0].start..scanned[0].end], "<w:t>");
        assert_eq!(&src[scanned[1].start..scanned[1].end], "</w:t>");
    }

    #[test]
    fn test_comments_and_pis_skipped() {
        let scanned = tags("<?xml version=\"1.0\"?><!-- note --><w:p/>");
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].name, "w:p");
    }

    #[test]
    fn test_unterminated_tag_errors() {
        let result: Result<Vec<_>, _> = TagScanner::new("<w:t attr=\"x").collect();
        assert_eq!(result.unwrap_err(), UnterminatedTag { offset: 0 });
    }

    #[test]
    fn test_find_matching_close_skips_nested() {
        let src = "<w:tbl><w:tr><w:tc><w:tbl><w:tr/></w:tbl></w:tc></w:tr></w:tbl>";
        let open_end = "<w:tbl>".len();
        let close = find_matching_close(src, "w:tbl", open_end)
            .expect("scan succeeds")
            .expect("close found");
        assert_eq!(&src[close.start..close.end], "</w:tbl>");
        assert_eq!(close.end, src.len());
    }

    #[test]
    fn test_find_matching_close_none_at_eof() {
        let result = find_matching_close("<w:tbl><w:tr></w:tr>", "w:tbl", 7).expect("scan succeeds");
        assert!(result.is_none());
    }
}
