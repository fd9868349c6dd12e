/*
 * repair.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Split-marker repair.
//!
//! Rich-text editors commonly split one logical line of text across several
//! adjacent runs (spell-check regions, formatting changes, revision
//! tracking), so a directive like `${#each items}` can arrive as
//! `<w:t>${#each ite</w:t>` in one run and `<w:t>ms}</w:t>` in the next.
//! The evaluator's scan requires every marker to live in one contiguous
//! text span.
//!
//! The repair pass finds a `${` whose closing `}` is not in the same
//! `<w:t>` span and merges the text of the following spans in the same
//! paragraph into the first span until the marker closes, dropping the
//! now-redundant markup of the merged spans. The first span's formatting is
//! kept as representative; losing intra-directive formatting is deliberate,
//! since directive text is never meant to be independently styled.
//!
//! Repair is idempotent, and text outside a detected split-marker region is
//! never altered.

use crate::error::NormalizationError;
use crate::scanner::{TagKind, TagScanner, UnterminatedTag};

/// Reassemble directive markers split across adjacent text spans.
pub fn repair(markup: &str) -> Result<String, NormalizationError> {
    let paragraphs = collect_paragraphs(markup)?;

    let mut merges: Vec<Merge> = Vec::new();
    for spans in &paragraphs {
        collect_merges(markup, spans, &mut merges)?;
    }
    if merges.is_empty() {
        return Ok(markup.to_string());
    }
    merges.sort_by_key(|m| m.first.content_start);
    tracing::debug!(count = merges.len(), "merging split directive markers");

    let mut out = String::with_capacity(markup.len());
    let mut cursor = 0;
    for merge in &merges {
        if merge.first.content_start < cursor {
            // A merge nested inside an already-dropped region (possible only
            // with paragraphs nested through drawing content) is gone with
            // that region.
            continue;
        }
        out.push_str(&markup[cursor..merge.first.content_start]);
        out.push_str(&merge.text);
        cursor = merge.emit_tail(markup, &mut out);
    }
    out.push_str(&markup[cursor..]);
    Ok(out)
}

/// One `<w:t>` span together with the geometry of its enclosing run.
#[derive(Debug, Clone, Copy)]
struct TextSpan {
    /// Start of the `<w:t ...>` open tag.
    t_open_start: usize,
    /// Text content range.
    content_start: usize,
    content_end: usize,
    /// End of the `</w:t>` close tag.
    t_close_end: usize,
    /// Range of the enclosing `<w:r>` element.
    run_start: usize,
    run_end: usize,
}

/// A split marker: the span that keeps the merged text, the spans whose
/// text was folded into it, and the merged text itself.
#[derive(Debug)]
struct Merge {
    first: TextSpan,
    followers: Vec<TextSpan>,
    text: String,
}

impl Merge {
    /// Emit everything after the merged text that survives the merge and
    /// return the position at which normal copying resumes.
    ///
    /// Followers inside the first span's own run lose only their `<w:t>`
    /// element (markup between them, like `<w:br/>`, is kept); followers in
    /// later runs are dropped with their whole run, as is anything between
    /// those runs.
    fn emit_tail(&self, markup: &str, out: &mut String) -> usize {
        let first = self.first;
        let mut pos = first.content_end;
        let mut in_first_run = true;

        for follower in &self.followers {
            if in_first_run && follower.run_start == first.run_start {
                out.push_str(&markup[pos..follower.t_open_start]);
                pos = follower.t_close_end;
            } else {
                if in_first_run {
                    out.push_str(&markup[pos..first.run_end]);
                    in_first_run = false;
                }
                pos = follower.run_end;
            }
        }

        if in_first_run {
            out.push_str(&markup[pos..first.run_end]);
            pos = first.run_end;
        }
        pos
    }
}

/// Collect the text spans of each paragraph, in document order.
fn collect_paragraphs(markup: &str) -> Result<Vec<Vec<TextSpan>>, NormalizationError> {
    let mut paragraphs: Vec<Vec<TextSpan>> = Vec::new();
    let mut open_paragraphs: Vec<(usize, Vec<TextSpan>)> = Vec::new();
    let mut run_start: Option<usize> = None;
    let mut open_text: Option<(usize, usize)> = None;
    let mut run_spans: Vec<(usize, usize, usize, usize)> = Vec::new();

    for tag in TagScanner::new(markup) {
        let tag = tag.map_err(|UnterminatedTag { offset }| NormalizationError::UnterminatedTag {
            offset,
        })?;
        match (tag.name, tag.kind) {
            ("w:p", TagKind::Open) => open_paragraphs.push((tag.start, Vec::new())),
            ("w:p", TagKind::Close) => {
                let Some((_, spans)) = open_paragraphs.pop() else {
                    return Err(NormalizationError::UnmatchedClose {
                        tag: "w:p".to_string(),
                        offset: tag.start,
                    });
                };
                paragraphs.push(spans);
            }
            ("w:r", TagKind::Open) => run_start = Some(tag.start),
            ("w:r", TagKind::Close) => {
                let start = run_start.take().unwrap_or(tag.start);
                if let Some((_, spans)) = open_paragraphs.last_mut() {
                    spans.extend(run_spans.drain(..).map(
                        |(t_open_start, content_start, content_end, t_close_end)| TextSpan {
                            t_open_start,
                            content_start,
                            content_end,
                            t_close_end,
                            run_start: start,
                            run_end: tag.end,
                        },
                    ));
                } else {
                    run_spans.clear();
                }
            }
            ("w:t", TagKind::Open) => open_text = Some((tag.start, tag.end)),
            ("w:t", TagKind::Close) => {
                if let Some((t_open_start, content_start)) = open_text.take() {
                    run_spans.push((t_open_start, content_start, tag.start, tag.end));
                }
            }
            _ => {}
        }
    }

    if let Some((t_open_start, _)) = open_text {
        return Err(NormalizationError::UnbalancedMarkup {
            tag: "w:t".to_string(),
            offset: t_open_start,
        });
    }
    if let Some((offset, _)) = open_paragraphs.first() {
        return Err(NormalizationError::UnbalancedMarkup {
            tag: "w:p".to_string(),
            offset: *offset,
        });
    }
    Ok(paragraphs)
}

fn collect_merges(
    markup: &str,
    spans: &[TextSpan],
    merges: &mut Vec<Merge>,
) -> Result<(), NormalizationError> {
    let mut i = 0;
    while i < spans.len() {
        let first = spans[i];
        let content = &markup[first.content_start..first.content_end];
        let next = spans.get(i + 1).map(|s| &markup[s.content_start..s.content_end]);

        let Some(rel) = open_marker_at(content, next) else {
            i += 1;
            continue;
        };
        let marker_offset = first.content_start + rel;

        // Walk forward, folding span text in until the marker closes.
        let mut text = content.to_string();
        let mut followers = Vec::new();
        let mut j = i;
        loop {
            j += 1;
            let Some(follower) = spans.get(j) else {
                return Err(NormalizationError::UnterminatedDirective {
                    snippet: snippet(&text[rel..]),
                    offset: marker_offset,
                });
            };
            text.push_str(&markup[follower.content_start..follower.content_end]);
            followers.push(*follower);
            let next = spans.get(j + 1).map(|s| &markup[s.content_start..s.content_end]);
            if open_marker_at(&text, next).is_none() {
                break;
            }
        }

        merges.push(Merge {
            first,
            followers,
            text,
        });
        i = j + 1;
    }
    Ok(())
}

/// The offset of a marker left open at the end of `text`, if any.
///
/// A marker is open when a `${` has no closing `}` (quote-aware, matching
/// the evaluator's scan), or when the text ends in a lone `$` and the next
/// span begins the `{`: the delimiter itself split across spans.
fn open_marker_at(text: &str, next: Option<&str>) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut pos = 0;

    while let Some(rel) = memchr::memmem::find(&bytes[pos..], b"${") {
        let start = pos + rel;
        match find_close(bytes, start + 2) {
            Some(close) => pos = close + 1,
            None => return Some(start),
        }
    }

    if bytes.last() == Some(&b'$') && next.is_some_and(|n| n.starts_with('{')) {
        return Some(text.len() - 1);
    }
    None
}

/// Quote-aware search for the `}` terminating a marker.
fn find_close(bytes: &[u8], from: usize) -> Option<usize> {
    let mut pos = from;
    let mut quote: Option<u8> = None;
    while pos < bytes.len() {
        match (quote, bytes[pos]) {
            (Some(_), b'\\') if pos + 1 < bytes.len() => {
                pos += 2;
                continue;
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, b'\'' | b'"') => quote = Some(bytes[pos]),
            (None, b'}') => return Some(pos),
            (None, _) => {}
        }
        pos += 1;
    }
    None
}

fn snippet(text: &str) -> String {
    const MAX: usize = 40;
    if text.len() <= MAX {
        return text.to_string();
    }
    let mut end = MAX;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
