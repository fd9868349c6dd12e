/*
 * pagebreak.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Table page-break planning.
//!
//! A table that straddles a page boundary renders awkwardly: a row sliced
//! in half, or a lone row orphaned on the next page. The planner annotates
//! rows with page-break-control properties so the renderer moves a whole
//! table to the next page as one unit instead of splitting it:
//!
//! - every row gets `<w:cantSplit/>` (a row never breaks across pages), and
//! - every row except the last also gets `<w:keepNext/>` (a row stays on the
//!   same page as its successor; the last row has no successor).
//!
//! With `long_table_split` enabled, rows are left free to break normally so
//! a very long table can span multiple pages. With `table_page_breaking`
//! disabled, the planner is a passthrough.
//!
//! Row and table boundaries are located by depth-counted tag scanning, not
//! a structural parse; untouched markup survives byte-for-byte.

use crate::error::PlannerError;
use crate::scanner::{Tag, TagKind, TagScanner, UnterminatedTag};

/// Per-render table page-break configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageBreakConfig {
    /// Keep tables intact across page boundaries.
    pub table_page_breaking: bool,
    /// Let long tables break row-by-row instead of moving as one unit.
    pub long_table_split: bool,
}

/// Annotate table rows according to `config`. Stateless and pure.
pub fn plan(markup: &str, config: &PageBreakConfig) -> Result<String, PlannerError> {
    if !config.table_page_breaking || config.long_table_split {
        return Ok(markup.to_string());
    }

    let tables = collect_tables(markup)?;
    let mut edits: Vec<Edit> = Vec::new();
    for table in &tables {
        for (index, row) in table.rows.iter().enumerate() {
            let is_last = index + 1 == table.rows.len();
            if let Some(edit) = row_edit(markup, row, is_last) {
                edits.push(edit);
            }
        }
    }
    if edits.is_empty() {
        return Ok(markup.to_string());
    }
    edits.sort_by_key(|e| e.start);
    tracing::debug!(tables = tables.len(), edits = edits.len(), "annotating table rows");

    let mut out = String::with_capacity(markup.len() + edits.len() * 32);
    let mut cursor = 0;
    for edit in &edits {
        out.push_str(&markup[cursor..edit.start]);
        out.push_str(&edit.text);
        cursor = edit.end;
    }
    out.push_str(&markup[cursor..]);
    Ok(out)
}

/// A replacement of `markup[start..end]` (empty range for an insertion).
#[derive(Debug)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

/// One row: its open tag and the start of its close tag.
#[derive(Debug, Clone, Copy)]
struct Row {
    open_end: usize,
    close_start: usize,
}

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Row>,
}

/// Collect every table with its direct rows. A nested table (inside a
/// cell) is its own entry; its rows belong to it, not to the outer table.
fn collect_tables(markup: &str) -> Result<Vec<Table>, PlannerError> {
    let mut tables: Vec<Table> = Vec::new();
    let mut open_tables: Vec<(usize, usize)> = Vec::new();
    let mut open_rows: Vec<(usize, usize, Option<usize>)> = Vec::new();

    for tag in TagScanner::new(markup) {
        let tag = tag
            .map_err(|UnterminatedTag { offset }| PlannerError::UnterminatedTag { offset })?;
        match (tag.name, tag.kind) {
            ("w:tbl", TagKind::Open) => {
                tables.push(Table::default());
                open_tables.push((tables.len() - 1, tag.start));
            }
            ("w:tbl", TagKind::Close) => {
                if open_tables.pop().is_none() {
                    return Err(PlannerError::UnmatchedClose {
                        tag: "w:tbl".to_string(),
                        offset: tag.start,
                    });
                }
            }
            ("w:tr", TagKind::Open) => {
                let table = open_tables.last().map(|(index, _)| *index);
                open_rows.push((tag.start, tag.end, table));
            }
            ("w:tr", TagKind::Close) => {
                let Some((_, open_end, table)) = open_rows.pop() else {
                    return Err(PlannerError::UnmatchedClose {
                        tag: "w:tr".to_string(),
                        offset: tag.start,
                    });
                };
                if let Some(table) = table {
                    tables[table].rows.push(Row {
                        open_end,
                        close_start: tag.start,
                    });
                }
            }
            _ => {}
        }
    }

    if let Some((offset, _, _)) = open_rows.first() {
        return Err(PlannerError::UnclosedRow { offset: *offset });
    }
    if let Some((_, offset)) = open_tables.first() {
        return Err(PlannerError::UnclosedTable { offset: *offset });
    }

    // Rows were appended at close time; inner rows close before outer ones,
    // so restore document order per table.
    for table in &mut tables {
        table.rows.sort_by_key(|r| r.open_end);
    }
    Ok(tables)
}

/// The edit ensuring this row carries the required properties, if any are
/// missing.
fn row_edit(markup: &str, row: &Row, is_last: bool) -> Option<Edit> {
    let mut wanted = String::from("<w:cantSplit/>");
    if !is_last {
        wanted.push_str("<w:keepNext/>");
    }

    match existing_row_properties(markup, row) {
        // `<w:trPr>` already present: add only what is missing, as its
        // first children.
        Some(RowProperties::Element {
            content_start,
            content_end,
        }) => {
            let body = &markup[content_start..content_end];
            let mut insert = String::new();
            if !body.contains("<w:cantSplit") {
                insert.push_str("<w:cantSplit/>");
            }
            if !is_last && !body.contains("<w:keepNext") {
                insert.push_str("<w:keepNext/>");
            }
            if insert.is_empty() {
                return None;
            }
            Some(Edit {
                start: content_start,
                end: content_start,
                text: insert,
            })
        }
        // `<w:trPr/>`: rewrite to an open/close pair holding the properties.
        Some(RowProperties::Empty { start, end }) => Some(Edit {
            start,
            end,
            text: format!("<w:trPr>{wanted}</w:trPr>"),
        }),
        // No properties element yet: create one as the row's first child.
        None => Some(Edit {
            start: row.open_end,
            end: row.open_end,
            text: format!("<w:trPr>{wanted}</w:trPr>"),
        }),
    }
}

enum RowProperties {
    /// `<w:trPr>...</w:trPr>` with its content range.
    Element {
        content_start: usize,
        content_end: usize,
    },
    /// Self-closing `<w:trPr/>` with its full tag range.
    Empty { start: usize, end: usize },
}

/// The row's `<w:trPr>` element, which is always its first child when
/// present.
fn existing_row_properties(markup: &str, row: &Row) -> Option<RowProperties> {
    let mut scanner = TagScanner::starting_at(markup, row.open_end);
    let first: Tag = scanner.next()?.ok()?;
    if first.name != "w:trPr" || first.start >= row.close_start {
        return None;
    }
    match first.kind {
        TagKind::SelfClose => Some(RowProperties::Empty {
            start: first.start,
            end: first.end,
        }),
        TagKind::Open => {
            let mut depth = 0usize;
            for tag in scanner {
                let tag = tag.ok()?;
                if tag.name != "w:trPr" {
                    continue;
                }
                match tag.kind {
                    TagKind::Open => depth += 1,
                    TagKind::SelfClose => {}
                    TagKind::Close => {
                        if depth == 0 {
                            return Some(RowProperties::Element {
                                content_start: first.end,
                                content_end: tag.start,
                            });
                        }
                        depth -= 1;
                    }
                }
            }
            None
        }
        TagKind::Close => None,
    }
}
