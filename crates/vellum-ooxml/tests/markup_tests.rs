/*
 * markup_tests.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Integration tests: both passes must leave the markup well-formed.
 */

use pretty_assertions::assert_eq;
use vellum_ooxml::{PageBreakConfig, plan, repair};

/// Rewritten markup must still parse as XML.
fn assert_well_formed(xml: &str) {
    let wrapped = format!("<doc>{xml}</doc>");
    let mut reader = quick_xml::Reader::from_str(&wrapped);
    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Eof) => break,
            Ok(_) => {}
            Err(e) => panic!("markup not well-formed: {e}\n{xml}"),
        }
    }
}

fn config() -> PageBreakConfig {
    PageBreakConfig {
        table_page_breaking: true,
        long_table_split: false,
    }
}

#[test]
fn test_repair_output_is_well_formed() {
    let markup = "<w:p><w:r><w:rPr><w:i/></w:rPr><w:t>${#each collat</w:t></w:r>\
                  <w:proofErr w:type=\"spellStart\"/>\
                  <w:r><w:t>eral}</w:t></w:r>\
                  <w:proofErr w:type=\"spellEnd\"/>\
                  <w:r><w:t>${this.type}</w:t></w:r></w:p>";
    let repaired = repair(markup).unwrap();
    assert_well_formed(&repaired);
    assert!(repaired.contains("${#each collateral}"));
}

#[test]
fn test_plan_output_is_well_formed() {
    let markup = "<w:tbl><w:tblPr><w:tblW w:w=\"5000\"/></w:tblPr>\
                  <w:tr><w:trPr><w:trHeight w:val=\"240\"/></w:trPr><w:tc><w:p/></w:tc></w:tr>\
                  <w:tr><w:tc><w:p/></w:tc></w:tr>\
                  </w:tbl>";
    let planned = plan(markup, &config()).unwrap();
    assert_well_formed(&planned);
    assert_eq!(planned.matches("<w:cantSplit/>").count(), 2);
    assert_eq!(planned.matches("<w:keepNext/>").count(), 1);
}

#[test]
fn test_repair_then_plan_round_trip() {
    // A split marker inside a table cell, then row annotation on top.
    let cell = "<w:tc><w:p><w:r><w:t>${this.amou</w:t></w:r><w:r><w:t>nt}</w:t></w:r></w:p></w:tc>";
    let markup = format!("<w:tbl><w:tr>{cell}</w:tr><w:tr>{cell}</w:tr></w:tbl>");

    let repaired = repair(&markup).unwrap();
    assert!(repaired.contains("${this.amount}"));

    let planned = plan(&repaired, &config()).unwrap();
    assert_well_formed(&planned);
    assert_eq!(planned.matches("<w:cantSplit/>").count(), 2);
    assert_eq!(planned.matches("<w:keepNext/>").count(), 1);
}

#[test]
fn test_repair_idempotent_on_document_scale_input() {
    let mut markup = String::new();
    for i in 0..200 {
        markup.push_str(&format!(
            "<w:p><w:r><w:t>paragraph {i}: ${{va</w:t></w:r><w:r><w:t>lue{i}}}</w:t></w:r></w:p>"
        ));
    }
    let once = repair(&markup).unwrap();
    let twice = repair(&once).unwrap();
    assert_eq!(once, twice);
    assert_well_formed(&once);
    assert_eq!(once.matches("${va").count(), 200);
}
