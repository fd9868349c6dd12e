/*
 * pipeline_tests.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * End-to-end pipeline tests: repair, evaluate, and plan chained over
 * realistic markup.
 */

use std::sync::Mutex;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use vellum_core::{
    MemorySource, NoopObserver, RenderError, RenderObserver, RenderOptions, TemplateSource,
    TemplateSourceError, render, render_with_observer,
};

fn options() -> RenderOptions {
    RenderOptions::default()
}

fn text_of(content: &str) -> String {
    // Strip tags, keeping only text content, for assertions that ignore
    // surrounding markup.
    let mut text = String::new();
    let mut in_tag = false;
    for c in content.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    text
}

#[test]
fn test_collateral_scenario_through_the_full_pipeline() {
    // The directive marker arrives split across runs, the way an editor
    // leaves it after a spell-check pass.
    let markup = "<w:p>\
                  <w:r><w:t>${#each collat</w:t></w:r>\
                  <w:proofErr w:type=\"spellStart\"/>\
                  <w:r><w:t>eral}</w:t></w:r>\
                  <w:r><w:t>${this.type}</w:t></w:r>\
                  <w:r><w:t>${#if this.collateralOwner.type == 'Individual'}</w:t></w:r>\
                  <w:r><w:t>OWNER:${this.collateralOwner.name}</w:t></w:r>\
                  <w:r><w:t>${/if}</w:t></w:r>\
                  <w:r><w:t>${/each}</w:t></w:r>\
                  </w:p>";
    let data = json!({"collateral": [
        {"type": "Land", "collateralOwner": {"type": "Individual", "name": "Shiva"}},
    ]});

    let output = render(markup, &data, &options()).unwrap();
    assert_eq!(text_of(&output.content), "LandOWNER:Shiva");
    assert!(output.warnings.is_empty());
}

#[test]
fn test_loop_expanded_tables_get_page_break_properties() {
    // One table per loan: the loop wraps the whole table, and planning runs
    // on the expanded output, so every copy gets its own row annotations.
    let markup = "<w:p><w:r><w:t>${#each loans}</w:t></w:r></w:p>\
                  <w:tbl>\
                  <w:tr><w:tc><w:p><w:r><w:t>${this.id}</w:t></w:r></w:p></w:tc></w:tr>\
                  <w:tr><w:tc><w:p><w:r><w:t>${this.amount}</w:t></w:r></w:p></w:tc></w:tr>\
                  </w:tbl>\
                  <w:p><w:r><w:t>${/each}</w:t></w:r></w:p>";
    let data = json!({"loans": [
        {"id": "L-1", "amount": 1000},
        {"id": "L-2", "amount": 2500},
    ]});

    let output = render(markup, &data, &options()).unwrap();

    // 2 tables of 2 rows: every row cant-split, keep-next on all but the
    // last row of each table.
    assert_eq!(output.content.matches("<w:tbl>").count(), 2);
    assert_eq!(output.content.matches("<w:tr>").count(), 4);
    assert_eq!(output.content.matches("<w:cantSplit/>").count(), 4);
    assert_eq!(output.content.matches("<w:keepNext/>").count(), 2);
}

#[test]
fn test_long_table_split_leaves_rows_free() {
    let markup = "<w:tbl><w:tr><w:tc><w:p/></w:tc></w:tr><w:tr><w:tc><w:p/></w:tc></w:tr></w:tbl>";
    let opts = RenderOptions {
        long_table_split: true,
        ..RenderOptions::default()
    };
    let output = render(markup, &json!({}), &opts).unwrap();
    assert_eq!(output.content, markup);
}

#[test]
fn test_warnings_surface_through_the_pipeline() {
    let markup = "<w:p><w:r><w:t>${missing} ${#each absent}x${/each}</w:t></w:r></w:p>";
    let output = render(markup, &json!({}), &options()).unwrap();
    assert_eq!(output.warnings.len(), 2);
}

#[test]
fn test_duration_is_recorded() {
    let output = render(
        "<w:p><w:r><w:t>${x}</w:t></w:r></w:p>",
        &json!({"x": 1}),
        &options(),
    )
    .unwrap();
    assert!(output.duration > Duration::ZERO);
}

#[derive(Default)]
struct Recording {
    events: Mutex<Vec<String>>,
}

impl RenderObserver for Recording {
    fn on_render_start(&self) {
        self.events.lock().unwrap().push("start".to_string());
    }

    fn on_stage_complete(&self, name: &str) {
        self.events.lock().unwrap().push(name.to_string());
    }

    fn on_render_complete(&self, _duration: Duration, warning_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("complete:{warning_count}"));
    }

    fn on_render_error(&self, _error: &RenderError) {
        self.events.lock().unwrap().push("error".to_string());
    }
}

#[test]
fn test_observer_sees_stages_and_outcome() {
    let observer = Recording::default();
    render_with_observer(
        "<w:p><w:r><w:t>${missing}</w:t></w:r></w:p>",
        &json!({}),
        &options(),
        &observer,
    )
    .unwrap();

    assert_eq!(
        *observer.events.lock().unwrap(),
        vec!["start", "repair", "evaluate", "plan", "complete:1"]
    );
}

#[test]
fn test_observer_sees_failure() {
    let observer = Recording::default();
    let result = render_with_observer(
        "<w:p><w:r><w:t>${/each}</w:t></w:r></w:p>",
        &json!({}),
        &options(),
        &observer,
    );
    assert!(result.is_err());
    assert_eq!(observer.events.lock().unwrap().last().unwrap(), "error");
}

#[test]
fn test_template_source_feeds_pipeline() {
    let mut source = MemorySource::new();
    source.insert(
        "greeting",
        "<w:p><w:r><w:t>Hello ${name}</w:t></w:r></w:p>",
    );

    let bytes = source.resolve("greeting").unwrap();
    let markup = String::from_utf8(bytes).unwrap();
    let output = render(&markup, &json!({"name": "World"}), &options()).unwrap();
    assert_eq!(text_of(&output.content), "Hello World");

    assert!(matches!(
        source.resolve("no-such-template"),
        Err(TemplateSourceError::NotFound { .. })
    ));
}

#[test]
fn test_parallel_renders_are_independent() {
    let markup = "<w:p><w:r><w:t>${#each items}${this.v}${/each}</w:t></w:r></w:p>";
    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let markup = markup.to_string();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    let data = json!({"items": [{"v": worker}]});
                    let output =
                        render_with_observer(&markup, &data, &options(), &NoopObserver).unwrap();
                    assert_eq!(text_of(&output.content), worker.to_string());
                    assert!(output.warnings.is_empty());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker succeeds");
    }
}
