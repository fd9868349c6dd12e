/*
 * observer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Observer abstraction for render events.
//!
//! The surrounding system keeps an append-only operational record of every
//! render (actor, action, timing, outcome). The core does not write those
//! records itself; instead it reports stage progress, success, failure, and
//! timing through this trait so any caller can record them.
//!
//! All methods have empty default implementations, so observers implement
//! only the events they care about.

use std::time::Duration;

use crate::error::RenderError;

/// Observer for render pipeline events.
///
/// Implementations must be `Send + Sync`: renders of different documents
/// may run on parallel worker threads.
pub trait RenderObserver: Send + Sync {
    /// Called once before the first stage runs.
    fn on_render_start(&self) {}

    /// Called when a pipeline stage begins.
    fn on_stage_start(&self, _name: &str) {}

    /// Called when a pipeline stage completes successfully.
    fn on_stage_complete(&self, _name: &str) {}

    /// Called when the render completes successfully.
    fn on_render_complete(&self, _duration: Duration, _warning_count: usize) {}

    /// Called when the render fails.
    fn on_render_error(&self, _error: &RenderError) {}
}

/// No-op observer, the default when the caller does not need events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RenderObserver for NoopObserver {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<String>>,
    }

    impl RenderObserver for Recording {
        fn on_stage_start(&self, name: &str) {
            self.events.lock().unwrap().push(format!("start:{name}"));
        }

        fn on_stage_complete(&self, name: &str) {
            self.events.lock().unwrap().push(format!("done:{name}"));
        }
    }

    #[test]
    fn test_default_methods_are_noops() {
        // A unit observer compiles and accepts every event.
        let observer = NoopObserver;
        observer.on_render_start();
        observer.on_stage_start("repair");
        observer.on_render_complete(Duration::from_millis(3), 0);
    }

    #[test]
    fn test_partial_implementation() {
        let observer = Recording::default();
        observer.on_render_start(); // default no-op
        observer.on_stage_start("repair");
        observer.on_stage_complete("repair");
        assert_eq!(
            *observer.events.lock().unwrap(),
            vec!["start:repair", "done:repair"]
        );
    }
}
