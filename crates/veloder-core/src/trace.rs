use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::files;

/// Context key under which stages append their trace events.
pub const TRACE_CONTEXT_KEY: &str = "trace.events";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub stage: String,
    pub message: String,
    pub timestamp_ms: i64,
}

impl TraceEvent {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceCollector {
    events: Vec<TraceEvent>,
}

impl TraceCollector {
    pub fn from_events(events: Vec<TraceEvent>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn summary(&self) -> TraceSummary {
        TraceSummary::from_events(&self.events)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub index: usize,
    pub stage: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceSummary {
    pub steps: Vec<TraceStep>,
}

impl TraceSummary {
    pub fn from_events(events: &[TraceEvent]) -> Self {
        let steps = events
            .iter()
            .enumerate()
            .map(|(idx, event)| TraceStep {
                index: idx + 1,
                stage: event.stage.clone(),
                message: event.message.clone(),
            })
            .collect();
        Self { steps }
    }

    pub fn render_markdown(&self) -> String {
        if self.steps.is_empty() {
            return "No trace events recorded.".to_string();
        }
        let mut output = String::from("### Trace Summary\n");
        for step in &self.steps {
            let _ = writeln!(output, "{}. {} -> {}", step.index, step.stage, step.message);
        }
        output
    }
}

/// Write `<dir>/<run_id>.json`.
pub fn persist_trace(
    dir: impl AsRef<Path>,
    run_id: &str,
    events: &[TraceEvent],
) -> Result<PathBuf> {
    let path = dir.as_ref().join(format!("{run_id}.json"));
    files::save_json(events, &path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_lists_steps_in_order() {
        let collector = TraceCollector::from_events(vec![
            TraceEvent::new("research", "tool Serper Search: 1200 chars"),
            TraceEvent::new("writing", "llm gemini-1.5-pro: 5400 chars"),
        ]);

        let markdown = collector.summary().render_markdown();
        assert!(markdown.starts_with("### Trace Summary\n"));
        assert!(markdown.contains("1. research -> tool Serper Search"));
        assert!(markdown.contains("2. writing -> llm"));
    }

    #[test]
    fn empty_trace_renders_placeholder() {
        assert_eq!(
            TraceSummary::default().render_markdown(),
            "No trace events recorded."
        );
    }

    #[test]
    fn persisted_trace_reloads() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        let events = vec![TraceEvent::new("seo", "saved post")];
        let path = persist_trace(temp.path().join("traces"), "run-1", &events).unwrap();
        assert!(path.ends_with("run-1.json"));
        let loaded: Vec<TraceEvent> = files::load_json(&path).unwrap();
        assert_eq!(loaded, events);
    }
}
