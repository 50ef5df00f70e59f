//! Veloder core: a blog-writing crew of LLM agents built on `graph_flow`.
//!
//! A run loads the topic, assembles the stages of the selected pipeline
//! variant (research, writing, design, SEO, publishing) and executes them in
//! order, each stage reading the previous stage's output.

pub mod agents;
pub mod config;
pub mod crew;
pub mod descriptor;
mod error;
pub mod files;
pub mod llm;
pub mod logging;
mod security;
pub mod tasks;
pub mod telemetry;
pub mod tools;
pub mod trace;
pub mod variants;

pub use agents::{AgentDescriptor, AgentFactory};
pub use config::{Config, ConfigLoader, DEFAULT_TOPIC, PipelineVariant, load_subject};
pub use crew::{Crew, CrewOutcome};
pub use error::{Result, VeloderError};
pub use llm::{CompletionRequest, DynModel, GeminiModel, LanguageModel, OpenAiModel, build_model};
pub use security::{SecretValue, require_all, require_env};
pub use tasks::{TaskDescriptor, TaskFactory};
pub use telemetry::{TelemetryOptions, init_telemetry, reconfigure_telemetry};
pub use trace::{TraceCollector, TraceEvent, TraceStep, TraceSummary, persist_trace};
pub use variants::{PipelineOutcome, build_crew, run_configured, run_pipeline};
