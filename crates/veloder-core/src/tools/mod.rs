//! Agent tools. Each performs one external effect and reports failures as
//! text instead of errors, so a stage never aborts because of a tool.

mod article;
mod design;
mod events;
mod report;
mod search;
mod seo;
mod writer;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

pub use article::{ArticleSeoOptions, ArticleSeoTool, optimize_markdown};
pub use design::{DesignTool, render_markdown, render_post, strip_code_fence};
pub use events::{
    EventDataset, EventResearchTool, EventSummary, TriathlonEvent, consolidate_results,
    format_date_pt, research_queries,
};
pub use report::{SeoReport, SeoReportTool};
pub use search::{
    OrganicResult, SEARCH_ERROR_PREFIX, SearchArchiveTool, SearchClient, SearchRecord,
    SerperSearchTool, extract_content, load_search_records,
};
pub use seo::{SeoOptions, SeoTool, optimize_html, slugify};
pub use writer::{PostWriterTool, TextSaverTool};

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Run the tool; failures come back as human-readable text.
    async fn run(&self, input: &str) -> String;
}

pub type DynTool = Arc<dyn Tool>;

/// What a tool consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolInput {
    /// The run topic, before the agent is prompted.
    Topic,
    /// The stage's working text, after the agent answered.
    Working,
}

/// What happens to a tool's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutputUse {
    /// Becomes the stage's working text (or prompt material for `Topic` tools).
    Replace,
    /// Recorded as a stage note; working text is kept.
    Annotate,
}

#[derive(Clone)]
pub struct ToolBinding {
    pub tool: DynTool,
    pub input: ToolInput,
    pub output: ToolOutputUse,
}

impl ToolBinding {
    pub fn gather(tool: DynTool) -> Self {
        Self {
            tool,
            input: ToolInput::Topic,
            output: ToolOutputUse::Replace,
        }
    }

    pub fn transform(tool: DynTool) -> Self {
        Self {
            tool,
            input: ToolInput::Working,
            output: ToolOutputUse::Replace,
        }
    }

    pub fn annotate(tool: DynTool) -> Self {
        Self {
            tool,
            input: ToolInput::Working,
            output: ToolOutputUse::Annotate,
        }
    }
}

impl fmt::Debug for ToolBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolBinding")
            .field("tool", &self.tool.name())
            .field("input", &self.input)
            .field("output", &self.output)
            .finish()
    }
}
