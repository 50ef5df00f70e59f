//! Sequential crew: every stage is a graph-flow task chained to the next.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use graph_flow::{
    Context, ExecutionStatus, FlowRunner, GraphBuilder, GraphError, InMemorySessionStorage,
    NextAction, Session, SessionStorage, Task, TaskResult,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::llm::{CompletionRequest, DynModel};
use crate::tasks::TaskDescriptor;
use crate::tools::{ToolInput, ToolOutputUse};
use crate::trace::{TRACE_CONTEXT_KEY, TraceCollector, TraceEvent};

const TOPIC_KEY: &str = "topic";
const NOTES_KEY: &str = "crew.notes";

fn output_key(stage: &str) -> String {
    format!("stage.{stage}.output")
}

/// One crew stage as a graph task.
struct StageTask {
    descriptor: TaskDescriptor,
    upstream: Vec<String>,
    llm: DynModel,
    temperature: f32,
    last: bool,
}

impl StageTask {
    async fn upstream_text(&self, context: &Context) -> String {
        let mut parts = Vec::new();
        for stage in &self.upstream {
            match context.get::<String>(&output_key(stage)).await {
                Some(text) if !text.trim().is_empty() => parts.push(text),
                _ => debug!(upstream = %stage, "upstream stage produced no output"),
            }
        }
        parts.join("\n\n")
    }

    fn prompt(&self, upstream: &str, gathered: &[(String, String)]) -> String {
        let mut prompt = format!(
            "{}\n\nResultado esperado: {}",
            self.descriptor.description.trim(),
            self.descriptor.expected_output.trim()
        );
        if !upstream.is_empty() {
            prompt.push_str("\n\nContexto recebido das etapas anteriores:\n");
            prompt.push_str(upstream);
        }
        if !gathered.is_empty() {
            prompt.push_str("\n\nMaterial coletado pelas ferramentas:");
            for (tool, output) in gathered {
                prompt.push_str(&format!("\n\n### {tool}\n{output}"));
            }
        }
        prompt
    }

    async fn record(&self, context: &Context, events: Vec<TraceEvent>, notes: Vec<String>) {
        let mut trace: Vec<TraceEvent> = context.get(TRACE_CONTEXT_KEY).await.unwrap_or_default();
        trace.extend(events);
        context.set(TRACE_CONTEXT_KEY, &trace).await;

        if !notes.is_empty() {
            let mut all: Vec<String> = context.get(NOTES_KEY).await.unwrap_or_default();
            all.extend(notes);
            context.set(NOTES_KEY, &all).await;
        }
    }
}

#[async_trait]
impl Task for StageTask {
    fn id(&self) -> &str {
        &self.descriptor.name
    }

    #[instrument(
        name = "crew.stage",
        skip(self, context),
        fields(stage = %self.descriptor.name, agent = %self.descriptor.agent.name)
    )]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let name = self.descriptor.name.as_str();
        let topic: String = context.get(TOPIC_KEY).await.unwrap_or_default();
        let upstream = self.upstream_text(&context).await;
        let mut events = Vec::new();
        let mut notes = Vec::new();

        let mut gathered = Vec::new();
        for binding in self
            .descriptor
            .tools
            .iter()
            .filter(|binding| binding.input == ToolInput::Topic)
        {
            let output = binding.tool.run(&topic).await;
            events.push(TraceEvent::new(
                name,
                format!("tool {}: {} chars", binding.tool.name(), output.len()),
            ));
            match binding.output {
                ToolOutputUse::Replace => gathered.push((binding.tool.name().to_string(), output)),
                ToolOutputUse::Annotate => notes.push(output),
            }
        }

        let mut working = if self.descriptor.generate {
            let request = CompletionRequest {
                system: self.descriptor.agent.system_prompt(),
                prompt: self.prompt(&upstream, &gathered),
                temperature: self.temperature,
            };
            let answer = self.llm.complete(&request).await.map_err(|err| {
                GraphError::TaskExecutionFailed(format!("stage `{name}` failed: {err}"))
            })?;
            events.push(TraceEvent::new(
                name,
                format!("llm {}: {} chars", self.llm.model(), answer.len()),
            ));
            answer
        } else {
            let mut parts: Vec<&str> = Vec::new();
            if !upstream.is_empty() {
                parts.push(&upstream);
            }
            parts.extend(gathered.iter().map(|(_, output)| output.as_str()));
            parts.join("\n\n")
        };

        for binding in self
            .descriptor
            .tools
            .iter()
            .filter(|binding| binding.input == ToolInput::Working)
        {
            let output = binding.tool.run(&working).await;
            events.push(TraceEvent::new(
                name,
                format!("tool {}: {} chars", binding.tool.name(), output.len()),
            ));
            match binding.output {
                ToolOutputUse::Replace => working = output,
                ToolOutputUse::Annotate => {
                    info!(tool = binding.tool.name(), note = %output, "tool note");
                    notes.push(output);
                }
            }
        }

        if working.trim().is_empty() {
            warn!("stage produced empty output");
        }
        events.push(TraceEvent::new(name, format!("output {} chars", working.len())));
        context.set(&output_key(name), working.clone()).await;
        self.record(&context, events, notes).await;

        info!(chars = working.len(), "stage completed");

        let next = if self.last {
            NextAction::End
        } else {
            NextAction::ContinueAndExecute
        };
        Ok(TaskResult::new(Some(format!("Etapa {name} concluída")), next))
    }
}

/// Result of [`Crew::kickoff`].
#[derive(Debug, Clone)]
pub struct CrewOutcome {
    pub run_id: String,
    /// Output of the last stage.
    pub result: String,
    pub stage_outputs: Vec<(String, String)>,
    pub notes: Vec<String>,
    pub trace: TraceCollector,
}

/// Ordered list of stages.
#[derive(Debug, Clone)]
pub struct Crew {
    name: String,
    stages: Vec<TaskDescriptor>,
    temperature: f32,
}

impl Crew {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            temperature: 0.7,
        }
    }

    pub fn stage(mut self, task: TaskDescriptor) -> Self {
        self.stages.push(task);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name.as_str()).collect()
    }

    /// Upstream stages per stage; explicit context must name earlier stages.
    fn resolve_upstream(&self) -> Result<Vec<Vec<String>>> {
        if self.stages.is_empty() {
            bail!("crew `{}` has no stages", self.name);
        }
        let mut seen: HashSet<&str> = HashSet::new();
        let mut resolved = Vec::with_capacity(self.stages.len());
        for (idx, stage) in self.stages.iter().enumerate() {
            if seen.contains(stage.name.as_str()) {
                bail!("duplicate stage name `{}`", stage.name);
            }
            let upstream = if stage.context.is_empty() {
                idx.checked_sub(1)
                    .map(|prev| vec![self.stages[prev].name.clone()])
                    .unwrap_or_default()
            } else {
                for name in &stage.context {
                    if !seen.contains(name.as_str()) {
                        bail!(
                            "stage `{}` reads context from `{name}`, which does not run before it",
                            stage.name
                        );
                    }
                }
                stage.context.clone()
            };
            seen.insert(stage.name.as_str());
            resolved.push(upstream);
        }
        Ok(resolved)
    }

    #[instrument(name = "crew.kickoff", skip(self, llm, topic), fields(crew = %self.name))]
    pub async fn kickoff(&self, llm: DynModel, topic: &str) -> Result<CrewOutcome> {
        let upstream = self.resolve_upstream()?;
        let last = self.stages.len() - 1;

        let tasks: Vec<Arc<StageTask>> = self
            .stages
            .iter()
            .cloned()
            .zip(upstream)
            .enumerate()
            .map(|(idx, (descriptor, upstream))| {
                Arc::new(StageTask {
                    descriptor,
                    upstream,
                    llm: llm.clone(),
                    temperature: self.temperature,
                    last: idx == last,
                })
            })
            .collect();

        let mut builder = GraphBuilder::new(&self.name);
        for task in &tasks {
            builder = builder.add_task(task.clone());
        }
        for pair in tasks.windows(2) {
            builder = builder.add_edge(pair[0].id(), pair[1].id());
        }
        let graph = Arc::new(builder.set_start_task(tasks[0].id()).build());

        let storage = Arc::new(InMemorySessionStorage::new());
        let runner = FlowRunner::new(graph, storage.clone());

        let run_id = format!("run-{}", Uuid::new_v4());
        let session = Session::new_from_task(run_id.clone(), tasks[0].id());
        session.context.set(TOPIC_KEY, topic.to_string()).await;
        storage
            .save(session)
            .await
            .map_err(|err| anyhow!("failed to persist session: {err}"))?;

        info!(%run_id, stages = ?self.stage_names(), "crew started");

        loop {
            let result = runner
                .run(&run_id)
                .await
                .map_err(|err| anyhow!("graph execution failure: {err}"))?;

            match result.status {
                ExecutionStatus::Completed => break,
                ExecutionStatus::WaitingForInput => continue,
                ExecutionStatus::Error(message) => return Err(anyhow!(message)),
            }
        }

        let session = storage
            .get(&run_id)
            .await
            .map_err(|err| anyhow!("failed to reload session: {err}"))?
            .ok_or_else(|| anyhow!("session missing after execution"))?;

        let mut stage_outputs = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let output: String = session
                .context
                .get(&output_key(&stage.name))
                .await
                .unwrap_or_default();
            stage_outputs.push((stage.name.clone(), output));
        }
        let result = stage_outputs
            .last()
            .map(|(_, output)| output.clone())
            .unwrap_or_default();
        let notes: Vec<String> = session.context.get(NOTES_KEY).await.unwrap_or_default();
        let events: Vec<TraceEvent> = session
            .context
            .get(TRACE_CONTEXT_KEY)
            .await
            .unwrap_or_default();

        info!(%run_id, chars = result.len(), "crew finished");

        Ok(CrewOutcome {
            run_id,
            result,
            stage_outputs,
            notes,
            trace: TraceCollector::from_events(events),
        })
    }
}
