//! Stage layouts of the three pipelines and the end-to-end run.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::{info, warn};

use crate::agents::AgentFactory;
use crate::config::{Config, PipelineVariant, SearchOutput, load_subject};
use crate::crew::{Crew, CrewOutcome};
use crate::files::Artifacts;
use crate::llm::{DynModel, build_model};
use crate::logging::{RunLogInput, log_run_completion};
use crate::security::require_all;
use crate::tasks::TaskFactory;
use crate::tools::{
    ArticleSeoOptions, ArticleSeoTool, DesignTool, EventResearchTool, PostWriterTool,
    SearchArchiveTool, SearchClient, SeoOptions, SeoReportTool, SeoTool, SerperSearchTool,
    TextSaverTool, ToolBinding,
};
use crate::trace::persist_trace;

const DEFAULT_FOCUS_KEYWORD: &str = "triathlon";

/// Assemble the crew for `variant`. Tools record written files in `artifacts`.
pub fn build_crew(
    variant: PipelineVariant,
    config: &Config,
    topic: &str,
    search: SearchClient,
    artifacts: &Artifacts,
) -> Result<Crew> {
    let agents_dir = config.path(&config.pipeline.agents_dir);
    let tasks_dir = config.path(&config.pipeline.tasks_dir);
    let agents = AgentFactory::new(&agents_dir);
    let tasks = TaskFactory::new(&tasks_dir, topic);
    let search_dir = config.path(&config.pipeline.search_dir);
    let post_dir = config.path(&config.pipeline.post_dir);

    let design = || {
        Arc::new(
            DesignTool::new(config.path(&config.pipeline.template), topic)
                .with_language(&config.seo.language),
        )
    };
    let serper = |default_output: SearchOutput| {
        let tool = SerperSearchTool::new(
            search.clone(),
            config.search.output.unwrap_or(default_output),
        )
        .with_artifacts(artifacts.clone());
        let tool = if config.search.persist.unwrap_or(true) {
            tool.persist_to(&search_dir)
        } else {
            tool
        };
        Arc::new(tool)
    };

    let crew = Crew::new(format!("veloder_{variant}")).with_temperature(config.agents.temperature);
    let crew = match variant {
        PipelineVariant::Blog => {
            let seo = SeoTool::new(
                &post_dir,
                SeoOptions {
                    site_url: config.seo.site_url.clone(),
                    words_per_minute: config.seo.words_per_minute,
                    language: config.seo.language.clone(),
                    fallback_title: topic.to_string(),
                },
            )
            .with_artifacts(artifacts.clone());

            crew.stage(
                tasks
                    .research_task(agents.researcher())
                    .with_tool(ToolBinding::gather(serper(SearchOutput::Digest))),
            )
            .stage(tasks.writing_task(agents.journalist()))
            .stage(
                tasks
                    .design_task(agents.designer())
                    .with_tool(ToolBinding::transform(design())),
            )
            .stage(
                tasks
                    .seo_task(agents.seo_expert())
                    .with_tool(ToolBinding::transform(Arc::new(seo))),
            )
        }
        PipelineVariant::Wordpress => {
            let writer = PostWriterTool::new(&post_dir).with_artifacts(artifacts.clone());

            crew.stage(
                tasks
                    .raw_research_task(agents.researcher())
                    .with_tool(ToolBinding::gather(serper(SearchOutput::Raw))),
            )
            .stage(
                tasks
                    .writing_task(agents.journalist())
                    .with_tool(ToolBinding::gather(Arc::new(SearchArchiveTool::new(&search_dir)))),
            )
            .stage(
                tasks
                    .publish_task(agents.designer())
                    .with_tool(ToolBinding::transform(design()))
                    .with_tool(ToolBinding::annotate(Arc::new(writer))),
            )
        }
        PipelineVariant::Triathlon => {
            let params = config.triathlon.search_params()?;
            let year = params.year;
            let data_dir = config.path(&config.pipeline.data_dir);
            let output_dir = config.path(&config.pipeline.output_dir);
            let keyword = config
                .seo
                .focus_keyword
                .clone()
                .unwrap_or_else(|| DEFAULT_FOCUS_KEYWORD.to_string());

            let research = EventResearchTool::new(
                search.clone(),
                params.clone(),
                data_dir.join(format!("triathlon_events_{year}.json")),
            )
            .with_artifacts(artifacts.clone());
            let save_post =
                TextSaverTool::new(output_dir.join(format!("triathlon_blog_post_{year}.md")))
                    .with_artifacts(artifacts.clone());
            let article_seo = ArticleSeoTool::new(ArticleSeoOptions::triathlon(
                &params.country,
                year,
                &config.seo.site_url,
                config.seo.focus_keyword.as_deref(),
            ));
            let save_optimized = TextSaverTool::new(
                output_dir.join(format!("triathlon_blog_post_{year}_seo_optimized.md")),
            )
            .with_artifacts(artifacts.clone());
            let report = SeoReportTool::new(
                output_dir.join(format!("seo_analysis_report_{year}.md")),
                keyword,
                format!("Triathlon Blog Post {year}"),
            )
            .with_artifacts(artifacts.clone());

            crew.stage(
                tasks
                    .triathlon_research_task(agents.triathlon_researcher(&params), &params)
                    .with_tool(ToolBinding::gather(Arc::new(research))),
            )
            .stage(
                tasks
                    .triathlon_writing_task(agents.content_writer(), &params)
                    .with_tool(ToolBinding::annotate(Arc::new(save_post))),
            )
            .stage(
                tasks
                    .triathlon_seo_task(agents.seo_optimizer(), &params)
                    .with_tool(ToolBinding::transform(Arc::new(article_seo)))
                    .with_tool(ToolBinding::annotate(Arc::new(save_optimized)))
                    .with_tool(ToolBinding::annotate(Arc::new(report))),
            )
        }
    };

    info!(%variant, stages = ?crew.stage_names(), "crew assembled");
    Ok(crew)
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub variant: PipelineVariant,
    pub topic: String,
    pub crew: CrewOutcome,
    pub artifacts: Vec<PathBuf>,
    pub trace_path: Option<PathBuf>,
    pub journal_path: Option<PathBuf>,
}

/// Run `variant` end to end with the given clients, then persist trace and journal.
pub async fn run_pipeline(
    config: &Config,
    variant: PipelineVariant,
    llm: DynModel,
    search: SearchClient,
) -> Result<PipelineOutcome> {
    let topic = load_subject(config.path(&config.pipeline.subject_file));
    info!(%variant, %topic, "pipeline starting");

    let artifacts = Artifacts::new();
    let crew = build_crew(variant, config, &topic, search, &artifacts)?;
    let outcome = crew
        .kickoff(llm, &topic)
        .await
        .with_context(|| format!("pipeline `{variant}` failed"))?;

    let trace_path = match persist_trace(
        config.path(&config.pipeline.trace_dir),
        &outcome.run_id,
        outcome.trace.events(),
    ) {
        Ok(path) => {
            artifacts.record(&path);
            Some(path)
        }
        Err(err) => {
            warn!(error = %err, "unable to persist trace");
            None
        }
    };

    let artifacts = artifacts.list();
    let journal_path = match log_run_completion(
        config.path(&config.logging.dir),
        config.logging.retention_days,
        RunLogInput {
            run_id: outcome.run_id.clone(),
            variant: variant.to_string(),
            topic: topic.clone(),
            summary: outcome.result.clone(),
            artifacts: artifacts.iter().map(|p| p.display().to_string()).collect(),
            trace_path: trace_path.as_ref().map(|p| p.display().to_string()),
        },
    ) {
        Ok(path) => Some(path),
        Err(err) => {
            warn!(error = %err, "unable to write run journal");
            None
        }
    };

    info!(run_id = %outcome.run_id, artifacts = artifacts.len(), "pipeline finished");
    Ok(PipelineOutcome {
        variant,
        topic,
        crew: outcome,
        artifacts,
        trace_path,
        journal_path,
    })
}

/// Check secrets, build the clients from `config` and run the selected variant.
pub async fn run_configured(config: &Config, variant: PipelineVariant) -> Result<PipelineOutcome> {
    let names = config.required_secrets();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let mut secrets = require_all(&names)?.into_iter();
    let (Some(llm_key), Some(search_key)) = (secrets.next(), secrets.next()) else {
        anyhow::bail!("secret resolution returned fewer values than requested");
    };

    let llm = build_model(&config.agents, llm_key)?;
    let search = SearchClient::new(search_key, &config.search)?;
    run_pipeline(config, variant, llm, search).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VeloderError;
    use crate::security::SecretValue;
    use tempfile::TempDir;

    fn client(config: &Config) -> SearchClient {
        SearchClient::new(SecretValue::new("test"), &config.search).unwrap()
    }

    #[test]
    fn stage_layouts_per_variant() {
        let temp = TempDir::new().expect("temp dir");
        let config = Config::default().with_root(temp.path());
        let artifacts = Artifacts::new();
        let layout = |variant| {
            build_crew(variant, &config, "IA", client(&config), &artifacts)
                .unwrap()
                .stage_names()
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>()
        };

        assert_eq!(
            layout(PipelineVariant::Blog),
            vec!["research_task", "writing_task", "design_task", "seo_task"]
        );
        assert_eq!(
            layout(PipelineVariant::Wordpress),
            vec!["research_task", "writing_task", "publish_task"]
        );
        assert_eq!(
            layout(PipelineVariant::Triathlon),
            vec!["triathlon_research_task", "triathlon_writing_task", "triathlon_seo_task"]
        );
    }

    #[test]
    fn triathlon_rejects_out_of_range_year() {
        let temp = TempDir::new().expect("temp dir");
        let mut config = Config::default().with_root(temp.path());
        config.triathlon.year = Some(2019);
        let result = build_crew(
            PipelineVariant::Triathlon,
            &config,
            "triathlon",
            client(&config),
            &Artifacts::new(),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn missing_keys_stop_before_any_file_is_written() {
        let temp = TempDir::new().expect("temp dir");
        let mut config = Config::default().with_root(temp.path());
        config.agents.api_key_env = Some("VELODER_TEST_LLM_KEY_NEVER_SET".into());
        config.search.api_key_env = Some("VELODER_TEST_SEARCH_KEY_NEVER_SET".into());

        let err = run_configured(&config, PipelineVariant::Blog).await.unwrap_err();
        match err.downcast_ref::<VeloderError>() {
            Some(VeloderError::MissingSecret(names)) => {
                assert!(names.contains("VELODER_TEST_LLM_KEY_NEVER_SET"), "{names}");
                assert!(names.contains("VELODER_TEST_SEARCH_KEY_NEVER_SET"), "{names}");
            }
            other => panic!("expected MissingSecret, got {other:?}"),
        }
        let written = std::fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(written, 0);
    }
}
