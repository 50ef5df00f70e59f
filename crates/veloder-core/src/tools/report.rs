use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::Tool;
use crate::files::{self, Artifacts};

static MD_H1: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^# ").expect("invalid h1 regex"));
static MD_H2: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^## ").expect("invalid h2 regex"));
static MD_H3: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^### ").expect("invalid h3 regex"));
static HTML_H1: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<h1\b").expect("invalid h1 regex"));
static HTML_H2: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<h2\b").expect("invalid h2 regex"));
static HTML_H3: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<h3\b").expect("invalid h3 regex"));

/// Heading and keyword metrics for a Markdown or HTML post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeoReport {
    pub word_count: usize,
    pub h1_count: usize,
    pub h2_count: usize,
    pub h3_count: usize,
    pub keyword: String,
    pub keyword_count: usize,
    pub keyword_density: f64,
}

impl SeoReport {
    pub fn analyze(content: &str, keyword: &str) -> Self {
        let word_count = content.split_whitespace().count();
        let h1_count = MD_H1.find_iter(content).count() + HTML_H1.find_iter(content).count();
        let h2_count = MD_H2.find_iter(content).count() + HTML_H2.find_iter(content).count();
        let h3_count = MD_H3.find_iter(content).count() + HTML_H3.find_iter(content).count();

        let needle = keyword.trim().to_lowercase();
        let keyword_count = if needle.is_empty() {
            0
        } else {
            content.to_lowercase().matches(&needle).count()
        };
        let keyword_density = if word_count > 0 {
            keyword_count as f64 / word_count as f64 * 100.0
        } else {
            0.0
        };

        Self {
            word_count,
            h1_count,
            h2_count,
            h3_count,
            keyword: keyword.trim().to_string(),
            keyword_count,
            keyword_density,
        }
    }

    fn mark(ok: bool) -> &'static str {
        if ok { "✅" } else { "⚠️" }
    }

    pub fn render_markdown(&self, title: &str) -> String {
        let density_ok = (1.0..=3.0).contains(&self.keyword_density);
        format!(
            "# Relatório de Análise SEO - {title}\n\n\
             ## Métricas Gerais\n\
             - **Contagem de palavras:** {} palavras {} (Ideal: 1000+ palavras)\n\
             - **Títulos H1:** {} {} (Ideal: 1 título H1)\n\
             - **Títulos H2:** {} {} (Ideal: 3-5 títulos H2)\n\
             - **Títulos H3:** {} {} (Ideal: múltiplos H3 para estrutura)\n\n\
             ## Análise de Palavras-chave\n\
             - **Palavra-chave principal:** \"{}\"\n\
             - **Frequência:** {} ocorrências\n\
             - **Densidade:** {:.2}% {} (Ideal: 1-3%)\n\n\
             ---\n\n\
             **Data da análise:** {}\n",
            self.word_count,
            Self::mark(self.word_count >= 1000),
            self.h1_count,
            Self::mark(self.h1_count == 1),
            self.h2_count,
            Self::mark((3..=5).contains(&self.h2_count)),
            self.h3_count,
            Self::mark(self.h3_count > 1),
            self.keyword,
            self.keyword_count,
            self.keyword_density,
            Self::mark(density_ok),
            Local::now().format("%d/%m/%Y às %H:%M"),
        )
    }
}

/// Writes an [`SeoReport`] for the working text; returns where it went.
pub struct SeoReportTool {
    path: PathBuf,
    keyword: String,
    title: String,
    artifacts: Artifacts,
}

impl SeoReportTool {
    pub fn new(
        path: impl Into<PathBuf>,
        keyword: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            keyword: keyword.into(),
            title: title.into(),
            artifacts: Artifacts::new(),
        }
    }

    pub fn with_artifacts(mut self, artifacts: Artifacts) -> Self {
        self.artifacts = artifacts;
        self
    }
}

#[async_trait]
impl Tool for SeoReportTool {
    fn name(&self) -> &str {
        "SEO Report"
    }

    fn description(&self) -> &str {
        "Gera um relatório de análise SEO do conteúdo."
    }

    #[instrument(name = "tool.seo_report", skip_all)]
    async fn run(&self, content: &str) -> String {
        let report = SeoReport::analyze(content, &self.keyword);
        let path = files::unique_path(self.path.clone());
        match files::save_text(&report.render_markdown(&self.title), &path) {
            Ok(()) => {
                info!(
                    path = %path.display(),
                    words = report.word_count,
                    density = report.keyword_density,
                    "SEO report saved"
                );
                self.artifacts.record(&path);
                format!("Relatório SEO salvo em: {}", path.display())
            }
            Err(err) => {
                warn!(error = %err, "unable to save SEO report");
                format!("Erro ao salvar relatório SEO: {err}")
            }
        }
    }
}
