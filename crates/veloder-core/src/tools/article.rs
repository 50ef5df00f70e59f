//! SEO pass over a Markdown article: metadata comment, single H1, FAQ and a
//! schema markup suggestion for the publishing platform.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde_json::json;
use tracing::{debug, instrument};

use super::Tool;
use super::design::strip_code_fence;
use super::seo::slugify;

const METADATA_MARKER: &str = "SEO METADATA:";
const FAQ_HEADING: &str = "## Perguntas Frequentes";
const SCHEMA_MARKER: &str = "SCHEMA MARKUP SUGERIDO";

#[derive(Debug, Clone, Default)]
pub struct ArticleSeoOptions {
    pub title: String,
    pub description: String,
    pub focus_keyword: String,
    pub keywords: Vec<String>,
    /// Source text of the slug; slugified on use.
    pub slug: String,
    pub site_url: String,
    /// Question/answer pairs for the FAQ section; empty skips it.
    pub faq: Vec<(String, String)>,
}

impl ArticleSeoOptions {
    /// Triathlon guide metadata for `country` and `year`.
    pub fn triathlon(
        country: &str,
        year: i32,
        site_url: &str,
        focus_keyword: Option<&str>,
    ) -> Self {
        let lower = country.to_lowercase();
        Self {
            title: format!(
                "As Melhores Provas de Triathlon do {country} em {year} | Guia Completo"
            ),
            description: format!(
                "Descubra as melhores provas de triathlon do {country} em {year}. Guia completo \
                 com datas, locais, inscrições e dicas de atletas experientes."
            ),
            focus_keyword: focus_keyword
                .map(str::to_string)
                .unwrap_or_else(|| format!("provas de triathlon {lower} {year}")),
            keywords: vec![
                format!("triathlon {lower}"),
                "provas triathlon".to_string(),
                format!("ironman {lower}"),
                format!("triathlon {year}"),
                format!("corridas triathlon {year}"),
            ],
            slug: format!("melhores provas triathlon {country} {year}"),
            site_url: site_url.to_string(),
            faq: vec![
                (
                    format!("Quando abrem as inscrições para as provas de triathlon em {year}?"),
                    "As inscrições costumam abrir entre dezembro e janeiro, com lotes \
                     promocionais para quem se inscreve primeiro."
                        .to_string(),
                ),
                (
                    "Qual distância é indicada para estrear no triathlon?".to_string(),
                    "Provas sprint e olímpicas são as mais indicadas para iniciantes, com \
                     percursos mais curtos e técnicos."
                        .to_string(),
                ),
                (
                    "Qual equipamento é obrigatório em uma prova de triathlon?".to_string(),
                    "Capacete homologado, bicicleta revisada e tênis de corrida; roupa de \
                     neoprene quando a água está fria."
                        .to_string(),
                ),
            ],
        }
    }
}

fn is_h1(line: &str) -> bool {
    line.starts_with("# ")
}

/// Rewrite the first H1 to `title` and demote later ones to H2, leaving fenced
/// code untouched. Without any H1 the title is prepended.
fn normalize_headings(markdown: &str, title: &str) -> String {
    let mut lines = Vec::new();
    let mut in_fence = false;
    let mut seen_h1 = false;
    for line in markdown.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            lines.push(line.to_string());
            continue;
        }
        if !in_fence && is_h1(line) {
            if seen_h1 {
                lines.push(format!("#{line}"));
            } else {
                seen_h1 = true;
                lines.push(format!("# {title}"));
            }
            continue;
        }
        lines.push(line.to_string());
    }
    let body = lines.join("\n");
    if seen_h1 {
        body
    } else {
        format!("# {title}\n\n{body}")
    }
}

fn metadata_comment(options: &ArticleSeoOptions, slug: &str) -> String {
    let mut comment = format!(
        "<!--\n{METADATA_MARKER}\nTitle: {}\nMeta Description: {}\nFocus Keyword: {}\n",
        options.title, options.description, options.focus_keyword
    );
    if !options.keywords.is_empty() {
        comment.push_str(&format!("Keywords: {}\n", options.keywords.join(", ")));
    }
    comment.push_str(&format!("Slug: /{slug}/\n-->\n\n"));
    comment
}

fn faq_section(faq: &[(String, String)], title: &str) -> String {
    let heading = title.split(" | ").next().unwrap_or(title);
    let mut section = format!("\n\n---\n\n{FAQ_HEADING} - {heading}\n");
    for (question, answer) in faq {
        section.push_str(&format!("\n### {question}\n{answer}\n"));
    }
    section
}

fn schema_comment(options: &ArticleSeoOptions, slug: &str, now: DateTime<Local>) -> String {
    let schema = json!({
        "@context": "https://schema.org",
        "@type": "Article",
        "headline": options.title.split(" | ").next().unwrap_or(options.title.as_str()),
        "description": options.description,
        "datePublished": now.format("%Y-%m-%d").to_string(),
        "mainEntityOfPage": {
            "@type": "WebPage",
            "@id": format!("{}/{slug}/", options.site_url.trim_end_matches('/')),
        },
    });
    let schema = serde_json::to_string_pretty(&schema)
        .unwrap_or_default()
        .replace("-->", "--\\>");
    format!("\n\n<!-- {SCHEMA_MARKER}:\n{schema}\n-->\n")
}

/// Apply the Markdown SEO pass. Sections already present are not added twice.
pub fn optimize_markdown(
    markdown: &str,
    options: &ArticleSeoOptions,
    now: DateTime<Local>,
) -> String {
    let markdown = strip_code_fence(markdown).trim();
    let slug = slugify(if options.slug.is_empty() {
        &options.title
    } else {
        &options.slug
    });

    let (metadata, body) = match markdown.strip_prefix("<!--") {
        Some(rest) if rest.trim_start().starts_with(METADATA_MARKER) => match rest.find("-->") {
            Some(end) => (
                format!("<!--{}-->\n\n", &rest[..end]),
                rest[end + 3..].trim_start().to_string(),
            ),
            None => (metadata_comment(options, &slug), markdown.to_string()),
        },
        _ => (metadata_comment(options, &slug), markdown.to_string()),
    };

    let mut body = normalize_headings(&body, &options.title);
    if !options.faq.is_empty() && !body.contains(FAQ_HEADING) {
        body.push_str(&faq_section(&options.faq, &options.title));
    }
    if !body.contains(SCHEMA_MARKER) {
        body.push_str(&schema_comment(options, &slug, now));
    }
    format!("{metadata}{}", body.trim_end())
}

/// Markdown SEO tool for articles published as Markdown.
pub struct ArticleSeoTool {
    options: ArticleSeoOptions,
}

impl ArticleSeoTool {
    pub fn new(options: ArticleSeoOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Tool for ArticleSeoTool {
    fn name(&self) -> &str {
        "Article SEO"
    }

    fn description(&self) -> &str {
        "Aplica otimizações de SEO ao artigo em Markdown."
    }

    #[instrument(name = "tool.article_seo", skip_all, fields(markdown_len = markdown.len()))]
    async fn run(&self, markdown: &str) -> String {
        let optimized = optimize_markdown(markdown, &self.options, Local::now());
        debug!(chars = optimized.len(), "article optimized");
        optimized
    }
}
