//! Markdown to responsive HTML via a placeholder template.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd, html};
use regex::{Captures, Regex};
use tracing::{debug, instrument, warn};

use super::Tool;

const BUILTIN_TEMPLATE: &str = include_str!("../../templates/post.html");
const DESCRIPTION_LIMIT: usize = 160;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Z_]+)\s*\}\}").expect("invalid placeholder regex"));

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").expect("invalid fence regex")
});

fn markdown_options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_FOOTNOTES
}

/// Models often wrap whole documents in a ```markdown / ```html fence.
pub fn strip_code_fence(text: &str) -> &str {
    CODE_FENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
}

pub fn render_markdown(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, markdown_options());
    let mut output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut output, parser);
    output
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Plain text of the first H1 and of the first paragraph.
fn title_and_description(markdown: &str) -> (Option<String>, Option<String>) {
    let mut title: Option<String> = None;
    let mut description: Option<String> = None;
    let mut in_title = false;
    let mut in_paragraph = false;
    let mut buffer = String::new();

    for event in Parser::new_ext(markdown, markdown_options()) {
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) if title.is_none() => {
                in_title = true;
                buffer.clear();
            }
            Event::End(TagEnd::Heading(HeadingLevel::H1)) if in_title => {
                in_title = false;
                title = Some(buffer.trim().to_string());
            }
            Event::Start(Tag::Paragraph) if description.is_none() && !in_title => {
                in_paragraph = true;
                buffer.clear();
            }
            Event::End(TagEnd::Paragraph) if in_paragraph => {
                in_paragraph = false;
                let text = buffer.split_whitespace().collect::<Vec<_>>().join(" ");
                if !text.is_empty() {
                    description = Some(truncate_chars(&text, DESCRIPTION_LIMIT));
                }
            }
            Event::Text(text) | Event::Code(text) if in_title || in_paragraph => {
                buffer.push_str(&text)
            }
            Event::SoftBreak | Event::HardBreak if in_title || in_paragraph => buffer.push(' '),
            _ => {}
        }
        if title.is_some() && description.is_some() {
            break;
        }
    }

    (title.filter(|t| !t.is_empty()), description)
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut: String = text.chars().take(limit.saturating_sub(3)).collect();
    format!("{}...", cut.trim_end())
}

/// Render `markdown` into `template`. Unknown placeholders are dropped.
pub fn render_post(
    template: &str,
    markdown: &str,
    fallback_title: &str,
    language: &str,
    now: DateTime<Local>,
) -> String {
    let markdown = strip_code_fence(markdown);
    let content = render_markdown(markdown);
    let (title, description) = title_and_description(markdown);
    let title = escape_html(title.as_deref().unwrap_or(fallback_title));
    let description = escape_html(description.as_deref().unwrap_or(""));
    let date = now.format("%d/%m/%Y").to_string();
    let datetime = now.to_rfc3339();
    let year = now.format("%Y").to_string();

    // Single pass: substituted text is never rescanned, and only the first
    // CONTENT slot receives the article.
    let mut content = Some(content);
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match &caps[1] {
            "TITLE" => title.clone(),
            "DESCRIPTION" => description.clone(),
            "DATE" => date.clone(),
            "DATETIME" => datetime.clone(),
            "YEAR" => year.clone(),
            "LANG" => escape_html(language),
            "CONTENT" => content.take().unwrap_or_default(),
            other => {
                debug!(placeholder = other, "dropping unknown template placeholder");
                String::new()
            }
        })
        .into_owned()
}

/// Design tool: Markdown in, templated HTML out.
pub struct DesignTool {
    template_path: PathBuf,
    topic: String,
    language: String,
}

impl DesignTool {
    pub fn new(template_path: impl Into<PathBuf>, topic: impl Into<String>) -> Self {
        Self {
            template_path: template_path.into(),
            topic: topic.into(),
            language: "pt-BR".to_string(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    fn load_template(&self) -> String {
        match fs::read_to_string(&self.template_path) {
            Ok(template) if template.contains("{{CONTENT}}") => template,
            Ok(_) => {
                warn!(
                    path = %self.template_path.display(),
                    "template has no CONTENT placeholder; using built-in template"
                );
                BUILTIN_TEMPLATE.to_string()
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(
                    path = %self.template_path.display(),
                    "template not found; using built-in template"
                );
                BUILTIN_TEMPLATE.to_string()
            }
            Err(err) => {
                warn!(
                    path = %self.template_path.display(),
                    error = %err,
                    "template unreadable; using built-in template"
                );
                BUILTIN_TEMPLATE.to_string()
            }
        }
    }
}

#[async_trait]
impl Tool for DesignTool {
    fn name(&self) -> &str {
        "Design Tool"
    }

    fn description(&self) -> &str {
        "Converte conteúdo markdown em HTML responsivo e mobile-first usando o template."
    }

    #[instrument(name = "tool.design", skip_all, fields(markdown_len = markdown.len()))]
    async fn run(&self, markdown: &str) -> String {
        let template = self.load_template();
        render_post(&template, markdown, &self.topic, &self.language, Local::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = "# IA & Você\n\nA inteligência artificial\nestá mudando tudo.\n\n\
                           ## Aplicações\n\n- Saúde\n- Educação\n";

    #[test]
    fn converted_content_replaces_placeholder() {
        let html = render_post(BUILTIN_TEMPLATE, ARTICLE, "Tema", "pt-BR", Local::now());
        assert!(html.contains("<h2>Aplicações</h2>"));
        assert!(html.contains("<li>Saúde</li>"));
        assert!(html.contains("<title>IA &amp; Você</title>"));
        assert!(html.contains(
            r#"<meta name="description" content="A inteligência artificial está mudando tudo.">"#
        ));
        assert!(!html.contains("{{"), "raw placeholder left in output: {html}");
        assert!(!html.contains("}}"));
    }

    #[test]
    fn unknown_placeholders_are_removed() {
        let template = "<p>{{AUTHOR}}</p><main>{{CONTENT}}</main><span>{{ YEAR }}</span>";
        let html = render_post(template, "texto", "Tema", "pt-BR", Local::now());
        assert!(html.starts_with("<p></p><main><p>texto</p>"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn missing_heading_falls_back_to_topic() {
        let template = "<title>{{TITLE}}</title>{{CONTENT}}";
        let html = render_post(template, "só texto", "Energia", "pt-BR", Local::now());
        assert!(html.starts_with("<title>Energia</title>"));
    }

    #[test]
    fn only_first_content_slot_is_filled() {
        let template = "<title>{{TITLE}}</title><main>{{CONTENT}}</main><aside>{{CONTENT}}</aside>";
        let html = render_post(template, "# {{CONTENT}} hoje\n\ncorpo", "x", "pt-BR", Local::now());
        assert_eq!(html.matches("<p>corpo</p>").count(), 1);
        assert!(html.contains("<aside></aside>"));
        // Placeholder-looking text in the article is kept as written.
        assert!(html.starts_with("<title>{{CONTENT}} hoje</title><main><h1>{{CONTENT}} hoje</h1>"));
    }

    #[test]
    fn fenced_markdown_is_unwrapped() {
        let fenced = "```markdown\n# Título\n\nCorpo\n```";
        assert_eq!(strip_code_fence(fenced), "# Título\n\nCorpo");
        assert_eq!(strip_code_fence("# Sem cerca"), "# Sem cerca");
        let html = render_post("{{CONTENT}}", fenced, "x", "pt-BR", Local::now());
        assert!(html.contains("<h1>Título</h1>"));
    }

    #[test]
    fn long_description_is_truncated() {
        let text = "palavra ".repeat(60);
        let (_, description) = title_and_description(&text);
        let description = description.unwrap();
        assert!(description.chars().count() <= DESCRIPTION_LIMIT);
        assert!(description.ends_with("..."));
    }

    #[tokio::test]
    async fn tool_uses_builtin_template_when_file_missing() {
        let tool = DesignTool::new("/nonexistent/template.html", "Tema");
        let html = tool.run(ARTICLE).await;
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<h1>IA &amp; Você</h1>"));
    }
}
