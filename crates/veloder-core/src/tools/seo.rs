//! Regex-driven SEO pass over a rendered HTML post.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::json;
use tracing::{info, instrument, warn};

use super::Tool;
use super::design::{escape_html, strip_code_fence};
use crate::files::{self, Artifacts};

static TITLE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>").expect("invalid title regex"));
static META_DESCRIPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<meta\s+name\s*=\s*["']description["']\s+content\s*=\s*["']([^"']*)["']"#)
        .expect("invalid description regex")
});
static H1_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<h1(\s[^>]*)?>(.*?)</h1\s*>").expect("invalid h1 regex")
});
static IMG_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("invalid img regex"));
static ALT_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\salt\s*=").expect("invalid alt regex"));
static HEAD_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</head\s*>").expect("invalid head regex"));
static HTML_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<html\b[^>]*>").expect("invalid html regex"));
static BODY_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<body\b[^>]*>(.*)</body\s*>").expect("invalid body regex"));
static NON_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--.*?-->")
        .expect("invalid non-text regex")
});
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("invalid tag regex"));
static ROBOTS_META: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]+name\s*=\s*["']robots["']"#).expect("invalid robots regex")
});
static CANONICAL_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<link[^>]+rel\s*=\s*["']canonical["']"#).expect("invalid canonical regex")
});
static READING_META: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]+name\s*=\s*["']reading-time["']"#)
        .expect("invalid reading-time regex")
});

#[derive(Debug, Clone)]
pub struct SeoOptions {
    pub site_url: String,
    pub words_per_minute: u32,
    pub language: String,
    /// Headline when the document has neither `<title>` nor `<h1>`.
    pub fallback_title: String,
}

impl Default for SeoOptions {
    fn default() -> Self {
        Self {
            site_url: "https://seusite.com".to_string(),
            words_per_minute: 200,
            language: "pt-BR".to_string(),
            fallback_title: String::new(),
        }
    }
}

/// Lowercase ASCII slug, e.g. `Inteligência Artificial` -> `inteligencia-artificial`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for ch in text.chars().flat_map(char::to_lowercase) {
        let folded = match ch {
            'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            other => other,
        };
        if folded.is_ascii_alphanumeric() {
            slug.push(folded);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "post".to_string()
    } else {
        slug
    }
}

fn plain_text(fragment: &str) -> String {
    let without_blocks = NON_TEXT.replace_all(fragment, " ");
    let text = ANY_TAG.replace_all(&without_blocks, " ");
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn word_count(html: &str) -> usize {
    let body = BODY_BLOCK
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(html);
    plain_text(body).split_whitespace().count()
}

/// `ceil(words / wpm)`, never below one minute.
pub fn reading_minutes(words: usize, words_per_minute: u32) -> usize {
    let wpm = words_per_minute.max(1) as usize;
    words.div_ceil(wpm).max(1)
}

fn headline(html: &str, fallback: &str) -> String {
    TITLE_TAG
        .captures(html)
        .map(|caps| plain_text(&caps[1]))
        .filter(|title| !title.is_empty())
        .or_else(|| {
            H1_BLOCK
                .captures(html)
                .map(|caps| plain_text(&caps[2]))
                .filter(|title| !title.is_empty())
        })
        .unwrap_or_else(|| fallback.to_string())
}

fn demote_extra_h1(html: &str) -> String {
    let mut seen = 0usize;
    H1_BLOCK
        .replace_all(html, |caps: &Captures| {
            seen += 1;
            if seen == 1 {
                caps[0].to_string()
            } else {
                let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("<h2{attrs}>{}</h2>", &caps[2])
            }
        })
        .into_owned()
}

fn default_image_alts(html: &str) -> String {
    IMG_TAG
        .replace_all(html, |caps: &Captures| {
            let tag = &caps[0];
            if ALT_ATTR.is_match(tag) {
                return tag.to_string();
            }
            match tag.strip_suffix("/>") {
                Some(head) => format!("{} alt=\"\" />", head.trim_end()),
                None => format!("{} alt=\"\">", tag[..tag.len() - 1].trim_end()),
            }
        })
        .into_owned()
}

fn inject_head(html: &str, tags: &str) -> String {
    if tags.is_empty() {
        return html.to_string();
    }
    if let Some(close) = HEAD_CLOSE.find(html) {
        let mut output = String::with_capacity(html.len() + tags.len());
        output.push_str(&html[..close.start()]);
        output.push_str(tags);
        output.push_str(&html[close.start()..]);
        return output;
    }
    let head = format!("<head>\n{tags}</head>\n");
    match HTML_OPEN.find(html) {
        Some(open) => format!("{}\n{head}{}", &html[..open.end()], &html[open.end()..]),
        None => format!("{head}{html}"),
    }
}

/// Apply the SEO pass: JSON-LD, image alts, robots, canonical, single H1,
/// reading time.
pub fn optimize_html(html: &str, options: &SeoOptions, now: DateTime<Local>) -> String {
    let title = headline(html, &options.fallback_title);
    let description = META_DESCRIPTION
        .captures(html)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default();
    let words = word_count(html);
    let canonical = format!(
        "{}/{}/",
        options.site_url.trim_end_matches('/'),
        slugify(&title)
    );

    let document = default_image_alts(&demote_extra_h1(html));

    let mut head_tags = String::new();
    if !document.contains("application/ld+json") {
        let schema = json!({
            "@context": "https://schema.org",
            "@type": "Article",
            "headline": title,
            "description": description,
            "inLanguage": options.language,
            "datePublished": now.format("%Y-%m-%d").to_string(),
            "wordCount": words,
            "mainEntityOfPage": {"@type": "WebPage", "@id": canonical},
        });
        let schema = serde_json::to_string_pretty(&schema)
            .unwrap_or_default()
            .replace("</", "<\\/");
        head_tags.push_str(&format!(
            "    <script type=\"application/ld+json\">\n{schema}\n    </script>\n"
        ));
    }
    if !ROBOTS_META.is_match(&document) {
        head_tags.push_str("    <meta name=\"robots\" content=\"index, follow\">\n");
    }
    if !CANONICAL_LINK.is_match(&document) {
        head_tags.push_str(&format!(
            "    <link rel=\"canonical\" href=\"{}\">\n",
            escape_html(&canonical)
        ));
    }
    if !READING_META.is_match(&document) {
        head_tags.push_str(&format!(
            "    <meta name=\"reading-time\" content=\"{} min\">\n",
            reading_minutes(words, options.words_per_minute)
        ));
    }

    inject_head(&document, &head_tags)
}

/// SEO tool: optimizes HTML and writes it to `post_seo_<ts>.html`.
pub struct SeoTool {
    output_dir: PathBuf,
    options: SeoOptions,
    artifacts: Artifacts,
}

impl SeoTool {
    pub fn new(output_dir: impl Into<PathBuf>, options: SeoOptions) -> Self {
        Self {
            output_dir: output_dir.into(),
            options,
            artifacts: Artifacts::new(),
        }
    }

    pub fn with_artifacts(mut self, artifacts: Artifacts) -> Self {
        self.artifacts = artifacts;
        self
    }
}

#[async_trait]
impl Tool for SeoTool {
    fn name(&self) -> &str {
        "SEO Tool"
    }

    fn description(&self) -> &str {
        "Otimiza HTML para mecanismos de busca e salva o resultado em data/output/post/."
    }

    #[instrument(name = "tool.seo", skip_all, fields(html_len = html.len()))]
    async fn run(&self, html: &str) -> String {
        let optimized = optimize_html(strip_code_fence(html), &self.options, Local::now());
        let path = files::timestamped_path(&self.output_dir, "post_seo", "html");
        match files::save_text(&optimized, &path) {
            Ok(()) => {
                info!(path = %path.display(), "SEO-optimized post saved");
                self.artifacts.record(&path);
            }
            Err(err) => warn!(error = %err, "unable to save SEO-optimized post"),
        }
        optimized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html lang="pt-BR">
<head>
    <title>Inteligência Artificial em 2025</title>
    <meta name="description" content="Panorama da IA">
</head>
<body>
<h1>Inteligência Artificial em 2025</h1>
<p>Texto de abertura com algumas palavras.</p>
<h1 class="sub">Segundo título</h1>
<img src="a.png">
<img src="b.png" alt="gráfico" />
<img src="c.png"/>
</body>
</html>"#;

    fn optimized() -> String {
        optimize_html(PAGE, &SeoOptions::default(), Local::now())
    }

    #[test]
    fn second_h1_becomes_h2() {
        let html = optimized();
        assert_eq!(html.matches("<h1").count(), 1);
        assert_eq!(html.matches("</h1>").count(), 1);
        assert!(html.contains(r#"<h2 class="sub">Segundo título</h2>"#));
    }

    #[test]
    fn images_without_alt_get_empty_alt() {
        let html = optimized();
        assert!(html.contains(r#"<img src="a.png" alt="">"#));
        assert!(html.contains(r#"<img src="b.png" alt="gráfico" />"#));
        assert!(html.contains(r#"<img src="c.png" alt="" />"#));
    }

    #[test]
    fn head_receives_schema_robots_canonical_and_reading_time() {
        let html = optimized();
        let head_end = html.find("</head>").unwrap();
        let head = &html[..head_end];
        assert!(head.contains(r#"<script type="application/ld+json">"#));
        assert!(head.contains(r#""headline": "Inteligência Artificial em 2025""#));
        assert!(head.contains(r#"<meta name="robots" content="index, follow">"#));
        assert!(head.contains(
            r#"<link rel="canonical" href="https://seusite.com/inteligencia-artificial-em-2025/">"#
        ));
        assert!(head.contains(r#"<meta name="reading-time" content="1 min">"#));
    }

    #[test]
    fn existing_tags_are_not_duplicated() {
        let once = optimized();
        let twice = optimize_html(&once, &SeoOptions::default(), Local::now());
        assert_eq!(twice.matches("application/ld+json").count(), 1);
        assert_eq!(twice.matches(r#"name="robots""#).count(), 1);
        assert_eq!(twice.matches(r#"rel="canonical""#).count(), 1);
        assert_eq!(twice.matches(r#"name="reading-time""#).count(), 1);
    }

    #[test]
    fn fragment_without_head_gets_one() {
        let html = optimize_html("<h1>Olá</h1><p>mundo</p>", &SeoOptions::default(), Local::now());
        assert!(html.starts_with("<head>\n"));
        assert!(html.contains("</head>\n<h1>Olá</h1>"));
    }

    #[test]
    fn reading_time_rounds_up() {
        assert_eq!(reading_minutes(0, 200), 1);
        assert_eq!(reading_minutes(200, 200), 1);
        assert_eq!(reading_minutes(201, 200), 2);
        assert_eq!(reading_minutes(1000, 200), 5);
    }

    #[test]
    fn slug_folds_accents_and_punctuation() {
        assert_eq!(slugify("Inteligência Artificial!"), "inteligencia-artificial");
        assert_eq!(slugify("  Provas -- Triathlon 2025 "), "provas-triathlon-2025");
        assert_eq!(slugify("???"), "post");
    }

    #[tokio::test]
    async fn tool_writes_timestamped_file() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        let artifacts = Artifacts::new();
        let tool =
            SeoTool::new(temp.path(), SeoOptions::default()).with_artifacts(artifacts.clone());
        let html = tool.run(PAGE).await;
        let written = artifacts.list();
        assert_eq!(written.len(), 1);
        assert!(
            written[0]
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("post_seo_")
        );
        assert_eq!(std::fs::read_to_string(&written[0]).unwrap(), html);
    }
}
