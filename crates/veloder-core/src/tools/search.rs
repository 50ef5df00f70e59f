//! Web search through the Serper API.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use super::Tool;
use crate::config::{SearchConfig, SearchOutput};
use crate::error::VeloderError;
use crate::files::{self, Artifacts};
use crate::security::SecretValue;

/// Prefix of every search failure returned in place of results.
pub const SEARCH_ERROR_PREFIX: &str = "Erro na pesquisa: ";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DIGEST_LIMIT: usize = 5;
const USER_AGENT: &str = concat!("Veloder/", env!("CARGO_PKG_VERSION"));

/// Thin HTTP client for the search endpoint.
#[derive(Clone)]
pub struct SearchClient {
    http: Client,
    api_key: SecretValue,
    base_url: String,
    num: u32,
    gl: String,
    hl: String,
}

impl SearchClient {
    pub fn new(api_key: SecretValue, config: &SearchConfig) -> Result<Self, VeloderError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| VeloderError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.clone(),
            num: config.num,
            gl: config.gl.clone(),
            hl: config.hl.clone(),
        })
    }

    /// POST `{q, num, gl, hl}` and return the decoded JSON body.
    pub async fn search(&self, query: &str) -> Result<Value, VeloderError> {
        let payload = json!({
            "q": query,
            "num": self.num,
            "gl": self.gl,
            "hl": self.hl,
        });

        let response = self
            .http
            .post(&self.base_url)
            .header("X-API-KEY", self.api_key.expose())
            .json(&payload)
            .send()
            .await
            .map_err(|e| VeloderError::Http(format!("{}: {e}", self.base_url)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VeloderError::Http(format!(
                "{}: HTTP {status} {}",
                self.base_url,
                body.trim()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| VeloderError::Http(format!("{}: invalid JSON body: {e}", self.base_url)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganicResult {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

/// Organic results of a Serper response, skipping entries that do not decode.
pub fn organic_results(results: &Value) -> Vec<OrganicResult> {
    results
        .get("organic")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// A search response as persisted under the search directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub query: String,
    pub timestamp: String,
    pub results: Value,
    pub total_results: usize,
}

impl SearchRecord {
    pub fn new(query: &str, results: Value) -> Self {
        let total_results = organic_results(&results).len();
        Self {
            query: query.to_string(),
            timestamp: files::timestamp_slug(),
            results,
            total_results,
        }
    }

    pub fn organic(&self) -> Vec<OrganicResult> {
        organic_results(&self.results)
    }

    pub fn save(&self, dir: &Path) -> Result<PathBuf, VeloderError> {
        files::ensure_directory(dir)?;
        let path = files::timestamped_path(dir, "search", "json");
        files::save_json(self, &path)?;
        Ok(path)
    }
}

/// Every readable `*.json` record in `dir`, in filename order.
pub fn load_search_records(dir: impl AsRef<Path>) -> Vec<SearchRecord> {
    let dir = dir.as_ref();
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    paths.sort();

    paths
        .into_iter()
        .filter_map(|path| match files::load_json::<SearchRecord>(&path) {
            Ok(record) => Some(record),
            Err(err) => {
                debug!(%err, "skipping unreadable search record");
                None
            }
        })
        .collect()
}

/// `**title**\nsnippet` pieces and source links for results carrying both a
/// title and a snippet.
pub fn extract_content(records: &[SearchRecord]) -> (Vec<String>, Vec<String>) {
    let mut pieces = Vec::new();
    let mut sources = Vec::new();

    for result in records.iter().flat_map(SearchRecord::organic) {
        match (result.title.as_deref(), result.snippet.as_deref()) {
            (Some(title), Some(snippet)) if !title.is_empty() && !snippet.is_empty() => {
                pieces.push(format!("**{title}**\n{snippet}"));
                if let Some(link) = result.link.filter(|link| !link.is_empty()) {
                    sources.push(link);
                }
            }
            _ => {}
        }
    }

    (pieces, sources)
}

fn render_digest(query: &str, results: &[OrganicResult], saved_to: Option<&Path>) -> String {
    let mut summary = format!(
        "Encontrados {} resultados para '{query}':\n\n",
        results.len()
    );

    for (idx, result) in results.iter().take(DIGEST_LIMIT).enumerate() {
        summary.push_str(&format!(
            "{}. {}\n   {}\n   URL: {}\n\n",
            idx + 1,
            result.title.as_deref().unwrap_or("N/A"),
            result.snippet.as_deref().unwrap_or("N/A"),
            result.link.as_deref().unwrap_or("N/A"),
        ));
    }

    match saved_to {
        Some(path) => summary.push_str(&format!("Dados completos salvos em: {}", path.display())),
        None => summary.truncate(summary.trim_end().len()),
    }
    summary
}

/// Search tool handed to research agents.
pub struct SerperSearchTool {
    client: SearchClient,
    persist_dir: Option<PathBuf>,
    output: SearchOutput,
    artifacts: Artifacts,
}

impl SerperSearchTool {
    pub fn new(client: SearchClient, output: SearchOutput) -> Self {
        Self {
            client,
            persist_dir: None,
            output,
            artifacts: Artifacts::new(),
        }
    }

    /// Persist every response under `dir`.
    pub fn persist_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.persist_dir = Some(dir.into());
        self
    }

    pub fn with_artifacts(mut self, artifacts: Artifacts) -> Self {
        self.artifacts = artifacts;
        self
    }
}

#[async_trait]
impl Tool for SerperSearchTool {
    fn name(&self) -> &str {
        "Serper Search"
    }

    fn description(&self) -> &str {
        "Pesquisa informações na internet usando Google Search via API SERPER."
    }

    #[instrument(name = "tool.search", skip(self))]
    async fn run(&self, query: &str) -> String {
        let results = match self.client.search(query).await {
            Ok(results) => results,
            Err(err) => {
                warn!(error = %err, "search request failed");
                return format!("{SEARCH_ERROR_PREFIX}{err}");
            }
        };

        let saved_to = self.persist_dir.as_ref().and_then(|dir| {
            match SearchRecord::new(query, results.clone()).save(dir) {
                Ok(path) => {
                    self.artifacts.record(&path);
                    Some(path)
                }
                Err(err) => {
                    warn!(error = %err, "unable to persist search results");
                    None
                }
            }
        });

        let organic = organic_results(&results);
        info!(results = organic.len(), saved = saved_to.is_some(), "search completed");

        match self.output {
            SearchOutput::Digest => render_digest(query, &organic, saved_to.as_deref()),
            SearchOutput::Raw => results.to_string(),
        }
    }
}

/// Material from previously persisted searches, for writers.
pub struct SearchArchiveTool {
    dir: PathBuf,
}

impl SearchArchiveTool {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Tool for SearchArchiveTool {
    fn name(&self) -> &str {
        "Search Archive"
    }

    fn description(&self) -> &str {
        "Reúne o conteúdo das pesquisas salvas anteriormente."
    }

    #[instrument(name = "tool.search_archive", skip_all, fields(dir = %self.dir.display()))]
    async fn run(&self, _topic: &str) -> String {
        let records = load_search_records(&self.dir);
        let (pieces, sources) = extract_content(&records);
        debug!(records = records.len(), pieces = pieces.len(), "search archive loaded");
        if pieces.is_empty() {
            return "Nenhuma pesquisa salva encontrada.".to_string();
        }

        let mut material = pieces.join("\n\n");
        if !sources.is_empty() {
            material.push_str("\n\nFontes:\n");
            material.push_str(
                &sources
                    .iter()
                    .map(|link| format!("- {link}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            );
        }
        material
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_results() -> Value {
        json!({
            "organic": [
                {"title": "IA no Brasil", "snippet": "Panorama 2025", "link": "https://a.example/ia"},
                {"title": "Sem snippet", "link": "https://b.example"},
                {"snippet": "Sem título"}
            ]
        })
    }

    #[test]
    fn digest_lists_results_with_placeholders() {
        let organic = organic_results(&sample_results());
        let digest = render_digest("ia", &organic, Some(Path::new("data/search_1.json")));
        assert!(digest.starts_with("Encontrados 3 resultados para 'ia':"));
        assert!(digest.contains("1. IA no Brasil\n   Panorama 2025\n   URL: https://a.example/ia"));
        assert!(digest.contains("2. Sem snippet\n   N/A"));
        assert!(digest.contains("3. N/A\n   Sem título\n   URL: N/A"));
        assert!(digest.ends_with("Dados completos salvos em: data/search_1.json"));
    }

    #[test]
    fn digest_without_persistence_has_no_trailing_blank() {
        let digest = render_digest("ia", &[], None);
        assert_eq!(digest, "Encontrados 0 resultados para 'ia':");
    }

    #[test]
    fn record_counts_organic_results() {
        let record = SearchRecord::new("ia", sample_results());
        assert_eq!(record.total_results, 3);
        assert_eq!(SearchRecord::new("ia", json!({})).total_results, 0);
    }

    #[test]
    fn records_load_and_extract_content() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        SearchRecord::new("ia", sample_results())
            .save(temp.path())
            .unwrap();
        std::fs::write(temp.path().join("zz_broken.json"), "{").unwrap();

        let records = load_search_records(temp.path());
        assert_eq!(records.len(), 1);

        let (pieces, sources) = extract_content(&records);
        assert_eq!(pieces, vec!["**IA no Brasil**\nPanorama 2025".to_string()]);
        assert_eq!(sources, vec!["https://a.example/ia".to_string()]);
    }

    #[tokio::test]
    async fn archive_tool_lists_pieces_and_sources() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        SearchRecord::new("ia", sample_results())
            .save(temp.path())
            .unwrap();

        let material = SearchArchiveTool::new(temp.path()).run("ia").await;
        assert!(material.starts_with("**IA no Brasil**\nPanorama 2025"));
        assert!(material.ends_with("Fontes:\n- https://a.example/ia"));

        let empty = tempfile::TempDir::new().expect("temp dir");
        assert_eq!(
            SearchArchiveTool::new(empty.path()).run("ia").await,
            "Nenhuma pesquisa salva encontrada."
        );
    }

    #[test]
    fn missing_search_directory_yields_no_records() {
        assert!(load_search_records("/nonexistent/veloder/search").is_empty());
    }
}
