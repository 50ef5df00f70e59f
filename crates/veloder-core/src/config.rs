use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::VeloderError;

const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";
const CONFIG_PATH_ENV: &str = "VELODER_CONFIG";
const TRIATHLON_YEAR_ENV: &str = "TRIATHLON_SEARCH_YEAR";
const TRIATHLON_COUNTRY_ENV: &str = "TRIATHLON_SEARCH_COUNTRY";
pub const SERPER_KEY_ENV: &str = "SERPER_API_KEY";

/// Topic used when no subject file is present.
pub const DEFAULT_TOPIC: &str = "Inteligência Artificial";

/// Top-level configuration structure, mirroring `config/config.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agents: AgentsConfig,
    pub pipeline: PipelineConfig,
    pub search: SearchConfig,
    pub seo: SeoConfig,
    pub triathlon: TriathlonConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Environment variables a run cannot start without.
    pub fn required_secrets(&self) -> Vec<String> {
        let llm = self
            .agents
            .api_key_env
            .clone()
            .unwrap_or_else(|| self.agents.provider.api_key_env().to_string());
        let search = self
            .search
            .api_key_env
            .clone()
            .unwrap_or_else(|| SERPER_KEY_ENV.to_string());
        vec![llm, search]
    }

    /// Resolve a workspace-relative path against `pipeline.root`.
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        let relative = relative.as_ref();
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.pipeline.root.join(relative)
        }
    }

    /// Rebase every relative path onto `root`; used by tests and `--root`.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.pipeline.root = root.into();
        self
    }
}

/// Helper to load configuration with default substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `VELODER_CONFIG` environment variable.
    /// 3. `config/config.yaml` in the current working directory.
    ///
    /// A missing file yields the built-in defaults.
    pub fn load(path: Option<PathBuf>) -> Result<Config, VeloderError> {
        let candidate = resolve_path(path);
        if !candidate.exists() {
            info!(path = %candidate.display(), "config file not found; using defaults");
            return Ok(Config::default());
        }

        let raw = fs::read_to_string(&candidate)
            .map_err(|err| VeloderError::config_io(candidate.clone(), err))?;
        let config = Self::parse(&raw)?;
        debug!(path = %candidate.display(), variant = %config.pipeline.variant, "config loaded");
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Config, VeloderError> {
        // An empty YAML document deserializes to unit, not a map.
        if raw.trim().is_empty() {
            return Ok(Config::default());
        }
        let config: Config = serde_yaml::from_str(raw)
            .map_err(|err| VeloderError::InvalidConfiguration(err.to_string()))?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &Config) -> Result<(), VeloderError> {
        if !(0.0..=2.0).contains(&config.agents.temperature) {
            return Err(VeloderError::InvalidConfiguration(format!(
                "agents.temperature must be within 0.0..=2.0, got {}",
                config.agents.temperature
            )));
        }
        if config.agents.model.trim().is_empty() {
            return Err(VeloderError::InvalidConfiguration(
                "agents.model must not be empty".into(),
            ));
        }
        if !(1..=100).contains(&config.search.num) {
            return Err(VeloderError::InvalidConfiguration(format!(
                "search.num must be within 1..=100, got {}",
                config.search.num
            )));
        }
        if config.seo.words_per_minute == 0 {
            return Err(VeloderError::InvalidConfiguration(
                "seo.words_per_minute must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> PathBuf {
    if let Some(path) = path {
        return path;
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return PathBuf::from(from_env);
        }
    }

    Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
}

/// Read the research subject, falling back to [`DEFAULT_TOPIC`].
pub fn load_subject(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
        Ok(_) => {
            debug!(path = %path.display(), "subject file is blank; using default topic");
            DEFAULT_TOPIC.to_string()
        }
        Err(err) => {
            debug!(
                path = %path.display(),
                error = %err,
                "subject file unavailable; using default topic"
            );
            DEFAULT_TOPIC.to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gemini,
    Openai,
}

impl Provider {
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::Gemini => "GOOGLE_API_KEY",
            Provider::Openai => "OPENAI_API_KEY",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub model: String,
    pub temperature: f32,
    pub verbose: bool,
    pub provider: Provider,
    /// Override for the provider endpoint (proxies, tests).
    pub base_url: Option<String>,
    /// Variable holding the model key, when not the provider's default.
    pub api_key_env: Option<String>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-pro".to_string(),
            temperature: 0.7,
            verbose: true,
            provider: Provider::Gemini,
            base_url: None,
            api_key_env: None,
        }
    }
}

/// Which of the pipeline layouts to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineVariant {
    #[default]
    Blog,
    Wordpress,
    Triathlon,
}

impl PipelineVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineVariant::Blog => "blog",
            PipelineVariant::Wordpress => "wordpress",
            PipelineVariant::Triathlon => "triathlon",
        }
    }
}

impl fmt::Display for PipelineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineVariant {
    type Err = VeloderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "blog" => Ok(PipelineVariant::Blog),
            "wordpress" => Ok(PipelineVariant::Wordpress),
            "triathlon" => Ok(PipelineVariant::Triathlon),
            other => Err(VeloderError::InvalidConfiguration(format!(
                "unknown pipeline variant `{other}` (expected blog, wordpress or triathlon)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub variant: PipelineVariant,
    pub root: PathBuf,
    pub subject_file: PathBuf,
    pub agents_dir: PathBuf,
    pub tasks_dir: PathBuf,
    pub template: PathBuf,
    pub search_dir: PathBuf,
    pub post_dir: PathBuf,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub trace_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            variant: PipelineVariant::default(),
            root: PathBuf::from("."),
            subject_file: PathBuf::from("data/input/subject/topic.txt"),
            agents_dir: PathBuf::from("config/agents"),
            tasks_dir: PathBuf::from("config/tasks"),
            template: PathBuf::from("data/input/template/template.html"),
            search_dir: PathBuf::from("data/input/search"),
            post_dir: PathBuf::from("data/output/post"),
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            trace_dir: PathBuf::from("data/traces"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchOutput {
    /// Short numbered summary of the top results.
    #[default]
    Digest,
    /// The provider's JSON response, verbatim.
    Raw,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub num: u32,
    pub gl: String,
    pub hl: String,
    pub base_url: String,
    /// Persist raw results; `None` lets the variant decide.
    pub persist: Option<bool>,
    /// Output shape; `None` lets the variant decide.
    pub output: Option<SearchOutput>,
    /// Variable holding the Serper key; defaults to `SERPER_API_KEY`.
    pub api_key_env: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            num: 10,
            gl: "br".to_string(),
            hl: "pt".to_string(),
            base_url: "https://google.serper.dev/search".to_string(),
            persist: None,
            output: None,
            api_key_env: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SeoConfig {
    pub site_url: String,
    pub focus_keyword: Option<String>,
    pub words_per_minute: u32,
    pub language: String,
}

impl Default for SeoConfig {
    fn default() -> Self {
        Self {
            site_url: "https://seusite.com".to_string(),
            focus_keyword: None,
            words_per_minute: 200,
            language: "pt-BR".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TriathlonConfig {
    pub year: Option<i32>,
    pub country: String,
}

impl Default for TriathlonConfig {
    fn default() -> Self {
        Self {
            year: None,
            country: "Brasil".to_string(),
        }
    }
}

/// Search parameters shared by the triathlon research and writing stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    pub year: i32,
    pub country: String,
    pub year_next: i32,
    pub search_period: String,
}

impl TriathlonConfig {
    /// Resolve year/country with environment overrides and range validation.
    pub fn search_params(&self) -> Result<SearchParams, VeloderError> {
        let current_year = Local::now().year();
        let year = match env::var(TRIATHLON_YEAR_ENV) {
            Ok(raw) if !raw.trim().is_empty() => raw.trim().parse::<i32>().map_err(|_| {
                VeloderError::InvalidConfiguration(format!(
                    "{TRIATHLON_YEAR_ENV} must be a year, got `{raw}`"
                ))
            })?,
            _ => self.year.unwrap_or(current_year),
        };
        let country = env::var(TRIATHLON_COUNTRY_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| self.country.clone());

        Self::build_params(year, country, current_year)
    }

    fn build_params(
        year: i32,
        country: String,
        current_year: i32,
    ) -> Result<SearchParams, VeloderError> {
        if year < 2020 || year > current_year + 2 {
            return Err(VeloderError::InvalidConfiguration(format!(
                "invalid search year {year}; use a year between 2020 and {}",
                current_year + 2
            )));
        }
        Ok(SearchParams {
            year,
            country,
            year_next: year + 1,
            search_period: format!("{year}-{}", year + 1),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub dir: PathBuf,
    /// Days to keep run journal files; 0 keeps everything.
    pub retention_days: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: PathBuf::from("data/logs"),
            retention_days: 90,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_config_file_yields_defaults() {
        let temp = TempDir::new().expect("temp dir");
        let config = ConfigLoader::load(Some(temp.path().join("absent.yaml"))).unwrap();
        assert_eq!(config.agents.model, "gemini-1.5-pro");
        assert!((config.agents.temperature - 0.7).abs() < f32::EPSILON);
        assert!(config.agents.verbose);
        assert_eq!(config.search.num, 10);
        assert_eq!(config.pipeline.variant, PipelineVariant::Blog);
    }

    #[test]
    fn partial_yaml_keeps_remaining_defaults() {
        let config = ConfigLoader::parse(
            "agents:\n  model: gemini-2.0-flash\n  temperature: 0.2\n  verbose: false\npipeline:\n  variant: triathlon\n",
        )
        .unwrap();
        assert_eq!(config.agents.model, "gemini-2.0-flash");
        assert!(!config.agents.verbose);
        assert_eq!(config.agents.provider, Provider::Gemini);
        assert_eq!(config.pipeline.variant, PipelineVariant::Triathlon);
        assert_eq!(config.search.gl, "br");
    }

    #[test]
    fn malformed_yaml_is_rejected() {
        let err = ConfigLoader::parse("agents: [unclosed").unwrap_err();
        assert!(matches!(err, VeloderError::InvalidConfiguration(_)));
    }

    #[test]
    fn out_of_range_temperature_is_rejected() {
        let err = ConfigLoader::parse("agents:\n  temperature: 3.5\n").unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn missing_subject_file_yields_default_topic() {
        let temp = TempDir::new().expect("temp dir");
        assert_eq!(load_subject(temp.path().join("topic.txt")), DEFAULT_TOPIC);
    }

    #[test]
    fn subject_file_is_trimmed() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("topic.txt");
        fs::write(&path, "\n  Energia solar no Brasil \n").unwrap();
        assert_eq!(load_subject(&path), "Energia solar no Brasil");
    }

    #[test]
    fn triathlon_year_outside_range_is_rejected() {
        let err = TriathlonConfig::build_params(2019, "Brasil".into(), 2026).unwrap_err();
        assert!(err.to_string().contains("2019"));
        let params = TriathlonConfig::build_params(2027, "Brasil".into(), 2026).unwrap();
        assert_eq!(params.search_period, "2027-2028");
    }

    #[test]
    fn variant_parses_case_insensitively() {
        assert_eq!(
            "WordPress".parse::<PipelineVariant>().unwrap(),
            PipelineVariant::Wordpress
        );
        assert!("newsletter".parse::<PipelineVariant>().is_err());
    }

    #[test]
    fn relative_paths_resolve_against_root() {
        let config = Config::default().with_root("/srv/veloder");
        assert_eq!(
            config.path(&config.pipeline.post_dir),
            PathBuf::from("/srv/veloder/data/output/post")
        );
    }

    #[test]
    fn secret_variables_follow_provider_and_overrides() {
        let mut config = Config::default();
        assert_eq!(config.required_secrets(), vec!["GOOGLE_API_KEY", "SERPER_API_KEY"]);
        config.agents.provider = Provider::Openai;
        config.search.api_key_env = Some("MY_SERPER".into());
        assert_eq!(config.required_secrets(), vec!["OPENAI_API_KEY", "MY_SERPER"]);
    }
}
