//! Triathlon event research: several searches merged into one dataset.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{Datelike, Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::Tool;
use super::search::{OrganicResult, SEARCH_ERROR_PREFIX, SearchClient, organic_results};
use crate::config::SearchParams;
use crate::files::{self, Artifacts};

const MONTHS_PT: [&str; 12] = [
    "janeiro",
    "fevereiro",
    "março",
    "abril",
    "maio",
    "junho",
    "julho",
    "agosto",
    "setembro",
    "outubro",
    "novembro",
    "dezembro",
];

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("invalid iso date regex"));
static BR_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("invalid date regex"));
static REGISTRATION_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)inscri(ç|c)(õ|o)es\s+abertas|registration\s+(is\s+)?open")
        .expect("invalid registration regex")
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriathlonEvent {
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub date: String,
    /// `date` written out in Portuguese, e.g. `26 de maio de 2025`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_date: String,
    #[serde(default)]
    pub distance: String,
    #[serde(default)]
    pub registration_open: bool,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub description: String,
}

impl TriathlonEvent {
    /// Best-effort event from one organic result; `None` without a title.
    fn from_result(result: &OrganicResult, default_location: &str) -> Option<Self> {
        let name = result.title.as_deref()?.trim();
        if name.is_empty() {
            return None;
        }
        let description = result.snippet.clone().unwrap_or_default();
        let haystack = format!("{name} {description}");
        let date = find_date(&haystack).unwrap_or_default();
        let display_date = if date.is_empty() {
            String::new()
        } else {
            format_date_pt(&date)
        };

        Some(Self {
            name: name.to_string(),
            location: default_location.to_string(),
            date,
            display_date,
            distance: classify_distance(&haystack).to_string(),
            registration_open: REGISTRATION_OPEN.is_match(&haystack),
            website: result.link.clone().unwrap_or_default(),
            description,
        })
    }
}

fn find_date(text: &str) -> Option<String> {
    if let Some(caps) = ISO_DATE.captures(text) {
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        )?;
        return Some(date.format("%Y-%m-%d").to_string());
    }
    let caps = BR_DATE.captures(text)?;
    let date = NaiveDate::from_ymd_opt(
        caps[3].parse().ok()?,
        caps[2].parse().ok()?,
        caps[1].parse().ok()?,
    )?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn classify_distance(text: &str) -> &'static str {
    let text = text.to_lowercase();
    if text.contains("70.3") || text.contains("half") || text.contains("meio ironman") {
        "Half Distance"
    } else if text.contains("ironman")
        || text.contains("full distance")
        || text.contains("longa distância")
    {
        "Full Distance"
    } else if text.contains("olímpic") || text.contains("olimpic") || text.contains("olympic") {
        "Olympic Distance"
    } else if text.contains("sprint") {
        "Sprint Distance"
    } else {
        ""
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub total_events: usize,
    pub upcoming_events: usize,
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventDataset {
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_params: Option<SearchParams>,
    pub events: Vec<TriathlonEvent>,
    pub sources: Vec<String>,
    pub summary: EventSummary,
}

impl EventDataset {
    pub fn from_search(results: &serde_json::Value, params: &SearchParams) -> Self {
        let organic = organic_results(results);
        let events: Vec<TriathlonEvent> = organic
            .iter()
            .filter_map(|result| TriathlonEvent::from_result(result, &params.country))
            .collect();
        let sources = organic
            .iter()
            .filter_map(|result| result.link.clone())
            .filter(|link| !link.is_empty())
            .collect();

        let mut dataset = Self {
            timestamp: Local::now().to_rfc3339(),
            search_params: Some(params.clone()),
            events,
            sources,
            summary: EventSummary::default(),
        };
        dataset.summary = summarize(&dataset.events);
        dataset
    }
}

fn summarize(events: &[TriathlonEvent]) -> EventSummary {
    let mut locations: Vec<String> = Vec::new();
    for event in events {
        if !locations.contains(&event.location) {
            locations.push(event.location.clone());
        }
    }
    EventSummary {
        total_events: events.len(),
        upcoming_events: events.len(),
        locations,
    }
}

/// Merge datasets, keeping the first event seen for each name.
pub fn consolidate_results(results: Vec<EventDataset>) -> EventDataset {
    let timestamp = results
        .first()
        .map(|dataset| dataset.timestamp.clone())
        .unwrap_or_default();
    let search_params = results
        .iter()
        .find_map(|dataset| dataset.search_params.clone());

    let mut seen_names = HashSet::new();
    let mut events = Vec::new();
    let mut sources = Vec::new();
    for dataset in results {
        sources.extend(dataset.sources);
        for event in dataset.events {
            if seen_names.insert(event.name.clone()) {
                events.push(event);
            }
        }
    }

    let summary = summarize(&events);
    EventDataset {
        timestamp,
        search_params,
        events,
        sources,
        summary,
    }
}

/// `2025-05-26` -> `26 de maio de 2025`; anything unparsable is returned as is.
pub fn format_date_pt(date: &str) -> String {
    match NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") {
        Ok(parsed) => format!(
            "{} de {} de {}",
            parsed.format("%d"),
            MONTHS_PT[parsed.month0() as usize],
            parsed.year()
        ),
        Err(_) => date.to_string(),
    }
}

pub fn research_queries(params: &SearchParams) -> Vec<String> {
    let SearchParams { year, country, .. } = params;
    vec![
        format!("triathlon events {country} {year} upcoming races"),
        format!("ironman triathlon {country} calendar {year}"),
        format!("provas triathlon nacionais {} {year}", country.to_lowercase()),
    ]
}

/// Runs the event queries, saves the consolidated dataset and returns it as JSON.
pub struct EventResearchTool {
    client: SearchClient,
    params: SearchParams,
    output_path: PathBuf,
    artifacts: Artifacts,
}

impl EventResearchTool {
    pub fn new(
        client: SearchClient,
        params: SearchParams,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            params,
            output_path: output_path.into(),
            artifacts: Artifacts::new(),
        }
    }

    pub fn with_artifacts(mut self, artifacts: Artifacts) -> Self {
        self.artifacts = artifacts;
        self
    }
}

#[async_trait]
impl Tool for EventResearchTool {
    fn name(&self) -> &str {
        "Triathlon Event Search"
    }

    fn description(&self) -> &str {
        "Pesquisa provas de triathlon e estrutura os dados em JSON."
    }

    #[instrument(
        name = "tool.event_research",
        skip_all,
        fields(year = self.params.year, country = %self.params.country)
    )]
    async fn run(&self, _topic: &str) -> String {
        let mut datasets = Vec::new();
        let mut failures = Vec::new();
        for query in research_queries(&self.params) {
            match self.client.search(&query).await {
                Ok(results) => datasets.push(EventDataset::from_search(&results, &self.params)),
                Err(err) => {
                    warn!(%query, error = %err, "event search failed");
                    failures.push(format!("{SEARCH_ERROR_PREFIX}{err}"));
                }
            }
        }
        if datasets.is_empty() {
            return failures.join("\n");
        }

        let dataset = consolidate_results(datasets);
        let path = files::unique_path(self.output_path.clone());
        match files::save_json(&dataset, &path) {
            Ok(()) => self.artifacts.record(&path),
            Err(err) => warn!(error = %err, "unable to save event dataset"),
        }
        info!(
            events = dataset.summary.total_events,
            locations = dataset.summary.locations.len(),
            failed_queries = failures.len(),
            "event research completed"
        );

        let mut output = serde_json::to_string_pretty(&dataset)
            .unwrap_or_else(|err| format!("{SEARCH_ERROR_PREFIX}{err}"));
        for failure in failures {
            output.push_str("\n\n");
            output.push_str(&failure);
        }
        output
    }
}
