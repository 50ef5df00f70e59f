use std::fs;
use std::path::Path;

use chrono::{Datelike, Local};
use serde_json::{Value, json};
use tempfile::TempDir;
use veloder_core::tools::{SEARCH_ERROR_PREFIX, SearchClient, SerperSearchTool, Tool};
use veloder_core::{Config, PipelineVariant, SecretValue, build_model, run_pipeline};
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARTICLE: &str = "# Energia Solar no Brasil\n\n\
    A energia solar cresce em ritmo acelerado.\n\n\
    ## Mercado\n\nTexto sobre o mercado.\n\n\
    # Conclusão\n\nFim.";

async fn mock_services(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("x-api-key", "serper-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "organic": [
                {
                    "title": "Energia solar bate recorde",
                    "snippet": "Capacidade instalada dobra em 2025; balanço em 26/05/2025",
                    "link": "https://news.example/solar"
                }
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/v1beta/models/.+:generateContent$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": ARTICLE }] } }]
        })))
        .mount(server)
        .await;
}

fn config_for(root: &Path, server: &MockServer) -> Config {
    let mut config = Config::default().with_root(root);
    config.search.base_url = format!("{}/search", server.uri());
    config.agents.base_url = Some(server.uri());
    config.logging.retention_days = 0;
    config
}

fn clients(config: &Config) -> (veloder_core::DynModel, SearchClient) {
    let llm = build_model(&config.agents, SecretValue::new("gemini-test")).unwrap();
    let search = SearchClient::new(SecretValue::new("serper-test"), &config.search).unwrap();
    (llm, search)
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn blog_pipeline_writes_seo_optimized_post() {
    let server = MockServer::start().await;
    mock_services(&server).await;
    let temp = TempDir::new().expect("temp dir");
    fs::create_dir_all(temp.path().join("data/input/subject")).unwrap();
    fs::write(temp.path().join("data/input/subject/topic.txt"), "Energia Solar\n").unwrap();

    let config = config_for(temp.path(), &server);
    let (llm, search) = clients(&config);
    let outcome = run_pipeline(&config, PipelineVariant::Blog, llm, search)
        .await
        .expect("pipeline should succeed");

    assert_eq!(outcome.topic, "Energia Solar");
    let html = &outcome.crew.result;
    assert_eq!(html.matches("<h1").count(), 1, "{html}");
    assert!(html.contains("<h2>Conclusão</h2>"));
    assert!(html.contains("application/ld+json"));
    assert!(html.contains(
        r#"<link rel="canonical" href="https://seusite.com/energia-solar-no-brasil/">"#
    ));
    assert!(!html.contains("{{"));

    let searches = files_in(&temp.path().join("data/input/search"));
    assert_eq!(searches.len(), 1);
    assert!(searches[0].starts_with("search_"));
    let record_path = temp.path().join("data/input/search").join(&searches[0]);
    let record: Value = serde_json::from_str(&fs::read_to_string(record_path).unwrap()).unwrap();
    assert_eq!(record["query"], "Energia Solar");
    assert_eq!(record["total_results"], 1);

    let posts = files_in(&temp.path().join("data/output/post"));
    assert_eq!(posts.len(), 1);
    assert!(posts[0].starts_with("post_seo_"));

    let trace = outcome.trace_path.expect("trace persisted");
    assert!(trace.exists());
    assert!(outcome.journal_path.expect("journal written").exists());

    // The research digest reaches the model's prompt.
    let requests = server.received_requests().await.unwrap_or_default();
    let prompts: Vec<String> = requests
        .iter()
        .filter(|req| req.url.path().ends_with(":generateContent"))
        .map(|req| String::from_utf8_lossy(&req.body).into_owned())
        .collect();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("Encontrados 1 resultados para 'Energia Solar'"));
    assert!(prompts[1].contains("Contexto recebido das etapas anteriores"));
}

#[tokio::test]
async fn wordpress_pipeline_saves_html_post() {
    let server = MockServer::start().await;
    mock_services(&server).await;
    let temp = TempDir::new().expect("temp dir");

    let config = config_for(temp.path(), &server);
    let (llm, search) = clients(&config);
    let outcome = run_pipeline(&config, PipelineVariant::Wordpress, llm, search)
        .await
        .expect("pipeline should succeed");

    assert_eq!(outcome.topic, veloder_core::DEFAULT_TOPIC);
    assert!(
        outcome
            .crew
            .notes
            .iter()
            .any(|note| note.starts_with("Post HTML salvo com sucesso em: "))
    );
    let posts = files_in(&temp.path().join("data/output/post"));
    assert_eq!(posts.len(), 1);
    assert!(posts[0].starts_with("post_") && posts[0].ends_with(".html"));

    // Raw search JSON is passed inline to the writer.
    let (_, research) = &outcome.crew.stage_outputs[0];
    let raw: Value = serde_json::from_str(research).expect("raw JSON research output");
    assert_eq!(raw["organic"][0]["title"], "Energia solar bate recorde");
}

#[tokio::test]
async fn triathlon_pipeline_produces_post_and_report() {
    let server = MockServer::start().await;
    mock_services(&server).await;
    let temp = TempDir::new().expect("temp dir");

    let mut config = config_for(temp.path(), &server);
    let year = Local::now().year();
    config.triathlon.year = Some(year);
    let (llm, search) = clients(&config);
    let outcome = run_pipeline(&config, PipelineVariant::Triathlon, llm, search)
        .await
        .expect("pipeline should succeed");

    let dataset_path = temp.path().join(format!("data/triathlon_events_{year}.json"));
    let dataset: Value = serde_json::from_str(&fs::read_to_string(dataset_path).unwrap()).unwrap();
    // Three queries return the same result; consolidation keeps one.
    assert_eq!(dataset["summary"]["total_events"], 1);
    assert_eq!(dataset["sources"].as_array().map(Vec::len), Some(3));
    assert_eq!(dataset["events"][0]["display_date"], "26 de maio de 2025");

    let output = temp.path().join("output");
    assert!(output.join(format!("triathlon_blog_post_{year}.md")).exists());
    let optimized =
        fs::read_to_string(output.join(format!("triathlon_blog_post_{year}_seo_optimized.md")))
            .unwrap();
    assert_eq!(optimized, outcome.crew.result);
    assert!(optimized.starts_with("<!--\nSEO METADATA:\n"));
    assert_eq!(optimized.lines().filter(|line| line.starts_with("# ")).count(), 1);
    assert!(optimized.contains("\n## Conclusão\n"));
    assert!(optimized.contains("## Perguntas Frequentes - "));

    let report = fs::read_to_string(output.join(format!("seo_analysis_report_{year}.md"))).unwrap();
    assert!(report.contains("**Títulos H1:** 1"), "{report}");

    // The writer sees the dates spelled out in Portuguese.
    let requests = server.received_requests().await.unwrap_or_default();
    let writer_prompt = requests
        .iter()
        .find(|req| req.url.path().ends_with(":generateContent"))
        .map(|req| String::from_utf8_lossy(&req.body).into_owned())
        .expect("writer prompt sent");
    assert!(writer_prompt.contains("26 de maio de 2025"), "{writer_prompt}");
}

#[tokio::test]
async fn search_failure_becomes_error_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("invalid key"))
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.search.base_url = format!("{}/search", server.uri());
    let client = SearchClient::new(SecretValue::new("bad"), &config.search).unwrap();
    let tool = SerperSearchTool::new(client, Default::default());

    let output = tool.run("qualquer coisa").await;
    assert!(output.starts_with(SEARCH_ERROR_PREFIX), "{output}");
    assert!(output.contains("403"));
}

#[tokio::test]
async fn model_http_error_fails_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "organic": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r":generateContent$"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    let temp = TempDir::new().expect("temp dir");

    let config = config_for(temp.path(), &server);
    let (llm, search) = clients(&config);
    let err = run_pipeline(&config, PipelineVariant::Blog, llm, search)
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("500"), "{err:#}");
    assert!(files_in(&temp.path().join("data/output/post")).is_empty());
}
