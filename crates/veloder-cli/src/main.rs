use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio::runtime::Runtime;
use tracing::{error, info};
use veloder_core::{
    ConfigLoader, PipelineOutcome, PipelineVariant, TelemetryOptions, init_telemetry,
    reconfigure_telemetry, run_configured,
};

#[derive(Parser, Debug)]
#[command(
    name = "veloder",
    version,
    about = "Gera posts de blog com uma equipe de agentes LLM"
)]
struct Cli {
    /// Path to the YAML configuration (defaults to config/config.yaml).
    #[arg(long, env = "VELODER_CONFIG")]
    config: Option<PathBuf>,

    /// Pipeline variant: blog, wordpress or triathlon.
    #[arg(long)]
    variant: Option<PipelineVariant>,

    /// Directory every relative path in the configuration is resolved against.
    #[arg(long)]
    root: Option<PathBuf>,
}

fn main() -> ExitCode {
    // A missing .env file is fine; variables may already be exported.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "run failed");
            eprintln!("❌ Erro durante execução: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    init_telemetry(TelemetryOptions::default())?;
    let mut config = ConfigLoader::load(cli.config)?;
    if let Some(root) = cli.root {
        config = config.with_root(root);
    }
    reconfigure_telemetry(TelemetryOptions::from_config(&config))?;

    let variant = cli.variant.unwrap_or(config.pipeline.variant);
    info!(%variant, root = %config.pipeline.root.display(), "starting veloder");

    println!("🚀 Iniciando projeto Blog Veloder ({variant})...");
    let rt = Runtime::new()?;
    let outcome = rt.block_on(run_configured(&config, variant))?;
    report(&outcome, config.agents.verbose);
    Ok(())
}

fn report(outcome: &PipelineOutcome, verbose: bool) {
    println!("📝 Tema da pesquisa: {}", outcome.topic);
    println!("✅ Pipeline concluído! (execução {})", outcome.crew.run_id);
    for note in &outcome.crew.notes {
        println!("   {note}");
    }
    if !outcome.artifacts.is_empty() {
        println!("\n📁 Arquivos gerados:");
        for path in &outcome.artifacts {
            println!("   {}", path.display());
        }
    }
    if verbose {
        println!("\n🧭 Etapas:\n{}", outcome.crew.trace.summary().render_markdown());
    }
    println!("\n📄 Resultado final:\n{}", outcome.crew.result);
}
