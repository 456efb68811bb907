//! Signal Analyzer - one-shot alert confidence scoring
//!
//! Usage:
//!   signal-analyzer <SYMBOL> <BARS_JSON_FILE> [NOTES]
//!   signal-analyzer --print-config
//!
//! The bars file holds a JSON array of bars, oldest first. The analysis
//! result is printed to stdout as JSON; logs go to stderr.

use anyhow::{bail, Context};
use data_retrieval::Bar;
use signal_analyzer::{AnalysisRequest, AnalyzerConfig, SignalAnalyzer, UserContext};
use tracing::info;

const USAGE: &str = "usage: signal-analyzer <SYMBOL> <BARS_JSON_FILE> [NOTES] | --print-config";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AnalyzerConfig::load()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(
            config
                .log_level
                .parse::<tracing::Level>()
                .unwrap_or(tracing::Level::INFO),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.first().map(String::as_str) == Some("--print-config") {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    let (symbol, bars_path) = match (args.first(), args.get(1)) {
        (Some(symbol), Some(path)) => (symbol.clone(), path.clone()),
        _ => bail!(USAGE),
    };
    let notes = args.get(2).cloned();

    let raw = std::fs::read_to_string(&bars_path)
        .with_context(|| format!("Failed to read bars from {}", bars_path))?;
    let bars: Vec<Bar> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid bars JSON in {}", bars_path))?;

    info!("Analyzing {} with {} bars", symbol, bars.len());

    let analyzer = SignalAnalyzer::from_config(&config)?;
    let request = AnalysisRequest::new(symbol, bars).with_context(UserContext {
        notes,
        ..Default::default()
    });

    let result = analyzer.analyze(request).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
