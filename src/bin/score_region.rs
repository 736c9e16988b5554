// Score a configured region and write the result
//
// Usage: score_region <config.json> [output.{json,csv,parquet}]
// The config path may also come from SITE_CONFIG. Without an output path the
// heatmap triples are printed to stdout.

use anyhow::{Context, Result};
use site_scorer_rust::{
    write_run, CancellationToken, MapPresentation, ScoringEngine, SuitabilityConfig,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "site_scorer_rust=info,score_region=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut args = std::env::args().skip(1);
    let config_path: PathBuf = args
        .next()
        .or_else(|| std::env::var("SITE_CONFIG").ok())
        .map(PathBuf::from)
        .context("Usage: score_region <config.json> [output.{json,csv,parquet}]")?;
    let output_path = args.next().map(PathBuf::from);

    let start = Instant::now();

    tracing::info!("Loading configuration: {:?}", config_path);
    let config = SuitabilityConfig::load(&config_path)?;

    let engine = ScoringEngine::from_config(&config)?;
    let run = engine.run(&CancellationToken::new())?;

    let presentation = MapPresentation::build(&config.presentation, &run.points);
    for site in &presentation.sites {
        tracing::info!(
            "#{} {}: ({:.4}, {:.4}) score {:.2}",
            site.rank,
            site.label,
            site.lat,
            site.lon,
            site.score
        );
    }

    match output_path {
        Some(path) => {
            write_run(&run, &path)?;
            tracing::info!("Wrote {} points to {:?}", run.points.len(), path);
        }
        None => {
            let json =
                serde_json::to_string(&run.heatmap()).context("Failed to serialise heatmap")?;
            println!("{}", json);
        }
    }

    tracing::info!(
        "Done in {:.2}s ({} scored, {} excluded, {} degraded, {} omitted)",
        start.elapsed().as_secs_f64(),
        run.summary.emitted,
        run.summary.excluded,
        run.summary.degraded,
        run.summary.omitted
    );

    Ok(())
}
