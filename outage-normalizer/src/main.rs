use anyhow::{bail, Context, Result};
use outage_normalizer::{
    config::{AppConfig, PeriodsConfig},
    inference::{Inference, OpenAiInference},
    metrics_textfile,
    observability,
    pipeline::Pipeline,
    sinks::{format_outage_table, CsvFileSink},
    sources,
    transform::{Augmenter, RecordBuilder},
};
use std::{env, sync::Arc, time::Duration};

/// Optional `<start_year> <stop_year>` arguments replace the configured range.
fn periods_from_args(args: &[String]) -> Result<Option<PeriodsConfig>> {
    match args {
        [] => Ok(None),
        [start, stop] => Ok(Some(PeriodsConfig {
            start_year: start.parse().with_context(|| format!("invalid start year '{start}'"))?,
            stop_year: stop.parse().with_context(|| format!("invalid stop year '{stop}'"))?,
        })),
        _ => bail!("usage: outage-normalizer [<start_year> <stop_year>]"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let mut cfg = AppConfig::load()?;
    let args: Vec<String> = env::args().skip(1).collect();
    if let Some(periods) = periods_from_args(&args)? {
        cfg.periods = periods;
        cfg.validate()?;
    }

    if cfg.metrics.is_some() {
        metrics_textfile::init()?;
    }

    let periods = cfg.periods.range();
    tracing::info!(start = periods.start, stop = periods.end, "normalizing outage summaries");

    // Every year needs a source before anything is read or written.
    let sources = sources::discover(
        &cfg.paths.original_dir,
        periods,
        cfg.spreadsheet.header_reference_column,
        |year| cfg.labels_for(year),
    )?;

    let inf_cfg = &cfg.inference;
    let client = Arc::new(
        reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client")?,
    );
    let inference: Arc<dyn Inference> = Arc::new(OpenAiInference::new(
        inf_cfg.base_url.clone(),
        inf_cfg.api_key()?,
        inf_cfg.model.clone(),
        Duration::from_millis(inf_cfg.timeout_ms),
        client,
    ));

    let output = cfg.output_path();
    let pipeline = Pipeline {
        sources,
        builder: Arc::new(RecordBuilder::new(inference.clone())),
        augmenter: Augmenter::new(inference, inf_cfg.max_in_flight),
        sink: CsvFileSink::new(&output),
    };

    let events = pipeline.run().await?;
    tracing::info!(records = events.len(), path = %output.display(), "normalization complete");

    println!("{}", format_outage_table(events.iter().map(|env| &env.payload)));

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_textfile::write(&metrics_cfg.textfile_path)?;
    }

    Ok(())
}
