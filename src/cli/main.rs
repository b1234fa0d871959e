use accident_severity::metrics::{gather_metrics, init_metrics};
use accident_severity::ml::source::parse_records;
use accident_severity::ml::{JsonRecordSource, RecordSource, SyntheticRecordSource};
use accident_severity::{Config, SeverityPredictor};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "severity-cli")]
#[command(about = "Road-accident severity prediction", version, long_about = None)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, env = "SEVERITY_CONFIG", default_value = "config/severity.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model and persist it to the artifact directory
    Train {
        /// JSON array or JSON-lines file of raw records
        #[arg(short, long)]
        data: Option<PathBuf>,
    },

    /// Predict severity for one or more requests
    Predict {
        /// File holding a JSON object, array or JSON lines
        #[arg(short, long, conflicts_with = "json")]
        input: Option<PathBuf>,

        /// Inline JSON request
        #[arg(short, long)]
        json: Option<String>,
    },

    /// Show held-out metrics of the persisted model
    Metrics {
        /// Print Prometheus exposition text instead
        #[arg(long)]
        prometheus: bool,
    },

    /// List the category values and numeric inputs the model knows
    Features,

    /// Write synthetic raw records
    Generate {
        #[arg(short = 'n', long, default_value = "1000")]
        count: usize,

        /// Output file; `.jsonl` writes one record per line
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, default_value = "42")]
        seed: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load_from(&cli.config).context("loading configuration")?;
    init_tracing(&config);

    if config.observability.prometheus_enabled {
        if let Err(e) = init_metrics() {
            tracing::warn!("Metrics registration failed: {}", e);
        }
    }

    match cli.command {
        Commands::Train { data } => {
            let data = data.or_else(|| config.data.data_path.clone());
            let source: Arc<dyn RecordSource> = match data {
                Some(path) => Arc::new(JsonRecordSource::new(path)),
                None if config.data.fallback_to_synthetic => Arc::new(SyntheticRecordSource::new(
                    config.data.synthetic_samples,
                    config.training.random_seed,
                )),
                None => bail!("no training data: pass --data or set data.data_path"),
            };

            let predictor = SeverityPredictor::new(config);
            let metrics = predictor.train_from_source(source).await?;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }

        Commands::Predict { input, json } => {
            let text = match (input, json) {
                (Some(path), _) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                (None, Some(json)) => json,
                (None, None) => bail!("pass --input or --json"),
            };
            let records = parse_records(&text)?;

            let predictor = SeverityPredictor::new(config);
            predictor.initialize(None).await?;

            let results = records
                .iter()
                .map(|record| predictor.predict(record))
                .collect::<Result<Vec<_>, _>>()?;
            match results.as_slice() {
                [single] => println!("{}", serde_json::to_string_pretty(single)?),
                many => println!("{}", serde_json::to_string_pretty(many)?),
            }
        }

        Commands::Metrics { prometheus } => {
            let predictor = SeverityPredictor::new(config);
            predictor.reload().await?;

            if prometheus {
                print!("{}", gather_metrics());
            } else {
                let metrics = predictor.metrics().context("model carries no metrics")?;
                println!("{}", serde_json::to_string_pretty(&metrics)?);
            }
        }

        Commands::Features => {
            let predictor = SeverityPredictor::new(config);
            predictor.reload().await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&predictor.feature_options()?)?
            );
        }

        Commands::Generate {
            count,
            output,
            seed,
        } => {
            let records = SyntheticRecordSource::new(count, seed).generate();
            let body = if output.extension().is_some_and(|ext| ext == "jsonl") {
                records
                    .iter()
                    .map(serde_json::to_string)
                    .collect::<Result<Vec<_>, _>>()?
                    .join("\n")
            } else {
                serde_json::to_string_pretty(&records)?
            };

            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&output, body)?;
            println!(
                "{}",
                serde_json::json!({ "records": count, "output": output.display().to_string() })
            );
        }
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("accident_severity={}", config.observability.log_level).into()
    });
    let json = config.observability.json_logs;

    // stdout carries command output; logs go to stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}
