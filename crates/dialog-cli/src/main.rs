use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dialog_common::config::{DecodeStrategy, Device, InferConfig};
use dialog_rpc::{build_feed, PipelineClient, PipelineConfig, QueryTitle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "dialog", version, about = "Batch dialogue inference and pipeline client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate one response per line of a test file
    Infer(InferArgs),
    /// Send one request to a pipeline server and print the returned array
    Predict(PredictArgs),
    Version,
}

#[derive(Args, Debug)]
struct InferArgs {
    /// YAML run settings; falls back to $DIALOG_CONFIG
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    device: Option<Device>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    model_name_or_path: Option<String>,
    #[arg(long)]
    test_data_path: Option<PathBuf>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long)]
    max_dec_len: Option<usize>,
    #[arg(long)]
    min_dec_len: Option<usize>,
    #[arg(long)]
    decode_strategy: Option<DecodeStrategy>,
    #[arg(long)]
    temperature: Option<f32>,
    #[arg(long)]
    top_k: Option<usize>,
    #[arg(long)]
    top_p: Option<f32>,
    #[arg(long)]
    num_beams: Option<usize>,
    #[arg(long)]
    length_penalty: Option<f32>,
    #[arg(long)]
    early_stopping: Option<bool>,
    #[arg(long)]
    num_samples: Option<usize>,
    #[arg(long)]
    logging_steps: Option<usize>,
    #[arg(long)]
    output_path: Option<PathBuf>,
    #[arg(long)]
    max_seq_len: Option<usize>,
    /// Write Prometheus text metrics here after the run
    #[arg(long)]
    metrics_path: Option<PathBuf>,
}

impl InferArgs {
    fn apply(self, cfg: &mut InferConfig) {
        if let Some(v) = self.device { cfg.device = v; }
        if let Some(v) = self.seed { cfg.seed = v; }
        if let Some(v) = self.model_name_or_path { cfg.model_name_or_path = v; }
        if let Some(v) = self.test_data_path { cfg.test_data_path = v; }
        if let Some(v) = self.batch_size { cfg.batch_size = v; }
        if let Some(v) = self.max_dec_len { cfg.max_dec_len = v; }
        if let Some(v) = self.min_dec_len { cfg.min_dec_len = v; }
        if let Some(v) = self.decode_strategy { cfg.decode_strategy = v; }
        if let Some(v) = self.temperature { cfg.temperature = v; }
        if let Some(v) = self.top_k { cfg.top_k = v; }
        if let Some(v) = self.top_p { cfg.top_p = v; }
        if let Some(v) = self.num_beams { cfg.num_beams = v; }
        if let Some(v) = self.length_penalty { cfg.length_penalty = v; }
        if let Some(v) = self.early_stopping { cfg.early_stopping = v; }
        if let Some(v) = self.num_samples { cfg.num_samples = v; }
        if let Some(v) = self.logging_steps { cfg.logging_steps = v; }
        if let Some(v) = self.output_path { cfg.output_path = v; }
        if let Some(v) = self.max_seq_len { cfg.max_seq_len = v; }
        if self.metrics_path.is_some() {
            cfg.metrics_path = self.metrics_path;
        }
    }
}

#[derive(Args, Debug)]
struct PredictArgs {
    #[arg(long, default_value = "127.0.0.1:8089")]
    server: String,
    #[arg(long, default_value = "ernie")]
    service: String,
    #[arg(long)]
    query: Option<String>,
    #[arg(long)]
    title: Option<String>,
    /// JSON-lines file, one example record per line
    #[arg(long, conflicts_with_all = ["query", "title"])]
    input: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Infer(args) => infer(args),
        Commands::Predict(args) => {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
            rt.block_on(predict(args))
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn infer(args: InferArgs) -> Result<()> {
    let mut cfg = InferConfig::load(args.config.as_deref())?;
    args.apply(&mut cfg);
    cfg.log();
    dialog_obs::init();
    let report = dialog_core::run(&cfg)?;
    tracing::info!("{} responses over {} steps", report.responses, report.steps);
    if let Some(path) = &cfg.metrics_path {
        std::fs::write(path, dialog_obs::gather_text())
            .with_context(|| format!("writing metrics to {}", path.display()))?;
    }
    Ok(())
}

async fn predict(args: PredictArgs) -> Result<()> {
    let config = PipelineConfig::new().with_server(args.server).with_service(args.service);
    let feed = match &args.input {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            let records = text
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(serde_json::from_str::<serde_json::Value>)
                .collect::<std::result::Result<Vec<_>, _>>()
                .with_context(|| format!("parsing {}", path.display()))?;
            build_feed(&records)?
        }
        None => {
            let defaults = QueryTitle::default();
            build_feed(&[QueryTitle {
                query: args.query.unwrap_or(defaults.query),
                title: args.title.unwrap_or(defaults.title),
            }])?
        }
    };
    if feed.is_empty() {
        bail!("no examples to send");
    }
    println!("{}", serde_json::to_string(&feed)?);

    let client = PipelineClient::connect(&config)?;
    let prediction = client.predict(&feed).await?;
    println!("time to cost :{} seconds", prediction.elapsed.as_secs_f64());
    let result = prediction.response.first_array()?;
    println!("{}", result.shape_tuple());
    println!("{result}");
    Ok(())
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
