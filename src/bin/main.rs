use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use llm_bench::export::{self, ExportRecord};
use llm_bench::{
    report, BenchmarkRunner, Comparator, PriceTable, PromptSuite, QualityMetric, QualityScorer,
    RunConfig, SuiteRegistry,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "llm-bench")]
#[command(about = "Latency, throughput, cost and quality benchmarks for OpenAI-compatible LLM APIs")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Benchmark a single model
    Run {
        /// Model name (e.g. gpt-4o)
        #[arg(long, short)]
        model: String,

        #[command(flatten)]
        suite: SuiteArgs,

        #[command(flatten)]
        connection: ConnectionArgs,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Benchmark two models on the same suite and compare them
    Compare {
        /// First model
        model_a: String,

        /// Second model
        model_b: String,

        #[command(flatten)]
        suite: SuiteArgs,

        #[command(flatten)]
        connection: ConnectionArgs,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Print the report for a saved results file
    Report {
        /// Path to a JSON file written by `run` or `compare`
        file: PathBuf,

        /// Recompute statistics with this YAML price table
        #[arg(long)]
        prices: Option<PathBuf>,
    },
    /// List the available prompt suites
    Suites,
}

#[derive(ClapArgs, Debug)]
struct SuiteArgs {
    /// Built-in suite to run
    #[arg(long, short, default_value = "all")]
    suite: String,

    /// Load the suite from a YAML file instead
    #[arg(long, conflicts_with = "suite")]
    suite_file: Option<PathBuf>,
}

impl SuiteArgs {
    fn resolve(&self) -> Result<PromptSuite> {
        match &self.suite_file {
            Some(path) => PromptSuite::from_yaml_file(path)
                .with_context(|| format!("Failed to load suite file: {}", path.display())),
            None => Ok(SuiteRegistry::builtin().get(&self.suite)?.clone()),
        }
    }
}

#[derive(ClapArgs, Debug)]
struct OutputArgs {
    /// Save results to this JSON file
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Save results under --output-dir with a generated file name
    #[arg(long)]
    save: bool,

    /// Directory for generated result files
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,
}

impl OutputArgs {
    fn path(&self, label: &str) -> Option<PathBuf> {
        match &self.output {
            Some(path) => Some(path.clone()),
            None if self.save => Some(export::default_output_path(label, &self.output_dir)),
            None => None,
        }
    }
}

#[derive(ClapArgs, Debug)]
struct ConnectionArgs {
    /// Base URL of the OpenAI-compatible API
    #[arg(long, short = 'u', env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    base_url: String,

    /// API key for authentication
    #[arg(long, short = 'k', env = "OPENAI_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    /// Disable streaming (time-to-first-token is not measured)
    #[arg(long)]
    no_stream: bool,

    /// Maximum concurrent requests
    #[arg(long, short, default_value = "1")]
    concurrency: usize,

    /// Request timeout in seconds
    #[arg(long, default_value = "120")]
    timeout: u64,

    /// Completion budget for prompts that do not set their own
    #[arg(long, default_value = "512")]
    max_tokens: u32,

    /// Sampling temperature
    #[arg(long, short, default_value = "0.0")]
    temperature: f32,

    /// YAML price table merged over the built-in prices
    #[arg(long)]
    prices: Option<PathBuf>,

    /// Fail before sending requests if a model has no price entry
    #[arg(long)]
    require_pricing: bool,

    /// Similarity metric for reference answers
    #[arg(long, value_enum, default_value = "f1")]
    quality_metric: QualityMetricArg,
}

#[derive(Debug, Clone, ValueEnum)]
enum QualityMetricArg {
    F1,
    RougeL,
}

impl ConnectionArgs {
    fn to_config(&self) -> RunConfig {
        RunConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            stream: !self.no_stream,
            timeout_secs: self.timeout,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            concurrency: self.concurrency,
            require_pricing: self.require_pricing,
            show_progress: true,
        }
    }

    fn runner(&self) -> Result<BenchmarkRunner> {
        let metric = match self.quality_metric {
            QualityMetricArg::F1 => QualityMetric::TokenF1,
            QualityMetricArg::RougeL => QualityMetric::RougeL,
        };
        Ok(BenchmarkRunner::openai(self.to_config())?
            .with_prices(load_prices(self.prices.as_ref())?)
            .with_scorer(QualityScorer::new(metric)))
    }
}

fn load_prices(path: Option<&PathBuf>) -> Result<PriceTable> {
    let mut prices = PriceTable::builtin();
    if let Some(path) = path {
        let custom = PriceTable::from_yaml_file(path)
            .with_context(|| format!("Failed to load price table: {}", path.display()))?;
        prices.extend(custom);
    }
    Ok(prices)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise --verbose or "warn"
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if args.verbose {
            "debug".to_string()
        } else {
            "warn".to_string()
        }
    });
    tracing_subscriber::fmt().with_env_filter(&filter).init();

    match args.command {
        Commands::Run {
            model,
            suite,
            connection,
            output,
        } => run_command(&model, &suite, &connection, &output).await,
        Commands::Compare {
            model_a,
            model_b,
            suite,
            connection,
            output,
        } => compare_command(&model_a, &model_b, &suite, &connection, &output).await,
        Commands::Report { file, prices } => report_command(&file, prices.as_ref()),
        Commands::Suites => {
            for suite in SuiteRegistry::builtin().iter() {
                println!("{:<10} {:>2} prompts  {}", suite.name, suite.len(), suite.description);
            }
            Ok(())
        }
    }
}

async fn run_command(
    model: &str,
    suite: &SuiteArgs,
    connection: &ConnectionArgs,
    output: &OutputArgs,
) -> Result<()> {
    let suite = suite.resolve()?;
    info!("Target: {} (model: {})", connection.base_url, model);

    let result = connection.runner()?.run(model, &suite).await?;
    report::print_result(&result)?;

    if let Some(path) = output.path(&format!("{}_{}", model, suite.name)) {
        export::save(&ExportRecord::from(result.clone()), &path)?;
        println!("Results saved to {}", path.display());
    }

    if result.stats.successful == 0 {
        bail!("all {} requests failed", result.stats.failed);
    }
    Ok(())
}

async fn compare_command(
    model_a: &str,
    model_b: &str,
    suite: &SuiteArgs,
    connection: &ConnectionArgs,
    output: &OutputArgs,
) -> Result<()> {
    let suite = suite.resolve()?;
    let comparison = Comparator::new(connection.runner()?)
        .compare(model_a, model_b, &suite)
        .await?;

    report::print_result(&comparison.model_a)?;
    report::print_result(&comparison.model_b)?;
    report::print_comparison(&comparison)?;

    if let Some(path) = output.path(&format!("{}_vs_{}", model_a, model_b)) {
        export::save(&ExportRecord::from(comparison), &path)?;
        println!("Results saved to {}", path.display());
    }
    Ok(())
}

fn report_command(file: &PathBuf, prices: Option<&PathBuf>) -> Result<()> {
    let record = export::load(file)
        .with_context(|| format!("Failed to read results file: {}", file.display()))?;

    let prices = prices.map(|p| load_prices(Some(p))).transpose()?;

    match record {
        ExportRecord::Run(mut result) => {
            if let Some(prices) = &prices {
                result.recompute_stats(prices);
            }
            report::print_result(&result)?;
        }
        ExportRecord::Comparison(comparison) => {
            let comparison = match &prices {
                Some(prices) => {
                    let mut a = comparison.model_a;
                    let mut b = comparison.model_b;
                    a.recompute_stats(prices);
                    b.recompute_stats(prices);
                    llm_bench::compare_results(a, b)
                }
                None => comparison,
            };
            report::print_result(&comparison.model_a)?;
            report::print_result(&comparison.model_b)?;
            report::print_comparison(&comparison)?;
        }
    }
    Ok(())
}
