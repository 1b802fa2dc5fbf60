use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use finsight_classify::{
    BackendProvider, CategorizationEngine, CategoryProvider, RemoteClassifier, RuleProvider,
};
use finsight_core::{AnalysisResult, Category, JobStage, SourceFormat, StatementUpload};
use finsight_pipeline::{MemoryJobStore, MemoryObjectStore, Pipeline};

mod config;

#[derive(Parser, Debug)]
#[command(name = "finsight", version, about = "Bank statement analysis pipeline")]
struct Cli {
    /// Config file (default: ./finsight.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline over a local statement file and print the summary
    Analyze {
        /// Statement file (pdf, csv, xlsx/xls/ods)
        file: PathBuf,

        /// Declared format; guessed from the extension when omitted
        #[arg(long)]
        format: Option<String>,

        /// Account label attached to the upload
        #[arg(long, default_value = "default")]
        account: String,

        /// Emit the raw result as JSON instead of the summary
        #[arg(long)]
        json: bool,
    },

    /// List categories and the merchant patterns behind the rule matcher
    Categories,

    /// Write a default finsight.toml
    InitConfig {
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Analyze {
            file,
            format,
            account,
            json,
        } => analyze(cfg, file, format, account, json).await?,

        Command::Categories => {
            for cat in Category::ALL {
                let patterns = cat.merchant_patterns();
                if patterns.is_empty() {
                    println!("{}", cat.label());
                } else {
                    println!("{}: {}", cat.label(), patterns.join(", "));
                }
            }
        }

        Command::InitConfig { path } => config::init_config(path.as_deref())?,
    }

    Ok(())
}

async fn analyze(
    cfg: config::Config,
    file: PathBuf,
    format: Option<String>,
    account: String,
    json: bool,
) -> Result<()> {
    let bytes = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;

    let format = match format {
        Some(label) => SourceFormat::parse(&label)?,
        None => file
            .extension()
            .and_then(|e| e.to_str())
            .and_then(SourceFormat::from_extension)
            .with_context(|| {
                format!("cannot guess format of {}; pass --format", file.display())
            })?,
    };

    let mut providers: Vec<Arc<dyn CategoryProvider>> = vec![Arc::new(RuleProvider::new())];
    if let Some(endpoint) = cfg.classifier.endpoint.clone() {
        providers.push(Arc::new(BackendProvider::new(RemoteClassifier::new(
            endpoint,
            cfg.classifier.api_key.clone(),
        ))));
    }
    let engine = Arc::new(CategorizationEngine::new(providers));

    let objects = Arc::new(MemoryObjectStore::new());
    let store = Arc::new(MemoryJobStore::new());
    let pipeline = Pipeline::new(cfg.pipeline.clone(), objects.clone(), store, engine);

    let upload = StatementUpload::new(account, format, bytes.len() as u64);
    objects.put(upload.id, bytes);
    let job = pipeline.submit_statement(upload).await?;

    let status = loop {
        let status = pipeline.job_status(job)?;
        if status.stage.is_terminal() {
            break status;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    };

    if status.stage == JobStage::Failed {
        match status.error {
            Some(detail) => bail!(
                "analysis failed during {} ({}): {}",
                detail.stage.as_str(),
                detail.kind,
                detail.message
            ),
            None => bail!("analysis failed"),
        }
    }

    let result = pipeline.result(job)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&*result)?);
        return Ok(());
    }

    print_summary(&result, status.skipped_records);
    Ok(())
}

fn print_summary(result: &AnalysisResult, skipped: u32) {
    let s = &result.summary;

    println!(
        "Parsed {} transactions ({} unparsable rows skipped)\n",
        s.transaction_count, skipped
    );
    if let (Some(start), Some(end)) = (s.period_start, s.period_end) {
        println!("Period:   {start} to {end}");
    }
    println!("Income:   ${:.2}", dollars(s.total_income_minor));
    println!("Expenses: ${:.2}", dollars(s.total_expenses_minor));
    println!("Net:      ${:.2}\n", dollars(s.net_cash_flow_minor));

    println!("By category:");
    for c in &s.categories {
        println!(
            "  {:<16} ${:>10.2} | {:>3} txns | largest ${:.2}",
            c.category.label(),
            dollars(c.total_minor),
            c.count,
            dollars(c.largest_minor)
        );
    }

    if !s.top_categories.is_empty() {
        let top: Vec<&str> = s.top_categories.iter().map(|c| c.label()).collect();
        println!("\nTop spend: {}", top.join(", "));
    }

    if result.anomalies.is_empty() {
        println!("\nNo anomalies flagged.");
    } else {
        println!("\nAnomalies:");
        for txn in result
            .transactions
            .iter()
            .filter(|t| t.anomalous == Some(true))
        {
            println!(
                "  {} | {} | ${:.2}",
                txn.posted_date,
                txn.merchant,
                dollars(txn.abs_amount_minor())
            );
        }
    }
}

fn dollars(minor: i64) -> f64 {
    minor as f64 / 100.0
}
