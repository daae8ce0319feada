use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_expression_atlas::app::{App, ProgressSink};
use kira_expression_atlas::config::ConfigLoader;
use kira_expression_atlas::domain::SampleName;
use kira_expression_atlas::error::KiraError;
use kira_expression_atlas::output::{JsonOutput, OutputMode, StderrProgress};

#[derive(Parser)]
#[command(name = "kira-ea")]
#[command(about = "Time-series gene expression atlas over per-sample stores")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Build per-sample stores from expression tables")]
    Ingest(IngestArgs),
    #[command(about = "Look up expression series for comma-separated gene ids")]
    Query(QueryArgs),
    #[command(about = "List configured sample stores")]
    List,
    #[command(about = "Show the ingestion manifest of a sample store")]
    Info(InfoArgs),
}

#[derive(Args)]
struct IngestArgs {
    /// Samples to rebuild; all configured samples when omitted.
    samples: Vec<String>,
}

#[derive(Args)]
struct QueryArgs {
    gene_ids: String,
}

#[derive(Args)]
struct InfoArgs {
    sample: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        err if err.is_client_error() => 2,
        KiraError::StoreNotFound(_) | KiraError::MissingAnnotation(_) => 2,
        KiraError::MalformedTable { .. }
        | KiraError::InvalidTimePointColumn { .. }
        | KiraError::StoreOpen { .. }
        | KiraError::StoreRead { .. }
        | KiraError::StoreWrite { .. }
        | KiraError::CorruptRecord { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Interactive => &StderrProgress,
        OutputMode::NonInteractive => &JsonOutput,
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let app = App::new(config);

    match cli.command {
        Commands::Ingest(args) => {
            let samples = args
                .samples
                .iter()
                .map(|name| name.parse::<SampleName>())
                .collect::<Result<Vec<_>, KiraError>>()?;
            let result = app.ingest(&samples, sink)?;
            JsonOutput::print_ingest(&result).into_diagnostic()?;
        }
        Commands::Query(args) => {
            let atlas = app.open_atlas()?;
            let result = atlas.query_list(&args.gene_ids)?;
            JsonOutput::print_query(&result).into_diagnostic()?;
        }
        Commands::List => {
            let result = app.list(sink)?;
            JsonOutput::print_list(&result).into_diagnostic()?;
        }
        Commands::Info(args) => {
            let sample: SampleName = args.sample.parse()?;
            let result = app.info(&sample, sink)?;
            JsonOutput::print_info(&result).into_diagnostic()?;
        }
    }
    Ok(())
}
