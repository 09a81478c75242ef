use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::assignment::Assignment;
use crate::config::GraderConfig;
use crate::export::ExportFormat;

#[derive(Parser)]
#[command(name = "assignment-grader")]
#[command(about = "Extract, review and export learning-platform assignment submissions")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (GRADER_* environment variables override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Gradebook exported from the learning platform (csv, tsv or xlsx)
    #[arg(short, long)]
    gradebook: PathBuf,

    /// Zip archive of uploaded submission files
    #[arg(short, long)]
    archive: Option<PathBuf>,

    /// Assignment name (default: archive file stem)
    #[arg(short, long)]
    name: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract submissions and print a per-student summary
    Extract {
        #[command(flatten)]
        source: SourceArgs,

        /// Write every submission, images included, to a JSON manifest
        #[arg(short, long)]
        manifest: Option<PathBuf>,
    },
    /// Print the statistics report
    Stats {
        #[command(flatten)]
        source: SourceArgs,

        /// Also write the metrics as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Write the gradebook back out with grades and feedback
    Export {
        #[command(flatten)]
        source: SourceArgs,

        /// Output file (default: <assignment>_grades.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format (default: from the output extension)
        #[arg(short, long)]
        format: Option<ExportFormat>,
    },
}

pub fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = GraderConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Extract { source, manifest } => {
            let assignment = load_assignment(config, &source)?;
            print_summary(&assignment);

            if let Some(path) = manifest {
                assignment
                    .manifest()
                    .write(&path)
                    .with_context(|| format!("Failed to write manifest {}", path.display()))?;
                println!("\nManifest written to {}", path.display());
            }
        }
        Commands::Stats { source, csv } => {
            let assignment = load_assignment(config, &source)?;
            println!("{}", assignment.statistics_report());

            if let Some(path) = csv {
                assignment
                    .export_statistics(&path)
                    .with_context(|| format!("Failed to write statistics {}", path.display()))?;
                println!("\nStatistics exported to {}", path.display());
            }
        }
        Commands::Export {
            source,
            output,
            format,
        } => {
            let assignment = load_assignment(config, &source)?;
            let written = assignment
                .export(output.as_deref(), format)
                .context("Failed to export grades")?;
            println!("Exported grades and feedback to {}", written.display());
        }
    }

    Ok(())
}

fn load_assignment(config: GraderConfig, source: &SourceArgs) -> Result<Assignment> {
    let mut assignment = Assignment::new(config);
    assignment.set_name(source.name.as_deref(), source.archive.as_deref());
    assignment
        .load_submissions(&source.gradebook, source.archive.as_deref())
        .with_context(|| format!("Failed to load gradebook {}", source.gradebook.display()))?;
    Ok(assignment)
}

fn print_summary(assignment: &Assignment) {
    println!("Assignment: {}", assignment.name());
    println!("{}", "=".repeat(50));

    for submission in assignment.submissions() {
        println!(
            "{:<30} {:<15} {:>7} chars {:>3} image{}",
            submission.student_name(),
            submission.identifier().unwrap_or("-"),
            submission.solution_length(),
            submission.images().len(),
            if submission.images().len() == 1 { "" } else { "s" }
        );
    }

    println!(
        "\nProcessed {} of {} submitted students",
        assignment.submissions().len(),
        assignment.expected_count()
    );
    let missing = assignment.missing_count();
    if missing > 0 {
        println!(
            "Warning: {missing} student{} submitted but no content was found",
            if missing == 1 { "" } else { "s" }
        );
    }
}
