use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use readscope_core::{
    load_project, save_project, FolderGenomeStore, ProgressContext, ProgressListener,
    ProjectSummary, SaveOptions,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "readscope")]
#[command(about = "ReadScope - genomics read quantitation projects")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory of installed genomes (<species>/<assembly>/chr_list)
    #[arg(short, long, global = true, default_value = "genomes")]
    genomes: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the contents of a project file
    Info {
        /// Project file to inspect
        project: PathBuf,

        /// Emit the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rewrite a project file, choosing the compression
    Repack {
        /// Input project file
        input: PathBuf,

        /// Output project file
        output: PathBuf,

        /// Gzip the output
        #[arg(long)]
        compress: bool,
    },

    /// Round-trip a project file and verify the result matches
    Check {
        /// Project file to verify
        project: PathBuf,
    },
}

/// Bridges engine progress onto the log output.
struct LogListener;

impl ProgressListener for LogListener {
    fn updated(&self, message: &str, current: u64, max: u64) {
        log::debug!("{message} ({current}/{max})");
    }

    fn warning(&self, message: &str) {
        log::warn!("{message}");
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let genomes = FolderGenomeStore::new(&cli.genomes);
    let ctx = ProgressContext::new(vec![Arc::new(LogListener) as Arc<dyn ProgressListener>]);

    match cli.command {
        Commands::Info { project, json } => {
            let loaded = load_project(&project, &genomes, &ctx)
                .with_context(|| format!("failed to load {}", project.display()))?;
            let summary = ProjectSummary::of(&loaded.project);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }

        Commands::Repack {
            input,
            output,
            compress,
        } => {
            let loaded = load_project(&input, &genomes, &ctx)
                .with_context(|| format!("failed to load {}", input.display()))?;
            save_project(
                &loaded.project,
                &loaded.prefs,
                &output,
                &SaveOptions { compress },
                &ctx,
            )
            .with_context(|| format!("failed to write {}", output.display()))?;
            println!("wrote {}", output.display());
        }

        Commands::Check { project } => {
            let loaded = load_project(&project, &genomes, &ctx)
                .with_context(|| format!("failed to load {}", project.display()))?;
            let dir = tempfile::tempdir()?;
            let copy = dir.path().join("roundtrip.rsp");
            save_project(
                &loaded.project,
                &loaded.prefs,
                &copy,
                &SaveOptions { compress: false },
                &ctx,
            )?;
            let reloaded = load_project(&copy, &genomes, &ctx)?;
            if reloaded.project != loaded.project || reloaded.prefs != loaded.prefs {
                bail!("round trip mismatch for {}", project.display());
            }
            println!("{}: OK", project.display());
        }
    }
    Ok(())
}

fn print_summary(summary: &ProjectSummary) {
    println!("Genome:          {} {}", summary.species, summary.assembly);
    println!(
        "Samples:         {} ({} HiC), {} reads",
        summary.samples, summary.hic_samples, summary.total_reads
    );
    println!("Data groups:     {}", summary.groups);
    println!("Replicate sets:  {}", summary.replicate_sets);
    println!(
        "Annotation sets: {} ({} features)",
        summary.annotation_sets, summary.features
    );
    println!(
        "Probes:          {} ({} lists)",
        summary.probes, summary.probe_lists
    );
    println!("Visible stores:  {}", summary.visible_stores);
}
