use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use forkpatch::at::{collect_from_patches, to_table_string, write_table};
use forkpatch::config::{discover, ForkConfig, Strategy};
use forkpatch::java::StructuralRewriter;
use forkpatch::patch::{PatchEngine, PatchResult, PatchSetOptions, PatchSetReport};
use forkpatch::pipeline::{apply_stage, prior_table, setup_base, StageOutcome};
use forkpatch::rebuild::{PatchRebuilder, RebuildOptions, RebuildReport};
use forkpatch::report::{BatchFailure, Failure, Stage};
use forkpatch::vcs::{Author, VersionedTree};
use serde_json::json;
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "forkpatch")]
#[command(about = "Apply and rebuild patch sets for forks of generated Java sources", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: ./forkpatch.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print a machine-readable report on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a patch directory to a source tree
    Apply {
        /// Tree to patch
        #[arg(short, long)]
        source: PathBuf,

        /// Directory of .patch files
        #[arg(short, long)]
        patches: PathBuf,

        /// Write into this directory instead of patching in place (wiped first)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Tolerate whitespace drift and trimmed context
        #[arg(long)]
        fuzzy: bool,

        /// Skip rewriting header access transforms into the tree
        #[arg(long)]
        no_ats: bool,

        /// Reset to the base tag first and tag the result (source must be a checkpointed tree)
        #[arg(long, conflicts_with = "output")]
        checkpoint: bool,
    },

    /// Rebuild a patch directory from a working tree
    Rebuild {
        /// Unmodified tree
        #[arg(short, long)]
        base: PathBuf,

        /// Edited tree; inline access transform markers are stripped in place
        #[arg(short, long)]
        working: PathBuf,

        /// Output directory (wiped first)
        #[arg(short, long)]
        patches: PathBuf,

        /// Context lines per hunk
        #[arg(short = 'U', long)]
        context: Option<usize>,

        /// Prior access transform table, rewritten with the merged result
        #[arg(long)]
        at_table: Option<PathBuf>,

        /// Diff text only, without rewriting access transforms into the base
        #[arg(long)]
        no_rewrite: bool,
    },

    /// Merge patch-header access transforms into one table
    CollectAts {
        #[arg(short, long)]
        patches: PathBuf,

        /// Table to write (printed to stdout otherwise)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Create a checkpointed tree from vanilla sources
    Setup {
        #[arg(long)]
        vanilla: PathBuf,

        #[arg(long)]
        tree: PathBuf,

        /// Patches applied on top of vanilla before tagging the base
        #[arg(long)]
        base_patches: Option<PathBuf>,
    },

    /// Discard all changes and restore a checkpoint
    Reset {
        #[arg(long)]
        tree: PathBuf,

        /// Tag to restore (default: the base tag)
        #[arg(long)]
        to: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    InProcess,
    External,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::InProcess => Strategy::InProcess,
            StrategyArg::External => Strategy::External,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match real_main() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{:?}", e);
            ExitCode::from(1)
        }
    }
}

/// `Ok(false)` when the command ran but collected failures.
fn real_main() -> Result<bool> {
    let cli = Cli::parse();
    let cwd = env::current_dir().context("cannot determine current directory")?;
    let mut config = discover(cli.config.as_deref(), &cwd)?;

    match cli.command {
        Commands::Apply {
            source,
            patches,
            output,
            strategy,
            fuzzy,
            no_ats,
            checkpoint,
        } => {
            if let Some(strategy) = strategy {
                config.apply.strategy = strategy.into();
            }
            config.apply.fuzzy |= fuzzy;
            config.apply.apply_ats &= !no_ats;
            if checkpoint {
                let outcome = apply_stage(&source, &patches, &config)?;
                Ok(print_stage(&outcome, cli.json))
            } else {
                let output = output.unwrap_or_else(|| source.clone());
                cmd_apply(&source, &patches, &output, &config, cli.json)
            }
        }
        Commands::Rebuild {
            base,
            working,
            patches,
            context,
            at_table,
            no_rewrite,
        } => {
            if let Some(context) = context {
                config.rebuild.context_lines = context;
            }
            if at_table.is_some() {
                config.rebuild.at_table = at_table;
            }
            config.rebuild.structural_rewrite &= !no_rewrite;
            cmd_rebuild(&base, &working, &patches, &config, cli.json)
        }
        Commands::CollectAts { patches, output } => cmd_collect_ats(&patches, output.as_deref(), cli.json),
        Commands::Setup {
            vanilla,
            tree,
            base_patches,
        } => {
            let outcome = setup_base(&vanilla, &tree, base_patches.as_deref(), &config)?;
            Ok(print_stage(&outcome, cli.json))
        }
        Commands::Reset { tree, to } => {
            let tag = to.unwrap_or_else(|| config.checkpoint.base_tag.clone());
            let repo = VersionedTree::open(&tree, Author::from(&config.checkpoint));
            let checkpoint = repo.reset_hard(&tag)?;
            if cli.json {
                println!("{}", json!({ "checkpoint": checkpoint.name, "commit": checkpoint.commit }));
            } else {
                println!("{} Reset {} to {}", "✓".green(), tree.display(), checkpoint.name.bold());
            }
            Ok(true)
        }
    }
}

fn cmd_apply(source: &Path, patches: &Path, output: &Path, config: &ForkConfig, json: bool) -> Result<bool> {
    let options = PatchSetOptions {
        apply_ats: config.apply.apply_ats,
        extra_ats: prior_table(config.rebuild.at_table.as_deref())?,
        rewriter: StructuralRewriter::new(config.rebuild.classpath.clone()),
    };
    let engine = PatchEngine::from_config(&config.apply);
    let report = engine.apply_patch_set(source, patches, output, &options)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_patch_set(&report);
    }
    Ok(finish(Stage::Apply, report.failures(), json))
}

fn cmd_rebuild(base: &Path, working: &Path, patches: &Path, config: &ForkConfig, json: bool) -> Result<bool> {
    let table = config.rebuild.at_table.as_deref();
    let existing = prior_table(table)?;
    let rebuilder = PatchRebuilder::new(RebuildOptions::from(&config.rebuild));
    let report = rebuilder.rebuild(base, working, patches, &existing)?;
    if let Some(table) = table {
        write_table(table, &report.ats)?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rebuild_json(&report))?);
    } else {
        println!(
            "{} Rebuilt {} patches ({} inline transforms extracted, {} total)",
            "✓".green(),
            report.patches,
            report.extracted,
            report.ats.len()
        );
        print_failures(&report.failures);
    }
    Ok(finish(Stage::Rebuild, report.failures, json))
}

fn cmd_collect_ats(patches: &Path, output: Option<&Path>, json: bool) -> Result<bool> {
    let collection = collect_from_patches(patches)?;
    let failures: Vec<Failure> = collection.issues.iter().map(Failure::from).collect();

    match output {
        Some(path) => write_table(path, &collection.set)?,
        None if !json => print!("{}", to_table_string(&collection.set)),
        None => {}
    }
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "transforms": collection.set.len(),
                "table": to_table_string(&collection.set),
                "failures": failures,
            }))?
        );
    } else {
        print_failures(&failures);
    }
    Ok(finish(Stage::CollectAts, failures, json))
}

fn rebuild_json(report: &RebuildReport) -> serde_json::Value {
    json!({
        "patches": report.patches,
        "extracted": report.extracted,
        "transforms": report.ats.len(),
        "table": to_table_string(&report.ats),
        "failures": report.failures,
    })
}

fn print_stage(outcome: &StageOutcome, json: bool) -> bool {
    if json {
        let value = json!({
            "checkpoint": outcome.checkpoint.as_ref().map(|c| &c.name),
            "report": outcome.report,
        });
        println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
    } else {
        print_patch_set(&outcome.report);
        if let Some(checkpoint) = &outcome.checkpoint {
            println!("{} Tagged {} at {}", "✓".green(), checkpoint.name.bold(), checkpoint.commit.dimmed());
        }
    }
    finish(Stage::Apply, outcome.report.failures(), json)
}

fn print_patch_set(report: &PatchSetReport) {
    for result in &report.patches.results {
        match result {
            PatchResult::Success {
                patch, fuzz, offset, ..
            } => {
                let mut line = format!("{} {}", "✓".green(), patch.display());
                if *fuzz > 0 || *offset > 0 {
                    line.push_str(&format!(" (fuzz {fuzz}, offset {offset})").dimmed().to_string());
                }
                println!("{line}");
            }
            PatchResult::PerFileFailure { failure, .. } => {
                eprintln!("{} {}", "✗".red(), failure);
            }
        }
    }
    print_failures(&report.at_failures);

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} access transforms", report.transforms);
    println!("  {} declarations rewritten", report.rewritten);
    println!("  {} applied", report.patches.applied().to_string().green());
    let failed = report.patches.results.len() - report.patches.applied();
    println!("  {} failed", failed.to_string().red());
}

fn print_failures(failures: &[Failure]) {
    for failure in failures {
        eprintln!("{} {}", "✗".red(), failure);
    }
}

/// Report the stage outcome; `true` when nothing failed.
fn finish(stage: Stage, failures: Vec<Failure>, json: bool) -> bool {
    match BatchFailure::check(stage, failures) {
        Ok(()) => true,
        Err(batch) => {
            if !json {
                eprintln!("{}", batch.to_string().red());
            }
            false
        }
    }
}
