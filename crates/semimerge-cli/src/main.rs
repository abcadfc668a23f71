use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use semimerge_core::config::{FatalPolicy, Settings};
use semimerge_core::logging::{init_logging, log_file};
use semimerge_core::printer;
use semimerge_core::statistics::{Statistics, STATISTICS_FILE};
use semimerge_core::{FilesTriple, Manifest, Scenario, ScenarioRunner};
use semimerge_engine::{CancelToken, Language, Revisions};

#[derive(Parser)]
#[command(
    name = "semimerge",
    about = "Semistructured three-way merge for source files"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to .semimerge data directory
    #[arg(long, default_value = ".semimerge")]
    data_dir: PathBuf,
}

#[derive(clap::Args)]
struct MergeArgs {
    /// Merge textually only
    #[arg(long)]
    textual_only: bool,
    /// Omit the base section from conflict markers
    #[arg(long)]
    no_base: bool,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Concurrent file merges (default: available parallelism)
    #[arg(short, long)]
    jobs: Option<usize>,
    /// Keep merging other files when one fails
    #[arg(long)]
    continue_on_error: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge three versions of one file. An omitted side is absent.
    Files {
        #[arg(long)]
        left: Option<PathBuf>,
        #[arg(long)]
        base: Option<PathBuf>,
        #[arg(long)]
        right: Option<PathBuf>,
        /// Write the merged file here instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Grammar to use instead of the one implied by the extension
        #[arg(long)]
        language: Option<String>,
        #[command(flatten)]
        merge: MergeArgs,
    },
    /// Merge three directory trees
    Dirs {
        left: PathBuf,
        base: PathBuf,
        right: PathBuf,
        /// Write merged files under this directory instead of printing them
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        merge: MergeArgs,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Merge the revisions named by one or more manifest files
    Revisions {
        /// Manifest files: three lines naming the left, base and right directories
        #[arg(required = true)]
        manifests: Vec<PathBuf>,
        #[command(flatten)]
        merge: MergeArgs,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Show configuration and recent statistics
    Status,
    /// Write default settings to the data directory
    Init,
}

fn settings_path(cli: &Cli) -> PathBuf {
    cli.data_dir.join("settings.json")
}

fn statistics_path(cli: &Cli) -> PathBuf {
    cli.data_dir.join(STATISTICS_FILE)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_dir = cli.data_dir.join("logs");
    let guard = init_logging(&log_dir)?;

    if let Err(e) = run(&cli).await {
        tracing::error!("{e:#}");
        drop(guard);
        eprintln!(
            "An error occurred. See {} for more details.",
            log_file(&log_dir).display()
        );
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Init => cmd_init(cli),
        Commands::Status => cmd_status(cli),
        Commands::Files {
            left,
            base,
            right,
            output,
            language,
            merge,
        } => {
            let paths = Revisions::new(left.clone(), base.clone(), right.clone());
            cmd_files(cli, paths, output.as_deref(), language.as_deref(), merge).await
        }
        Commands::Dirs {
            left,
            base,
            right,
            output,
            merge,
            run,
        } => {
            let roots = Revisions::new(left.clone(), base.clone(), right.clone());
            cmd_dirs(cli, roots, output.as_deref(), merge, run).await
        }
        Commands::Revisions {
            manifests,
            merge,
            run,
        } => cmd_revisions(cli, manifests, merge, run).await,
    }
}

fn load_settings(cli: &Cli, merge: &MergeArgs, run: Option<&RunArgs>) -> anyhow::Result<Settings> {
    let mut settings = Settings::load_or_default(&settings_path(cli))?;
    if merge.textual_only {
        settings.merge.structural = false;
    }
    if merge.no_base {
        settings.merge.show_base = false;
    }
    if let Some(run) = run {
        if run.jobs.is_some() {
            settings.run.jobs = run.jobs;
        }
        if run.continue_on_error {
            settings.run.fatal_policy = FatalPolicy::Continue;
        }
    }
    Ok(settings)
}

/// A token tripped by Ctrl-C.
fn cancel_on_interrupt() -> CancelToken {
    let cancel = CancelToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight merges");
            token.cancel();
        }
    });
    cancel
}

fn record_statistics(cli: &Cli, settings: &Settings, stats: &Statistics) -> anyhow::Result<()> {
    tracing::info!("{}", stats.summary());
    if settings.output.statistics {
        stats.append_to(&statistics_path(cli))?;
    }
    Ok(())
}

async fn cmd_files(
    cli: &Cli,
    paths: Revisions<Option<PathBuf>>,
    output: Option<&Path>,
    language: Option<&str>,
    merge: &MergeArgs,
) -> anyhow::Result<()> {
    if paths.present_count() == 0 {
        anyhow::bail!("at least one of --left, --base, --right is required");
    }
    let mut settings = load_settings(cli, merge, None)?;
    let mut triple = FilesTriple::from_files(paths);

    if let Some(name) = language {
        let lang = Language::from_name(name)
            .ok_or_else(|| anyhow::anyhow!("unknown language: {name}"))?;
        // The grammar follows the relative path, so give it the right extension.
        triple.relative = triple.relative.with_extension(default_extension(lang));
        settings.merge.languages.clear();
    }

    let runner = ScenarioRunner::new(&settings, cancel_on_interrupt());
    let result = runner.merge_triple(&triple)?;

    match output {
        Some(path) => {
            printer::write_merged_file(&result, path)?;
        }
        None if settings.output.print_on_screen => printer::print_on_screen(&result)?,
        None => {}
    }

    let mut stats = Statistics::new(triple.relative.display().to_string());
    stats.record(&result);
    record_statistics(cli, &settings, &stats)
}

fn default_extension(lang: Language) -> &'static str {
    match lang {
        Language::Java => "java",
        Language::Rust => "rs",
        Language::JavaScript => "js",
        Language::TypeScript => "ts",
        Language::Python => "py",
        Language::Go => "go",
        Language::C => "c",
        Language::Cpp => "cpp",
    }
}

async fn cmd_dirs(
    cli: &Cli,
    roots: Revisions<PathBuf>,
    output: Option<&Path>,
    merge: &MergeArgs,
    run: &RunArgs,
) -> anyhow::Result<()> {
    let settings = load_settings(cli, merge, Some(run))?;
    let runner = ScenarioRunner::new(&settings, cancel_on_interrupt());
    let scenario = runner.run_dirs(roots).await?;

    match output {
        Some(dir) => {
            printer::write_scenario(&scenario, dir)?;
        }
        None if settings.output.print_on_screen => printer::print_scenario(&scenario)?,
        None => {}
    }

    report(&scenario);
    record_statistics(cli, &settings, &Statistics::from_scenario(&scenario))
}

async fn cmd_revisions(
    cli: &Cli,
    manifests: &[PathBuf],
    merge: &MergeArgs,
    run: &RunArgs,
) -> anyhow::Result<()> {
    let settings = load_settings(cli, merge, Some(run))?;

    // Every manifest is validated before any merging starts.
    let manifests = manifests
        .iter()
        .map(|path| Manifest::load(path))
        .collect::<Result<Vec<_>, _>>()?;

    let runner = ScenarioRunner::new(&settings, cancel_on_interrupt());
    for manifest in &manifests {
        let scenario = runner.run_manifest(manifest).await?;
        printer::write_scenario(&scenario, &manifest.merged_dir())?;
        report(&scenario);
        record_statistics(cli, &settings, &Statistics::from_scenario(&scenario))?;
    }

    Ok(())
}

fn report(scenario: &Scenario) {
    eprintln!(
        "{}: {} files, {} conflicts, {} errors",
        scenario.name(),
        scenario.triples.len(),
        scenario.conflicts(),
        scenario.errors()
    );
    for triple in &scenario.triples {
        if let Some(e) = &triple.error {
            eprintln!("  failed: {} ({e})", triple.relative.display());
        } else if triple.has_conflicts() {
            eprintln!("  conflicts: {}", triple.relative.display());
        }
    }
}

fn cmd_init(cli: &Cli) -> anyhow::Result<()> {
    let path = settings_path(cli);
    if path.exists() {
        println!("Configuration already exists at {}", path.display());
        return Ok(());
    }
    Settings::default().save(&path)?;
    println!("Configuration saved to {}", path.display());
    Ok(())
}

fn cmd_status(cli: &Cli) -> anyhow::Result<()> {
    println!("semimerge Status");
    println!("================");
    println!();

    match Settings::load(&settings_path(cli)) {
        Ok(settings) => {
            println!("Configuration: Found");
            print_settings(&settings);
        }
        Err(_) => {
            println!("Configuration: Not found (using defaults)");
            println!("  Run 'semimerge init' to write one");
            print_settings(&Settings::default());
        }
    }

    println!();
    println!("Log: {}", log_file(&cli.data_dir.join("logs")).display());

    let languages: Vec<_> = Language::ALL.iter().map(|l| l.as_str()).collect();
    println!("Grammars: {}", languages.join(", "));

    match Statistics::read_all(&statistics_path(cli)) {
        Ok(all) if !all.is_empty() => {
            println!();
            println!("Recorded runs: {}", all.len());
            if let Some(last) = all.last() {
                println!("  Last ({}): {}", last.label, last.summary());
            }
        }
        _ => {
            println!();
            println!("Recorded runs: none");
        }
    }

    Ok(())
}

fn print_settings(settings: &Settings) {
    println!("  Structural merge: {}", settings.merge.structural);
    println!("  Show base: {}", settings.merge.show_base);
    println!(
        "  Labels: {} / {} / {}",
        settings.merge.left_label, settings.merge.base_label, settings.merge.right_label
    );
    if !settings.merge.languages.is_empty() {
        println!("  Languages: {:?}", settings.merge.languages);
    }
    println!("  Jobs: {}", settings.run.jobs());
    println!("  On error: {:?}", settings.run.fatal_policy);
}
