use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ltc_core::{
    BranchSet, ModelOptions, UncertaintyKind, collapse_sources, expand_sources, export_json,
    filter_tree, models_with_weights,
};
use ltc_store::{RunConfig, Store, data_dir, database_path};

#[derive(Parser)]
#[command(name = "ltc", about = "Collapse the magnitude-rate branches of seismic source logic trees")]
struct Cli {
    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collapse a zone table across a logic tree
    Collapse {
        /// Zone table (CSV)
        #[arg(long)]
        zones: PathBuf,

        /// Symbolic logic tree (TSV)
        #[arg(long)]
        tree: PathBuf,

        /// Run configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Magnitude bin width, overrides the config file
        #[arg(long)]
        bin_width: Option<f64>,

        /// Write the augmented zone table here
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write a JSON export here
        #[arg(long)]
        json: Option<PathBuf>,

        /// Do not persist the run
        #[arg(long)]
        no_store: bool,

        /// Apply model omission, substitution and validation to the
        /// remaining tree
        #[arg(long)]
        filter_remaining: bool,
    },

    /// List persisted runs
    Runs,

    /// Show the fork breakdown of one zone
    Inspect {
        zone_id: String,

        /// Run id, defaults to the latest run
        #[arg(long)]
        run: Option<String>,
    },

    /// Filter and normalize the weights of a model list
    Weights {
        /// Uncertainty type, e.g. bGRRelative or gmpeModel
        #[arg(long = "type")]
        kind: String,

        #[arg(required = true)]
        models: Vec<String>,

        /// One weight per model, equal weights when omitted
        #[arg(long = "weight")]
        weights: Vec<f64>,

        /// Keep models that fail validation
        #[arg(long)]
        no_validate: bool,
    },

    /// Expand source-specific branch sets into one set per zone
    Expand {
        /// Zone table (CSV) referenced by `applyToSources`
        #[arg(long)]
        zones: PathBuf,

        /// Symbolic logic tree (TSV)
        #[arg(long)]
        tree: PathBuf,
    },

    /// Export a run to a JSON file
    Export {
        path: PathBuf,

        /// Run id, defaults to the latest run
        #[arg(long)]
        run: Option<String>,
    },

    /// Import a JSON export as a new run
    Import { path: PathBuf },
}

fn open_store() -> Result<Store> {
    let path = database_path(&data_dir()).context("failed to create data directory")?;
    Store::open(&path).context("failed to open run store")
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Collapse {
            zones,
            tree,
            config,
            bin_width,
            output,
            json,
            no_store,
            filter_remaining,
        } => cmd_collapse(
            zones,
            tree,
            config.as_deref(),
            *bin_width,
            output.as_deref(),
            json.as_deref(),
            *no_store,
            *filter_remaining,
        ),
        Commands::Runs => cmd_runs(),
        Commands::Inspect { zone_id, run } => cmd_inspect(zone_id, run.as_deref()),
        Commands::Weights {
            kind,
            models,
            weights,
            no_validate,
        } => cmd_weights(kind, models, weights, *no_validate),
        Commands::Expand { zones, tree } => cmd_expand(zones, tree),
        Commands::Export { path, run } => cmd_export(path, run.as_deref()),
        Commands::Import { path } => cmd_import(path),
    }
}

fn format_branch_set(branch_set: &BranchSet) -> String {
    let weights: Vec<String> = branch_set.weights().iter().map(|w| w.to_string()).collect();
    let mut line = format!(
        "{}\t{}\t[{}]",
        branch_set.kind(),
        branch_set.models(),
        weights.join(", ")
    );
    for (key, value) in branch_set.apply_to() {
        line.push_str(&format!("\t{key}={value}"));
    }
    line
}

fn resolve_run(store: &Store, run: Option<&str>) -> Result<uuid::Uuid> {
    match run {
        Some(id) => uuid::Uuid::parse_str(id).with_context(|| format!("invalid run id {id}")),
        None => match store.latest_run().context("failed to list runs")? {
            Some(run) => Ok(run.id),
            None => bail!("no runs stored yet"),
        },
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_collapse(
    zones_path: &Path,
    tree_path: &Path,
    config_path: Option<&Path>,
    bin_width: Option<f64>,
    output: Option<&Path>,
    json: Option<&Path>,
    no_store: bool,
    filter_remaining: bool,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RunConfig::default(),
    };
    if let Some(bin_width) = bin_width {
        config.bin_width = bin_width;
    }

    let zones = ltc_store::read_zone_table(zones_path)
        .with_context(|| format!("failed to read zones {}", zones_path.display()))?;
    let tree = ltc_store::read_tree_tsv(tree_path)
        .with_context(|| format!("failed to read tree {}", tree_path.display()))?;
    let mut outcome =
        collapse_sources(&zones, &tree, &config.collapse_config()).context("collapse failed")?;
    if filter_remaining || config.models.filter_remaining {
        outcome.remaining =
            filter_tree(&outcome.remaining, &config.model_options(), |p| Path::new(p).exists())
                .context("failed to filter remaining tree")?;
    }

    if let Some(path) = output {
        ltc_store::write_zone_table(path, &outcome.zones)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    if let Some(path) = json {
        let exported = export_json(&outcome).context("failed to serialize outcome")?;
        std::fs::write(path, exported)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    println!(
        "collapsed {} zones into {} forks",
        outcome.zones.len(),
        outcome.labels.len()
    );
    if !no_store {
        let store = open_store()?;
        let run = store
            .save_run(&outcome, config.bin_width)
            .context("failed to save run")?;
        println!("run: {run}");
    }

    println!("remaining tree:");
    for branch_set in &outcome.remaining {
        println!("{}", format_branch_set(branch_set));
    }
    Ok(())
}

fn cmd_runs() -> Result<()> {
    let store = open_store()?;
    let runs = store.list_runs().context("failed to list runs")?;
    if runs.is_empty() {
        println!("(no runs)");
        return Ok(());
    }
    for run in runs {
        println!(
            "{}  {}  bin_width={}  zones={}  forks={}",
            run.id,
            run.created_at,
            run.bin_width,
            run.zone_count,
            run.labels.len()
        );
    }
    Ok(())
}

fn cmd_inspect(zone_id: &str, run: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let run = resolve_run(&store, run)?;
    let Some(breakdown) = store
        .load_breakdown(run, zone_id)
        .context("failed to load breakdown")?
    else {
        bail!("zone {zone_id} not found in run {run}");
    };

    println!("zone:    {zone_id}");
    println!("run:     {run}");
    println!("forks:   {}", breakdown.rates.num_forks());
    println!("null:    {}", breakdown.null_forks());
    for (label, weight) in breakdown.labels.iter().zip(&breakdown.weights) {
        println!("  {weight:<6} {label}");
    }
    for (i, mag) in breakdown.magnitudes().iter().enumerate() {
        let row: Vec<String> = breakdown
            .rates
            .row(i)
            .iter()
            .map(|r| format!("{r:.4e}"))
            .collect();
        println!("{mag:.2}  {}", row.join(" "));
    }
    Ok(())
}

fn cmd_weights(kind: &str, models: &[String], weights: &[f64], no_validate: bool) -> Result<()> {
    let options = ModelOptions {
        validate: !no_validate,
        ..ModelOptions::default()
    };
    let weights = (!weights.is_empty()).then_some(weights);
    let pairs = models_with_weights(
        &UncertaintyKind::from(kind),
        models,
        weights,
        &options,
        |p| Path::new(p).exists(),
    )
    .context("failed to weight models")?;

    for (model, weight) in pairs {
        println!("{weight}\t{model}");
    }
    Ok(())
}

fn cmd_expand(zones_path: &Path, tree_path: &Path) -> Result<()> {
    let zones = ltc_store::read_zone_table(zones_path)
        .with_context(|| format!("failed to read zones {}", zones_path.display()))?;
    let tree = ltc_store::read_tree_tsv(tree_path)
        .with_context(|| format!("failed to read tree {}", tree_path.display()))?;

    let file_name = zones_path.file_name();
    let expanded = expand_sources(&tree, |target| {
        let target = Path::new(target);
        (target == zones_path || target.file_name() == file_name).then_some(zones.as_slice())
    })
    .context("failed to expand source-specific branch sets")?;

    for branch_set in &expanded {
        println!("{}", format_branch_set(branch_set));
    }
    Ok(())
}

fn cmd_export(path: &Path, run: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let run = resolve_run(&store, run)?;
    store
        .export_json_file(run, path)
        .context("failed to export run")?;
    println!("exported {run} to {}", path.display());
    Ok(())
}

fn cmd_import(path: &Path) -> Result<()> {
    let store = open_store()?;
    let run = store
        .import_json_file(path)
        .context("failed to import JSON")?;
    let summary = store
        .get_run(run)
        .context("failed to load run after import")?;
    let zones = summary.map(|s| s.zone_count).unwrap_or(0);
    println!("imported {} as {run}. zones={zones}", path.display());
    Ok(())
}
