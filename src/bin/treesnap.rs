//! # Treesnap CLI - Snapshots for document trees
//!
//! A command-line interface over a file-backed [`MemoryStore`].
//!
//! ## Features
//! - Build a live tree of folders and documents
//! - Snapshot any subtree, bumping only what changed
//! - Restore a subtree to any earlier label
//! - Inspect histories, compare generations and verify snapshots
//!
//! ## Usage
//! ```bash
//! # Create a store with one root folder
//! treesnap init --title workspace
//!
//! # Add a document under it (ids may be shortened to a unique prefix)
//! treesnap add 3f2a "Quarterly report"
//!
//! # Snapshot the root, then go back to it later
//! treesnap snapshot 3f2a -m "before review"
//! treesnap restore 3f2a 0.1
//!
//! # Compare two generations
//! treesnap diff 3f2a 0.1 0.2
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use treesnap::{
    in_transaction, BumpPolicy, LiveId, LiveNode, MemoryStore, NodeTemplate, Snapshot,
    SnapshotConfig, SnapshotDiff, SnapshotError, SnapshotVerifier, SnapshotableNode,
    VersionLabel, VersionedTreeStore,
};

const CONFIG_FILE: &str = "config.json";

/// Treesnap CLI - hierarchical snapshots of a versioned document tree
#[derive(Parser)]
#[command(name = "treesnap")]
#[command(version)]
#[command(about = "Snapshot and restore trees of folders and documents")]
#[command(long_about = None)]
struct Cli {
    /// Store directory (defaults to .treesnap)
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a store with an empty root folder
    Init {
        /// Title of the root folder
        #[arg(long, default_value = "root")]
        title: String,

        /// Overwrite an existing store
        #[arg(long)]
        force: bool,
    },

    /// Add a folder or document under a folder
    Add {
        /// Parent folder id
        parent: String,

        /// Title of the new node
        title: String,

        /// Create a folder instead of a document
        #[arg(long)]
        folder: bool,

        /// Create the node without versioning
        #[arg(long)]
        unversioned: bool,
    },

    /// Set a property on a live node
    Set {
        /// Node id
        id: String,

        /// Property name
        key: String,

        /// Property value
        value: String,
    },

    /// Delete a live node and its subtree
    Rm {
        /// Node id
        id: String,
    },

    /// Snapshot a subtree
    #[command(alias = "snap")]
    Snapshot {
        /// Root of the subtree
        id: String,

        /// Bump changed nodes by a major version
        #[arg(long)]
        major: bool,

        /// Checkin comment
        #[arg(short, long)]
        message: Option<String>,

        /// Show progress
        #[arg(long)]
        progress: bool,
    },

    /// Restore a subtree to an earlier label
    #[command(alias = "rs")]
    Restore {
        /// Root of the subtree
        id: String,

        /// Label to restore, e.g. 0.2
        label: String,

        /// Show progress
        #[arg(long)]
        progress: bool,
    },

    /// Show the live tree with version labels
    Show {
        /// Root of the subtree
        id: String,
    },

    /// Show a snapshot of a subtree
    Tree {
        /// Root of the subtree
        id: String,

        /// Label to show (defaults to the current base version)
        #[arg(short, long)]
        label: Option<String>,

        /// Print the canonical one-line form
        #[arg(long)]
        canonical: bool,
    },

    /// List the versions of a node
    #[command(alias = "log")]
    History {
        /// Node id
        id: String,
    },

    /// Compare two labels of a subtree
    Diff {
        /// Root of the subtree
        id: String,

        /// Older label
        from: String,

        /// Newer label
        to: String,
    },

    /// Verify a snapshot
    Verify {
        /// Root of the subtree
        id: String,

        /// Label to verify (defaults to the current base version)
        #[arg(short, long)]
        label: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("treesnap=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        let message = match e.downcast_ref::<SnapshotError>() {
            Some(err) => err.user_message(),
            None => format!("{:#}", e),
        };
        eprintln!("{}: {}", "Error".red().bold(), message);
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> anyhow::Result<()> {
    let store_path = cli.store.unwrap_or_else(|| PathBuf::from(".treesnap"));

    match cli.command {
        Commands::Init { title, force } => cmd_init(&store_path, title, force),
        Commands::Add { parent, title, folder, unversioned } => {
            cmd_add(&store_path, &parent, title, folder, unversioned)
        }
        Commands::Set { id, key, value } => cmd_set(&store_path, &id, key, value),
        Commands::Rm { id } => cmd_rm(&store_path, &id),
        Commands::Snapshot { id, major, message, progress } => {
            cmd_snapshot(&store_path, &id, major, message, progress)
        }
        Commands::Restore { id, label, progress } => cmd_restore(&store_path, &id, &label, progress),
        Commands::Show { id } => cmd_show(&store_path, &id),
        Commands::Tree { id, label, canonical } => cmd_tree(&store_path, &id, label.as_deref(), canonical),
        Commands::History { id } => cmd_history(&store_path, &id),
        Commands::Diff { id, from, to } => cmd_diff(&store_path, &id, &from, &to),
        Commands::Verify { id, label } => cmd_verify(&store_path, &id, label.as_deref()),
    }
}

/// Create the store directory, its configuration and a root folder
fn cmd_init(store_path: &Path, title: String, force: bool) -> anyhow::Result<()> {
    if store_path.join("metadata.json").exists() && !force {
        bail!("Store already initialized. Use --force to reinitialize.");
    }

    println!("{}", "Initializing treesnap store...".blue().bold());

    let store = MemoryStore::new();
    let root = in_transaction(&store, |tx| store.create_root(tx.token(), NodeTemplate::folder(&title)))?;
    store.save(store_path)?;
    SnapshotConfig::default().save(&store_path.join(CONFIG_FILE))?;

    println!("{} Initialized store", "✓".green().bold());
    println!("  Store: {}", store_path.display().to_string().cyan());
    println!("  Root: {} {}", root.short().yellow().bold(), title.cyan());
    println!("\nNext steps:");
    println!("  - Add a document: {}", format!("treesnap add {} \"My document\"", root.short()).yellow());
    println!("  - Take a snapshot: {}", format!("treesnap snapshot {}", root.short()).yellow());

    Ok(())
}

fn cmd_add(
    store_path: &Path,
    parent: &str,
    title: String,
    folder: bool,
    unversioned: bool,
) -> anyhow::Result<()> {
    let store = open_store(store_path)?;
    let parent = resolve_id(&store, parent)?;

    let mut template = if folder {
        NodeTemplate::folder(&title)
    } else {
        NodeTemplate::leaf(&title)
    };
    if unversioned {
        template = template.unversioned();
    }
    let id = in_transaction(&store, |tx| store.create_live_child(tx.token(), &parent, template))?;
    store.save(store_path)?;

    println!(
        "{} Added {} {} under {}",
        "✓".green().bold(),
        if folder { "folder" } else { "document" },
        id.short().yellow().bold(),
        parent.short().yellow()
    );
    Ok(())
}

fn cmd_set(store_path: &Path, id: &str, key: String, value: String) -> anyhow::Result<()> {
    let store = open_store(store_path)?;
    let id = resolve_id(&store, id)?;

    let node = in_transaction(&store, |tx| {
        let mut properties = store.live_node(tx.token(), &id)?.properties;
        properties.insert(key.clone(), value.clone());
        store.write_properties(tx.token(), &id, properties)?;
        store.live_node(tx.token(), &id)
    })?;
    store.save(store_path)?;

    println!(
        "{} Set {} on {} {}",
        "✓".green().bold(),
        key.cyan(),
        id.short().yellow().bold(),
        node.version_label().dimmed()
    );
    Ok(())
}

fn cmd_rm(store_path: &Path, id: &str) -> anyhow::Result<()> {
    let store = open_store(store_path)?;
    let id = resolve_id(&store, id)?;

    in_transaction(&store, |tx| store.delete_live(tx.token(), &id))?;
    store.save(store_path)?;

    println!("{} Removed {} and its subtree", "✓".green().bold(), id.short().yellow().bold());
    Ok(())
}

/// Snapshot a subtree
///
/// Only nodes whose own properties or child lists changed since their base
/// version are checked in; everything else is reused.
fn cmd_snapshot(
    store_path: &Path,
    id: &str,
    major: bool,
    message: Option<String>,
    show_progress: bool,
) -> anyhow::Result<()> {
    let store = open_store(store_path)?;
    let id = resolve_id(&store, id)?;
    let mut config = load_config(store_path)?;
    if message.is_some() {
        config.checkin_comment = message.clone();
    }
    let policy = if major { BumpPolicy::Major } else { config.default_bump_policy };

    println!("{}", "Creating snapshot...".blue().bold());

    let start = Instant::now();
    let progress = show_progress.then(|| spinner("Checking in changed nodes..."));

    let node = SnapshotableNode::new(&store, id)?.with_config(config);
    let (snapshot, stats) = node.create_snapshot_with_stats(policy)?;

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    let duration = start.elapsed();

    println!(
        "{} Created snapshot {} of {}",
        "✓".green().bold(),
        snapshot.label().to_string().yellow().bold(),
        snapshot.title().cyan()
    );
    if let Some(msg) = &message {
        println!("  Message: {}", msg.cyan());
    }
    println!("  Version: {}", snapshot.id().short().cyan());
    println!("  Nodes: {}", stats.nodes_visited.to_string().cyan());
    println!("  Time: {}", format_duration(duration).to_string().cyan());

    if stats.is_noop() {
        println!("  {}", "No changes since the last snapshot".dimmed());
    } else {
        println!("  Checked in: {} nodes", stats.versions_created.to_string().yellow());
    }
    if stats.nodes_skipped > 0 {
        println!("  Skipped: {} unversioned nodes", stats.nodes_skipped.to_string().dimmed());
    }

    store.save(store_path)?;
    Ok(())
}

/// Restore a subtree to an earlier label
///
/// The live subtree ends up structurally identical to the snapshot: nodes it
/// did not contain are removed, missing ones are recreated, children are put
/// back in their recorded order.
fn cmd_restore(store_path: &Path, id: &str, label: &str, show_progress: bool) -> anyhow::Result<()> {
    let store = open_store(store_path)?;
    let id = resolve_id(&store, id)?;
    let label: VersionLabel = label.parse()?;
    let config = load_config(store_path)?;

    println!(
        "{} {} to {}",
        "Restoring".blue().bold(),
        id.short().yellow(),
        label.to_string().yellow().bold()
    );

    let start = Instant::now();
    let progress = show_progress.then(|| spinner("Restoring nodes..."));

    let (node, stats) = SnapshotableNode::new(&store, id)?.with_config(config).restore(&label)?;

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    println!("{} Restoration complete", "✓".green().bold());
    println!("  Node: {} {}", node.title().unwrap_or_default().cyan(), node.version_label().dimmed());
    println!("  Updated: {}", stats.nodes_updated.to_string().cyan());
    println!("  Recreated: {}", stats.nodes_recreated.to_string().cyan());
    println!("  Moved: {}", stats.nodes_moved.to_string().cyan());
    println!("  Removed: {}", stats.nodes_removed.to_string().yellow());
    println!("  Reordered: {}", stats.nodes_reordered.to_string().cyan());
    println!("  Time: {}", format_duration(start.elapsed()).to_string().cyan());

    store.save(store_path)?;
    Ok(())
}

/// Print the live subtree with version labels
fn cmd_show(store_path: &Path, id: &str) -> anyhow::Result<()> {
    let store = open_store(store_path)?;
    let id = resolve_id(&store, id)?;

    let lines = in_transaction(&store, |tx| {
        let mut lines = Vec::new();
        collect_live(tx.store(), tx.token(), &id, 0, &mut lines)?;
        Ok(lines)
    })?;

    for (depth, node) in lines {
        let label = node.version_label();
        let label = if node.versionable {
            label.yellow()
        } else {
            "unversioned".dimmed()
        };
        println!(
            "{}{} {} {} {}",
            "  ".repeat(depth),
            if node.is_folder() { "▸".blue() } else { "·".normal() },
            node.title().unwrap_or_default(),
            label,
            node.id.short().dimmed()
        );
    }
    Ok(())
}

fn collect_live(
    store: &MemoryStore,
    tx: &treesnap::TxToken,
    id: &LiveId,
    depth: usize,
    lines: &mut Vec<(usize, LiveNode)>,
) -> treesnap::Result<()> {
    let node = store.live_node(tx, id)?;
    let children = node.children().to_vec();
    lines.push((depth, node));
    for child in &children {
        collect_live(store, tx, child, depth + 1, lines)?;
    }
    Ok(())
}

/// Print a snapshot of the subtree
fn cmd_tree(store_path: &Path, id: &str, label: Option<&str>, canonical: bool) -> anyhow::Result<()> {
    let store = open_store(store_path)?;
    let id = resolve_id(&store, id)?;
    let snapshot = open_snapshot(&store, &id, label)?;

    if canonical {
        println!("{}", snapshot.to_canonical_string()?);
        return Ok(());
    }

    println!(
        "{} {} {}",
        "Snapshot".blue().bold(),
        snapshot.label().to_string().yellow().bold(),
        snapshot.id().short().dimmed()
    );
    println!();
    print_snapshot(&snapshot, 0)?;
    Ok(())
}

fn print_snapshot(snapshot: &Snapshot<'_, MemoryStore>, depth: usize) -> treesnap::Result<()> {
    let node = snapshot.document();
    println!(
        "{}{} {} {}",
        "  ".repeat(depth),
        if node.is_folder() { "▸".blue() } else { "·".normal() },
        snapshot.title(),
        snapshot.label().to_string().yellow()
    );
    for child in snapshot.children() {
        print_snapshot(&child?, depth + 1)?;
    }
    Ok(())
}

/// List every version of a node, oldest first
fn cmd_history(store_path: &Path, id: &str) -> anyhow::Result<()> {
    let store = open_store(store_path)?;
    let id = resolve_id(&store, id)?;
    let (node, history) = in_transaction(&store, |tx| {
        Ok((store.live_node(tx.token(), &id)?, store.history(tx.token(), &id)?))
    })?;

    if history.is_empty() {
        println!("{}", "No versions yet.".yellow());
        return Ok(());
    }

    println!(
        "{} {}",
        "History of".blue().bold(),
        node.title().unwrap_or_default().cyan()
    );
    println!();

    for version_id in &history {
        let version = store.version_node(version_id)?;
        let marker = if node.base_version.as_ref() == Some(version_id) {
            "*".green().bold()
        } else {
            " ".normal()
        };
        print!("{} {} ", marker, version.label.to_string().yellow().bold());
        print!("{} ", version.id.short().dimmed());
        print!("{} ", version.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed());
        if let Some(comment) = &version.comment {
            print!("{}", comment.cyan());
        }
        println!();
    }
    Ok(())
}

/// Compare two labels of the same subtree
fn cmd_diff(store_path: &Path, id: &str, from: &str, to: &str) -> anyhow::Result<()> {
    let store = open_store(store_path)?;
    let id = resolve_id(&store, id)?;
    let old = open_snapshot(&store, &id, Some(from))?;
    let new = open_snapshot(&store, &id, Some(to))?;

    let diff = SnapshotDiff::between(&old, &new)?;

    println!(
        "{} {} → {}",
        "Comparing".blue().bold(),
        old.label().to_string().yellow(),
        new.label().to_string().yellow()
    );
    println!();

    for entry in &diff.added {
        println!("  {} {}", "+".green().bold(), entry.title.green());
    }
    for entry in &diff.removed {
        println!("  {} {}", "-".red().bold(), entry.title.red());
    }
    for entry in &diff.bumped {
        let old_label = entry.old_label.map(|l| l.to_string()).unwrap_or_default();
        let new_label = entry.new_label.map(|l| l.to_string()).unwrap_or_default();
        println!(
            "  {} {} {} → {}",
            "~".yellow().bold(),
            entry.title.yellow(),
            old_label.dimmed(),
            new_label
        );
    }

    println!(
        "\n{} added, {} removed, {} bumped, {} unchanged",
        diff.stats.added.to_string().green(),
        diff.stats.removed.to_string().red(),
        diff.stats.bumped.to_string().yellow(),
        diff.stats.unchanged
    );
    Ok(())
}

/// Check a snapshot's structural integrity
fn cmd_verify(store_path: &Path, id: &str, label: Option<&str>) -> anyhow::Result<()> {
    let store = open_store(store_path)?;
    let id = resolve_id(&store, id)?;
    let snapshot = open_snapshot(&store, &id, label)?;

    println!(
        "{} {}",
        "Verifying snapshot".blue().bold(),
        snapshot.label().to_string().yellow()
    );

    let report = in_transaction(&store, |tx| SnapshotVerifier::new(tx).verify(&snapshot))?;

    println!("\n{}", "Verification Report:".bold());
    println!("  Nodes checked: {}", report.nodes_checked);
    let check = |ok: bool| if ok { "✓ Valid".green() } else { "✗ Invalid".red() };
    println!("  References: {}", check(report.missing_versions.is_empty()));
    println!("  Acyclic: {}", check(report.cycles.is_empty()));
    println!("  Siblings: {}", check(report.duplicate_children.is_empty()));
    println!("  Histories: {}", check(report.history_errors.is_empty()));
    println!(
        "  Verification time: {}",
        format_duration(Duration::from_millis(report.duration_ms))
    );

    for problem in report.duplicate_children.iter().chain(&report.history_errors) {
        println!("  - {}", problem.yellow());
    }

    if !report.is_valid() {
        bail!("{}", report.summary());
    }
    Ok(())
}

fn open_store(store_path: &Path) -> anyhow::Result<MemoryStore> {
    if !store_path.join("metadata.json").exists() {
        bail!("Not a treesnap store. Run 'treesnap init' first.");
    }
    MemoryStore::open(store_path).with_context(|| format!("opening store at {}", store_path.display()))
}

fn load_config(store_path: &Path) -> anyhow::Result<SnapshotConfig> {
    let path = store_path.join(CONFIG_FILE);
    SnapshotConfig::load_or_default(&path).with_context(|| format!("loading {}", path.display()))
}

/// Resolve a possibly shortened live id
fn resolve_id(store: &MemoryStore, prefix: &str) -> anyhow::Result<LiveId> {
    Ok(in_transaction(store, |tx| store.find_live_by_prefix(tx.token(), prefix))?)
}

/// Snapshot of `id` at `label`, or at its current base version
fn open_snapshot<'s>(
    store: &'s MemoryStore,
    id: &LiveId,
    label: Option<&str>,
) -> anyhow::Result<Snapshot<'s, MemoryStore>> {
    let version = match label {
        Some(label) => {
            let label: VersionLabel = label.parse()?;
            in_transaction(store, |tx| store.resolve_label(tx.token(), id, &label))?.ok_or_else(
                || SnapshotError::LabelNotFound {
                    live_id: id.to_string(),
                    label: label.to_string(),
                },
            )?
        }
        None => in_transaction(store, |tx| store.get_last_version(tx.token(), id))?
            .with_context(|| format!("{} has no snapshot yet", id.short()))?,
    };
    Ok(Snapshot::open(store, &version)?)
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}
