use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use glacier::batch;
use glacier::logging;
use glacier::{
    Cluster, ConsolidateMode, Consolidator, FileStore, FuzzyHasher, GlacierConfig, Scanner, SignatureStore,
    SimilarityEngine, SimilarityMetric, SniffingClassifier,
};

const GRID_COLUMNS: usize = 4;
const FALLBACK_DB_NAME: &str = "signatures.db";

#[derive(Parser)]
#[command(name = "glacier", about = "Content-defined fuzzy hashing and similarity search")]
struct Cli {
    /// Verbose logging (RUST_LOG overrides)
    #[arg(long, global = true)]
    debug: bool,
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Similarity metric: jaccard or sequence
    #[arg(long, global = true)]
    metric: Option<SimilarityMetric>,
    /// Worker threads for parallel hashing
    #[arg(long, global = true)]
    threads: Option<usize>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the signature of a file
    Hash { file: PathBuf },
    /// Compare two files
    Compare { a: PathBuf, b: PathBuf },
    /// Hash every file under a folder into a signature database
    Build {
        folder: PathBuf,
        /// Database file (default: <folder>.db)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Match a file, or every file under a folder, against a database
    Scan {
        path: PathBuf,
        #[arg(long)]
        db: PathBuf,
        /// Minimum similarity to report, in (0, 1]
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Fold near-duplicate signatures in a database into masters
    Consolidate {
        #[arg(long)]
        db: PathBuf,
        /// Minimum similarity to the cluster seed, in (0, 1]
        #[arg(long)]
        threshold: Option<f64>,
        /// Apply every cluster without asking
        #[arg(long)]
        auto: bool,
        /// Existing master database; records matching it are left alone
        #[arg(long)]
        exist: Option<PathBuf>,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<GlacierConfig> {
    let mut config = match &cli.config {
        Some(path) => GlacierConfig::from_json_file(path)?,
        None => GlacierConfig::default(),
    };
    if let Some(metric) = cli.metric {
        config.hasher.metric = metric;
    }
    match &cli.command {
        Commands::Scan {
            threshold: Some(t), ..
        } => config.scan_threshold = *t,
        Commands::Consolidate { threshold, auto, .. } => {
            if let Some(t) = threshold {
                config.consolidate.threshold = *t;
            }
            if *auto {
                config.consolidate.mode = ConsolidateMode::Auto;
            }
        }
        _ => {}
    }
    config.validate()?;
    Ok(config)
}

/// `<folder name>.db` beside the folder, so `build .` names the database
/// after the current directory.
fn default_db_path(folder: &Path) -> anyhow::Result<PathBuf> {
    let folder = folder
        .canonicalize()
        .with_context(|| format!("Failed to canonicalize path: {}", folder.display()))?;
    Ok(match (folder.parent(), folder.file_name()) {
        (Some(parent), Some(name)) => {
            let mut file_name = name.to_os_string();
            file_name.push(".db");
            parent.join(file_name)
        }
        _ => PathBuf::from(FALLBACK_DB_NAME),
    })
}

/// Ask on stdin whether to commit a cluster. Anything but y/yes rejects it.
fn confirm_cluster(cluster: &Cluster) -> bool {
    println!("\nProposed master: {}", cluster.name);
    println!("  Members ({}):", cluster.members.len());
    for member in &cluster.members {
        println!("    {}", member.id);
    }
    println!("  Wildcards: {}/{}", cluster.master.wildcard_count(), cluster.master.len());
    println!("{}", cluster.master.grid(GRID_COLUMNS));
    print!("Accept this cluster? [y/N] ");
    if let Err(e) = std::io::stdout().flush() {
        warn!(error = %e, "failed to flush prompt");
    }

    let mut answer = String::new();
    match std::io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(e) => {
            warn!(error = %e, "failed to read answer; rejecting cluster");
            false
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.debug);

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure worker threads")?;
    }

    let config = load_config(&cli)?;
    let hasher = FuzzyHasher::new(config.hasher.clone())?.with_classifier(SniffingClassifier::default());
    let engine = SimilarityEngine::new(config.hasher.metric);

    match cli.command {
        Commands::Hash { file } => {
            let signature = hasher
                .calculate_signature_file(&file)
                .with_context(|| format!("Failed to hash {}", file.display()))?;
            println!("Signature of {} ({} blocks):", file.display(), signature.len());
            println!("{}", signature.grid(GRID_COLUMNS));
        }
        Commands::Compare { a, b } => {
            let sig_a = hasher
                .calculate_signature_file(&a)
                .with_context(|| format!("Failed to hash {}", a.display()))?;
            let sig_b = hasher
                .calculate_signature_file(&b)
                .with_context(|| format!("Failed to hash {}", b.display()))?;

            println!("Signature of {}:", a.display());
            println!("{}", sig_a.grid(GRID_COLUMNS));
            println!("\nSignature of {}:", b.display());
            println!("{}", sig_b.grid(GRID_COLUMNS));
            println!(
                "\nSimilarity: {:.2}% ({})",
                hasher.compare_signatures(&sig_a, &sig_b) * 100.0,
                engine.metric()
            );
        }
        Commands::Build { folder, db } => {
            let db = match db {
                Some(db) => db,
                None => default_db_path(&folder)?,
            };
            println!("Building signature database...");
            println!("  Folder: {}", folder.display());
            println!("  Database: {}", db.display());

            let start = Instant::now();
            let mut store = FileStore::open(&db)
                .with_context(|| format!("Failed to open database: {}", db.display()))?;
            let summary = batch::build_database(&folder, &mut store, &hasher).await?;
            store
                .flush()
                .with_context(|| format!("Failed to write database: {}", db.display()))?;
            let elapsed = start.elapsed();

            println!("\nDatabase built successfully!");
            println!("  Files hashed: {}", summary.files_hashed);
            println!("  Files failed: {}", summary.files_failed);
            println!("  Records in database: {}", summary.records_total);
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
        Commands::Scan { path, db, .. } => {
            let store = FileStore::open_existing(&db)
                .with_context(|| format!("Failed to open database: {}", db.display()))?;
            let records = store.get_all()?;
            let scanner = Scanner::new(engine, config.scan_threshold)?;
            info!(records = records.len(), threshold = scanner.threshold(), "scanning");

            if path.is_dir() {
                let (scans, summary) = batch::scan_folder(&path, &records, &scanner, &hasher).await?;
                for scan in &scans {
                    match &scan.best {
                        Some(m) => println!("{} -> {} ({:.2}%)", scan.relative_path, m.id, m.score * 100.0),
                        None => println!("{} -> no match", scan.relative_path),
                    }
                }
                println!("\nScan summary:");
                println!("  Total files: {}", summary.total);
                println!("  Matched: {}", summary.matched);
                println!("  Unmatched: {}", summary.unmatched);
                println!("  Errors: {}", summary.errors);
                println!("  Match rate: {:.2}%", summary.match_rate());
            } else {
                let signature = hasher
                    .calculate_signature_file(&path)
                    .with_context(|| format!("Failed to hash {}", path.display()))?;
                let matches = scanner.scan(&signature, &records);
                if matches.is_empty() {
                    println!(
                        "No match for {} at or above {:.2}%",
                        path.display(),
                        scanner.threshold() * 100.0
                    );
                } else {
                    println!("Matches for {}:", path.display());
                    for m in &matches {
                        let kind = if m.is_master { " [master]" } else { "" };
                        println!("  {}: {:.2}%{}", m.id, m.score * 100.0, kind);
                    }
                }
            }
        }
        Commands::Consolidate { db, exist, .. } => {
            let mut store = FileStore::open_existing(&db)
                .with_context(|| format!("Failed to open database: {}", db.display()))?;
            let reference = match &exist {
                Some(path) => FileStore::open_existing(path)
                    .and_then(|existing| existing.get_all())
                    .with_context(|| format!("Failed to open existing master database: {}", path.display()))?,
                None => Vec::new(),
            };
            let consolidator = Consolidator::new(config.consolidate, engine)?;
            println!("Consolidating {} signatures...", store.len()?);
            if !reference.is_empty() {
                println!("  Checking against {} existing signatures", reference.len());
            }

            let start = Instant::now();
            let (plan, summary) = consolidator.run_against(&mut store, &reference, confirm_cluster)?;
            let elapsed = start.elapsed();

            if consolidator.config().mode == ConsolidateMode::Auto {
                for cluster in &plan.clusters {
                    println!("  {} <- {} signatures", cluster.name, cluster.members.len());
                }
            }
            println!("\nConsolidation complete!");
            println!("  Masters created: {}", summary.masters_created);
            println!("  Signatures merged: {}", summary.signatures_merged);
            println!("  Clusters rejected: {}", summary.clusters_rejected);
            println!("  Singletons: {}", summary.singletons);
            if exist.is_some() {
                println!("  Signatures ignored (matched existing master): {}", summary.ignored);
            }
            println!("  Records in database: {}", store.len()?);
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
    }

    Ok(())
}
