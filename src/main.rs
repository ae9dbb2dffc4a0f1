use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use needledrop::catalog::{self, Catalog};
use needledrop::config::{AppConfig, EngineParams};
use needledrop::engine::IdentificationEngine;
use needledrop::fingerprint::FeatureFrame;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "needledrop", version, about = "Real-time track identification engine")]
struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Engine parameter file (TOML); overrides the config-file parameters
    #[arg(long, global = true)]
    params: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded tick stream against a catalog and report lock activity
    Identify {
        /// Catalog JSON file (defaults to config file catalog_path)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Tick stream JSON file (array of feature frames)
        #[arg(long)]
        ticks: PathBuf,

        /// Print the final summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Score a single feature frame and print the ranked candidates
    Score {
        /// Catalog JSON file (defaults to config file catalog_path)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Feature frame JSON file
        #[arg(long)]
        tick: PathBuf,

        /// Number of candidates to print
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Validate a catalog file and show a load summary
    Stats {
        /// Catalog JSON file (defaults to config file catalog_path)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = AppConfig::load();

    // Resolve parameters: explicit file > config file > built-in defaults
    let params = match &cli.params {
        Some(path) => {
            EngineParams::from_file(path).context("Failed to load engine parameters")?
        }
        None => match config.params.validate() {
            Ok(()) => config.params.clone(),
            Err(e) => {
                log::warn!("Config-file parameters invalid: {e}. Using defaults.");
                EngineParams::default()
            }
        },
    };

    match cli.command {
        Commands::Identify {
            catalog,
            ticks,
            json,
        } => {
            let catalog_path = resolve_catalog(catalog, &config)?;
            run_identify(params, &catalog_path, &ticks, json)
        }
        Commands::Score {
            catalog,
            tick,
            limit,
        } => {
            let catalog_path = resolve_catalog(catalog, &config)?;
            run_score(params, &catalog_path, &tick, limit)
        }
        Commands::Stats { catalog } => {
            let catalog_path = resolve_catalog(catalog, &config)?;
            run_stats(&catalog_path)
        }
    }
}

/// Resolve the catalog path: CLI arg > config file.
fn resolve_catalog(cli_arg: Option<PathBuf>, config: &AppConfig) -> Result<PathBuf> {
    if let Some(path) = cli_arg {
        return Ok(path);
    }
    if let Some(path) = &config.catalog_path {
        return Ok(path.clone());
    }
    bail!("No catalog given. Pass --catalog or set catalog_path in the config file.");
}

fn load_engine(params: EngineParams, catalog_path: &Path) -> Result<IdentificationEngine> {
    let sources = catalog::load_sources(catalog_path)
        .with_context(|| format!("Failed to load catalog {}", catalog_path.display()))?;
    let mut engine = IdentificationEngine::new(params);
    let summary = engine.load_database(sources);
    println!(
        "Catalog: {} tracks ({} rejected)",
        summary.loaded, summary.rejected
    );
    if summary.loaded == 0 {
        log::warn!("catalog has no usable tracks; every tick will report no match");
    }
    Ok(engine)
}

fn read_frames(path: &Path) -> Result<Vec<FeatureFrame>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read tick stream {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse tick stream {}", path.display()))
}

fn run_identify(
    params: EngineParams,
    catalog_path: &Path,
    ticks_path: &Path,
    json: bool,
) -> Result<()> {
    let mut engine = load_engine(params, catalog_path)?;
    let frames = read_frames(ticks_path)?;
    if frames.is_empty() {
        println!("Tick stream is empty — nothing to do.");
        return Ok(());
    }

    let pb = ProgressBar::new(frames.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap()
        .progress_chars("#>-"),
    );

    let mut locked_id: Option<String> = None;
    let mut acquisitions = 0usize;
    let mut switches = 0usize;
    let mut confident_ticks = 0usize;

    for (i, frame) in frames.iter().enumerate() {
        let result = engine.identify(frame);
        if result.is_confident {
            confident_ticks += 1;
        }

        let now_id = result.current_track.as_ref().map(|c| c.track.id.clone());
        if now_id != locked_id {
            match (&locked_id, &result.current_track) {
                (None, Some(current)) => {
                    acquisitions += 1;
                    pb.println(format!(
                        "tick {:>5}: locked onto {} — {} ({:.2})",
                        i, current.track.artist, current.track.name, result.confidence_score
                    ));
                }
                (Some(_), Some(current)) => {
                    switches += 1;
                    pb.println(format!(
                        "tick {:>5}: switched to {} — {} ({:.2})",
                        i, current.track.artist, current.track.name, result.confidence_score
                    ));
                }
                (Some(_), None) => {
                    pb.println(format!("tick {i:>5}: lock released"));
                }
                (None, None) => {}
            }
            locked_id = now_id;
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let stats = engine.stats();
    if json {
        let summary = serde_json::json!({
            "ticks": frames.len(),
            "acquisitions": acquisitions,
            "switches": switches,
            "confident_ticks": confident_ticks,
            "mean_input_confidence": engine.mean_input_confidence(),
            "final": stats,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!();
        println!("Ticks processed:       {}", frames.len());
        println!("Lock acquisitions:     {acquisitions}");
        println!("Lock switches:         {switches}");
        println!("Confident ticks:       {confident_ticks}");
        println!(
            "Recent input quality:  {:.2}",
            engine.mean_input_confidence()
        );
        match stats.current_match_name {
            Some(name) => println!("Final lock:            {name} ({:.2})", stats.confidence),
            None => println!("Final lock:            none"),
        }
    }
    Ok(())
}

fn run_score(
    params: EngineParams,
    catalog_path: &Path,
    tick_path: &Path,
    limit: usize,
) -> Result<()> {
    let mut engine = load_engine(params, catalog_path)?;
    let contents = std::fs::read_to_string(tick_path)
        .with_context(|| format!("Failed to read frame {}", tick_path.display()))?;
    let frame: FeatureFrame = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse frame {}", tick_path.display()))?;

    let candidates = engine.score_frame(&frame);
    if candidates.is_empty() {
        println!("No candidates above the noise floor.");
        return Ok(());
    }

    println!();
    for (rank, candidate) in candidates.iter().take(limit).enumerate() {
        println!(
            "{:>2}. {} — {}  (overall {:.2})",
            rank + 1,
            candidate.track.artist,
            candidate.track.name,
            candidate.overall
        );
        println!(
            "    tempo {:.2}  spectral {:.2}  energy {:.2}  key {:.2}  offset ~{:.0}s",
            candidate.tempo_score,
            candidate.spectral_score,
            candidate.energy_score,
            candidate.key_score,
            candidate.time_offset_secs
        );
        if !candidate.reasons.is_empty() {
            println!("    {}", candidate.reasons.join("; "));
        }
    }
    Ok(())
}

fn run_stats(catalog_path: &Path) -> Result<()> {
    let sources = catalog::load_sources(catalog_path)
        .with_context(|| format!("Failed to load catalog {}", catalog_path.display()))?;
    let total = sources.len();
    let catalog = Catalog::from_sources(sources);

    let with_genre = catalog
        .tracks()
        .iter()
        .filter(|t| t.genre.is_some())
        .count();
    let with_key = catalog.tracks().iter().filter(|t| t.key.is_some()).count();
    let with_energy = catalog
        .tracks()
        .iter()
        .filter(|t| t.energy.is_some())
        .count();

    println!("Catalog: {}", catalog_path.display());
    println!("  Source records:   {total}");
    println!("  Usable tracks:    {}", catalog.len());
    println!("  Rejected:         {}", catalog.rejected());
    if catalog.is_empty() {
        println!("  (no usable tracks — identification will never match)");
        return Ok(());
    }
    println!("  With genre:       {with_genre}");
    println!("  With key:         {with_key}");
    println!("  With energy data: {with_energy}");

    let mut bpms: Vec<f64> = catalog.tracks().iter().map(|t| t.bpm).collect();
    bpms.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    println!(
        "  BPM range:        {:.0}-{:.0} (median {:.0})",
        bpms[0],
        bpms[bpms.len() - 1],
        bpms[bpms.len() / 2]
    );
    Ok(())
}
