// Tickgrid CLI entry point.
//
// Usage:
//   tickgrid check  <DIR>                     compile and report counts
//   tickgrid export <DIR> -o out.mid          write a Standard MIDI File
//   tickgrid play   <DIR> [--from-measure N]  play to the log in real time,
//                         [--no-watch]        rebuilding when DIR changes
//
// Global flags: --config FILE (EngineConfig JSON), --seed N (seque seed),
// -v / -q (log verbosity).

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tickgrid_music::config::EngineConfig;
use tickgrid_music::player::BuildMode;
use tickgrid_music::scheduler::Scheduler;
use tickgrid_music::smf::write_smf;
use tickgrid_music::source::{SOURCE_FILES, SongSource};
use tickgrid_music::table::MessageTable;
use tickgrid_music::transport::{LogSink, Transport};
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser)]
#[command(name = "tickgrid")]
#[command(about = "Compile chord and rhythm grids to MIDI", long_about = None)]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seed for generative phrases (default: from config, else the clock)
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// More logging (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Errors only
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a song directory and report what it produces
    Check {
        /// Song directory
        dir: PathBuf,
    },
    /// Export a song directory to a Standard MIDI File
    Export {
        /// Song directory
        dir: PathBuf,

        /// Output MIDI file
        #[arg(short, long, default_value = "output.mid")]
        output: PathBuf,
    },
    /// Play a song directory against the log output
    Play {
        /// Song directory
        dir: PathBuf,

        /// Measure to start from (0-based)
        #[arg(long, default_value = "0")]
        from_measure: u32,

        /// Do not rebuild when the directory changes
        #[arg(long)]
        no_watch: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = match (cli.quiet, cli.verbose) {
        (true, _) => LevelFilter::ERROR,
        (false, 0) => LevelFilter::INFO,
        (false, 1) => LevelFilter::DEBUG,
        (false, _) => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    config.seque_seed = cli.seed.or(config.seque_seed).or_else(clock_seed);
    info!(seed = ?config.seque_seed, "seque seed");

    match cli.command {
        Commands::Check { dir } => check(&dir, &config)?,
        Commands::Export { dir, output } => export(&dir, &output, config)?,
        Commands::Play {
            dir,
            from_measure,
            no_watch,
        } => play(&dir, from_measure, !no_watch, config)?,
    }
    Ok(())
}

fn clock_seed() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_nanos() as u64)
}

fn check(dir: &Path, config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let source = SongSource::load_dir(dir)?;
    let mut composition = source.compile(config)?;
    let table = MessageTable::build(&mut composition, 0, BuildMode::Export)?;
    println!("Song: {}", source.song.name);
    println!("Key: {} {}", composition.song.tonality.key, composition.song.tonality.mode);
    println!("Tempo: {} BPM", composition.tempo_bpm);
    println!("Pattern instances: {}", composition.song.instances().len());
    println!("Length: {} ticks", composition.song.length_ticks());
    for player in &composition.players {
        println!(
            "  ch{:<2} {:<5} program {:>3}, {} phrase(s)",
            player.channel(),
            player.phrase_type().to_string(),
            player.program().number(),
            player.phrases().len()
        );
    }
    println!("Messages: {}", table.len());
    Ok(())
}

fn export(dir: &Path, output: &Path, config: EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let source = SongSource::load_dir(dir)?;
    let resolution = config.resolution()?;
    let scheduler = Scheduler::load(&source, config)?;
    let tempo_bpm = scheduler.snapshot().tempo_bpm;
    let transport = Transport::new(scheduler, LogSink)?;
    let stream = transport.export()?;
    write_smf(&stream, tempo_bpm, resolution, output)?;
    println!("Wrote {} messages to {}", stream.len(), output.display());
    Ok(())
}

/// Forward change events for notation files in `dir` to `tx`.
fn watch(dir: &Path, tx: mpsc::Sender<()>) -> notify::Result<notify::RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            let relevant = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
                && event.paths.iter().any(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| SOURCE_FILES.iter().any(|f| *f == n))
                });
            if relevant {
                let _ = tx.send(());
            }
        }
        Err(e) => warn!(error = %e, "watch error"),
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

fn play(
    dir: &Path,
    from_measure: u32,
    live: bool,
    config: EngineConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = SongSource::load_dir(dir)?;
    let resolution = config.resolution()?;
    let scheduler = Scheduler::load(&source, config)?;

    let (tx, rx) = mpsc::channel();
    let _watcher = if live {
        info!(dir = %dir.display(), "watching for changes");
        Some(watch(dir, tx)?)
    } else {
        None
    };

    let mut transport = Transport::new(scheduler.clone(), LogSink)?;
    let start = resolution.measures(from_measure);
    transport.start(start);

    let quanta_per_quarter = f64::from(resolution.ticks_per_quarter() / resolution.quantum());
    let mut deadline = Instant::now();
    while !transport.is_finished() {
        if rx.try_recv().is_ok() {
            // Collapse a burst of save events into one rebuild.
            while rx.try_recv().is_ok() {}
            let dir = dir.to_path_buf();
            scheduler.request_rebuild_with(move || SongSource::load_dir(&dir));
        }
        transport.advance();
        let bpm = f64::from(scheduler.snapshot().tempo_bpm.max(1));
        deadline += Duration::from_secs_f64(60.0 / bpm / quanta_per_quarter);
        if let Some(wait) = deadline.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
    }
    transport.stop();
    scheduler.wait_idle();
    Ok(())
}
