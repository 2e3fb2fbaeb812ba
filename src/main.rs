use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use dvdvr::extract::{ExtractStats, Extractor};
use dvdvr::{Program, VrIfo};

/// Identify and optionally extract the recorded programs from a DVD-VR disc.
///
/// Reads the VR_MANGR.IFO management file and prints what is on the disc.
/// When the VR_MOVIE.VRO data file is also given, each program is copied
/// into its own .vob file in the current directory, honoring any splits or
/// deletes made on the recorder.
#[derive(Parser)]
#[command(name = "dvd-vr", version)]
struct Args {
    /// The VR_MANGR.IFO metadata file
    ifo: PathBuf,

    /// The VR_MOVIE.VRO data file; programs are extracted when given
    vro: Option<PathBuf>,

    /// Process only this program (1-based)
    #[arg(short, long, value_name = "N")]
    program: Option<usize>,

    /// Output basename for extracted files; "-" streams to stdout
    #[arg(short, long, value_name = "NAME")]
    name: Option<String>,

    /// Suppress the progress display
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let ifo = VrIfo::open(&args.ifo)
        .with_context(|| format!("cannot read {}", args.ifo.display()))?;

    let to_stdout = args.name.as_deref() == Some("-");
    let extracting = args.vro.is_some();

    // keep the report separable from an extraction streamed to stdout
    let mut report: Box<dyn Write> = if to_stdout && extracting {
        Box::new(io::stderr())
    } else {
        Box::new(io::stdout())
    };

    print_disc(&mut report, &ifo)?;

    let programs: Vec<usize> = match args.program {
        Some(n) => {
            ifo.program(n)?; // out of range is fatal
            vec![n]
        }
        None => (1..=ifo.program_count()).collect(),
    };

    let mut extractor = match &args.vro {
        Some(path) => Some(Extractor::new(
            File::open(path).with_context(|| format!("cannot open {}", path.display()))?,
        )),
        None => None,
    };
    let run_start = SystemTime::now();

    for &n in &programs {
        let program = ifo.program(n)?;
        print_program(&mut report, &ifo, n, program)?;

        let Some(extractor) = extractor.as_mut() else {
            continue;
        };

        let stats = if to_stdout {
            let mut stdout = io::stdout().lock();
            Some(extractor.extract_to(program, &mut stdout, |_, _| {})?)
        } else {
            let path = output_path(program, n, args.name.as_deref());
            let touch = touch_time(program.timestamp, run_start, n);
            let bar = progress_bar(program.vobu_map.vobu_sizes.len(), args.quiet);
            let result = extractor.extract_to_file(program, &path, touch, |done, _| {
                bar.set_position(done as u64)
            });
            bar.finish_and_clear();
            match result {
                Ok((written, stats)) => {
                    writeln!(report, "extracted: {}", written.display())?;
                    Some(stats)
                }
                Err(e) if e.is_per_program() => {
                    eprintln!("skipping program {n}: {e}");
                    None
                }
                Err(e) => return Err(e).context(format!("extracting program {n}")),
            }
        };

        if let Some(stats) = stats {
            report_stats(&mut report, program, stats)?;
        }
    }

    Ok(())
}

fn print_disc(w: &mut dyn Write, ifo: &VrIfo) -> io::Result<()> {
    writeln!(w, "format: DVD-VR V{}.{}", ifo.version.0, ifo.version.1)?;
    writeln!(w, "text_encoding: {}", ifo.text_encoding)?;
    if let Some(label) = ifo.disc_label1() {
        writeln!(w, "disc_label1: {label}")?;
    }
    if let Some(label) = ifo.disc_label2() {
        writeln!(w, "disc_label2: {label}")?;
    }

    let multiple = ifo.vob_formats.len() > 1;
    for (i, format) in ifo.vob_formats.iter().enumerate() {
        writeln!(w)?;
        if multiple {
            writeln!(w, "VOB format {}...", i + 1)?;
        }
        writeln!(w, "tv_system: {}", format.video.tv_system)?;
        match format.video.resolution {
            Some((h, v)) => writeln!(w, "resolution: {h}x{v}")?,
            None => writeln!(w, "resolution: unknown (please report)")?,
        }
        writeln!(w, "video_format: {}", format.video.compression)?;
        writeln!(w, "aspect_ratio: {}", format.video.aspect)?;
        writeln!(w, "audio_channels: {}", format.audio0.channels)?;
        writeln!(w, "audio_coding: {}", format.audio0.coding)?;
        if format.audio_streams > 1 {
            writeln!(w, "audio_channels2: {}", format.audio1.channels)?;
            writeln!(w, "audio_coding2: {}", format.audio1.coding)?;
        }
    }

    writeln!(w)?;
    writeln!(w, "Number of programs: {}", ifo.program_count())
}

fn print_program(w: &mut dyn Write, ifo: &VrIfo, n: usize, program: &Program) -> io::Result<()> {
    writeln!(w)?;
    writeln!(w, "program: {n}")?;
    if let Some(set) = ifo.find_label_set(n) {
        if let Some(label) = set.label(ifo.text_encoding) {
            writeln!(w, "label: {label}")?;
        }
        if let Some(title) = set.title_if_distinct(ifo.text_encoding) {
            writeln!(w, "title: {title}")?;
        }
    }
    if let Some(ts) = program.timestamp {
        writeln!(w, "date: {}", ts.format("%Y-%m-%d %H:%M:%S"))?;
    }
    if ifo.vob_formats.len() > 1 {
        writeln!(w, "vob format: {}", program.format_id)?;
    }
    writeln!(w, "size: {}", program.size_bytes())
}

fn report_stats(w: &mut dyn Write, program: &Program, stats: ExtractStats) -> io::Result<()> {
    if stats.error_vobus > 0 {
        writeln!(
            w,
            "copied: {} ({} of {} VOBUs unreadable, skipped)",
            stats.bytes_written, stats.error_vobus, stats.vobus
        )
    } else if stats.bytes_written != program.size_bytes() {
        writeln!(w, "copied: {}", stats.bytes_written)
    } else {
        Ok(())
    }
}

/// Output naming: an explicit basename wins, otherwise the recording
/// timestamp, otherwise the program number. Collisions are resolved by the
/// extraction engine.
fn output_path(program: &Program, n: usize, basename: Option<&str>) -> PathBuf {
    match basename {
        Some(base) => PathBuf::from(format!("{base}_{n}.vob")),
        None => match program.timestamp {
            Some(ts) => PathBuf::from(format!("{}.vob", ts.format("%Y-%m-%d_%H.%M.%S"))),
            None => PathBuf::from(format!("program_{n}.vob")),
        },
    }
}

/// The time to stamp onto an output file: the recording time, or the run
/// start disambiguated by program number when the disc stores none.
fn touch_time(timestamp: Option<NaiveDateTime>, run_start: SystemTime, n: usize) -> SystemTime {
    timestamp
        .and_then(|ts| ts.and_local_timezone(Local).earliest())
        .map(SystemTime::from)
        .unwrap_or_else(|| run_start + Duration::from_secs(n as u64))
}

fn progress_bar(units: usize, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(units as u64);
    if let Ok(style) = ProgressStyle::with_template("[{bar:20}] {percent:>3}%") {
        bar.set_style(style.progress_chars(".. "));
    }
    bar
}
