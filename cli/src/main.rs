mod interactive;

use std::{
    fs::File,
    io::{stdin, stdout, BufWriter, Read, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use cache_sim::{
    config::{CacheConfig, CacheConfigRaw, SnapshotMode},
    sim::Simulator,
    trace::Trace,
};
use clap::{Args, Parser, ValueEnum};

#[cfg(feature = "stat")]
use terminal_size::terminal_size;

/// replay a trace of hex addresses through a set-associative cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    cache: CacheArgs,
    /// File path to trace of hex addresses (stdin when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Enable interactive mode
    #[arg(long)]
    interactive: bool,
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct CacheArgs {
    /// File path to JSON cache configuration (flags take precedence)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Total cache size in bytes
    #[arg(long)]
    cache_bytes: Option<usize>,
    /// Line size in bytes, a power of two
    #[arg(long)]
    line_bytes: Option<u32>,
    /// Lines per set
    #[arg(short = 'w', long = "ways")]
    lines_per_set: Option<usize>,
    /// Number of addresses to read (all when omitted)
    #[arg(short = 'n', long = "count")]
    trace_len: Option<usize>,
    /// When to print the line table
    #[arg(long, value_enum)]
    snapshot: Option<SnapshotArg>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SnapshotArg {
    Never,
    Every,
    OnChange,
}

impl From<SnapshotArg> for SnapshotMode {
    fn from(value: SnapshotArg) -> Self {
        match value {
            SnapshotArg::Never => SnapshotMode::Never,
            SnapshotArg::Every => SnapshotMode::Every,
            SnapshotArg::OnChange => SnapshotMode::OnChange,
        }
    }
}

impl CacheArgs {
    fn resolve(self) -> Result<CacheConfig> {
        let from_file = match &self.config {
            Some(p) => {
                let file = File::open(p)
                    .with_context(|| format!("cannot open config `{}`", p.display()))?;
                CacheConfigRaw::deser(file)
                    .with_context(|| format!("invalid config `{}`", p.display()))?
            }
            None => Default::default(),
        };
        let from_flags = CacheConfigRaw {
            cache_bytes: self.cache_bytes,
            line_bytes: self.line_bytes,
            lines_per_set: self.lines_per_set,
            trace_len: self.trace_len,
            snapshot: self.snapshot.map(Into::into),
        };
        Ok(from_file.merge(from_flags).resolve()?)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::init();
    }
    let config = args.cache.resolve()?;
    let mut sim = Simulator::new(config);
    if args.interactive {
        if let Some(input) = args.input {
            let trace = read_trace(Some(input), config.trace_len())?;
            log::info!("replaying {} addresses before entering.", trace.len());
            sim.run(trace, &mut stdout().lock())?;
        }
        interactive::execute_interactive(&mut sim)?;
    } else {
        let trace = read_trace(args.input, config.trace_len())?;
        log::info!("finished reading trace. # of addresses: {}", trace.len());
        let mut out = BufWriter::new(stdout().lock());
        sim.run(trace, &mut out)?;
        out.flush()?;
        sim.exit_sim();
    }
    let mut out = stdout().lock();
    writeln!(out)?;
    write!(out, "{}", sim.report())?;
    output_stat(&sim);
    Ok(())
}

#[cfg(not(feature = "stat"))]
fn output_stat(_: &Simulator) {}

#[cfg(feature = "stat")]
fn output_stat(sim: &Simulator) {
    let max_width = get_terminal_width().unwrap_or(120) as usize;
    log::info!("statistics:\n{}", sim.collect_stat().view(max_width));
}

#[cfg(feature = "stat")]
fn get_terminal_width() -> Option<u16> {
    terminal_size().map(|(w, _)| w.0.saturating_sub(20))
}

fn read_trace(input: Option<PathBuf>, count: Option<usize>) -> Result<Trace> {
    let mut buf = String::new();
    match input {
        Some(p) => {
            let mut file =
                File::open(&p).with_context(|| format!("cannot open trace `{}`", p.display()))?;
            file.read_to_string(&mut buf)?;
        }
        None => {
            stdin().read_to_string(&mut buf)?;
        }
    }
    Ok(Trace::parse(&buf, count)?)
}
