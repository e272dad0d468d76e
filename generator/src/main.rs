use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use irsmith::config::{normalize_feature_flags, GenConfig};
use irsmith::pipeline::{self, Artifact};

#[derive(Parser, Debug)]
#[command(
    name = "irsmith",
    version,
    about = "Generates random, verified IR programs for compiler testing",
    after_help = "Feature toggles also accept the GCC spelling: -fstats, -fno-loops, ..."
)]
struct Cli {
    /// Random seed (time-derived when absent)
    #[arg(long)]
    seed: Option<u64>,

    /// Output identifier; files are named <STRID>.ir, <STRID>.cfg.dot, ...
    #[arg(long, default_value = "main")]
    strid: String,

    /// Number of functions, including the entry function
    #[arg(long, default_value_t = 1)]
    nfuncs: usize,

    /// Maximum call sites per function
    #[arg(long = "func-maxcalls", default_value_t = 2)]
    func_maxcalls: usize,

    /// Topology growth steps per function
    #[arg(long, default_value_t = 5)]
    cfg_size: usize,

    /// Target node count per block
    #[arg(long, default_value_t = 10)]
    cfb_size: usize,

    /// Print generation statistics
    #[arg(long, overrides_with = "no_stats")]
    stats: bool,
    #[arg(long, overrides_with = "stats", hide = true)]
    no_stats: bool,

    /// Allow recursive call cycles (default on)
    #[arg(long, overrides_with = "no_func_cycles")]
    func_cycles: bool,
    #[arg(long, overrides_with = "func_cycles", hide = true)]
    no_func_cycles: bool,

    /// Generate calls between functions (default on)
    #[arg(long, overrides_with = "no_func_calls")]
    func_calls: bool,
    #[arg(long, overrides_with = "func_calls", hide = true)]
    no_func_calls: bool,

    /// Allow self-loops in the control flow (default on)
    #[arg(long, overrides_with = "no_loops")]
    loops: bool,
    #[arg(long, overrides_with = "loops", hide = true)]
    no_loops: bool,

    /// Generate loads, stores and allocations (default on)
    #[arg(long, overrides_with = "no_memory")]
    memory: bool,
    #[arg(long, overrides_with = "memory", hide = true)]
    no_memory: bool,

    /// Additional artifacts to write (repeatable or comma-separated)
    #[arg(long, value_enum, value_delimiter = ',')]
    emit: Vec<Artifact>,

    /// Directory for output files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Read an .ir file back, verify it and exit
    #[arg(long, value_name = "FILE")]
    check: Option<PathBuf>,

    /// Log generation phases
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> GenConfig {
        GenConfig {
            seed: self.seed.unwrap_or_else(time_seed),
            strid: self.strid.clone(),
            n_funcs: self.nfuncs,
            max_calls: self.func_maxcalls,
            cfg_size: self.cfg_size,
            cfb_size: self.cfb_size,
            stats: self.stats && !self.no_stats,
            func_cycles: self.func_cycles || !self.no_func_cycles,
            func_calls: self.func_calls || !self.no_func_calls,
            loops: self.loops || !self.no_loops,
            memory: self.memory || !self.no_memory,
        }
    }
}

fn time_seed() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn init_tracing(verbose: bool) {
    use std::io::IsTerminal;
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let args = normalize_feature_flags(std::env::args());
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version are not failures.
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_tracing(cli.verbose);

    // ── Read back ──
    if let Some(path) = &cli.check {
        return match pipeline::check_file(path) {
            Ok(read) => {
                println!(
                    "{}: ok ({} functions, seed {})",
                    path.display(),
                    read.graphs.len(),
                    read.seed
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("irsmith: error: {e}");
                ExitCode::from(1)
            }
        };
    }

    // ── Generate ──
    let config = cli.config();
    if cli.verbose {
        eprintln!("irsmith: seed = {}", config.seed);
        eprintln!("irsmith: strid = {}", config.strid);
    }
    let generated = match pipeline::generate(&config) {
        Ok(g) => g,
        Err(e) => {
            match e.code() {
                Some(code) => eprintln!("irsmith: generator defect [{code}] (seed {}): {e}", config.seed),
                None => eprintln!("irsmith: error: {e}"),
            }
            return ExitCode::from(1);
        }
    };

    // ── Write ──
    match pipeline::write_artifacts(&generated, &cli.emit, &cli.output_dir) {
        Ok(paths) => {
            if cli.verbose {
                for p in &paths {
                    eprintln!("irsmith: wrote {}", p.display());
                }
            }
        }
        Err(e) => {
            eprintln!("irsmith: error: {e}");
            return ExitCode::from(1);
        }
    }

    if generated.config.stats {
        print!("{}", generated.stats);
    }
    ExitCode::SUCCESS
}
