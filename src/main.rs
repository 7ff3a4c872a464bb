use clap::Parser;
use color_eyre::eyre;
use std::path::PathBuf;
use std::time::Instant;

use tilesim::config::Config;
use tilesim::Simulator;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Options {
    /// Program image directory to load before running.
    #[arg(value_name = "PROGRAM_DIR")]
    pub program_dir: Option<PathBuf>,

    /// Stats output file
    #[arg(short = 'o', long = "stats", value_name = "STATS_OUT")]
    pub stats_out_file: Option<PathBuf>,

    /// Turn debugging information on
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub debug: u8,

    #[clap(long = "columns", help = "chip grid width in tiles")]
    pub grid_columns: Option<u32>,

    #[clap(long = "rows", help = "chip grid height in tiles")]
    pub grid_rows: Option<u32>,

    #[clap(long = "cores-per-tile", help = "cores per tile")]
    pub num_cores: Option<usize>,

    #[clap(long = "banks-per-tile", help = "memory banks per tile")]
    pub num_banks: Option<usize>,

    #[clap(long = "cycles", help = "maximum cycles to run before giving up", default_value_t = 1_000_000)]
    pub max_cycles: u64,
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let start = Instant::now();
    let options = Options::parse();
    #[cfg(debug_assertions)]
    std::env::set_var("RUST_BACKTRACE", "full");

    if std::env::var("RUST_LOG").is_err() {
        let level = match options.debug {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        std::env::set_var("RUST_LOG", level);
    }
    tilesim::init_logging();

    let mut config = Config::default();
    if let Some(columns) = options.grid_columns {
        config.grid_columns = columns;
    }
    if let Some(rows) = options.grid_rows {
        config.grid_rows = rows;
    }
    if let Some(num_cores) = options.num_cores {
        config.tile.num_cores = num_cores;
    }
    if let Some(num_banks) = options.num_banks {
        config.tile.num_memories = num_banks;
    }

    let mut sim = Simulator::new(config)?;

    if let Some(program_dir) = options.program_dir.as_ref() {
        log::warn!("program loading from {program_dir:?} is not yet implemented; running an empty chip");
    }

    let ran = sim.run_until_idle(options.max_cycles)?;
    log::info!("ran {ran} cycles in {:?}", start.elapsed());

    if let Some(stats_out_file) = options.stats_out_file.as_ref() {
        log::warn!("stats reporting to {stats_out_file:?} is not yet implemented");
    }

    Ok(())
}
