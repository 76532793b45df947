use std::path::PathBuf;
use std::time::Instant;
use std::{env, fs, process};

use allele_base::utils;
use allele_base::{IngestionPipeline, PipelineParams};
use getopts::Options;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

//-----------------------------------------------------------------------------

fn main() -> Result<(), String> {
    let start_time = Instant::now();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // Parse arguments.
    let config = Config::new();

    // Check the resources before touching the output.
    let pipeline = IngestionPipeline::from_config_file(&config.config_file, &config.data_dir, config.params.clone())
        .map_err(|x| x.to_string())?;

    // Check if the database already exists.
    if utils::file_exists(&config.db_file) {
        if config.overwrite {
            warn!("Overwriting database {}", config.db_file);
            fs::remove_file(&config.db_file).map_err(|x| x.to_string())?;
        } else {
            return Err(format!("Database {} already exists", config.db_file));
        }
    }

    // Build the database.
    let report = pipeline.build(&config.db_file).map_err(|x| x.to_string())?;
    if let Some(size) = utils::file_size(&config.db_file) {
        info!("Database size: {}", size);
    }
    let failed = report.failed_sources();
    if !failed.is_empty() {
        warn!("Re-run the build to retry {} failed resources", failed.len());
    }

    let end_time = Instant::now();
    let seconds = end_time.duration_since(start_time).as_secs_f64();
    info!("Used {:.3} seconds", seconds);

    Ok(())
}

//-----------------------------------------------------------------------------

struct Config {
    pub config_file: String,
    pub data_dir: PathBuf,
    pub db_file: String,
    pub params: PipelineParams,
    pub overwrite: bool,
}

impl Config {
    pub fn new() -> Config {
        let args: Vec<String> = env::args().collect();
        let program = args[0].clone();

        let mut opts = Options::new();
        opts.optflag("h", "help", "print this help");
        opts.optopt("d", "data-dir", "directory for cached resource files (default: .)", "DIR");
        let threads_desc = format!("number of worker threads (default: {})", PipelineParams::DEFAULT_THREADS);
        opts.optopt("t", "threads", &threads_desc, "INT");
        let block_desc = format!("entries per database transaction (default: {})", PipelineParams::DEFAULT_BLOCK_SIZE);
        opts.optopt("b", "block-size", &block_desc, "INT");
        opts.optopt("r", "records-per-run", "records sorted in memory before writing a temporary file", "INT");
        opts.optopt("w", "work-dir", "directory for temporary files (default: system temp)", "DIR");
        opts.optflag("", "download", "download missing resource files");
        opts.optflag("", "overwrite", "overwrite the database file if it exists");
        let matches = match opts.parse(&args[1..]) {
            Ok(m) => m,
            Err(f) => {
                eprintln!("{}", f);
                process::exit(1);
            }
        };

        let header = format!("Usage: {} [options] resources.toml output.db", program);
        if matches.opt_present("h") {
            eprint!("{}", opts.usage(&header));
            process::exit(0);
        }

        let mut params = PipelineParams::default();
        if let Some(s) = matches.opt_str("t") {
            params.threads = parse_or_exit(&s, "--threads");
        }
        if let Some(s) = matches.opt_str("b") {
            params.block_size = parse_or_exit(&s, "--block-size");
        }
        if let Some(s) = matches.opt_str("r") {
            params.records_per_run = parse_or_exit(&s, "--records-per-run");
        }
        params.work_dir = matches.opt_str("w").map(PathBuf::from);
        params.download = matches.opt_present("download");

        let data_dir = PathBuf::from(matches.opt_str("d").unwrap_or(String::from(".")));
        let (config_file, db_file) = match (matches.free.first(), matches.free.get(1)) {
            (Some(config_file), Some(db_file)) => (config_file.clone(), db_file.clone()),
            _ => {
                eprint!("{}", opts.usage(&header));
                process::exit(1);
            }
        };
        let overwrite = matches.opt_present("overwrite");

        Config {
            config_file,
            data_dir,
            db_file,
            params,
            overwrite,
        }
    }
}

fn parse_or_exit(value: &str, option: &str) -> usize {
    match value.parse::<usize>() {
        Ok(value) => value,
        Err(f) => {
            eprintln!("{}: {}", option, f);
            process::exit(1);
        }
    }
}

//-----------------------------------------------------------------------------
