//! ipyvim - send code from Vim to a running IPython/Jupyter kernel
//!
//! ipyvim runs as a Vim job. The plugin script forwards `:IPython...`
//! commands over a JSON channel; ipyvim submits code to the kernel through
//! runtimelib and renders what the kernel prints into a scratch
//! buffer in the preview window.
//!
//! # Commands
//!
//! | Command | Action |
//! |---------|--------|
//! | `:IPython [name] [--profile p]` | Connect to a kernel |
//! | `:IPythonLast` | Connect to the kernel cpyvke started last |
//! | `:IPyRun {code}` | Run a piece of code |
//! | `:IPyRunFile` | `%run` the current file |
//! | `:IPyRunLine[Dedent]` | Run the cursor line |
//! | `:[range]IPyRunRange[Dedent]` | Run a range of lines |
//! | `:IPyRefresh[!]` | Pull pending kernel output |

mod ansi;
mod classify;
mod config;
mod dispatch;
mod kernel;
mod prompt;
mod render;
mod session;
mod surface;
mod vim;

use std::env;
use std::io;
use std::path::PathBuf;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::Config;
use crate::kernel::{JupyterConnector, Resolver};
use crate::session::Session;
use crate::vim::{VimChannel, VimSurface};

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the log filter
const LOG_ENV: &str = "IPYVIM_LOG";

/// Command line options
#[derive(Debug, Default)]
struct Args {
    /// Config file instead of ~/.ipyvim/config.toml
    config: Option<PathBuf>,
    /// Log filter, e.g. `debug` or `ipyvim::kernel=trace`
    log_level: Option<String>,
    /// Write the default config and exit
    write_config: bool,
}

fn print_version() {
    eprintln!("ipyvim {}", VERSION);
}

fn print_help() {
    eprintln!("ipyvim {} - IPython kernel client for Vim", VERSION);
    eprintln!();
    eprintln!("Usage: ipyvim [OPTIONS]");
    eprintln!();
    eprintln!("Started by plugin/ipyvim.vim as a Vim job speaking the JSON");
    eprintln!("channel protocol on stdin/stdout.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <PATH>   Config file (default: ~/.ipyvim/config.toml)");
    eprintln!("  --log-level <FILTER>  Log filter (default: ${} or info)", LOG_ENV);
    eprintln!("  --write-config        Write the default config file and exit");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Log file: ~/.ipyvim/ipyvim.log");
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = env::args().collect();
    let mut parsed = Args::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-c" | "--config" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing config path".to_string());
                }
                parsed.config = Some(PathBuf::from(&args[i]));
            }
            "--log-level" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing log filter".to_string());
                }
                parsed.log_level = Some(args[i].clone());
            }
            "--write-config" => {
                parsed.write_config = true;
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(parsed)
}

/// Log to ~/.ipyvim/ipyvim.log; stdout belongs to the Vim channel
fn init_logging(level: Option<&str>) {
    let log_path = config::app_dir()
        .map(|dir| dir.join("ipyvim.log"))
        .unwrap_or_else(|| PathBuf::from("ipyvim.log"));

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    let filter = level
        .map(String::from)
        .or_else(|| env::var(LOG_ENV).ok())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    if let Some(file) = log_file {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    if args.write_config {
        let path = args
            .config
            .or_else(Config::get_config_path)
            .context("could not determine the home directory")?;
        if path.exists() {
            anyhow::bail!("{} already exists", path.display());
        }
        Config::default().save_to(&path)?;
        eprintln!("Wrote {}", path.display());
        return Ok(());
    }

    init_logging(args.log_level.as_deref());
    info!("ipyvim {} starting", VERSION);

    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let resolver = Resolver::from_env(&config.kernel);
    let connector = JupyterConnector::new(config.kernel.connect_timeout());
    let mut session = Session::new(config, resolver, Box::new(connector));

    let channel = VimChannel::new(io::stdin().lock(), io::stdout().lock());
    let mut surface = VimSurface::new(channel);
    vim::serve(&mut session, &mut surface).context("vim channel failed")?;

    info!("ipyvim exiting");
    Ok(())
}
