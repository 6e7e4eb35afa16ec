use clap::Parser;
use colored::*;
use log::{info, warn};
use std::io::{self, Write};
use std::process;

use sectoolbox_core::{ProbeRegistry, ToolboxConfig};

mod console;

use console::Console;

#[derive(Parser, Debug)]
#[command(
    name = "sectoolbox",
    version,
    about = "Interactive toolbox of HTTP security probes",
    after_help = "\x1b[1;36mEXAMPLES:\x1b[0m
  Interactive menu:               sectoolbox
  List probes and exit:           sectoolbox --list
  Custom results directory:       sectoolbox --results-dir ./out
  Debug logging:                  sectoolbox -v
  Settings from a file:           sectoolbox -c toolbox.json"
)]
pub struct Args {
    #[arg(short = 'c', long, help = "JSON config file (resultsDir, verbose)")]
    pub config: Option<String>,

    #[arg(long, help = "Directory where CSV/JSON results are written")]
    pub results_dir: Option<String>,

    #[arg(short = 'v', long, default_value_t = false, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(long, default_value_t = false, help = "Print the available probes and exit")]
    pub list: bool,
}

#[tokio::main]
async fn main() {
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let args = Args::parse();
    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", format!("[!] {:#}", e).red());
            process::exit(1);
        }
    };

    init_logging(config.verbose);
    info!("Starting sectoolbox");

    let probes = ProbeRegistry::builtin().discover();

    if args.list {
        for (i, probe) in probes.iter().enumerate() {
            println!("{}) {} — {}", i + 1, probe.name().bold(), probe.description());
        }
        return;
    }

    if probes.is_empty() {
        warn!("No probes available.");
        return;
    }

    let stdin = io::stdin();
    let mut console = Console::new(stdin.lock(), io::stdout(), config.result_store());
    if let Err(e) = console.run(&probes).await {
        eprintln!("{}", format!("[!] Console error: {}", e).red());
        process::exit(1);
    }
    io::stdout().flush().ok();
}

/// Config file first, then command-line overrides.
fn resolve_config(args: &Args) -> anyhow::Result<ToolboxConfig> {
    let mut config = match args.config {
        Some(ref path) => ToolboxConfig::load(path)?,
        None => ToolboxConfig::default(),
    };
    if let Some(ref dir) = args.results_dir {
        config.results_dir = dir.clone();
    }
    if args.verbose {
        config.verbose = true;
    }
    Ok(config)
}

/// `RUST_LOG` wins; otherwise info, or debug with `-v`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();
}
