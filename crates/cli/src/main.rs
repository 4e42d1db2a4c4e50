mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use b3_lib::BuildConfig;

use crate::output::{OutputFormat, print_error};

/// b3 - Build rules declared in Lua across a package tree
#[derive(Parser)]
#[command(name = "b3")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Increase log verbosity (-v info, -vv debug, -vvv trace)
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  /// Workspace root (default: nearest directory with a B3ROOT marker)
  #[arg(long, global = true)]
  root: Option<PathBuf>,

  /// Ignore and do not write the compiled statement cache
  #[arg(long, global = true)]
  no_cache: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build rules and their dependencies
  Build {
    /// Addresses to build, relative to the workspace root
    #[arg(required = true)]
    targets: Vec<String>,

    /// Only report rules that produced artifacts
    #[arg(short, long)]
    quiet: bool,

    /// Print the rules in execution order instead of building
    #[arg(long)]
    list: bool,

    /// Maximum number of rules executing at once
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Build even if a dependency on a capability has no candidate for the consumer's language
    #[arg(long)]
    allow_unresolved_forks: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,

    /// Arguments passed to genrule commands as $1..$n
    #[arg(last = true)]
    passthrough: Vec<String>,
  },

  /// Show rules and their dependency closure without building
  Query {
    /// Addresses to query, relative to the workspace root
    #[arg(required = true)]
    targets: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Remove the output directory
  Clean {
    /// Also remove compiled statement caches
    #[arg(long)]
    cache: bool,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  match run(cli) {
    Ok(code) => code,
    Err(err) => {
      print_error(&format!("{:#}", err));
      ExitCode::FAILURE
    }
  }
}

fn init_tracing(verbose: u8) {
  let default = match verbose {
    0 => "warn",
    1 => "info",
    2 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
  let mut config = BuildConfig::from_env().context("Invalid environment configuration")?;
  if let Some(root) = cli.root {
    config.root = root;
  }
  if cli.no_cache {
    config.use_cache = false;
  }

  match cli.command {
    Commands::Build {
      targets,
      quiet,
      list,
      jobs,
      allow_unresolved_forks,
      format,
      passthrough,
    } => {
      if let Some(jobs) = jobs {
        anyhow::ensure!(jobs > 0, "--jobs must be at least 1");
        config.jobs = jobs;
      }
      config.allow_unresolved_forks |= allow_unresolved_forks;
      let options = cmd::BuildOptions {
        quiet,
        list,
        format,
        passthrough,
      };
      cmd::cmd_build(config, &targets, &options)
    }
    Commands::Query { targets, format } => cmd::cmd_query(config, &targets, format),
    Commands::Clean { cache } => cmd::cmd_clean(&config, cache),
  }
}
