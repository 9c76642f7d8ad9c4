//! Pulsar command line tool.
//!
//! Loads a manager configuration and either lists the registered modules,
//! checks that every key validates and can be created, or lists the
//! creators exported by a supermodule.

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pulsar_modules::{ManagerConfig, ModuleManager, SupermoduleKind};
use tracing::info;

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "pulsar")]
#[command(about = "Inspect and check pulsar module configurations")]
struct Args {
	/// Verbose logging
	#[arg(short, long, global = true)]
	verbose: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Register every module of a configuration and print the registry
	List {
		#[arg(value_name = "CONFIG")]
		config: PathBuf,
	},
	/// Validate options and create one instance of every key
	Check {
		#[arg(value_name = "CONFIG")]
		config: PathBuf,
	},
	/// Print the module names a shared-library supermodule exports
	Inspect {
		#[arg(value_name = "PATH")]
		path: String,
	},
}

fn load(config: &Path) -> Result<ModuleManager, Box<dyn std::error::Error>> {
	let config = ManagerConfig::from_file(config)?;
	let manager = ModuleManager::new();
	manager.load_config(&config)?;
	Ok(manager)
}

fn run(command: Command) -> Result<bool, Box<dyn std::error::Error>> {
	match command {
		Command::List { config } => {
			let manager = load(&config)?;
			manager.print(&mut io::stdout().lock())?;
			Ok(true)
		}
		Command::Check { config } => {
			let manager = load(&config)?;
			let report = manager.test_all()?;
			for (key, issues) in &report {
				println!("{key}: {issues}");
			}
			info!(keys = manager.size(), failed = report.len(), "check finished");
			Ok(report.is_empty())
		}
		Command::Inspect { path } => {
			let manager = ModuleManager::new();
			for name in manager.load_supermodule(SupermoduleKind::Native, &path)? {
				println!("{name}");
			}
			Ok(true)
		}
	}
}

fn main() -> ExitCode {
	let args = Args::parse();

	let subscriber = tracing_subscriber::fmt()
		.with_max_level(if args.verbose {
			tracing::Level::DEBUG
		} else {
			tracing::Level::INFO
		})
		.with_writer(io::stderr)
		.finish();
	if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
		eprintln!("pulsar: {e}");
		return ExitCode::FAILURE;
	}

	match run(args.command) {
		Ok(true) => ExitCode::SUCCESS,
		Ok(false) => ExitCode::FAILURE,
		Err(e) => {
			eprintln!("pulsar: {e}");
			ExitCode::FAILURE
		}
	}
}
