//! tftoolbox CLI entry point.
//!
//! This binary provides the command-line interface for tftoolbox.

use clap::Parser;
use std::error::Error;
use std::io::IsTerminal;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tftoolbox::cli::{Cli, Commands, ConfigCommand, LogFormat, WorkspaceCommand};
use tftoolbox::parser::HclConfigParser;
use tftoolbox::project::{FsProjectInspector, ProjectInspector};
use tftoolbox::reporter::Reporter;
use tftoolbox::runner::{IacCli, ProcessIacCli};
use tftoolbox::watch::FileWatcher;
use tftoolbox::{Config, ReconcileService};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.quiet, cli.log_format);

    // Run the appropriate command
    match run(cli).await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");

            // Print error with full chain
            eprintln!("Error: {e}");

            let mut source = e.source();
            if source.is_some() {
                eprintln!("\nCaused by:");
                let mut i = 0;
                while let Some(cause) = source {
                    eprintln!("  {i}: {cause}");
                    source = cause.source();
                    i += 1;
                }
            }

            let code = e
                .downcast_ref::<tftoolbox::ToolboxError>()
                .map_or(1, tftoolbox::ToolboxError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn init_logging(verbose: u8, quiet: bool, format: LogFormat) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        // First try to use RUST_LOG from environment, otherwise use verbose flag
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let base_level = match verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            };
            // tftoolbox at the requested level, everything else at warn
            EnvFilter::new(format!("warn,tftoolbox={base_level}"))
        })
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    // Config commands work on files of their own, even if the active one is broken
    if let Commands::Config(command) = cli.command {
        return run_config_command(command);
    }

    // Load configuration
    let mut config = load_config(&cli)?;
    config.merge_global_args(cli.tool, cli.binary.as_ref());
    tracing::debug!(tool = %config.iac.tool, binary = %config.binary().display(), "Configuration loaded");

    match cli.command {
        Commands::Watch(args) => {
            config.merge_watch_args(&args);
            config.validate()?;

            if !config.reconcile.any_enabled() {
                tracing::warn!("Automatic init and module fetch are both disabled, events will be ignored");
            }

            let root = args.root.canonicalize().unwrap_or(args.root);
            let service = ReconcileService::from_config(Arc::new(config));
            let watcher = FileWatcher::new(&root)?;

            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                }
            };

            println!("Watching {} (Ctrl-C to stop)", root.display());
            let handled = watcher.run(&service, shutdown).await;
            tracing::info!(events = handled, "Watch finished");

            Ok(ExitCode::SUCCESS)
        }

        Commands::Init(args) => {
            let runner = ProcessIacCli::new(config.binary());

            let progress = indicatif::ProgressBar::new_spinner();
            if let Ok(style) =
                indicatif::ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
            {
                progress.set_style(style);
            }
            progress.set_message(format!("Running {} init", config.iac.tool.provider().name()));
            progress.enable_steady_tick(std::time::Duration::from_millis(100));

            let outcomes = tftoolbox::init_projects(&args.root, &config, &runner).await;
            progress.finish_and_clear();
            let outcomes = outcomes?;

            let failed: Vec<_> = outcomes.iter().filter(|o| !o.succeeded()).collect();
            println!(
                "Initialized {} of {} projects",
                outcomes.len() - failed.len(),
                outcomes.len()
            );
            for outcome in &failed {
                eprintln!("Failed: {}", outcome.dir.display());
            }

            Ok(if failed.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }

        Commands::Get(args) => {
            if !FsProjectInspector::new().is_initialized(&args.dir).await {
                anyhow::bail!(
                    "Project is not initialized: {} (run 'tftoolbox init' first)",
                    args.dir.display()
                );
            }

            let declared = HclConfigParser::new().parse_directory(&args.dir).await?;
            if declared.modules.is_empty() {
                println!("No modules declared in {}", args.dir.display());
                return Ok(ExitCode::SUCCESS);
            }

            let output = ProcessIacCli::new(config.binary()).fetch_modules(&args.dir).await;
            if output.success {
                println!("Fetched {} modules in {}", declared.modules.len(), args.dir.display());
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("{}", output.stderr.trim());
                Ok(ExitCode::from(1))
            }
        }

        Commands::Status(args) => {
            let report = tftoolbox::status::collect_status(&args.root, &config).await?;

            let use_colors = args.output.is_none() && std::io::stdout().is_terminal();
            let rendered = Reporter::new(use_colors).generate(&report, args.format)?;

            if let Some(output_path) = args.output {
                std::fs::write(&output_path, &rendered)?;
                tracing::info!(path = %output_path.display(), "Report written");
            } else {
                println!("{rendered}");
            }

            Ok(ExitCode::SUCCESS)
        }

        Commands::Workspace(WorkspaceCommand::List { dir }) => {
            let workspaces = ProcessIacCli::new(config.binary()).list_workspaces(&dir).await?;
            for name in &workspaces.names {
                let marker = if *name == workspaces.current { "*" } else { " " };
                println!("{marker} {name}");
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Workspace(WorkspaceCommand::Select { name, dir }) => {
            ProcessIacCli::new(config.binary())
                .select_workspace(&dir, &name)
                .await?;
            println!("Switched to workspace '{name}'");
            Ok(ExitCode::SUCCESS)
        }

        Commands::Config(command) => run_config_command(command),
    }
}

fn run_config_command(command: ConfigCommand) -> anyhow::Result<ExitCode> {
    match command {
        ConfigCommand::Init { path, force } => {
            if path.exists() && !force {
                anyhow::bail!("Configuration file already exists: {}", path.display());
            }

            std::fs::write(&path, Config::example_yaml())?;
            println!("Created example configuration: {}", path.display());
            Ok(ExitCode::SUCCESS)
        }

        ConfigCommand::Validate(args) => match Config::from_file(&args.file) {
            Ok(_) => {
                println!("Configuration is valid: {}", args.file.display());
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("Configuration error: {e}");
                Ok(ExitCode::from(1))
            }
        },
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    // Check for explicit config file
    if let Some(ref config_path) = cli.config {
        tracing::debug!(path = %config_path.display(), "Loading configuration from explicit path");
        return Ok(Config::from_file(config_path)?);
    }

    if let Some(path) = Config::discover() {
        tracing::debug!(path = %path.display(), "Found configuration file");
        return Ok(Config::from_file(Path::new(&path))?);
    }

    tracing::debug!("No configuration file found, using default configuration");
    Ok(Config::default())
}
