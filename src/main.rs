use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use vocalrender::cli::{Cli, Commands, ConfigAction, RenderArgs};
use vocalrender::config::Config;
use vocalrender::diagnostics::{build_report, print_report};
use vocalrender::output::{BarProgress, print_failure, print_summary};
use vocalrender::pipeline::{
    CancellationToken, LogProgress, PipelineConfig, ProgressReporter, RenderSummary, Renderer,
};
use vocalrender::plugin::ProcessHost;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Err(e) = run(cli).await {
        print_failure(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Render(args) => {
            let config = load_config(cli.config.as_deref())?;
            run_render(config, args, cli.quiet).await?;
        }
        Commands::Master { input, output } => {
            let config = load_config(cli.config.as_deref())?;
            run_master(config, input, output, cli.quiet).await?;
        }
        Commands::Check { json } => {
            let config = load_config(cli.config.as_deref())?;
            let registry = config.registry();
            let report = build_report(
                &registry,
                Some(&config.plugins.base_dir),
                config.plugins.require_primary,
            );
            if json {
                println!("{}", report.to_json()?);
            } else {
                print_report(&report);
            }
            if !report.can_render() {
                std::process::exit(1);
            }
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "vocalrender",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Install the log subscriber. `RUST_LOG` wins over the -v/-q flags.
fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vocalrender={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/vocalrender/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}

async fn run_render(config: Config, args: RenderArgs, quiet: bool) -> Result<()> {
    let base = match &args.preset {
        Some(path) => PipelineConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load preset {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let pipeline = args.apply(base);

    let mut settings = config.render_settings();
    if let Some(interval) = args.poll_interval {
        settings.poll_interval = interval;
    }
    let cancel = CancellationToken::new();
    let renderer =
        Renderer::new(config.registry(), ProcessHost, settings).with_cancellation(cancel.clone());

    let json = args.json;
    let show_bar = !quiet && !json;
    let task = tokio::task::spawn_blocking(move || {
        with_progress(show_bar, |progress| {
            renderer.render(&args.input, &args.output, &pipeline, progress)
        })
    });

    let summary = wait_with_cancel(task, cancel, quiet).await?;
    report(&summary, json, quiet)
}

async fn run_master(config: Config, input: PathBuf, output: PathBuf, quiet: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    let renderer = Renderer::new(config.registry(), ProcessHost, config.render_settings())
        .with_cancellation(cancel.clone());

    let task = tokio::task::spawn_blocking(move || {
        with_progress(!quiet, |progress| renderer.master(&input, &output, progress))
    });

    let summary = wait_with_cancel(task, cancel, quiet).await?;
    report(&summary, false, quiet)
}

/// Runs `work` against a progress bar, or against the log when the bar is off.
fn with_progress<F>(show_bar: bool, work: F) -> vocalrender::Result<RenderSummary>
where
    F: FnOnce(&mut dyn ProgressReporter) -> vocalrender::Result<RenderSummary>,
{
    if !show_bar {
        return work(&mut LogProgress);
    }
    let mut bar = BarProgress::new();
    let result = work(&mut bar);
    match result {
        Ok(_) => bar.finish(),
        Err(_) => bar.abandon(),
    }
    result
}

/// Wait for the render, turning the first Ctrl+C into a cooperative cancel.
///
/// The host process of the running stage is left to finish; the render stops
/// at the next stage boundary.
async fn wait_with_cancel(
    mut task: JoinHandle<vocalrender::Result<RenderSummary>>,
    cancel: CancellationToken,
    quiet: bool,
) -> Result<RenderSummary> {
    let joined = tokio::select! {
        joined = &mut task => joined,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    if !quiet {
                        eprintln!("\nCancelling after the current stage...");
                    }
                    cancel.cancel();
                }
                Err(e) => warn!("Failed to wait for Ctrl+C: {e}"),
            }
            task.await
        }
    };

    let result = joined.context("Render worker stopped unexpectedly")?;
    Ok(result?)
}

fn report(summary: &RenderSummary, json: bool, quiet: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else if !quiet {
        print_summary(summary);
    }
    Ok(())
}

/// Handle configuration commands.
fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            let path = custom_path
                .map(Path::to_path_buf)
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
    }
    Ok(())
}
