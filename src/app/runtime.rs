use std::io::{self, IsTerminal};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use filesync_core::{CancellationCoordinator, SyncOrchestrator};
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::app::{config_file, exit_handler, output, progress_ui, terminal};
use crate::cli::Args;

pub(crate) async fn run_filesync() -> Result<ProcessExit> {
    // Parse before tracing so --help and --version stay clean.
    let args = Args::parse();

    let default_level = terminal::resolve_default_log_level(args.verbose, args.quiet);
    let no_color = terminal::is_no_color_requested(&args);
    terminal::init_tracing(
        default_level,
        terminal::should_force_cli_log_level(&args),
        no_color,
    );

    let loaded = config_file::load_config(args.config.as_deref())?;
    if loaded.config.is_some() {
        info!(path = %loaded.path.display(), "Loaded config file");
    } else {
        debug!(path = %loaded.path.display(), "No config file; using defaults and flags");
    }
    let env_password = std::env::var(config_file::PASSWORD_ENV).ok();
    let config = config_file::resolve_sync_config(loaded.config, &args, env_password)?;

    let cancel = CancellationCoordinator::new();
    let orchestrator = SyncOrchestrator::from_config(&config, cancel.clone())
        .context("Invalid configuration")?;
    let listener = cancel.listen_for_signals();

    info!(url = %config.base_url, "filesync starting");
    let exit = run_pass(&args, &orchestrator, config.progress_update_interval).await;
    listener.abort();
    exit
}

async fn run_pass(
    args: &Args,
    orchestrator: &SyncOrchestrator,
    interval: Duration,
) -> Result<ProcessExit> {
    let plan = match orchestrator.plan().await {
        Ok(plan) => plan,
        Err(e) if e.is_interrupted() => {
            warn!("Interrupted while listing; nothing was downloaded");
            return Ok(ProcessExit::Success);
        }
        Err(e) => return Err(e).context("Could not plan the sync"),
    };

    if args.dry_run {
        if args.json {
            output::print_json(&plan)?;
        } else {
            output::print_dry_run(&plan);
        }
        return Ok(ProcessExit::Success);
    }

    if !args.json && !args.quiet {
        output::print_plan(&plan);
    }

    let use_bar = terminal::should_use_progress_bar(
        io::stderr().is_terminal(),
        args.quiet,
        terminal::is_dumb_terminal(),
        args.json,
    );
    let sink = progress_ui::make_sink(use_bar, interval);
    let summary = orchestrator
        .execute(plan, sink.as_ref())
        .await
        .context("Sync aborted")?;

    if args.json {
        output::print_json(&summary)?;
    } else if !args.quiet {
        output::print_summary(&summary);
    }

    if summary.interrupted {
        info!(
            paused = summary.paused(),
            not_started = summary.not_started.len(),
            "Stopped on request; run again to resume"
        );
    }
    Ok(exit_handler::exit_for_summary(&summary))
}
