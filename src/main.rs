//! Kolosal Online - Main Entry Point
//!
//! Online training over CSV streams and hyper-parameter search from the command line.

use clap::Parser;
use kolosal_online::cli::{cmd_info, cmd_search, cmd_stream, print_banner, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kolosal_online=info".into()),
        )
        .init();

    let cli = Cli::parse();
    print_banner();

    match cli.command {
        Commands::Stream {
            data,
            config,
            chunk_size,
            window,
            n_features,
            full_run,
            max_batches,
            seed,
            no_warmup,
            summary_out,
        } => {
            cmd_stream(
                &data,
                config.as_deref(),
                chunk_size,
                window,
                n_features,
                full_run,
                max_batches,
                seed,
                no_warmup,
                summary_out.as_deref(),
            )?;
        }
        Commands::Search {
            data,
            config,
            target,
            evals,
            folds,
            strategy,
            family,
            scoring,
            n_jobs,
            seed,
            output,
        } => {
            cmd_search(
                &data,
                config.as_deref(),
                target.as_deref(),
                evals,
                folds,
                strategy.as_deref(),
                family.as_deref(),
                scoring.as_deref(),
                n_jobs,
                seed,
                output.as_deref(),
            )?;
        }
        Commands::Info { data } => {
            cmd_info(&data)?;
        }
    }

    Ok(())
}
