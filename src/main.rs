//! record-engine CLI entry point

use std::process::ExitCode;

use clap::Parser;

use record_engine::cli::{
    app::{
        build_record_options, build_stream_options, format_overrides, load_merged_config,
        record_overrides, run_devices, run_encoders, EXIT_ERROR, EXIT_USAGE_ERROR,
    },
    args::{Cli, Commands},
    config_cmd::handle_config_command,
    presenter::Presenter,
    run_record, run_stream,
};
use record_engine::infrastructure::{init_logging, XdgConfigStore};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let presenter = Presenter::new();

    match cli.command {
        Commands::Config { action } => {
            let store = XdgConfigStore::new();
            if let Err(e) = handle_config_command(action, &store, &presenter).await {
                presenter.error(&e.to_string());
                return ExitCode::from(EXIT_ERROR);
            }
            ExitCode::SUCCESS
        }
        Commands::Devices => run_devices(),
        Commands::Encoders { backend } => run_encoders(backend.map(Into::into)),
        Commands::Record(args) => {
            let config = load_merged_config(record_overrides(&args)).await;
            match build_record_options(args.output, args.format.duration.as_deref(), &config) {
                Ok(options) => run_record(options).await,
                Err(e) => {
                    presenter.error(&e);
                    ExitCode::from(EXIT_USAGE_ERROR)
                }
            }
        }
        Commands::Stream(args) => {
            let config = load_merged_config(format_overrides(&args.format)).await;
            match build_stream_options(args.format.duration.as_deref(), &config) {
                Ok(options) => run_stream(options).await,
                Err(e) => {
                    presenter.error(&e);
                    ExitCode::from(EXIT_USAGE_ERROR)
                }
            }
        }
    }
}
