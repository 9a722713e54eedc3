//! keyhold - SSH agent with an in-memory key store

use clap::{CommandFactory, Parser};
use clap_complete::env::CompleteEnv;
use std::process::ExitCode;

use keyhold::cli::commands;
use keyhold::cli::exit_code;
use keyhold::cli::{Cli, Commands};
use keyhold::logging::{self, Verbosity};

#[tokio::main]
async fn main() -> ExitCode {
    // Handle dynamic shell completion if COMPLETE env var is set
    CompleteEnv::with_factory(Cli::command).complete();

    let cli = Cli::parse();
    logging::init(Verbosity::from_flags(cli.verbose, cli.quiet));

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args, cli.config).await,
        Commands::List(args) => commands::list::execute(args).await,
        Commands::Add(args) => commands::add::execute(args).await,
        Commands::Remove(args) => commands::remove::execute(args).await,
        Commands::RemoveAll(args) => commands::remove::execute_all(args).await,
        Commands::Lock(args) => commands::lock::lock(args).await,
        Commands::Unlock(args) => commands::lock::unlock(args).await,
        Commands::Config(args) => commands::config::execute(args, cli.config).await,
        Commands::Version => {
            commands::version::print_version(cli.verbose);
            Ok(())
        }
        Commands::Completion(args) => commands::completion::execute(args).await,
    };

    match result {
        Ok(()) => exit_code::ExitCode::Success.into(),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code::ExitCode::for_error(&e).into()
        }
    }
}
