use std::process::ExitCode;

use clap::{CommandFactory, Parser, error::ErrorKind};

use ingestd::app::error::exit_code;
use ingestd::app::{
    common::emit_config_warnings, handle_info, handle_list, handle_logs, handle_settings,
    handle_start, handle_stop, handle_update, handle_watch,
};
use ingestd::cli::{Cli, Commands};
use ingestd::resolve_config;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(64),
            };
        }
    };

    let Cli { config, command } = cli;

    let Some(command) = command else {
        let mut command = Cli::command();
        let _ = command.print_help();
        println!();
        return ExitCode::from(64);
    };

    let config = match resolve_config(config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            return exit_code(&err);
        }
    };
    config.logging.init();
    emit_config_warnings(&config.warnings);

    let result = match command {
        Commands::Start(args) => handle_start(args, &config),
        Commands::Stop(args) => handle_stop(args, &config),
        Commands::Info(args) => handle_info(args, &config),
        Commands::Logs(args) => handle_logs(args, &config),
        Commands::List(args) => handle_list(args, &config),
        Commands::Watch(args) => handle_watch(args, &config),
        Commands::Update(args) => handle_update(args, &config),
        Commands::Settings(args) => handle_settings(args, &config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            exit_code(&err)
        }
    }
}
