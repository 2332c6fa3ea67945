use clap::Parser;
use dipoa_cli::{Cli, Commands};
use tracing::error;
use tracing_subscriber::FmtSubscriber;

mod commands;

fn main() {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install log subscriber: {err}");
    }

    let result = match &cli.command {
        Commands::Generate(args) => commands::generate::handle(args),
        command => commands::solve::handle(command, cli.config.as_deref()),
    };

    if let Err(err) = result {
        error!("{err:#}");
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
