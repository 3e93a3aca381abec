use clap::Parser;
use treewatch::Settings;
use treewatch::cli::commands::{init, watch};
use treewatch::cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        Settings::default()
    });

    treewatch::logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { force } => init::run_init(force),
        Commands::Config => init::run_config(&settings),
        Commands::Watch {
            paths,
            recursive,
            pattern,
            kinds,
            json,
            timeout,
        } => watch::run_watch(
            watch::WatchArgs {
                paths,
                recursive,
                pattern,
                kinds,
                json,
                timeout,
            },
            &settings,
        )?,
    }

    Ok(())
}
