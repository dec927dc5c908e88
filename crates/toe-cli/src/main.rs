use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "toe", version, about = "TOE: calendar gap prompting and time entry replay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the calendar and ask about unaccounted time
    Watch(commands::watch::WatchArgs),
    /// Show today's slots and gaps
    Gaps(commands::gaps::GapsArgs),
    /// Replay a step script against the attached browser
    Replay(commands::replay::ReplayArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    let cli = Cli::parse();
    let _logging = commands::init_logging();
    let result = match cli.command {
        Commands::Watch(args) => commands::watch::run(args),
        Commands::Gaps(args) => commands::gaps::run(args),
        Commands::Replay(args) => commands::replay::run(args),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
