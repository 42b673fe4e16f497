use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "levelup", version, about = "LevelUp CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Award experience for a habit completion
    Award(commands::award::AwardArgs),
    /// Show a user's expertise by domain
    Expertise {
        /// User id
        user: String,
    },
    /// Detect level-change candidates and store them as pending suggestions
    Scan {
        /// User id
        user: String,
    },
    /// List a user's pending suggestions
    Suggestions {
        /// User id
        user: String,
    },
    /// Accept or dismiss a pending suggestion
    Respond {
        /// Suggestion id
        id: String,
        /// Decision
        #[arg(value_enum)]
        decision: commands::suggestion::Decision,
    },
    /// Query the level-change history
    History(commands::history::HistoryArgs),
    /// Habit records (host-side)
    Habit {
        #[command(subcommand)]
        action: commands::habit::HabitAction,
    },
    /// Domain names (host-side)
    Domain {
        #[command(subcommand)]
        action: commands::habit::DomainAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

/// Log to stderr, filtered by `LEVELUP_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_env("LEVELUP_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Award(args) => commands::award::run(args),
        Commands::Expertise { user } => commands::expertise::run(&user),
        Commands::Scan { user } => commands::suggestion::scan(&user),
        Commands::Suggestions { user } => commands::suggestion::list(&user),
        Commands::Respond { id, decision } => commands::suggestion::respond(&id, decision),
        Commands::History(args) => commands::history::run(args),
        Commands::Habit { action } => commands::habit::run(action),
        Commands::Domain { action } => commands::habit::run_domain(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
