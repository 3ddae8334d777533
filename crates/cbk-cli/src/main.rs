use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "cbk")]
#[command(about = "closebook schedule rebuild CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive a schedule's period lines offline
    Rebuild {
        /// Path to the schedule terms JSON
        #[arg(long)]
        schedule: String,

        /// Path to a JSON array of events, applied in file order
        #[arg(long)]
        events: Option<String>,

        /// Closed period (YYYY-MM) for the schedule's entity; repeatable
        #[arg(long)]
        closed: Vec<String>,

        /// Layered config paths in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Print the full view as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Journal utilities
    Journal {
        #[command(subcommand)]
        cmd: JournalCmd,
    },
}

#[derive(Subcommand)]
enum JournalCmd {
    /// Verify the hash chain of a journal file
    Verify { path: String },

    /// Restore a journal and print one schedule
    Show {
        path: String,

        #[arg(long)]
        schedule: String,

        #[arg(long = "config")]
        config_paths: Vec<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Rebuild {
            schedule,
            events,
            closed,
            config_paths,
            json,
        } => commands::rebuild::run_rebuild(commands::rebuild::RebuildArgs {
            schedule_path: schedule,
            events_path: events,
            closed,
            config_paths,
            json,
        })?,

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = cbk_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Journal { cmd } => match cmd {
            JournalCmd::Verify { path } => commands::journal::run_verify(&path)?,
            JournalCmd::Show {
                path,
                schedule,
                config_paths,
                json,
            } => commands::journal::run_show(&path, &schedule, &config_paths, json)?,
        },
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable. Default level: warn.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
}
