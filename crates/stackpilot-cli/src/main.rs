mod commands;

use clap::{Parser, Subcommand};
use commands::Session;
use stackpilot_core::{install_signal_handler, CancelToken};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "stackpilot",
    version,
    about = "Create, update, and delete infrastructure stacks and wait for them to settle"
)]
struct Cli {
    /// Control-plane URL (overrides ~/.config/stackpilot/remote.json).
    #[arg(long, global = true)]
    remote: Option<String>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    /// Give up waiting after this many minutes (default 30).
    #[arg(long, global = true)]
    timeout_minutes: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a stack from a definition file and wait for it to settle.
    Create {
        /// Path to the stack definition TOML file.
        #[arg(default_value = "stack.toml")]
        definition: PathBuf,
    },
    /// Update an existing stack and wait for it to settle.
    Update {
        /// Stack identifier.
        stack_id: String,
        /// Path to the stack definition TOML file.
        #[arg(default_value = "stack.toml")]
        definition: PathBuf,
    },
    /// Delete a stack and wait until it is gone.
    Delete {
        /// Stack identifier.
        stack_id: String,
    },
    /// Show the current status of a stack.
    Status {
        /// Stack identifier.
        stack_id: String,
    },
    /// List a stack's events, newest first.
    Events {
        /// Stack identifier.
        stack_id: String,
        /// Stop after this many events.
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("STACKPILOT_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancelToken::new();
    install_signal_handler(&cancel);

    let timeout = cli.timeout_minutes.map(minutes);
    let json_output = cli.json;

    let result = Session::connect(cli.remote.as_deref(), cancel, timeout).and_then(|session| {
        match cli.command {
            Commands::Create { definition } => {
                commands::create::run(&session, &definition, json_output)
            }
            Commands::Update {
                stack_id,
                definition,
            } => commands::update::run(&session, &stack_id, &definition, json_output),
            Commands::Delete { stack_id } => {
                commands::delete::run(&session, &stack_id, json_output)
            }
            Commands::Status { stack_id } => {
                commands::status::run(&session, &stack_id, json_output)
            }
            Commands::Events { stack_id, limit } => {
                commands::events::run(&session, &stack_id, limit, json_output)
            }
        }
    });

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.code)
        }
    }
}

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m.saturating_mul(60))
}
