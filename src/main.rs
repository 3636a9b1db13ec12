//! FocusDot CLI
//!
//! `focusdot daemon` runs the timer; every other command talks to the
//! running daemon over its Unix socket.

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser};

use focusdot::cli::{Cli, Commands, Display, IpcClient};
use focusdot::config::{self, DaemonConfig};
use focusdot::types::Identity;

/// Main entry point
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_tracing(cli.verbose);

    // Execute command
    if let Err(e) = execute(cli).await {
        Display::show_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber for logging.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

/// Executes the CLI command.
async fn execute(cli: Cli) -> Result<()> {
    let Some(command) = cli.command else {
        // No command provided, show help
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Daemon => {
            let mut config = DaemonConfig::load(cli.config.as_deref())?;
            if let Some(socket) = cli.socket {
                config.socket_path = Some(socket);
            }
            focusdot::daemon::run(config).await?;
        }
        Commands::Completions { shell } => {
            generate_completions(shell);
        }
        Commands::Status => {
            let client = client_for(cli.socket, cli.config)?;
            let response = client.get_state().await?;
            match &response.data {
                Some(snapshot) => Display::show_snapshot(snapshot),
                None => Display::show_ack(&response),
            }
        }
        Commands::Start => {
            let client = client_for(cli.socket, cli.config)?;
            Display::show_ack(&client.start().await?);
        }
        Commands::Pause => {
            let client = client_for(cli.socket, cli.config)?;
            Display::show_ack(&client.pause().await?);
        }
        Commands::Reset => {
            let client = client_for(cli.socket, cli.config)?;
            Display::show_ack(&client.reset().await?);
        }
        Commands::Skip => {
            let client = client_for(cli.socket, cli.config)?;
            Display::show_ack(&client.skip().await?);
        }
        Commands::Settings(args) => {
            let patch = args.to_patch();
            if patch.is_empty() {
                anyhow::bail!("No settings given; see 'focusdot settings --help'");
            }
            let client = client_for(cli.socket, cli.config)?;
            Display::show_ack(&client.update_settings(patch).await?);
        }
        Commands::Watch => {
            let client = client_for(cli.socket, cli.config)?;
            let mut updates = client.subscribe().await?;
            loop {
                tokio::select! {
                    update = updates.next() => match update? {
                        Some(snapshot) => Display::show_update(&snapshot),
                        None => anyhow::bail!("The daemon closed the connection"),
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
        Commands::Login(args) => {
            let client = client_for(cli.socket, cli.config)?;
            let identity = Identity {
                user_id: args.user_id,
                access_token: args.access_token,
                email: args.email,
            };
            Display::show_ack(&client.sign_in(identity).await?);
        }
        Commands::Logout => {
            let client = client_for(cli.socket, cli.config)?;
            Display::show_ack(&client.sign_out().await?);
        }
    }

    Ok(())
}

/// Builds a client for `--socket`, else the configured socket path.
fn client_for(socket: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<IpcClient> {
    let socket_path = match socket {
        Some(path) => path,
        None => match DaemonConfig::load(config_path.as_deref()) {
            Ok(config) => config.socket_path()?,
            Err(e) => {
                tracing::warn!("Ignoring unreadable config: {}", e);
                config::default_socket_path()?
            }
        },
    };
    Ok(IpcClient::new(socket_path))
}

/// Generates shell completion scripts.
fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}
