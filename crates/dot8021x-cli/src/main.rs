//! dot8021x-authd - wired 802.1X port-access-control authenticator
//!
//! A thin process wrapper around `dot8021x_daemon`'s dispatcher: loads configuration, installs
//! the process's sole `tracing` subscriber, and drives the dispatcher in the foreground or as a
//! background service.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dot8021x_daemon::{platform, Callbacks, DaemonConfig, DispatcherRunner};
use dot8021x_types::PortId;

#[derive(Parser)]
#[command(name = "dot8021x-authd", version, about = "Wired 802.1X port-access-control authenticator")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). Overridden by `RUST_LOG`.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all logging below `error`.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the TOML configuration file. Defaults to the platform config path.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the authenticator against the configured switch-facing interface and port.
    Run {
        /// Run attached to the controlling terminal instead of daemonizing.
        #[arg(short, long)]
        foreground: bool,
        /// Switch port this instance guards, given as its MAC-shaped identifier.
        #[arg(long)]
        port_id: String,
    },
    /// Reports whether an instance is already running, per its PID file.
    Status,
    /// Signals a running instance to stop, via its PID file.
    Stop,
    /// Installs a platform service unit (systemd/launchd) that runs `run --foreground`.
    InstallService,
    /// Removes a previously installed service unit.
    UninstallService,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { foreground, port_id } => run(config, foreground, &port_id).await,
        Commands::Status => status(&config),
        Commands::Stop => stop(&config),
        Commands::InstallService => {
            platform::install_service(&config)?;
            println!("service installed");
            Ok(())
        }
        Commands::UninstallService => uninstall_service(),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn load_config(path: Option<&std::path::Path>) -> Result<DaemonConfig> {
    let config = match path {
        Some(path) => DaemonConfig::load(path)?,
        None => {
            let default_path = DaemonConfig::default_path();
            if default_path.exists() {
                DaemonConfig::load(&default_path)?
            } else {
                return Err(eyre!(
                    "no configuration found; pass --config or create {}",
                    default_path.display()
                ));
            }
        }
    };
    Ok(config)
}

async fn run(config: DaemonConfig, foreground: bool, port_id: &str) -> Result<()> {
    let port: PortId = port_id
        .parse()
        .map_err(|_| eyre!("--port-id must be a MAC-shaped identifier, e.g. 00:11:22:33:44:55"))?;

    if let Some(pid) = platform::already_running(&config.general.pid_file) {
        return Err(eyre!("already running (PID: {pid})"));
    }

    if !foreground {
        #[cfg(unix)]
        platform::daemonize()?;
        #[cfg(windows)]
        return Err(eyre!("on Windows, install a service with install-service instead"));
    }

    platform::write_pid_file(&config.general.pid_file)?;
    let pid_file = config.general.pid_file.clone();

    // The dispatcher already logs each outcome at info level; this binary has no switch
    // control plane to drive, so the callbacks are a no-op hook for an embedder to replace.
    let callbacks = Callbacks {
        auth_success: Arc::new(|_mac, _port, _session_timeout| {}),
        auth_failure: Arc::new(|_mac, _port| {}),
        auth_logoff: Arc::new(|_mac, _port| {}),
    };

    let interface = config.interface.clone();
    let (dispatcher, runner) = DispatcherRunner::new(config, callbacks).await?;
    dispatcher.port_up(port);
    tracing::info!(%interface, %port, "authenticator running");

    let shutdown = {
        let dispatcher = dispatcher.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            dispatcher.port_down(port);
            dispatcher.stop();
        }
    };

    let result = tokio::select! {
        result = runner.run() => result,
        () = shutdown => Ok(()),
    };

    platform::remove_pid_file(&pid_file);
    result.map_err(Into::into)
}

fn status(config: &DaemonConfig) -> Result<()> {
    match platform::already_running(&config.general.pid_file) {
        Some(pid) => println!("running (PID: {pid})"),
        None => println!("not running"),
    }
    Ok(())
}

fn stop(config: &DaemonConfig) -> Result<()> {
    let pid = platform::send_stop_signal(&config.general.pid_file)?;
    println!("sent stop signal to PID {pid}");
    Ok(())
}

fn uninstall_service() -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        let path = std::path::Path::new("/Library/LaunchDaemons/net.dot8021x.authd.plist");
        if path.exists() {
            std::process::Command::new("launchctl").args(["unload", &path.display().to_string()]).status()?;
            std::fs::remove_file(path)?;
            println!("service uninstalled");
        } else {
            println!("service is not installed");
        }
        Ok(())
    }

    #[cfg(target_os = "linux")]
    {
        let path = std::path::Path::new("/etc/systemd/system/dot8021x-authd.service");
        if path.exists() {
            std::process::Command::new("systemctl").args(["disable", "--now", "dot8021x-authd"]).status()?;
            std::fs::remove_file(path)?;
            std::process::Command::new("systemctl").arg("daemon-reload").status()?;
            println!("service uninstalled");
        } else {
            println!("service is not installed");
        }
        Ok(())
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Err(eyre!("service uninstallation is not supported on this platform"))
    }
}
