//! Repeater Host CLI
//!
//! Command-line entry point for the trunked TDMA/FDMA repeater daemon.
//!
//! # Usage
//!
//! ```bash
//! # Run against a configuration file
//! repeater-host --config host.yaml
//!
//! # Run in the foreground even if the config requests daemonising
//! repeater-host --config host.yaml --foreground
//!
//! # Validate a configuration file without starting the host
//! repeater-host validate --config host.yaml
//!
//! # Write a default configuration file
//! repeater-host gen-config --output host.yaml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use repeater_core::config::HostConfig;
use repeater_core::modem::{Modem, ModemError, NullModem, SerialModem, UdpModem};
use repeater_core::network::{Network, NullNetwork, UdpNetwork};
use repeater_core::Host;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "repeater-host")]
#[command(about = "Trunked TDMA/FDMA repeater host daemon")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "host.yaml")]
    config: PathBuf,

    /// Stay in the foreground even if the config requests daemonising
    #[arg(long)]
    foreground: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file
    GenConfig {
        #[arg(short, long, default_value = "host.yaml")]
        output: PathBuf,
    },
    /// Validate a configuration file and exit
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = match args.command {
        Some(Commands::GenConfig { output }) => cmd_gen_config(output),
        Some(Commands::Validate { config }) => cmd_validate(config),
        None => cmd_run(args),
    };

    if let Err(err) = result {
        eprintln!("repeater-host: {err}");
        std::process::exit(1);
    }
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = HostConfig::default();
    let yaml = config.to_yaml()?;
    std::fs::write(&output, yaml)?;
    println!("Generated default configuration: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match HostConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!("  site: net={} site={} color-code={}",
                config.system.config.net_id,
                config.system.config.site_id,
                config.system.config.color_code);
            println!(
                "  protocols: dmr={} (control={}) p25={} (control={})",
                config.protocols.dmr.enable,
                config.protocols.dmr.control,
                config.protocols.p25.enable,
                config.protocols.p25.control
            );
            Ok(())
        }
        Err(err) => {
            eprintln!("Configuration invalid: {err}");
            std::process::exit(1);
        }
    }
}

fn cmd_run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = HostConfig::from_file(&args.config)?;

    if config.system.daemon && !args.foreground {
        daemonize()?;
    }

    let modem = build_modem(&config)?;
    let network = build_network(&config)?;

    let mut host = Host::new(config, modem, network)?;
    let stop_handle = host.stop_handle();

    ctrlc::set_handler(move || {
        tracing::info!("shutdown requested");
        stop_handle.stop();
    })?;

    tracing::info!("repeater host starting");
    host.run()?;
    tracing::info!("repeater host stopped");
    Ok(())
}

fn build_modem(config: &HostConfig) -> Result<Box<dyn Modem>, ModemError> {
    match config.system.modem.port_type.as_str() {
        "udp" => {
            let peer: SocketAddr = config
                .system
                .modem
                .port
                .parse()
                .map_err(|_| ModemError::NotOpen)?;
            let bind: SocketAddr = "0.0.0.0:0".parse().unwrap();
            Ok(Box::new(UdpModem::new(bind, peer)?))
        }
        "uart" | "serial" => Ok(Box::new(SerialModem::new(&config.system.modem.port, 115_200)?)),
        _ => Ok(Box::new(NullModem::new())),
    }
}

fn build_network(config: &HostConfig) -> Result<Box<dyn Network>, Box<dyn std::error::Error>> {
    if !config.network.enable {
        return Ok(Box::new(NullNetwork::new()));
    }
    let peer: SocketAddr = format!("{}:{}", config.network.address, config.network.port).parse()?;
    let bind: SocketAddr = "0.0.0.0:0".parse().unwrap();
    Ok(Box::new(UdpNetwork::new(bind, peer)?))
}

/// Detach to a background session on POSIX (`system.daemon`, §6's config
/// table): fork, drop the controlling terminal, and move to `/`.
#[cfg(unix)]
fn daemonize() -> Result<(), Box<dyn std::error::Error>> {
    use std::ffi::CString;

    unsafe {
        match libc::fork() {
            -1 => return Err("fork() failed".into()),
            0 => {}
            _ => std::process::exit(0),
        }

        if libc::setsid() == -1 {
            return Err("setsid() failed".into());
        }

        let root = CString::new("/").unwrap();
        if libc::chdir(root.as_ptr()) == -1 {
            return Err("chdir(\"/\") failed".into());
        }

        libc::close(0);
        libc::close(1);
        libc::close(2);
    }
    Ok(())
}

#[cfg(not(unix))]
fn daemonize() -> Result<(), Box<dyn std::error::Error>> {
    tracing::warn!("daemon mode requested but this platform has no POSIX fork(); staying in the foreground");
    Ok(())
}
