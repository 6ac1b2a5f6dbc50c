// # windnsctl - WinDNS command-line client
//
// Thin integration layer: all record logic lives in windns-core, the SSH
// transport in windns-ssh. This binary is responsible for:
// 1. Reading connection settings from environment variables
// 2. Opening one session pool for the invocation
// 3. Running a single engine operation and printing its result
// 4. Closing the pool before exit
//
// Results go to stdout (JSON or a bare id); logs go to stderr.
//
// ## Configuration
//
// ### SSH
// - `WINDNS_SSH_USERNAME`: Username for password authentication (required)
// - `WINDNS_SSH_PASSWORD`: Password (required)
// - `WINDNS_SSH_HOSTNAME`: Host running OpenSSH and PowerShell (required)
// - `WINDNS_SSH_PORT`: SSH port (default 22)
//
// ### DNS
// - `WINDNS_DNS_SERVER_HOSTNAME`: Target for `-ComputerName` (empty: the SSH host itself)
//
// ### Pool
// - `WINDNS_POOL_MAX_IDLE_SECS`: Evict idle sessions older than this
// - `WINDNS_POOL_PROBE`: Probe idle sessions before reuse (true/false)
//
// ### Logging
// - `WINDNS_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export WINDNS_SSH_USERNAME=administrator
// export WINDNS_SSH_PASSWORD=...
// export WINDNS_SSH_HOSTNAME=dc01.example.com
//
// windnsctl create --zone example.com --name www --type A --record 203.0.113.11 --record 203.0.113.12
// windnsctl read www/example.com/A
// windnsctl update www/example.com/A --record 203.0.113.12 --record 203.0.113.13
// windnsctl delete www/example.com/A
// ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::env;
use std::process::ExitCode;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;
use windns_core::suppress::suppress_record_diff;
use windns_core::{
    ConnectionPool, PoolConfig, RecordEngine, RecordId, RecordSet, RecordState, RecordType,
    SshConfig, WinDnsConfig,
};
use windns_ssh::SshConnector;

/// Exit codes for different termination scenarios
///
/// - 0: Success
/// - 1: Configuration or input error
/// - 2: Runtime error (remote or transport failure)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CtlExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<CtlExitCode> for ExitCode {
    fn from(code: CtlExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Debug, Parser)]
#[command(name = "windnsctl", version, about = "Reconcile DNS records on a Windows DNS server over SSH")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a record set and print its id
    Create {
        /// Zone name
        #[arg(long)]
        zone: String,

        /// Record name within the zone
        #[arg(long)]
        name: String,

        /// Record type (A, AAAA, TXT, PTR, CNAME)
        #[arg(long = "type")]
        record_type: String,

        /// Record value; repeat for multiple values
        #[arg(long = "record", required = true)]
        records: Vec<String>,

        /// Also create reverse records (A/AAAA only)
        #[arg(long)]
        create_ptr: bool,
    },

    /// Print the observed state of a record set as JSON
    Read {
        /// Record id (`<name>/<zone>/<type>`)
        id: String,
    },

    /// Converge a record set to the given values and print the applied diff
    Update {
        /// Record id (`<name>/<zone>/<type>`)
        id: String,

        /// Desired value; repeat for multiple values
        #[arg(long = "record", required = true)]
        records: Vec<String>,

        /// Also create reverse records for added values (A/AAAA only)
        #[arg(long)]
        create_ptr: bool,
    },

    /// Delete every value of a record set
    Delete {
        /// Record id (`<name>/<zone>/<type>`)
        id: String,
    },

    /// Check whether two value lists differ only in ways the server normalizes
    CheckDiff {
        /// Record type (A, AAAA, TXT, PTR, CNAME)
        #[arg(long = "type")]
        record_type: String,

        /// Values as reported by the server
        #[arg(long = "old")]
        old: Vec<String>,

        /// Values as declared
        #[arg(long = "new")]
        new: Vec<String>,
    },
}

/// Connection settings
struct Config {
    ssh_username: String,
    ssh_password: String,
    ssh_hostname: String,
    ssh_port: u16,
    dns_server: Option<String>,
    pool_max_idle_secs: Option<u64>,
    pool_probe: bool,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            ssh_username: env::var("WINDNS_SSH_USERNAME").context("WINDNS_SSH_USERNAME is required")?,
            ssh_password: env::var("WINDNS_SSH_PASSWORD").context("WINDNS_SSH_PASSWORD is required")?,
            ssh_hostname: env::var("WINDNS_SSH_HOSTNAME").context("WINDNS_SSH_HOSTNAME is required")?,
            ssh_port: env::var("WINDNS_SSH_PORT")
                .ok()
                .map(|s| s.parse())
                .transpose()
                .context("WINDNS_SSH_PORT must be a port number")?
                .unwrap_or(22),
            dns_server: env::var("WINDNS_DNS_SERVER_HOSTNAME").ok(),
            pool_max_idle_secs: env::var("WINDNS_POOL_MAX_IDLE_SECS")
                .ok()
                .map(|s| s.parse())
                .transpose()
                .context("WINDNS_POOL_MAX_IDLE_SECS must be a number of seconds")?,
            pool_probe: env::var("WINDNS_POOL_PROBE")
                .ok()
                .map(|s| parse_flag(&s))
                .transpose()?
                .unwrap_or(false),
        })
    }

    /// Build and validate the library configuration
    fn to_windns_config(&self) -> Result<WinDnsConfig> {
        let ssh = SshConfig::new(&self.ssh_username, &self.ssh_password, &self.ssh_hostname)
            .with_port(self.ssh_port);

        let mut config = WinDnsConfig::new(ssh).with_pool(PoolConfig {
            max_idle_secs: self.pool_max_idle_secs,
            probe_on_acquire: self.pool_probe,
        });
        if let Some(server) = &self.dns_server {
            config = config.with_dns_server(server.as_str());
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("WINDNS_POOL_PROBE '{}' is not a boolean", other),
    }
}

fn parse_log_level(value: &str) -> Result<Level> {
    match value.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "WINDNS_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            value
        ),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match parse_log_level(&env::var("WINDNS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return CtlExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return CtlExitCode::ConfigError.into();
    }

    // Pure comparison; needs no connection settings
    if let Command::CheckDiff {
        record_type,
        old,
        new,
    } = &cli.command
    {
        return match check_diff(record_type, old, new) {
            Ok(()) => CtlExitCode::Success.into(),
            Err(e) => {
                error!("{:#}", e);
                CtlExitCode::ConfigError.into()
            }
        };
    }

    let config = match Config::from_env().and_then(|c| c.to_windns_config()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return CtlExitCode::ConfigError.into();
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return CtlExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run(cli.command, &config).await {
            Ok(()) => CtlExitCode::Success,
            Err(e) => {
                error!("{:#}", e);
                exit_code_for(&e)
            }
        }
    })
    .into()
}

/// Input errors exit 1, everything that happened after talking to the host exits 2
fn exit_code_for(error: &anyhow::Error) -> CtlExitCode {
    match error.downcast_ref::<windns_core::Error>() {
        Some(
            windns_core::Error::Validation(_)
            | windns_core::Error::UnsupportedType(_)
            | windns_core::Error::Config(_),
        ) => CtlExitCode::ConfigError,
        _ => CtlExitCode::RuntimeError,
    }
}

async fn run(command: Command, config: &WinDnsConfig) -> Result<()> {
    let connector = SshConnector::new(config.ssh.clone())?;
    let pool = ConnectionPool::new(connector, config.pool.clone());
    let (engine, mut events) = RecordEngine::new(config)?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Engine event: {:?}", event);
        }
    });

    let result = execute(&engine, &pool, command).await;

    pool.close().await;
    let stats = pool.stats();
    debug!(
        "Pool stats: {} opened, {} reused, {} evicted",
        stats.opened, stats.reused, stats.evicted
    );

    result
}

async fn execute(engine: &RecordEngine, pool: &ConnectionPool<SshConnector>, command: Command) -> Result<()> {
    match command {
        Command::Create {
            zone,
            name,
            record_type,
            records,
            create_ptr,
        } => {
            let record_type: RecordType = record_type.parse()?;
            let record = RecordSet::new(&zone, &name, record_type, &records, create_ptr)?;
            let id = engine.create(pool, &record).await?;
            println!("{}", id);
        }

        Command::Read { id } => {
            let id: RecordId = id.parse()?;
            let state = engine.read(pool, &id).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }

        Command::Update {
            id,
            records,
            create_ptr,
        } => {
            let id: RecordId = id.parse()?;
            let desired = RecordSet::new(id.zone(), id.host(), id.record_type(), &records, create_ptr)?;
            let diff = engine.update(pool, &id, &desired).await?;
            println!("{}", serde_json::to_string_pretty(&diff)?);
        }

        Command::Delete { id } => {
            let id: RecordId = id.parse()?;
            match engine.read(pool, &id).await? {
                RecordState::Present(record) => engine.delete(pool, &record).await?,
                RecordState::Absent => info!("Record {} is already absent", id),
            }
        }

        Command::CheckDiff {
            record_type,
            old,
            new,
        } => check_diff(&record_type, &old, &new)?,
    }

    Ok(())
}

fn check_diff(record_type: &str, old: &[String], new: &[String]) -> Result<()> {
    let record_type: RecordType = record_type.parse()?;
    let suppressed = suppress_record_diff(old, new, record_type);
    println!("{}", serde_json::json!({ "suppressed": suppressed }));
    Ok(())
}
