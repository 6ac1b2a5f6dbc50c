// # SSH Transport
//
// This crate connects the WinDNS core to a Windows host running OpenSSH and
// PowerShell.
//
// - ✅ Password authentication with one username/hostname/password triple
// - ✅ One exec channel per command; stdout, stderr and exit code captured separately
//   (both streams drained together, so a chatty stderr cannot stall the channel)
// - ✅ Connect timeout from `SshConfig::connect_timeout_secs`
// - ✅ Keepalive-based liveness probe (used only when the pool enables probing)
// - ❌ NO command timeout: a hung remote command blocks its caller
// - ❌ NO retry logic (callers own retries)
//
// libssh2 is blocking, so every call runs on tokio's blocking thread pool.
//
// ## Security Requirements
//
// - The password NEVER appears in logs or `Debug` output
// - Host keys are not pinned; run over a trusted network

use async_trait::async_trait;
use ssh2::{Channel, Session};
use std::io::{ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, warn};
use windns_core::config::SshConfig;
use windns_core::traits::{CommandOutput, Connector, RemoteSession};
use windns_core::{Error, Result};

/// Keepalive interval requested from the server (in seconds)
const KEEPALIVE_INTERVAL_SECS: u32 = 30;

/// Buffer size for draining channel output
const READ_CHUNK_BYTES: usize = 8192;

/// Pause between reads when neither stream had data
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Opens password-authenticated SSH sessions to one host
///
/// The Debug implementation does NOT expose the password (see [`SshConfig`]).
#[derive(Debug, Clone)]
pub struct SshConnector {
    config: SshConfig,
}

impl SshConnector {
    /// Create a connector; fails fast on an incomplete configuration
    pub fn new(config: SshConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Session = SshSession;

    async fn connect(&self) -> Result<SshSession> {
        let config = self.config.clone();
        debug!("Opening SSH session to {}", config.address());

        let session = tokio::task::spawn_blocking(move || connect_session(&config))
            .await
            .map_err(|e| Error::connection(format!("SSH connect task failed: {}", e)))??;

        Ok(SshSession {
            session: Some(session),
            target: self.config.address(),
        })
    }

    async fn is_alive(&self, session: &mut SshSession) -> bool {
        let Some(inner) = session.session.take() else {
            return false;
        };

        let probe = tokio::task::spawn_blocking(move || {
            let alive = inner.keepalive_send().is_ok();
            (inner, alive)
        })
        .await;

        match probe {
            Ok((inner, alive)) => {
                session.session = Some(inner);
                alive
            }
            Err(e) => {
                warn!("SSH keepalive probe for {} failed: {}", session.target, e);
                false
            }
        }
    }

    fn target(&self) -> &str {
        &self.config.hostname
    }
}

/// An authenticated SSH session
pub struct SshSession {
    // `None` only while a blocking call owns it, or after that call panicked
    session: Option<Session>,
    target: String,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("target", &self.target)
            .field("open", &self.session.is_some())
            .finish()
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(&mut self, invocation: &str) -> Result<CommandOutput> {
        let session = self
            .session
            .take()
            .ok_or_else(|| Error::transport(format!("SSH session to {} is no longer usable", self.target)))?;
        let invocation = invocation.to_string();

        let (session, result) = tokio::task::spawn_blocking(move || {
            let result = run_command(&session, &invocation);
            (session, result)
        })
        .await
        .map_err(|e| Error::transport(format!("SSH exec task failed: {}", e)))?;

        self.session = Some(session);
        result
    }

    async fn close(self) {
        let Some(session) = self.session else {
            return;
        };
        let target = self.target;

        let closed = tokio::task::spawn_blocking(move || session.disconnect(None, "closing", None)).await;
        match closed {
            Ok(Ok(())) => debug!("Closed SSH session to {}", target),
            Ok(Err(e)) => debug!("SSH disconnect from {} failed: {}", target, e),
            Err(e) => warn!("SSH disconnect task for {} failed: {}", target, e),
        }
    }
}

/// Open and authenticate a session (blocking)
fn connect_session(config: &SshConfig) -> Result<Session> {
    let address = config.address();
    let timeout = Duration::from_secs(config.connect_timeout_secs);

    let socket_addr = address
        .to_socket_addrs()
        .map_err(|e| Error::connection(format!("cannot resolve {}: {}", address, e)))?
        .next()
        .ok_or_else(|| Error::connection(format!("{} resolved to no address", address)))?;

    let tcp = TcpStream::connect_timeout(&socket_addr, timeout)
        .map_err(|e| Error::connection(format!("failed to connect to {}: {}", address, e)))?;

    let mut session =
        Session::new().map_err(|e| Error::connection(format!("failed to create SSH session: {}", e)))?;
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| Error::connection(format!("SSH handshake with {} failed: {}", address, e)))?;

    session
        .userauth_password(&config.username, &config.password)
        .map_err(|e| {
            Error::connection(format!(
                "SSH authentication as {} on {} failed: {}",
                config.username, address, e
            ))
        })?;
    if !session.authenticated() {
        return Err(Error::connection(format!(
            "SSH authentication as {} on {} failed",
            config.username, address
        )));
    }

    session.set_keepalive(true, KEEPALIVE_INTERVAL_SECS);
    Ok(session)
}

/// Run one command on a fresh exec channel (blocking)
fn run_command(session: &Session, invocation: &str) -> Result<CommandOutput> {
    let mut channel = session
        .channel_session()
        .map_err(|e| Error::transport(format!("failed to open SSH channel: {}", e)))?;
    channel
        .exec(invocation)
        .map_err(|e| Error::transport(format!("failed to start remote command: {}", e)))?;

    // Both streams share one channel window, so they are drained together
    session.set_blocking(false);
    let streams = read_streams(&mut channel);
    session.set_blocking(true);
    let (stdout, stderr) = streams?;

    channel
        .wait_close()
        .map_err(|e| Error::transport(format!("failed to close SSH channel: {}", e)))?;
    let exit_code = channel
        .exit_status()
        .map_err(|e| Error::transport(format!("failed to read exit status: {}", e)))?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
    })
}

/// Read stdout and stderr until the remote side signals EOF (non-blocking session)
fn read_streams(channel: &mut Channel) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut buf = [0u8; READ_CHUNK_BYTES];

    loop {
        let mut progressed = false;

        match channel.read(&mut buf) {
            Ok(n) if n > 0 => {
                stdout.extend_from_slice(&buf[..n]);
                progressed = true;
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => return Err(Error::transport(format!("failed to read stdout: {}", e))),
        }

        match channel.stderr().read(&mut buf) {
            Ok(n) if n > 0 => {
                stderr.extend_from_slice(&buf[..n]);
                progressed = true;
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => return Err(Error::transport(format!("failed to read stderr: {}", e))),
        }

        // Keep reading after EOF until both buffers are drained
        if channel.eof() && !progressed {
            return Ok((stdout, stderr));
        }
        if !progressed {
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}
