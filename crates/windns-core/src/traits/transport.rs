// # Transport Traits
//
// Defines the interface between the core and a remote shell transport.
//
// ## Implementations
//
// - SSH (password auth): `windns-ssh` crate
// - In-memory fakes: `tests/common`
//
// ## Usage
//
// ```rust,ignore
// use windns_core::traits::{Connector, RemoteSession};
//
// let mut session = connector.connect().await?;
// let output = session.exec("powershell.exe -EncodedCommand ...").await?;
// if !output.success() {
//     eprintln!("{}", output.stderr);
// }
// ```

use async_trait::async_trait;

/// Captured result of one remote command
///
/// A non-zero `exit_code` is not a transport failure: the command ran and
/// reported a business error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured stdout text
    pub stdout: String,
    /// Captured stderr text
    pub stderr: String,
    /// Exit code of the remote process
    pub exit_code: i32,
}

impl CommandOutput {
    /// Whether the remote process exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A live session to the remote shell host
///
/// # Ownership
///
/// While idle a session is owned by the `ConnectionPool`. While checked out
/// it is exclusively owned by a single in-flight operation; a session is
/// never shared between two concurrent operations.
#[async_trait]
pub trait RemoteSession: Send + 'static {
    /// Run one fully wrapped remote-shell invocation
    ///
    /// # Returns
    ///
    /// - `Ok(CommandOutput)`: The command ran (whatever its exit code)
    /// - `Err(Error::Transport)`: The command could not be started or transmitted
    async fn exec(&mut self, invocation: &str) -> Result<CommandOutput, crate::Error>;

    /// Tear the session down
    async fn close(self);
}

/// Opens new sessions against the configured remote host
///
/// All sessions share one username/hostname/password triple.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Session type produced by this connector
    type Session: RemoteSession;

    /// Open and authenticate a new session
    ///
    /// # Returns
    ///
    /// - `Ok(Session)`: A ready session
    /// - `Err(Error::Connection)`: Host unreachable or authentication failed
    async fn connect(&self) -> Result<Self::Session, crate::Error>;

    /// Liveness probe for an idle session
    ///
    /// Only consulted when the pool is configured with `probe_on_acquire`.
    async fn is_alive(&self, _session: &mut Self::Session) -> bool {
        true
    }

    /// Remote host name (for logging/debugging)
    fn target(&self) -> &str;
}
