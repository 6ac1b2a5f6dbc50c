// # Command Executor
//
// Runs a `PsCommand` on a pooled session.
//
// - The session goes back to the pool on every exit path (the guard releases on drop)
// - A session whose transport failed is discarded instead of returned
// - A non-zero exit code is returned in `CommandOutput`, not as an error
// - Force-array descriptors get single-object JSON wrapped in `[...]`

use tracing::debug;

use super::PsCommand;
use crate::error::Result;
use crate::pool::ConnectionPool;
use crate::traits::{CommandOutput, Connector, RemoteSession};

/// Run a command descriptor on a session from `pool`
///
/// # Returns
///
/// - `Ok(CommandOutput)`: The command ran; inspect `exit_code`
/// - `Err(Error::Connection)`: No session could be acquired
/// - `Err(Error::Transport)`: The command could not be started or transmitted
pub async fn execute<C: Connector>(command: &PsCommand, pool: &ConnectionPool<C>) -> Result<CommandOutput> {
    let mut session = pool.acquire().await?;
    debug!("Running remote command: {}", command);

    let result = session.exec(&command.invocation()).await;
    let mut output = match result {
        Ok(output) => {
            pool.release(session);
            output
        }
        Err(e) => {
            debug!("Discarding session after transport failure: {}", e);
            pool.discard(session).await;
            return Err(e);
        }
    };

    debug!(
        "Remote command exited with code {} ({} bytes stdout, {} bytes stderr)",
        output.exit_code,
        output.stdout.len(),
        output.stderr.len()
    );

    if command.options().force_array {
        output.stdout = normalize_array(&output.stdout);
    }

    Ok(output)
}

/// Wrap a lone JSON object in array brackets
///
/// Empty output and output that already opens an array pass through unchanged.
pub fn normalize_array(stdout: &str) -> String {
    let trimmed = stdout.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('[') {
        stdout.to_string()
    } else {
        format!("[{}]", stdout)
    }
}
