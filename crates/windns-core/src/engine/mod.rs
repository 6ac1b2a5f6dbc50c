//! Record reconciliation engine
//!
//! The RecordEngine is responsible for:
//! - Turning declared record sets into per-value add/remove commands
//! - Reading the observed state of a record set back from the server
//! - Reporting every applied value as an event, so partial failures are inspectable
//!
//! ## Architecture
//!
//! ```text
//!                  ┌──────────────┐
//! RecordSet ──────▶│ RecordEngine │──── EngineEvent ────▶ caller
//!                  └──────────────┘
//!                         │
//!                         ▼
//!                  ┌──────────────┐       ┌────────────────┐
//!                  │  PsCommand   │──────▶│ ConnectionPool │──▶ remote shell
//!                  │  (builder)   │execute│  (sessions)    │
//!                  └──────────────┘       └────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! Per record set: **Absent → Present → (mutated) Present → Absent**.
//! State is never persisted; [`RecordEngine::read`] reports it as a
//! [`RecordState`].
//!
//! ## Failure Semantics
//!
//! There are no retries and no rollback. A multi-value operation aborts on
//! the first failing value; values applied before it stay applied and have
//! already been reported through `ValueAdded` / `ValueRemoved` events.
//!
//! Operations on the same identity are not sequenced here; callers
//! serialize them.

pub mod diff;

pub use diff::{ValueDiff, compute_diff};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use crate::command::{self, executor};
use crate::config::{ServerSettings, WinDnsConfig};
use crate::error::{Error, Result};
use crate::pool::ConnectionPool;
use crate::record::remote::parse_remote_records;
use crate::record::{RecordId, RecordSet, RecordState};
use crate::traits::Connector;

/// Substring the DNS server writes to stderr when a queried record does not exist
const NOT_FOUND_MARKER: &str = "ObjectNotFound";

/// Engine operation, as reported in failure events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Events emitted by the RecordEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// One value was added on the server
    ValueAdded { id: RecordId, value: String },

    /// One value was removed from the server
    ValueRemoved { id: RecordId, value: String },

    /// A record set was read and exists
    RecordRead { id: RecordId, values: usize },

    /// A record set was read and does not exist
    RecordAbsent { id: RecordId },

    /// An operation aborted
    OperationFailed {
        id: RecordId,
        operation: Operation,
        error: String,
    },
}

/// Record reconciliation engine
///
/// The engine holds no connections of its own: every operation takes the
/// caller's [`ConnectionPool`], so one pool can be shared across engines
/// and torn down explicitly with [`ConnectionPool::close`].
///
/// ## Load Resistance
///
/// Events go through a bounded channel. When it is full, new events are
/// dropped with a warning rather than blocking an operation.
pub struct RecordEngine {
    /// Target server and credentials stamped onto every command
    settings: ServerSettings,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl RecordEngine {
    /// Create a new record engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(config: &WinDnsConfig) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            settings: config.server_settings(),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Per-command settings used by this engine
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Create every value of a record set
    ///
    /// # Returns
    ///
    /// - `Ok(RecordId)`: All values were added; the id is the only handle there is
    /// - `Err(Error::Validation)`: The set carries no values (nothing is sent)
    /// - `Err(_)`: The first failing value's error; earlier values remain
    pub async fn create<C: Connector>(&self, pool: &ConnectionPool<C>, record: &RecordSet) -> Result<RecordId> {
        let id = record.id();

        if record.values().is_empty() {
            return Err(self.fail(&id, Operation::Create, Error::validation("missing records variable")));
        }

        for value in record.values() {
            if let Err(e) = self.add_value(pool, record, value).await {
                return Err(self.fail(&id, Operation::Create, e));
            }
        }

        info!("Created {} with {} value(s)", id, record.values().len());
        Ok(id)
    }

    /// Read the observed state of a record set
    ///
    /// A record the server reports as missing is `RecordState::Absent`, not
    /// an error, so callers can treat it as deleted out of band.
    pub async fn read<C: Connector>(&self, pool: &ConnectionPool<C>, id: &RecordId) -> Result<RecordState> {
        match self.query(pool, id).await {
            Ok(record) => {
                debug!("Read {} with {} value(s)", id, record.values().len());
                self.emit_event(EngineEvent::RecordRead {
                    id: id.clone(),
                    values: record.values().len(),
                });
                Ok(RecordState::Present(record))
            }
            Err(e) if e.is_not_found() => {
                debug!("Record {} does not exist", id);
                self.emit_event(EngineEvent::RecordAbsent { id: id.clone() });
                Ok(RecordState::Absent)
            }
            Err(e) => Err(self.fail(id, Operation::Read, e)),
        }
    }

    /// Converge the values of an existing record set
    ///
    /// All additions are issued before any removal, so a full replacement
    /// never leaves the name without a value.
    ///
    /// # Returns
    ///
    /// - `Ok(ValueDiff)`: The changes that were applied
    /// - `Err(Error::Validation)`: `desired` names a different record set than `id`
    pub async fn update<C: Connector>(
        &self,
        pool: &ConnectionPool<C>,
        id: &RecordId,
        desired: &RecordSet,
    ) -> Result<ValueDiff> {
        if desired.id() != *id {
            return Err(self.fail(
                id,
                Operation::Update,
                Error::validation(format!(
                    "cannot change identity from {} to {} in place; delete and create instead",
                    id,
                    desired.id()
                )),
            ));
        }

        let observed = match self.read(pool, id).await? {
            RecordState::Present(record) => record.values().to_vec(),
            RecordState::Absent => {
                warn!("Record {} is absent, re-adding all desired values", id);
                Vec::new()
            }
        };

        let diff = compute_diff(&observed, desired.values());
        if diff.is_empty() {
            debug!("Record {} already up to date", id);
            return Ok(diff);
        }

        for value in &diff.to_add {
            if let Err(e) = self.add_value(pool, desired, value).await {
                return Err(self.fail(id, Operation::Update, e));
            }
        }
        for value in &diff.to_remove {
            if let Err(e) = self.remove_value(pool, desired, value).await {
                return Err(self.fail(id, Operation::Update, e));
            }
        }

        info!(
            "Updated {}: {} added, {} removed",
            id,
            diff.to_add.len(),
            diff.to_remove.len()
        );
        Ok(diff)
    }

    /// Remove every value of a record set, one command per value
    pub async fn delete<C: Connector>(&self, pool: &ConnectionPool<C>, record: &RecordSet) -> Result<()> {
        let id = record.id();

        for value in record.values() {
            if let Err(e) = self.remove_value(pool, record, value).await {
                return Err(self.fail(&id, Operation::Delete, e));
            }
        }

        info!("Deleted {} ({} value(s))", id, record.values().len());
        Ok(())
    }

    async fn query<C: Connector>(&self, pool: &ConnectionPool<C>, id: &RecordId) -> Result<RecordSet> {
        let cmd = command::get_record(id, &self.settings);
        let output = executor::execute(&cmd, pool).await?;

        if !output.success() {
            if output.stderr.contains(NOT_FOUND_MARKER) {
                return Err(Error::not_found(format!("record {} does not exist", id)));
            }
            return Err(Error::remote_exit(
                "Get-DnsServerResourceRecord",
                output.exit_code,
                output.stderr,
            ));
        }

        let records = parse_remote_records(&output.stdout)?;
        RecordSet::from_remote(id, &records)
    }

    async fn add_value<C: Connector>(&self, pool: &ConnectionPool<C>, record: &RecordSet, value: &str) -> Result<()> {
        let cmd = command::add_record(record, value, &self.settings);
        let output = executor::execute(&cmd, pool).await?;

        if !output.success() {
            return Err(Error::remote_exit(
                "Add-DnsServerResourceRecord",
                output.exit_code,
                output.stderr,
            ));
        }

        let id = record.id();
        if record.create_reverse() && record.record_type().supports_reverse() {
            info!("Added {} to {} (with reverse record)", value, id);
        } else {
            info!("Added {} to {}", value, id);
        }
        self.emit_event(EngineEvent::ValueAdded {
            id,
            value: value.to_string(),
        });
        Ok(())
    }

    async fn remove_value<C: Connector>(&self, pool: &ConnectionPool<C>, record: &RecordSet, value: &str) -> Result<()> {
        let cmd = command::remove_record(record, value, &self.settings);
        let output = executor::execute(&cmd, pool).await?;

        if !output.success() {
            return Err(Error::remote_exit(
                "Remove-DnsServerResourceRecord",
                output.exit_code,
                output.stderr,
            ));
        }

        let id = record.id();
        info!("Removed {} from {}", value, id);
        self.emit_event(EngineEvent::ValueRemoved {
            id,
            value: value.to_string(),
        });
        Ok(())
    }

    /// Log and report a failed operation, handing the error back
    fn fail(&self, id: &RecordId, operation: Operation, error: Error) -> Error {
        error!("Failed to {} {}: {}", operation, id, error);
        self.emit_event(EngineEvent::OperationFailed {
            id: id.clone(),
            operation,
            error: error.to_string(),
        });
        error
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            // Consumer is slower than the engine; drop rather than block
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Event receiver dropped, discarding event");
            }
        }
    }
}
