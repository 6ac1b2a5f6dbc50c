// # windns-core
//
// Core library for reconciling DNS records on a Windows DNS server over a
// pooled remote-shell transport.
//
// ## Architecture Overview
//
// - **Connector / RemoteSession**: Traits for opening sessions and running remote commands
// - **ConnectionPool**: Explicit, caller-owned pool of reusable sessions
// - **PsCommand**: Pure PowerShell command assembly and encoded invocation
// - **RecordSet / RecordId**: Sanitized record model and its composite identity
// - **RecordEngine**: Create / Read / Update / Delete against the DNS server
// - **suppress**: Change detection that ignores server-side rewrites
//
// ## Design Principles
//
// 1. **Transport-Agnostic Core**: SSH lives in its own crate behind `Connector`
// 2. **Sanitize Once**: Every string is validated or escaped before it can reach a command
// 3. **No Hidden State**: The pool is passed in; record state is read, never cached
// 4. **Library-First**: All core functionality can be used as a library

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod pool;
pub mod record;
pub mod suppress;
pub mod traits;

// Re-export core types for convenience
pub use command::{Credentials, PsCommand, PsCommandOptions};
pub use config::{EngineConfig, PoolConfig, ServerSettings, SshConfig, WinDnsConfig};
pub use engine::{EngineEvent, Operation, RecordEngine, ValueDiff, compute_diff};
pub use error::{Error, Result};
pub use pool::{ConnectionPool, PoolStats, PooledSession};
pub use record::{RecordId, RecordInput, RecordSet, RecordState, RecordType};
pub use traits::{CommandOutput, Connector, RemoteSession};
