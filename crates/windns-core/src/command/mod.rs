//! PowerShell command descriptors
//!
//! A [`PsCommand`] is pure string assembly: fragments joined by a space,
//! followed by the optional server, JSON conversion, and depth clauses in
//! that order. Building never touches the network and identical inputs
//! always produce an identical descriptor.
//!
//! Every string that reaches a builder here has already been through the
//! sanitizer (see [`crate::record::sanitize`]); the builders only quote.
//!
//! ## Example
//!
//! ```rust
//! use windns_core::command::{PsCommand, PsCommandOptions};
//!
//! let cmd = PsCommand::new(
//!     ["Get-DnsServerZone"],
//!     PsCommandOptions {
//!         json_output: true,
//!         json_depth: Some(2),
//!         server: Some("dc01".to_string()),
//!         ..Default::default()
//!     },
//! );
//! assert_eq!(cmd.text(), "Get-DnsServerZone -ComputerName dc01 | ConvertTo-Json -Depth 2");
//! ```

pub mod executor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::config::ServerSettings;
use crate::error::{Error, Result};
use crate::record::{RecordId, RecordSet, RecordType};

/// Prefix of the remote-shell invocation form
pub const INVOCATION_PREFIX: &str = "powershell.exe -EncodedCommand ";

/// JSON depth used for record queries
pub const QUERY_JSON_DEPTH: u32 = 4;

/// Remote-host credentials declared on a command descriptor
///
/// Carried for the transport's benefit; never interpolated into command text.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// ⚠️ NEVER log this value
    pub fn password(&self) -> &str {
        &self.password
    }
}

// Custom Debug implementation that hides the password
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

/// Options shaping a command descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PsCommandOptions {
    /// Append `| ConvertTo-Json`
    pub json_output: bool,

    /// Append `-Depth <n>` (only together with `json_output`)
    pub json_depth: Option<u32>,

    /// Wrap a single-object JSON response in `[...]` after execution
    pub force_array: bool,

    /// Append `-ComputerName <server>`
    pub server: Option<String>,

    /// Credentials for the remote host
    pub credentials: Option<Credentials>,
}

impl PsCommandOptions {
    fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            server: settings.dns_server.clone(),
            credentials: Some(settings.credentials.clone()),
            ..Default::default()
        }
    }
}

/// A fully assembled PowerShell command line plus its execution options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsCommand {
    text: String,
    options: PsCommandOptions,
}

impl PsCommand {
    /// Assemble a command from its fragments
    pub fn new<I, S>(fragments: I, options: PsCommandOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut text = fragments
            .into_iter()
            .map(|fragment| fragment.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(" ");

        if let Some(server) = &options.server
            && !server.is_empty()
        {
            text.push_str(" -ComputerName ");
            text.push_str(server);
        }

        if options.json_output {
            text.push_str(" | ConvertTo-Json");
            if let Some(depth) = options.json_depth {
                text.push_str(&format!(" -Depth {}", depth));
            }
        }

        Self { text, options }
    }

    /// The PowerShell command text
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn options(&self) -> &PsCommandOptions {
        &self.options
    }

    /// The command wrapped in the remote shell's invocation form
    ///
    /// `powershell.exe -EncodedCommand <base64 of UTF-16LE text>`
    pub fn invocation(&self) -> String {
        let utf16: Vec<u8> = self
            .text
            .encode_utf16()
            .flat_map(|unit| unit.to_le_bytes())
            .collect();
        format!("{}{}", INVOCATION_PREFIX, STANDARD.encode(utf16))
    }
}

impl std::fmt::Display for PsCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Recover the command text from an encoded invocation
pub fn decode_invocation(invocation: &str) -> Result<String> {
    let encoded = invocation
        .trim()
        .strip_prefix(INVOCATION_PREFIX)
        .ok_or_else(|| Error::parse("not an encoded PowerShell invocation"))?;

    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::parse(format!("invalid base64 in invocation: {}", e)))?;

    if bytes.len() % 2 != 0 {
        return Err(Error::parse("encoded command is not valid UTF-16LE"));
    }

    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    String::from_utf16(&units)
        .map_err(|e| Error::parse(format!("encoded command is not valid UTF-16LE: {}", e)))
}

/// Parameter carrying the value of an added record
fn value_parameter(record_type: RecordType) -> &'static str {
    match record_type {
        RecordType::A => "-IPv4Address",
        RecordType::Aaaa => "-IPv6Address",
        RecordType::Txt => "-DescriptiveText",
        RecordType::Ptr => "-PtrDomainName",
        RecordType::Cname => "-HostNameAlias",
    }
}

/// Render an already sanitized value as a command argument
fn value_argument(record_type: RecordType, value: &str) -> String {
    match record_type {
        RecordType::Aaaa => value.to_lowercase(),
        RecordType::Txt => format!("\"{}\"", value),
        _ => value.to_string(),
    }
}

/// Query every object of one record set
pub fn get_record(id: &RecordId, settings: &ServerSettings) -> PsCommand {
    PsCommand::new(
        [
            "Get-DnsServerResourceRecord",
            "-ZoneName",
            id.zone(),
            "-Name",
            id.host(),
            "-RRType",
            id.record_type().as_str(),
        ],
        PsCommandOptions {
            json_output: true,
            json_depth: Some(QUERY_JSON_DEPTH),
            force_array: true,
            ..PsCommandOptions::from_settings(settings)
        },
    )
}

/// Add one value of a record set
///
/// `-CreatePtr` is appended for A/AAAA sets that ask for a reverse record.
pub fn add_record(record: &RecordSet, value: &str, settings: &ServerSettings) -> PsCommand {
    let record_type = record.record_type();
    let type_switch = format!("-{}", record_type.as_str());
    let argument = value_argument(record_type, value);

    let mut fragments = vec![
        "Add-DnsServerResourceRecord",
        "-ZoneName",
        record.zone(),
        "-Name",
        record.host(),
        type_switch.as_str(),
        value_parameter(record_type),
        argument.as_str(),
    ];
    if record.create_reverse() && record_type.supports_reverse() {
        fragments.push("-CreatePtr");
    }

    PsCommand::new(fragments, PsCommandOptions::from_settings(settings))
}

/// Remove exactly one value of a record set, leaving the others in place
pub fn remove_record(record: &RecordSet, value: &str, settings: &ServerSettings) -> PsCommand {
    let argument = match record.record_type() {
        RecordType::Txt => format!("\"{}\"", value),
        _ => value.to_string(),
    };

    PsCommand::new(
        [
            "Remove-DnsServerResourceRecord",
            "-Force",
            "-ZoneName",
            record.zone(),
            "-RRType",
            record.record_type().as_str(),
            "-Name",
            record.host(),
            "-RecordData",
            argument.as_str(),
        ],
        PsCommandOptions::from_settings(settings),
    )
}
