//! DNS record model
//!
//! A [`RecordSet`] is the (zone, host, type) keyed collection of values under
//! reconciliation. The remote server issues no primary key, so the composite
//! [`RecordId`] is the record set's only persistent identifier; changing any
//! of its three components is destroy-then-create, never an in-place update.
//!
//! Declared values are validated by [`RecordSet::new`] and
//! [`RecordSet::from_input`]. Values read back through
//! [`RecordSet::from_remote`] are only normalized (TXT escaping), so a value
//! the server accepted out of band never makes a record unreadable.

pub mod remote;
pub mod sanitize;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use sanitize::{normalize_observed, sanitize_token, sanitize_value};

pub use remote::{RemoteRecord, parse_remote_records};

/// Separator between the components of a [`RecordId`]
///
/// Not a member of the token allow-list, so it never occurs inside a component.
pub const ID_SEPARATOR: char = '/';

/// Supported DNS record types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    /// IPv4 address record
    A,
    /// IPv6 address record
    Aaaa,
    /// Descriptive text record
    Txt,
    /// Reverse-lookup pointer record
    Ptr,
    /// Canonical name (alias) record
    Cname,
}

impl RecordType {
    /// All supported types
    pub const ALL: [RecordType; 5] = [
        RecordType::A,
        RecordType::Aaaa,
        RecordType::Txt,
        RecordType::Ptr,
        RecordType::Cname,
    ];

    /// Canonical upper-case name, as used by the DNS server cmdlets
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Txt => "TXT",
            RecordType::Ptr => "PTR",
            RecordType::Cname => "CNAME",
        }
    }

    /// Whether the server can create a reverse (PTR) entry alongside this type
    pub fn supports_reverse(&self) -> bool {
        matches!(self, RecordType::A | RecordType::Aaaa)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RecordType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::unsupported_type(s))
    }
}

/// Composite identity of a record set: `<host>/<zone>/<type>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordId {
    host: String,
    zone: String,
    record_type: RecordType,
}

impl RecordId {
    /// Relative name within the zone
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Zone name
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Record type
    pub fn record_type(&self) -> RecordType {
        self.record_type
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.host,
            self.zone,
            self.record_type,
            sep = ID_SEPARATOR
        )
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(ID_SEPARATOR).collect();
        let [host, zone, record_type] = parts.as_slice() else {
            return Err(Error::validation(format!(
                "record id {:?} must have the form <name>{sep}<zone_name>{sep}<type>",
                s,
                sep = ID_SEPARATOR
            )));
        };

        Ok(Self {
            host: sanitize_token("name", host)?,
            zone: sanitize_token("zone_name", zone)?,
            record_type: record_type.parse()?,
        })
    }
}

impl Serialize for RecordId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Caller-declared desired state, as raw strings
///
/// Field names follow the resource schema the record set is declared with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordInput {
    /// Zone name
    pub zone_name: String,
    /// Record name within the zone
    pub name: String,
    /// Record type name
    #[serde(rename = "type")]
    pub record_type: String,
    /// Desired values
    pub records: Vec<String>,
    /// Also create reverse (PTR) entries for A/AAAA values
    #[serde(default)]
    pub create_ptr: bool,
}

/// A DNS record set under reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSet {
    zone: String,
    host: String,
    #[serde(rename = "type")]
    record_type: RecordType,
    values: Vec<String>,
    create_reverse: bool,
}

impl RecordSet {
    /// Build a record set, sanitizing every component
    ///
    /// Duplicate values are dropped, keeping the first occurrence.
    pub fn new<I, S>(
        zone: &str,
        host: &str,
        record_type: RecordType,
        values: I,
        create_reverse: bool,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sanitized: Vec<String> = Vec::new();
        for value in values {
            let value = sanitize_value(record_type, value.as_ref())?;
            if !sanitized.contains(&value) {
                sanitized.push(value);
            }
        }

        Ok(Self {
            zone: sanitize_token("zone_name", zone)?,
            host: sanitize_token("name", host)?,
            record_type,
            values: sanitized,
            create_reverse,
        })
    }

    /// Build a record set from caller-declared desired state
    ///
    /// Required fields are checked first so the error names the missing one.
    pub fn from_input(input: &RecordInput) -> Result<Self> {
        if input.zone_name.is_empty() {
            return Err(Error::validation("missing zone_name variable"));
        }
        if input.name.is_empty() {
            return Err(Error::validation("missing name variable"));
        }
        if input.record_type.is_empty() {
            return Err(Error::validation("missing type variable"));
        }
        if input.records.is_empty() {
            return Err(Error::validation("missing records variable"));
        }

        let record_type: RecordType = input.record_type.parse()?;
        Self::new(
            &input.zone_name,
            &input.name,
            record_type,
            &input.records,
            input.create_ptr,
        )
    }

    /// Reconstruct the observed record set from parsed query output
    ///
    /// Host and type come from the first object, as the server reports them;
    /// the zone comes from the queried identity.
    pub fn from_remote(id: &RecordId, records: &[RemoteRecord]) -> Result<Self> {
        let first = records
            .first()
            .ok_or_else(|| Error::parse(format!("no records returned for {}", id)))?;

        let record_type = first
            .record_type
            .as_deref()
            .map(RecordType::from_str)
            .transpose()?
            .unwrap_or(id.record_type);
        let host = first.host_name.as_deref().unwrap_or(&id.host);

        // Observed values are normalized, never validated: a value added out
        // of band must not make the record unreadable.
        let mut values: Vec<String> = Vec::with_capacity(records.len());
        for record in records {
            let value = normalize_observed(record_type, &record.value()?);
            if !values.contains(&value) {
                values.push(value);
            }
        }

        Ok(Self {
            zone: id.zone.clone(),
            host: host.to_string(),
            record_type,
            values,
            create_reverse: false,
        })
    }

    /// Composite identity: a pure function of (host, zone, type)
    pub fn id(&self) -> RecordId {
        RecordId {
            host: self.host.clone(),
            zone: self.zone.clone(),
            record_type: self.record_type,
        }
    }

    /// Zone name
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Record name within the zone
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Record type
    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    /// Sanitized values
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Whether reverse entries are requested (only meaningful for A/AAAA)
    pub fn create_reverse(&self) -> bool {
        self.create_reverse
    }

    /// Set the reverse-entry flag
    pub fn with_create_reverse(mut self, create_reverse: bool) -> Self {
        self.create_reverse = create_reverse;
        self
    }
}

/// Observed lifecycle state of a record set on the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum RecordState {
    /// No values exist for the identity
    Absent,
    /// At least one value exists
    Present(RecordSet),
}

impl RecordState {
    /// Whether the record set exists
    pub fn is_present(&self) -> bool {
        matches!(self, RecordState::Present(_))
    }

    /// The observed record set, if present
    pub fn into_record(self) -> Option<RecordSet> {
        match self {
            RecordState::Present(record) => Some(record),
            RecordState::Absent => None,
        }
    }
}
