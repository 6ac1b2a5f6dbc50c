// # Remote Record Model
//
// Shape of `Get-DnsServerResourceRecord | ConvertTo-Json` output. The server
// emits many more properties; only the ones below are read. Each object
// carries exactly one value, nested in `RecordData.CimInstanceProperties`.

use serde::Deserialize;

use crate::error::{Error, Result};

/// One resource record object as serialized by the DNS server
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRecord {
    /// Relative record name
    #[serde(rename = "HostName", default)]
    pub host_name: Option<String>,

    /// Record type name
    #[serde(rename = "RecordType", default)]
    pub record_type: Option<String>,

    /// Directory object name of the record
    #[serde(rename = "DistinguishedName", default)]
    pub distinguished_name: Option<String>,

    /// Record payload
    #[serde(rename = "RecordData")]
    pub record_data: RecordData,

    /// Record TTL (parsed but not reconciled)
    #[serde(rename = "TimeToLive", default)]
    pub time_to_live: Option<TimeToLive>,
}

/// Payload wrapper of a remote record
#[derive(Debug, Clone, Deserialize)]
pub struct RecordData {
    /// Typed properties of the payload; the first one holds the value
    #[serde(rename = "CimInstanceProperties", default)]
    pub cim_instance_properties: Vec<CimInstanceProperty>,
}

/// One typed property of a record payload
#[derive(Debug, Clone, Deserialize)]
pub struct CimInstanceProperty {
    /// Property value; usually a string, stringified otherwise
    #[serde(rename = "Value", alias = "value", default)]
    pub value: serde_json::Value,
}

/// TTL structure of a remote record
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TimeToLive {
    /// TTL in whole seconds
    #[serde(rename = "TotalSeconds", default)]
    pub total_seconds: i64,
}

impl RemoteRecord {
    /// The single value carried by this object
    pub fn value(&self) -> Result<String> {
        let property = self
            .record_data
            .cim_instance_properties
            .first()
            .ok_or_else(|| {
                Error::parse(format!(
                    "record {} carries no record data",
                    self.host_name.as_deref().unwrap_or("<unnamed>")
                ))
            })?;

        match &property.value {
            serde_json::Value::String(s) => Ok(s.clone()),
            serde_json::Value::Null => Err(Error::parse("record data value is null")),
            other => Ok(other.to_string()),
        }
    }

    /// TTL in seconds, when reported
    pub fn ttl_seconds(&self) -> Option<i64> {
        self.time_to_live.map(|ttl| ttl.total_seconds)
    }
}

/// Parse query output into one-or-more remote records
///
/// Expects the array form produced by force-array normalization.
pub fn parse_remote_records(stdout: &str) -> Result<Vec<RemoteRecord>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(Error::parse("empty json document"));
    }

    let records: Vec<RemoteRecord> = serde_json::from_str(trimmed).map_err(|e| {
        tracing::debug!(
            "Failed to parse record json document with error {:?}, document was {}",
            e,
            trimmed
        );
        Error::parse(format!("failed while parsing record json document: {}", e))
    })?;

    if records.is_empty() {
        return Err(Error::parse(format!(
            "no records in record json document: {}",
            trimmed
        )));
    }

    Ok(records)
}
