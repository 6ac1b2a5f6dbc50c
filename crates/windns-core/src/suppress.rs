//! Diff suppression
//!
//! Change detection for callers comparing declared state with what the DNS
//! server reports. A `true` result means "treat as unchanged despite the
//! textual difference".
//!
//! The server rewrites some values on the way in:
//!
//! - PTR and CNAME targets always come back with a trailing `.`
//! - AAAA addresses always come back lower-cased
//!
//! This is a caller-facing concern only. The engine's add/remove diffing
//! uses exact equality on sanitized values.

use crate::record::{RecordSet, RecordType};

/// Compare two value lists of the given record type, ignoring order
pub fn suppress_record_diff<O, N>(old: &[O], new: &[N], record_type: RecordType) -> bool
where
    O: AsRef<str>,
    N: AsRef<str>,
{
    let mut old: Vec<String> = old.iter().map(|v| v.as_ref().to_string()).collect();

    if old.is_empty() && new.is_empty() {
        return true;
    }

    match record_type {
        RecordType::Ptr | RecordType::Cname => {
            let mut new: Vec<String> = new
                .iter()
                .map(|v| {
                    let v = v.as_ref();
                    if v.ends_with('.') {
                        v.to_string()
                    } else {
                        format!("{}.", v)
                    }
                })
                .collect();
            old.sort();
            new.sort();
            old == new
        }
        _ => {
            let mut new: Vec<String> = new.iter().map(|v| v.as_ref().to_string()).collect();
            old.sort();
            new.sort();
            old.len() == new.len()
                && old
                    .iter()
                    .zip(new.iter())
                    .all(|(o, n)| suppress_case_diff(o, n))
        }
    }
}

/// Case-insensitive comparison for the scalar fields (zone, name, type)
pub fn suppress_case_diff(old: &str, new: &str) -> bool {
    old.to_lowercase() == new.to_lowercase()
}

/// Whether moving from `old` to `new` changes the record identity
///
/// Identity changes cannot be applied in place: the old set must be deleted
/// and the new one created.
pub fn requires_replacement(old: &RecordSet, new: &RecordSet) -> bool {
    !suppress_case_diff(old.zone(), new.zone())
        || !suppress_case_diff(old.host(), new.host())
        || old.record_type() != new.record_type()
}
