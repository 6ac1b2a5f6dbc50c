// # Input Sanitizer
//
// Every externally supplied string passes through here before it is
// interpolated into a PowerShell command line.
//
// - zone, host, type and non-TXT values: strict allow-list `[a-zA-Z0-9:.\-_]+`
// - TXT values: at most 255 characters, PowerShell metacharacters escaped with a backtick

use regex::Regex;
use std::sync::LazyLock;

use super::RecordType;
use crate::error::{Error, Result};

/// Maximum length of a TXT value
pub const MAX_TXT_LENGTH: usize = 255;

static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9:.\-_]+$").expect("token pattern is a valid regex")
});

/// Characters PowerShell treats specially inside an unquoted argument, with their escaped form
const ESCAPE_TABLE: &[(char, &str)] = &[
    ('`', "``"),
    (';', "`;"),
    ('&', "`&"),
    ('(', "`("),
    (')', "`)"),
    ('$', "`$"),
    ('"', "`\""),
];

/// Validate a zone, host or type token
///
/// `field` names the input in the error message.
pub fn sanitize_token(field: &str, input: &str) -> Result<String> {
    if TOKEN_PATTERN.is_match(input) {
        Ok(input.to_string())
    } else {
        Err(Error::validation(format!(
            "invalid characters detected in {}: {}",
            field, input
        )))
    }
}

/// Validate (and for TXT, escape) a record value of the given type
pub fn sanitize_value(record_type: RecordType, input: &str) -> Result<String> {
    if record_type == RecordType::Txt {
        if input.chars().count() > MAX_TXT_LENGTH {
            return Err(Error::validation(format!(
                "TXT record can only be {} characters long",
                MAX_TXT_LENGTH
            )));
        }
        return Ok(escape_powershell(input));
    }

    sanitize_token("record value", input)
}

/// Bring a value read back from the server into the form `sanitize_value` produces
///
/// Nothing is rejected: the server already holds the value, whatever its
/// length or alphabet. TXT values get the same escaping so observed and
/// declared values compare by plain equality.
pub fn normalize_observed(record_type: RecordType, input: &str) -> String {
    match record_type {
        RecordType::Txt => escape_powershell(input),
        _ => input.to_string(),
    }
}

/// Escape PowerShell metacharacters with a backtick
pub fn escape_powershell(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match ESCAPE_TABLE.iter().find(|(special, _)| *special == c) {
            Some((_, replacement)) => escaped.push_str(replacement),
            None => escaped.push(c),
        }
    }
    escaped
}
