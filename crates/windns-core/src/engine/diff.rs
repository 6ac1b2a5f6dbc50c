// # Value Diff
//
// Symmetric difference between observed and desired values by membership
// scan. Value sets are small so the O(n*m) scan is fine. Equality is exact
// on sanitized values; type-aware normalization lives in `suppress`.

use serde::Serialize;

/// Values to add and remove to move from observed to desired
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValueDiff {
    /// Desired values missing from the server, in desired order
    pub to_add: Vec<String>,
    /// Observed values no longer desired, in observed order
    pub to_remove: Vec<String>,
}

impl ValueDiff {
    /// Whether nothing needs to change
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Compute the changes that turn `observed` into `desired`
pub fn compute_diff<O, D>(observed: &[O], desired: &[D]) -> ValueDiff
where
    O: AsRef<str>,
    D: AsRef<str>,
{
    let to_add = desired
        .iter()
        .map(|d| d.as_ref())
        .filter(|d| !observed.iter().any(|o| o.as_ref() == *d))
        .map(str::to_string)
        .collect();

    let to_remove = observed
        .iter()
        .map(|o| o.as_ref())
        .filter(|o| !desired.iter().any(|d| d.as_ref() == *o))
        .map(str::to_string)
        .collect();

    ValueDiff { to_add, to_remove }
}
