use crate::instrument::InstrumentState;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Current snapshot schema version. Bump on any incompatible change to
/// `InstrumentState` serialization.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Versioned, date-stamped dump of every registered instrument state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistrySnapshot {
    pub version: u32,
    /// Calendar day the snapshot belongs to; restores are only merged
    /// back on the same day.
    pub date: NaiveDate,
    pub entries: Vec<InstrumentState>,
}

impl RegistrySnapshot {
    #[must_use]
    pub fn new(date: NaiveDate, entries: Vec<InstrumentState>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            date,
            entries,
        }
    }
}

/// Store key for a given calendar day, `analyse_<ISO-date>`.
#[must_use]
pub fn snapshot_key(date: NaiveDate) -> String {
    format!("analyse_{}", date.format("%Y-%m-%d"))
}
