//! Decoded key history.
use chrono::Utc;

use crate::error::Result;
use crate::ledger::LedgerStub;
use crate::record::{Record, decode_record};
use crate::types::TimeStamp;

/// One committed modification of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord<T> {
    pub key: String,
    /// `None` for a delete, leaving only the bare key.
    pub record: Option<T>,
    pub tx_id: String,
    pub timestamp: TimeStamp<Utc>,
    pub is_delete: bool,
}

/// Every committed value of `key` decoded as `T`, newest first.
pub fn read_history<T: Record>(ledger: &dyn LedgerStub, key: &str) -> Result<Vec<HistoryRecord<T>>> {
    let mut records = Vec::new();
    // the cursor is released when it goes out of scope, early returns included
    for modification in ledger.history_for_key(key)? {
        let modification = modification?;
        let record = match &modification.value {
            Some(bytes) if !bytes.is_empty() => Some(decode_record::<T>(key, bytes)?),
            _ => None,
        };
        records.push(HistoryRecord {
            key: key.to_string(),
            record,
            tx_id: modification.tx_id,
            timestamp: modification.timestamp,
            is_delete: modification.is_delete,
        });
    }
    Ok(records)
}
