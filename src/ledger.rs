//! World state and key history over sled.
//!
//! Layout inside the default tree:
//! - `S` + key: current value of a key
//! - `H` + u32 BE key length + key + u64 BE sequence: one [`HistoryEntry`] per commit touching the key
//!
//! Writes made through a [`Transaction`] are buffered and land in one
//! `sled::Batch`, so an invocation either commits all of its writes and their
//! history or none of them.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use minicbor::bytes::ByteVec;
use sled::Batch;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::types::TimeStamp;
use crate::utils;

const STATE_PREFIX: u8 = b'S';
const HISTORY_PREFIX: u8 = b'H';
const COMPOSITE_SEP: char = '\0';

/// What the contracts need from the ledger.
pub trait LedgerStub {
    fn tx_id(&self) -> &str;
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<()>;
    fn del_state(&mut self, key: &str) -> Result<()>;
    /// Committed modifications of `key`, newest first.
    fn history_for_key(&self, key: &str) -> Result<HistoryCursor>;
    /// Live keys under the composite prefix built from `index` and `attributes`.
    fn keys_by_partial_composite_key(&self, index: &str, attributes: &[&str])
    -> Result<Vec<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct HistoryEntry {
    #[n(0)]
    pub tx_id: String,
    #[n(1)]
    pub timestamp: TimeStamp<Utc>,
    #[n(2)]
    pub value: Option<ByteVec>, // None marks a delete
}

/// One committed modification of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyModification {
    pub tx_id: String,
    pub timestamp: TimeStamp<Utc>,
    pub value: Option<Vec<u8>>,
    pub is_delete: bool,
}

/// Iterator over a key's history.
///
/// Holds the underlying sled iterator until dropped.
pub struct HistoryCursor {
    key: String,
    inner: std::iter::Rev<sled::Iter>,
}

impl Iterator for HistoryCursor {
    type Item = Result<KeyModification>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        Some(item.map_err(LedgerError::from).and_then(|(_, raw)| {
            let entry: HistoryEntry = minicbor::decode(&raw)
                .map_err(|e| LedgerError::decoding("history entry", &self.key, e))?;
            let value = entry.value.map(|bytes| bytes.to_vec());
            Ok(KeyModification {
                tx_id: entry.tx_id,
                timestamp: entry.timestamp,
                is_delete: value.is_none(),
                value,
            })
        }))
    }
}

fn state_key(key: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 1);
    out.push(STATE_PREFIX);
    out.extend_from_slice(key.as_bytes());
    out
}

fn history_prefix(key: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 5);
    out.push(HISTORY_PREFIX);
    out.extend_from_slice(&(key.len() as u32).to_be_bytes());
    out.extend_from_slice(key.as_bytes());
    out
}

fn history_key(key: &str, seq: u64) -> Vec<u8> {
    let mut out = history_prefix(key);
    out.extend_from_slice(&seq.to_be_bytes());
    out
}

/// Builds `\0index\0attr1\0attr2\0`.
pub fn create_composite_key(index: &str, attributes: &[&str]) -> Result<String> {
    if index.is_empty() {
        return Err(LedgerError::Validation(
            "composite key index must not be empty".to_string(),
        ));
    }
    let mut key = String::new();
    key.push(COMPOSITE_SEP);
    for part in std::iter::once(&index).chain(attributes.iter()) {
        if part.contains(COMPOSITE_SEP) {
            return Err(LedgerError::Validation(format!(
                "composite key attribute {part:?} contains the reserved separator"
            )));
        }
        key.push_str(part);
        key.push(COMPOSITE_SEP);
    }
    Ok(key)
}

/// Inverse of [`create_composite_key`]: the index name and its attributes.
pub fn split_composite_key(key: &str) -> Result<(String, Vec<String>)> {
    let body = key
        .strip_prefix(COMPOSITE_SEP)
        .and_then(|rest| rest.strip_suffix(COMPOSITE_SEP))
        .ok_or_else(|| LedgerError::Validation(format!("{key:?} is not a composite key")))?;
    let mut parts = body.split(COMPOSITE_SEP).map(str::to_string);
    let index = parts.next().unwrap_or_default();
    Ok((index, parts.collect()))
}

/// Entity keys share the keyspace with composite keys, so they may not be
/// empty or start with the separator.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(LedgerError::Validation("key must not be empty".to_string()));
    }
    if key.starts_with(COMPOSITE_SEP) {
        return Err(LedgerError::Validation(format!(
            "key {key:?} uses the reserved composite prefix"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SledLedger {
    instance: Arc<sled::Db>,
}

impl SledLedger {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }

    pub fn open(config: &LedgerConfig) -> Result<Self> {
        let db = sled::Config::new()
            .path(&config.path)
            .temporary(config.temporary)
            .open()?;
        Ok(Self::new(Arc::new(db)))
    }

    /// Starts a transaction whose id is derived from the creator's credential.
    pub fn begin(&self, creator: &[u8]) -> Transaction {
        Transaction {
            db: Arc::clone(&self.instance),
            tx_id: utils::new_tx_id(creator),
            writes: BTreeMap::new(),
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.instance.flush()?;
        Ok(())
    }
}

/// Outcome of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub tx_id: String,
    pub writes: usize,
}

/// Buffered writes of one invocation. Dropping it without [`Transaction::commit`]
/// discards every write.
pub struct Transaction {
    db: Arc<sled::Db>,
    tx_id: String,
    writes: BTreeMap<String, Option<Vec<u8>>>,
}

impl Transaction {
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    pub fn commit(self) -> Result<CommitSummary> {
        let timestamp = TimeStamp::new();
        let mut batch = Batch::default();

        for (key, value) in &self.writes {
            match value {
                Some(bytes) => batch.insert(state_key(key), bytes.as_slice()),
                None => batch.remove(state_key(key)),
            }
            let entry = HistoryEntry {
                tx_id: self.tx_id.clone(),
                timestamp: timestamp.clone(),
                value: value.clone().map(ByteVec::from),
            };
            let encoded = minicbor::to_vec(&entry)
                .map_err(|e| LedgerError::Storage(format!("failed to encode history: {e}")))?;
            batch.insert(history_key(key, self.db.generate_id()?), encoded);
        }
        self.db.apply_batch(batch)?;

        Ok(CommitSummary {
            tx_id: self.tx_id,
            writes: self.writes.len(),
        })
    }
}

impl LedgerStub for Transaction {
    fn tx_id(&self) -> &str {
        &self.tx_id
    }

    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(pending) = self.writes.get(key) {
            return Ok(pending.clone());
        }
        Ok(self.db.get(state_key(key))?.map(|v| v.to_vec()))
    }

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        if key.is_empty() {
            return Err(LedgerError::Validation("key must not be empty".to_string()));
        }
        self.writes.insert(key.to_string(), Some(value));
        Ok(())
    }

    fn del_state(&mut self, key: &str) -> Result<()> {
        self.writes.insert(key.to_string(), None);
        Ok(())
    }

    fn history_for_key(&self, key: &str) -> Result<HistoryCursor> {
        Ok(HistoryCursor {
            key: key.to_string(),
            inner: self.db.scan_prefix(history_prefix(key)).rev(),
        })
    }

    fn keys_by_partial_composite_key(
        &self,
        index: &str,
        attributes: &[&str],
    ) -> Result<Vec<String>> {
        let prefix = create_composite_key(index, attributes)?;

        let mut keys = BTreeSet::new();
        for item in self.db.scan_prefix(state_key(&prefix)) {
            let (raw, _) = item?;
            let key = String::from_utf8(raw[1..].to_vec())
                .map_err(|e| LedgerError::decoding("composite key", &prefix, e))?;
            keys.insert(key);
        }
        // overlay this transaction's own writes
        for (key, value) in self.writes.range(prefix.clone()..) {
            if !key.starts_with(&prefix) {
                break;
            }
            match value {
                Some(_) => keys.insert(key.clone()),
                None => keys.remove(key),
            };
        }
        Ok(keys.into_iter().collect())
    }
}
