//! Per-invocation context handed to every contract operation.
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::history::{HistoryRecord, read_history};
use crate::identity::{Authority, CallContext};
use crate::ledger::{LedgerStub, create_composite_key, split_composite_key};
use crate::record::{Record, decode_record, encode_record};

/// Sentinel stored under composite index keys.
const INDEX_VALUE: [u8; 1] = [0x00];

/// Ledger handle, caller and authorization policy of one invocation.
///
/// Contracts call into each other through the same context, so every read
/// observes the writes made earlier in the invocation.
pub struct TxContext<'a> {
    ledger: &'a mut dyn LedgerStub,
    authority: &'a Authority,
    caller: &'a CallContext,
}

impl<'a> TxContext<'a> {
    pub fn new(
        ledger: &'a mut dyn LedgerStub,
        authority: &'a Authority,
        caller: &'a CallContext,
    ) -> Self {
        Self {
            ledger,
            authority,
            caller,
        }
    }

    pub fn ledger(&self) -> &dyn LedgerStub {
        &*self.ledger
    }

    pub fn tx_id(&self) -> &str {
        self.ledger.tx_id()
    }

    pub fn principal(&self) -> Result<String> {
        self.authority.principal(self.caller)
    }

    /// The caller's org, checked against the node's when the policy says so.
    pub fn require_same_org(&self) -> Result<String> {
        self.authority.require_same_org(self.caller)
    }

    pub fn require_role(&self, role: &str) -> Result<()> {
        self.authority.require_role(self.caller, role)
    }

    /// Fails unless the caller is `advisor`; returns the caller's principal.
    pub fn require_advisor(&self, entity: &str, key: &str, advisor: &str) -> Result<String> {
        let principal = self.principal()?;
        if principal != advisor {
            return Err(LedgerError::Authorization(format!(
                "{principal} does not advise {entity} {key}"
            )));
        }
        Ok(principal)
    }

    pub fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.ledger.get_state(key)?.is_some())
    }

    /// Locations are checked by key only; any record may serve as one.
    pub fn require_location(&self, key: &str) -> Result<()> {
        if key.is_empty() || !self.exists(key)? {
            return Err(LedgerError::not_found("location", key));
        }
        Ok(())
    }

    pub fn require_absent(&self, entity: &'static str, key: &str) -> Result<()> {
        crate::ledger::validate_key(key)?;
        if self.exists(key)? {
            return Err(LedgerError::already_exists(entity, key));
        }
        Ok(())
    }

    pub fn load<T: Record>(&self, key: &str) -> Result<T> {
        match self.ledger.get_state(key)? {
            Some(bytes) => decode_record(key, &bytes),
            None => Err(LedgerError::not_found(T::DOC_TYPE, key)),
        }
    }

    pub fn store<T: Record>(&mut self, key: &str, record: &T) -> Result<()> {
        let bytes = encode_record(key, record)?;
        self.ledger.put_state(key, bytes)
    }

    pub fn put_index(&mut self, index: &str, attributes: &[&str]) -> Result<()> {
        let key = create_composite_key(index, attributes)?;
        debug!(index, key = ?key, "index entry added");
        self.ledger.put_state(&key, INDEX_VALUE.to_vec())
    }

    pub fn del_index(&mut self, index: &str, attributes: &[&str]) -> Result<()> {
        let key = create_composite_key(index, attributes)?;
        debug!(index, key = ?key, "index entry removed");
        self.ledger.del_state(&key)
    }

    /// First attribute (the primary key) of every live entry of `index`.
    pub fn index_keys(&self, index: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for composite in self.ledger.keys_by_partial_composite_key(index, &[])? {
            let (_, attributes) = split_composite_key(&composite)?;
            if let Some(first) = attributes.into_iter().next() {
                keys.push(first);
            }
        }
        Ok(keys)
    }

    pub fn history<T: Record>(&self, key: &str) -> Result<Vec<HistoryRecord<T>>> {
        read_history(self.ledger(), key)
    }
}
