//! Entry point that runs contract operations as ledger transactions.
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::context::TxContext;
use crate::error::Result;
use crate::identity::{Authority, CallContext, HexCertIdentity};
use crate::ledger::SledLedger;
use crate::observability;
use crate::operation::{Operation, OperationKind};

pub struct SupplyChain {
    ledger: SledLedger,
    authority: Authority,
}

impl SupplyChain {
    pub fn new(instance: std::sync::Arc<sled::Db>, authority: Authority) -> Self {
        Self {
            ledger: SledLedger::new(instance),
            authority,
        }
    }

    pub fn open(config: &LedgerConfig) -> Result<Self> {
        let ledger = SledLedger::open(config)?;
        let authority = Authority::new(
            Box::new(HexCertIdentity::new(config.node_org.clone())),
            config.policy,
        );
        Ok(Self { ledger, authority })
    }

    pub fn ledger(&self) -> &SledLedger {
        &self.ledger
    }

    /// Runs `f` inside one transaction on behalf of `caller`.
    ///
    /// Submit operations commit every write when `f` succeeds; evaluate
    /// operations never commit. A failing `f` leaves the ledger untouched.
    pub fn invoke<O, T, F>(&self, caller: &CallContext, operation: O, f: F) -> Result<T>
    where
        O: Operation,
        F: FnOnce(&mut TxContext<'_>) -> Result<T>,
    {
        let kind = operation.kind();
        let span =
            observability::invocation_span(operation.contract(), operation.name(), kind.as_str());
        let _guard = span.enter();

        let mut tx = self.ledger.begin(caller.credential.as_bytes());
        let outcome = {
            let mut ctx = TxContext::new(&mut tx, &self.authority, caller);
            f(&mut ctx)
        };

        let value = match outcome {
            Ok(value) => value,
            Err(err) => {
                warn!(kind = ?err.kind(), error = %err, "invocation failed, discarding writes");
                return Err(err);
            }
        };

        match kind {
            OperationKind::Submit => {
                let summary = tx.commit().inspect_err(|err| {
                    warn!(kind = ?err.kind(), error = %err, "commit failed");
                })?;
                info!(tx_id = %summary.tx_id, writes = summary.writes, "committed");
            }
            OperationKind::Evaluate => {
                if tx.pending_writes() > 0 {
                    warn!(
                        writes = tx.pending_writes(),
                        "evaluate operation wrote to the ledger, discarding"
                    );
                }
                debug!("evaluated");
            }
        }
        Ok(value)
    }
}

impl std::fmt::Debug for SupplyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupplyChain")
            .field("authority", &self.authority)
            .finish_non_exhaustive()
    }
}
