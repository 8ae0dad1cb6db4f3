//! Caller identity and the authorization checks shared by every contract.
use std::collections::BTreeMap;

use crate::config::AccessPolicy;
use crate::error::{LedgerError, Result};

/// What the submitting client presented with an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Hex encoded client certificate subject.
    pub credential: String,
    /// Membership service the client is enrolled with.
    pub msp_id: String,
    pub attributes: BTreeMap<String, String>,
}

impl CallContext {
    /// Builds the context a client enrolled as `principal` in `msp_id` would present.
    pub fn new(principal: &str, msp_id: &str) -> Self {
        Self {
            credential: hex::encode(principal.as_bytes()),
            msp_id: msp_id.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }
}

pub trait IdentityProvider: Send + Sync {
    fn decode_principal(&self, caller: &CallContext) -> Result<String>;
    fn caller_org(&self, caller: &CallContext) -> Result<String>;
    fn node_org(&self) -> String;
    fn has_attribute(&self, caller: &CallContext, name: &str) -> bool;
}

/// Decodes hex credentials and reads the org from the caller's msp id.
#[derive(Debug, Clone)]
pub struct HexCertIdentity {
    node_org: String,
}

impl HexCertIdentity {
    pub fn new(node_org: impl Into<String>) -> Self {
        Self {
            node_org: node_org.into(),
        }
    }
}

impl IdentityProvider for HexCertIdentity {
    fn decode_principal(&self, caller: &CallContext) -> Result<String> {
        let raw = hex::decode(&caller.credential)
            .map_err(|e| LedgerError::Identity(format!("failed to hex decode client id: {e}")))?;
        let principal = String::from_utf8(raw)
            .map_err(|e| LedgerError::Identity(format!("client id is not utf-8: {e}")))?;
        if principal.is_empty() {
            return Err(LedgerError::Identity("client id is empty".to_string()));
        }
        Ok(principal)
    }

    fn caller_org(&self, caller: &CallContext) -> Result<String> {
        Ok(caller.msp_id.clone())
    }

    fn node_org(&self) -> String {
        self.node_org.clone()
    }

    fn has_attribute(&self, caller: &CallContext, name: &str) -> bool {
        caller.attributes.get(name).is_some_and(|v| v == "true")
    }
}

/// Identity provider plus the policy deciding which optional checks apply.
pub struct Authority {
    provider: Box<dyn IdentityProvider>,
    policy: AccessPolicy,
}

impl Authority {
    pub fn new(provider: Box<dyn IdentityProvider>, policy: AccessPolicy) -> Self {
        Self { provider, policy }
    }

    /// Hex identities for `node_org` with both optional checks disabled.
    pub fn permissive(node_org: &str) -> Self {
        Self::new(
            Box::new(HexCertIdentity::new(node_org)),
            AccessPolicy::default(),
        )
    }

    pub fn policy(&self) -> AccessPolicy {
        self.policy
    }

    pub fn principal(&self, caller: &CallContext) -> Result<String> {
        self.provider.decode_principal(caller)
    }

    /// Returns the caller's org, failing if the policy demands it match the node's.
    pub fn require_same_org(&self, caller: &CallContext) -> Result<String> {
        let org = self.provider.caller_org(caller)?;
        if self.policy.enforce_org_match {
            let node_org = self.provider.node_org();
            if org != node_org {
                return Err(LedgerError::Authorization(format!(
                    "client from org {org} may not write through an org {node_org} node"
                )));
            }
        }
        Ok(org)
    }

    pub fn require_role(&self, caller: &CallContext, role: &str) -> Result<()> {
        if self.policy.enforce_roles && !self.provider.has_attribute(caller, role) {
            return Err(LedgerError::Authorization(format!(
                "client does not hold the {role} role"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Authority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authority")
            .field("node_org", &self.provider.node_org())
            .field("policy", &self.policy)
            .finish()
    }
}
