//! Utility functions for identifiers and hashing

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Transaction id: hash of a fresh nonce followed by the creator's credential.
pub fn new_tx_id(creator: &[u8]) -> String {
    let mut preimage = uuid7().as_bytes().to_vec();
    preimage.extend_from_slice(creator);
    sha256::digest(preimage.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_ids_are_unique_hex_digests() {
        let a = new_tx_id(b"alice");
        let b = new_tx_id(b"alice");

        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn bech32_ids_carry_prefix() {
        let id = new_uuid_to_bech32("lot_").unwrap();
        assert!(id.starts_with("lot_1"));
    }
}
