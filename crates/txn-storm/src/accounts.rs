use alloy::{
    primitives::{Address, B256, keccak256},
    signers::local::{LocalSigner, PrivateKeySigner},
};
use anyhow::{Context, Result};

use crate::partition::AccountRange;

/// Deterministic signer for account `index`: `keccak256(seed || index_be || salt)`,
/// bumping `salt` in the negligible case the hash is not a valid secp256k1 scalar.
pub(crate) fn account_signer(seed: B256, index: u64) -> PrivateKeySigner {
    let mut preimage = [0u8; 41];
    preimage[..32].copy_from_slice(seed.as_slice());
    preimage[32..40].copy_from_slice(&index.to_be_bytes());

    loop {
        if let Ok(signer) = PrivateKeySigner::from_bytes(&keccak256(preimage)) {
            return signer;
        }
        preimage[40] = preimage[40].wrapping_add(1);
    }
}

/// Signers for every account of `range`, in index order.
pub(crate) fn range_signers(seed: B256, range: AccountRange) -> Vec<PrivateKeySigner> {
    range.indices().map(|index| account_signer(seed, index)).collect()
}

/// Parses a private key from hex string (with or without 0x prefix)
pub(crate) fn parse_private_key(hex_key: &str) -> Result<PrivateKeySigner> {
    let key = hex_key.strip_prefix("0x").unwrap_or(hex_key);
    key.parse::<PrivateKeySigner>().context("Failed to parse donor private key")
}

/// Get addresses from signers
pub(crate) fn addresses(signers: &[PrivateKeySigner]) -> Vec<Address> {
    signers.iter().map(LocalSigner::address).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signers_are_deterministic_and_distinct() {
        let seed = keccak256(b"seed");
        let range = AccountRange::new(5, 9);

        let first = addresses(&range_signers(seed, range));
        let second = addresses(&range_signers(seed, range));
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);

        let mut unique = first.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 4);

        assert_eq!(first[0], account_signer(seed, 5).address());
        assert_ne!(account_signer(keccak256(b"other"), 5).address(), first[0]);
    }

    #[test]
    fn parses_keys_with_and_without_prefix() {
        let key = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
        let with_prefix = parse_private_key(key).unwrap();
        let without_prefix = parse_private_key(&key[2..]).unwrap();
        assert_eq!(with_prefix.address(), without_prefix.address());

        assert!(parse_private_key("not a key").is_err());
    }
}
