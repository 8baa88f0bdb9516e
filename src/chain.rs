//! External chain-reader interface consumed by the engine.
//!
//! Chain storage, header indexing, and state persistence are explicitly out of scope:
//! the engine only ever reads headers through this trait, never writes them. Block
//! production and P2P delivery of headers belong to the embedding node.

use crate::header_types::XdcHeader;
use alloy_primitives::{Address, Bytes, B256};

/// Minimal read-only view of the canonical chain the engine needs.
///
/// Implemented by the embedding node over its own header store; the engine never
/// assumes a particular storage backend.
pub trait ChainReader: Send + Sync {
    fn header_by_hash(&self, hash: B256) -> Option<XdcHeader>;
    fn header_by_number(&self, number: u64) -> Option<XdcHeader>;
    fn current_header(&self) -> XdcHeader;
}

/// Signing identity injected by the embedding node's keystore. `sign` must never block
/// on network I/O; it is called while the engine holds its state lock.
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;
    fn sign(&self, digest: &B256) -> crate::errors::EngineResult<Bytes>;
}

/// A `Signer` that never signs, for read-only / observer nodes.
pub struct NoSigner;

impl Signer for NoSigner {
    fn address(&self) -> Address {
        Address::ZERO
    }

    fn sign(&self, _digest: &B256) -> crate::errors::EngineResult<Bytes> {
        Err(crate::errors::EngineError::EngineNotInitialized)
    }
}

/// In-memory chain reader used by tests: a flat header history keyed by number, with a
/// hash index built alongside it. Mirrors the shape of the teacher's own test helpers
/// (`tests::helpers`) without reaching into disk storage.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use parking_lot::RwLock;
    use std::collections::HashMap;

    /// A `Signer` backed by a raw secp256k1 key, for tests that need to exercise real
    /// sign-then-recover round trips rather than just satisfying the trait.
    pub struct TestSigner {
        secret_key: secp256k1::SecretKey,
        address: Address,
    }

    impl TestSigner {
        pub fn new(seed: u8) -> Self {
            let secret_key = secp256k1::SecretKey::from_slice(&[seed; 32]).unwrap();
            let secp = secp256k1::Secp256k1::new();
            let public_key = secp256k1::PublicKey::from_secret_key(&secp, &secret_key);
            let uncompressed = public_key.serialize_uncompressed();
            let hash = alloy_primitives::keccak256(&uncompressed[1..]);
            let address = Address::from_slice(&hash[12..]);
            Self { secret_key, address }
        }
    }

    impl Signer for TestSigner {
        fn address(&self) -> Address {
            self.address
        }

        fn sign(&self, digest: &B256) -> crate::errors::EngineResult<Bytes> {
            crate::signature::sign_digest(digest, &self.secret_key).map(Bytes::from)
        }
    }

    #[derive(Default)]
    pub struct MockChain {
        by_number: RwLock<HashMap<u64, XdcHeader>>,
        by_hash: RwLock<HashMap<B256, XdcHeader>>,
    }

    impl MockChain {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, hash: B256, header: XdcHeader) {
            self.by_number.write().insert(header.number, header.clone());
            self.by_hash.write().insert(hash, header);
        }
    }

    impl ChainReader for MockChain {
        fn header_by_hash(&self, hash: B256) -> Option<XdcHeader> {
            self.by_hash.read().get(&hash).cloned()
        }

        fn header_by_number(&self, number: u64) -> Option<XdcHeader> {
            self.by_number.read().get(&number).cloned()
        }

        fn current_header(&self) -> XdcHeader {
            let by_number = self.by_number.read();
            let max = by_number.keys().max().copied().unwrap_or(0);
            by_number.get(&max).cloned().unwrap_or_default()
        }
    }
}
