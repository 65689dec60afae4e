//! Deterministic record addressing
//!
//! A locator is the SHA-256 of the length-prefixed seeds, the owning
//! program identity and a fixed marker. Length prefixes keep seed lists
//! injective, so `[tag, id]` and `[tag, initiator, nonce]` can never alias.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FlipError;

/// Maximum length of a single seed in bytes
pub const MAX_SEED_LEN: usize = 32;

/// Maximum number of seeds, namespace tag included
pub const MAX_SEEDS: usize = 16;

/// Namespace tag shared by every escrow record
pub const COIN_FLIP_SEED: &[u8] = b"coin_flip";

/// Namespace tag of the global counter record
pub const VENDOR_SEED: &[u8] = b"vendor";

const LOCATOR_MARKER: &[u8] = b"CoinFlipLocator";

/// A 32-byte participant or program identity. All zeroes means "unset".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Identity([u8; 32]);

impl Identity {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", hex::encode(&self.0[..4]))
    }
}

/// Address of one escrow record's storage slot
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Locator([u8; 32]);

impl Locator {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn to_bytes(self) -> [u8; 32] {
        self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Locator({})", hex::encode(&self.0[..6]))
    }
}

/// One derivation input with its fixed-width encoding
#[derive(Clone, Copy, Debug)]
pub enum Component<'a> {
    /// 32 raw bytes
    Identity(&'a Identity),
    /// 8 bytes, little-endian (matches `u64::to_le_bytes` on the client)
    U64(u64),
    /// Arbitrary bytes, at most [`MAX_SEED_LEN`]
    Bytes(&'a [u8]),
}

impl Component<'_> {
    fn write_to(&self, preimage: &mut Vec<u8>) -> Result<(), FlipError> {
        match self {
            Component::Identity(id) => push_seed(preimage, id.as_bytes()),
            Component::U64(value) => push_seed(preimage, &value.to_le_bytes()),
            Component::Bytes(bytes) => push_seed(preimage, bytes),
        }
    }
}

fn push_seed(preimage: &mut Vec<u8>, seed: &[u8]) -> Result<(), FlipError> {
    if seed.len() > MAX_SEED_LEN {
        return Err(FlipError::InvalidComponents("seed longer than 32 bytes"));
    }
    preimage.push(seed.len() as u8);
    preimage.extend_from_slice(seed);
    Ok(())
}

/// Pure locator derivation bound to one owning program
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressDeriver {
    owner: Identity,
}

impl AddressDeriver {
    pub fn new(owner: Identity) -> Self {
        Self { owner }
    }

    pub fn owner(&self) -> Identity {
        self.owner
    }

    /// Derive the locator for `namespace_tag` followed by `components`.
    pub fn derive(&self, namespace_tag: &[u8], components: &[Component<'_>]) -> Result<Locator, FlipError> {
        if namespace_tag.is_empty() {
            return Err(FlipError::InvalidComponents("empty namespace tag"));
        }
        if components.len() + 1 > MAX_SEEDS {
            return Err(FlipError::InvalidComponents("too many seeds"));
        }

        let mut preimage = Vec::with_capacity(1 + (components.len() + 1) * 33 + 32 + LOCATOR_MARKER.len());
        preimage.push((components.len() + 1) as u8);
        push_seed(&mut preimage, namespace_tag)?;
        for component in components {
            component.write_to(&mut preimage)?;
        }
        preimage.extend_from_slice(self.owner.as_bytes());
        preimage.extend_from_slice(LOCATOR_MARKER);

        Ok(Locator(solana_sha256_hasher::hash(&preimage).to_bytes()))
    }

    /// Re-derive a locator and require it to equal `supplied`.
    pub fn verify(
        &self,
        supplied: &Locator,
        namespace_tag: &[u8],
        components: &[Component<'_>],
    ) -> Result<Locator, FlipError> {
        let derived = self.derive(namespace_tag, components)?;
        if derived != *supplied {
            return Err(FlipError::LocatorMismatch { supplied: *supplied, derived });
        }
        Ok(derived)
    }
}

/// The identity inputs of one record, per addressing mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKey {
    /// Global-counter mode: `[tag, identifier]`
    Sequence(u64),
    /// Per-initiator mode: `[tag, initiator, nonce]`
    InitiatorNonce { initiator: Identity, nonce: u64 },
}

impl RecordKey {
    pub fn locate(&self, deriver: &AddressDeriver, namespace_tag: &[u8]) -> Result<Locator, FlipError> {
        match self {
            RecordKey::Sequence(id) => deriver.derive(namespace_tag, &[Component::U64(*id)]),
            RecordKey::InitiatorNonce { initiator, nonce } => {
                deriver.derive(namespace_tag, &[Component::Identity(initiator), Component::U64(*nonce)])
            }
        }
    }

    /// Value stored in the record's `identifier` field
    pub fn identifier(&self) -> u64 {
        match self {
            RecordKey::Sequence(id) => *id,
            RecordKey::InitiatorNonce { nonce, .. } => *nonce,
        }
    }
}
