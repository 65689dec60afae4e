//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::address::{AddressDeriver, Component, Identity, COIN_FLIP_SEED};
use crate::error::FlipError;

/// How record locators are formed.
///
/// `GlobalCounter` is the authoritative mode and what the deployed program
/// uses by default; `InitiatorNonce` is kept for clients that address
/// their own games.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressingMode {
    /// `[namespace, identifier]` with identifiers from the shared counter
    #[default]
    GlobalCounter,
    /// `[namespace, initiator, nonce]` with a client-chosen nonce
    InitiatorNonce,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: AddressingMode,
    /// Identity of the program owning every record
    pub owner: Identity,
    /// Namespace tag prefixed to every record's seeds
    pub namespace: Vec<u8>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: AddressingMode::default(),
            owner: Identity::default(),
            namespace: COIN_FLIP_SEED.to_vec(),
        }
    }
}

impl EngineConfig {
    pub fn new(mode: AddressingMode, owner: Identity) -> Self {
        Self { mode, owner, ..Self::default() }
    }

    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, FlipError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| FlipError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The namespace must itself be a valid seed.
    pub fn validate(&self) -> Result<(), FlipError> {
        AddressDeriver::new(self.owner).derive(&self.namespace, &[Component::U64(0)])?;
        Ok(())
    }
}
