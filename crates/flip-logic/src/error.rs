//! Error taxonomy for the settlement core

use thiserror::Error;

use crate::address::Locator;

/// Every way an open or settle request can be rejected.
///
/// Rejections never leave partial state behind: a caller that receives any
/// of these can re-read the record and retry from scratch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlipError {
    #[error("a record already exists at {0}")]
    RecordAlreadyExists(Locator),

    #[error("no record exists at {0}")]
    RecordNotFound(Locator),

    #[error("supplied locator {supplied} does not match derived locator {derived}")]
    LocatorMismatch { supplied: Locator, derived: Locator },

    #[error("game has already finished")]
    GameAlreadyFinished,

    #[error("cannot join own game")]
    CannotJoinOwnGame,

    #[error("wager {wager} outside accepted range [{min}, {max}]")]
    WagerOutOfRange { wager: u64, min: u64, max: u64 },

    #[error("insufficient funds: {required} required, {available} available")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("invalid locator components: {0}")]
    InvalidComponents(&'static str),

    #[error("invalid record data: {0}")]
    InvalidRecordData(&'static str),

    #[error("invalid engine config: {0}")]
    InvalidConfig(String),

    #[error("arithmetic overflow")]
    Overflow,
}

impl FlipError {
    /// Stable short name of the failure kind, used in log events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RecordAlreadyExists(_) => "RecordAlreadyExists",
            Self::RecordNotFound(_) => "RecordNotFound",
            Self::LocatorMismatch { .. } => "LocatorMismatch",
            Self::GameAlreadyFinished => "GameAlreadyFinished",
            Self::CannotJoinOwnGame => "CannotJoinOwnGame",
            Self::WagerOutOfRange { .. } => "WagerOutOfRange",
            Self::InsufficientFunds { .. } => "InsufficientFunds",
            Self::InvalidComponents(_) => "InvalidComponents",
            Self::InvalidRecordData(_) => "InvalidRecordData",
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::Overflow => "Overflow",
        }
    }
}
