//! Custom error codes

use anchor_lang::prelude::*;
use flip_logic::FlipError;

#[error_code]
pub enum CoinFlipError {
    #[msg("A game already exists at this address")]
    RecordAlreadyExists = 6000,

    #[msg("No game exists at this address")]
    RecordNotFound = 6001,

    #[msg("Supplied address does not match the derived address")]
    LocatorMismatch = 6002,

    #[msg("Game has already finished")]
    GameAlreadyFinished = 6003,

    #[msg("Cannot join your own game")]
    CannotJoinOwnGame = 6004,

    #[msg("Wager is outside the accepted range")]
    WagerOutOfRange = 6005,

    #[msg("Insufficient funds for wager")]
    InsufficientFunds = 6006,

    #[msg("Invalid address components")]
    InvalidComponents = 6007,

    #[msg("Game account data is invalid")]
    InvalidRecordData = 6008,

    #[msg("Arithmetic overflow")]
    Overflow = 6009,

    #[msg("SlotHashes sysvar unavailable")]
    SlotHashUnavailable = 6010,

    #[msg("Initiator account does not match the game")]
    InitiatorMismatch = 6011,

    #[msg("Invalid engine configuration")]
    InvalidConfig = 6012,
}

impl From<FlipError> for CoinFlipError {
    fn from(err: FlipError) -> Self {
        match err {
            FlipError::RecordAlreadyExists(_) => CoinFlipError::RecordAlreadyExists,
            FlipError::RecordNotFound(_) => CoinFlipError::RecordNotFound,
            FlipError::LocatorMismatch { .. } => CoinFlipError::LocatorMismatch,
            FlipError::GameAlreadyFinished => CoinFlipError::GameAlreadyFinished,
            FlipError::CannotJoinOwnGame => CoinFlipError::CannotJoinOwnGame,
            FlipError::WagerOutOfRange { .. } => CoinFlipError::WagerOutOfRange,
            FlipError::InsufficientFunds { .. } => CoinFlipError::InsufficientFunds,
            FlipError::InvalidComponents(_) => CoinFlipError::InvalidComponents,
            FlipError::InvalidRecordData(_) => CoinFlipError::InvalidRecordData,
            FlipError::InvalidConfig(_) => CoinFlipError::InvalidConfig,
            FlipError::Overflow => CoinFlipError::Overflow,
        }
    }
}
