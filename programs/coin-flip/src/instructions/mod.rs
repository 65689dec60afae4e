//! Instruction handlers

pub mod game;
pub mod vendor;

pub use game::*;
pub use vendor::*;
