//! Escrowed value custody
//!
//! [`FundCustody`] moves value between participants on a [`Ledger`] and
//! escrow handles. A [`CustodyHandle`] is neither `Clone` nor `Copy`, and
//! [`FundCustody::release`] consumes it, so escrowed value can be paid out
//! at most once.

use std::collections::HashMap;

use crate::address::{Identity, Locator};
use crate::error::FlipError;

/// Value-transfer substrate
pub trait Ledger {
    fn balance(&self, who: &Identity) -> u64;

    /// Balance a participant must keep after any debit
    fn minimum_balance(&self) -> u64 {
        0
    }

    /// Remove `amount` from `who`. Fails without effect when the balance
    /// cannot cover `amount` plus the minimum balance.
    fn debit(&mut self, who: &Identity, amount: u64) -> Result<(), FlipError>;

    /// Add `amount` to `who`. Only ever called with value previously
    /// debited, so it cannot exceed the ledger's total supply.
    fn credit(&mut self, who: &Identity, amount: u64);
}

/// In-process ledger with a supply cap of `u64::MAX`
#[derive(Clone, Debug, Default)]
pub struct InMemoryLedger {
    balances: HashMap<Identity, u64>,
    minimum_balance: u64,
    supply: u64,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger that keeps `minimum_balance` in every debited account
    pub fn with_minimum_balance(minimum_balance: u64) -> Self {
        Self { minimum_balance, ..Self::default() }
    }

    /// Mint `amount` to `who`.
    pub fn fund(&mut self, who: Identity, amount: u64) -> Result<(), FlipError> {
        self.supply = self.supply.checked_add(amount).ok_or(FlipError::Overflow)?;
        *self.balances.entry(who).or_insert(0) += amount;
        Ok(())
    }

    /// Sum of all balances; value held in escrow is not included
    pub fn circulating(&self) -> u64 {
        self.balances.values().sum()
    }

    /// Everything ever minted
    pub fn supply(&self) -> u64 {
        self.supply
    }
}

impl Ledger for InMemoryLedger {
    fn balance(&self, who: &Identity) -> u64 {
        self.balances.get(who).copied().unwrap_or(0)
    }

    fn minimum_balance(&self) -> u64 {
        self.minimum_balance
    }

    fn debit(&mut self, who: &Identity, amount: u64) -> Result<(), FlipError> {
        let available = self.balance(who);
        let required = amount.checked_add(self.minimum_balance).ok_or(FlipError::Overflow)?;
        if available < required {
            return Err(FlipError::InsufficientFunds { required, available });
        }
        self.balances.insert(*who, available - amount);
        Ok(())
    }

    fn credit(&mut self, who: &Identity, amount: u64) {
        let balance = self.balances.entry(*who).or_insert(0);
        // Bounded by `supply`, itself capped at u64::MAX in `fund`
        *balance = balance.saturating_add(amount);
    }
}

/// Claim on value escrowed for one record
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a custody handle strands its escrowed value"]
pub struct CustodyHandle {
    locator: Locator,
    amount: u64,
}

impl CustodyHandle {
    pub fn locator(&self) -> Locator {
        self.locator
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }
}

/// Owner of every escrowed unit, layered over a [`Ledger`]
#[derive(Debug)]
pub struct FundCustody<L: Ledger> {
    ledger: L,
    escrowed: u64,
}

impl<L: Ledger> FundCustody<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger, escrowed: 0 }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Total value currently held across all handles
    pub fn escrowed(&self) -> u64 {
        self.escrowed
    }

    /// Debit `source` now and hold `amount` for the record at `locator`.
    pub fn hold(&mut self, locator: Locator, source: &Identity, amount: u64) -> Result<CustodyHandle, FlipError> {
        let escrowed = self.escrowed.checked_add(amount).ok_or(FlipError::Overflow)?;
        self.ledger.debit(source, amount)?;
        self.escrowed = escrowed;
        Ok(CustodyHandle { locator, amount })
    }

    /// Debit `source` and add `amount` to an existing hold. On failure
    /// neither the ledger nor the handle changes.
    pub fn top_up(&mut self, handle: &mut CustodyHandle, source: &Identity, amount: u64) -> Result<(), FlipError> {
        let held = handle.amount.checked_add(amount).ok_or(FlipError::Overflow)?;
        let escrowed = self.escrowed.checked_add(amount).ok_or(FlipError::Overflow)?;
        self.ledger.debit(source, amount)?;
        self.escrowed = escrowed;
        handle.amount = held;
        Ok(())
    }

    /// Pay the entire held amount to `destination`, consuming the handle.
    pub fn release(&mut self, handle: CustodyHandle, destination: &Identity) -> u64 {
        self.escrowed = self.escrowed.saturating_sub(handle.amount);
        self.ledger.credit(destination, handle.amount);
        handle.amount
    }
}
