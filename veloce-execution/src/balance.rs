use crate::error::BalanceError;
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Free and locked amounts of one asset in an account.
///
/// Both components are non-negative at all times; operations that would drive
/// either below zero fail with [`BalanceError`] instead of saturating.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Default, Deserialize, Serialize, Constructor,
)]
pub struct Balance {
    pub free: Decimal,
    pub locked: Decimal,
}

impl Balance {
    /// Total balance (`free + locked`).
    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }

    /// Move `amount` from free into locked, as a hold against an open order.
    pub fn lock(&mut self, amount: Decimal) -> Result<(), BalanceError> {
        if amount > self.free {
            return Err(BalanceError::InsufficientFree {
                requested: amount,
                free: self.free,
            });
        }
        self.free -= amount;
        self.locked += amount;
        Ok(())
    }

    /// Release `amount` of a hold back into free (eg/ on cancel or reject).
    pub fn unlock(&mut self, amount: Decimal) -> Result<(), BalanceError> {
        if amount > self.locked {
            return Err(BalanceError::InsufficientLocked {
                requested: amount,
                locked: self.locked,
            });
        }
        self.locked -= amount;
        self.free += amount;
        Ok(())
    }

    /// Consume `amount` of a hold permanently (eg/ the spent side of a fill).
    pub fn settle(&mut self, amount: Decimal) -> Result<(), BalanceError> {
        if amount > self.locked {
            return Err(BalanceError::InsufficientLocked {
                requested: amount,
                locked: self.locked,
            });
        }
        self.locked -= amount;
        Ok(())
    }

    /// Credit `amount` into free (eg/ the received side of a fill).
    pub fn deposit(&mut self, amount: Decimal) {
        self.free += amount;
    }

    /// Debit `amount` from free directly (eg/ fees charged outside a hold).
    pub fn withdraw(&mut self, amount: Decimal) -> Result<(), BalanceError> {
        if amount > self.free {
            return Err(BalanceError::InsufficientFree {
                requested: amount,
                free: self.free,
            });
        }
        self.free -= amount;
        Ok(())
    }
}
