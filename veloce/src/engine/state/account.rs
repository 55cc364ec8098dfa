use fnv::FnvHashMap;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::warn;
use veloce_execution::{balance::Balance, error::BalanceError, ClientOrderId};
use veloce_instrument::Symbol;

/// Margin hold recorded against one open order.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
struct Hold {
    asset: SmolStr,
    remaining: Decimal,
}

/// Session account: per-asset balances plus the margin holds backing open
/// orders.
///
/// The engine runs a margin-style account in the quote asset of each
/// instrument: accepting an order locks its notional, fills release the
/// proportional hold, and realized PnL / fees settle against the free
/// balance. Balances never go negative; a losing settlement that would
/// overdraw clamps at zero and is logged (liquidation is not a core concern).
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct AccountState {
    balances: IndexMap<SmolStr, Balance>,
    holds: FnvHashMap<ClientOrderId, Hold>,
}

impl AccountState {
    /// Construct an account with a single starting balance.
    pub fn with_deposit(asset: impl Into<SmolStr>, amount: Decimal) -> Self {
        let mut account = Self::default();
        account.deposit(asset, amount);
        account
    }

    pub fn deposit(&mut self, asset: impl Into<SmolStr>, amount: Decimal) {
        self.balances.entry(asset.into()).or_default().deposit(amount);
    }

    pub fn balance(&self, asset: &str) -> Balance {
        self.balances.get(asset).copied().unwrap_or_default()
    }

    /// Iterate all `(asset, balance)` pairs in insertion order.
    pub fn balances(&self) -> impl Iterator<Item = (&SmolStr, &Balance)> {
        self.balances.iter()
    }

    /// Total account value in quote terms, excluding unrealized PnL.
    pub fn total(&self) -> Decimal {
        self.balances
            .values()
            .map(Balance::total)
            .sum()
    }

    /// Free balance available for new holds on `asset`.
    pub fn free(&self, asset: &str) -> Decimal {
        self.balance(asset).free
    }

    /// Place a margin hold of `amount` against order `cid`.
    pub fn lock_for_order(
        &mut self,
        cid: &ClientOrderId,
        asset: impl Into<SmolStr>,
        amount: Decimal,
    ) -> Result<(), BalanceError> {
        let asset = asset.into();
        self.balances.entry(asset.clone()).or_default().lock(amount)?;
        self.holds.insert(
            cid.clone(),
            Hold {
                asset,
                remaining: amount,
            },
        );
        Ok(())
    }

    /// Release `amount` of the hold backing `cid` (eg/ the proportional hold
    /// of an executed fill). Amounts beyond the recorded hold are clamped.
    pub fn release_partial(&mut self, cid: &ClientOrderId, amount: Decimal) {
        let Some(hold) = self.holds.get_mut(cid) else {
            return;
        };
        let release = amount.min(hold.remaining);
        hold.remaining -= release;
        let asset = hold.asset.clone();
        if hold.remaining.is_zero() {
            self.holds.remove(cid);
        }
        if let Some(balance) = self.balances.get_mut(&asset) {
            if let Err(error) = balance.unlock(release) {
                warn!(%cid, %error, "account hold release exceeded locked balance");
            }
        }
    }

    /// Release whatever hold remains for `cid` (terminal order transitions).
    pub fn release_remaining(&mut self, cid: &ClientOrderId) {
        let Some(hold) = self.holds.remove(cid) else {
            return;
        };
        if let Some(balance) = self.balances.get_mut(&hold.asset) {
            if let Err(error) = balance.unlock(hold.remaining) {
                warn!(%cid, %error, "account hold release exceeded locked balance");
            }
        }
    }

    /// Credit (or debit) realized PnL against the free balance of `asset`.
    ///
    /// A debit that would overdraw clamps the balance at zero.
    pub fn apply_realized(&mut self, asset: impl Into<SmolStr>, delta: Decimal) {
        let asset = asset.into();
        let balance = self.balances.entry(asset.clone()).or_default();
        if delta >= Decimal::ZERO {
            balance.deposit(delta);
        } else if balance.withdraw(-delta).is_err() {
            warn!(%asset, %delta, free = %balance.free, "realized loss clamped at zero free balance");
            balance.free = Decimal::ZERO;
        }
    }

    /// Debit a fee from the free balance of `asset`, clamping at zero.
    pub fn debit_fee(&mut self, asset: impl Into<SmolStr>, fee: Decimal) {
        self.apply_realized(asset, -fee);
    }
}

/// Derive the quote asset of a symbol from its conventional suffix.
///
/// Falls back to `USDT` for unrecognised symbols; exchange-accurate pair
/// metadata is an adapter concern.
pub fn quote_asset(symbol: &Symbol) -> SmolStr {
    const QUOTES: [&str; 6] = ["USDT", "USDC", "BUSD", "USD", "BTC", "ETH"];
    let name = symbol.as_str();
    for quote in QUOTES {
        if name.len() > quote.len() && name.ends_with(quote) {
            return SmolStr::new(quote);
        }
    }
    SmolStr::new("USDT")
}
