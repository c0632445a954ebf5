//! Persisted column sets of each record type

use stampline_core::{AllowList, Projection};

use crate::records::{Fields, HolderBalance, StampHolder, TickAction, TokenBalance};

pub const HOLDER_COLUMNS: [&str; 4] = ["tick", "address", "balance", "blockHeight"];
pub const STAMP_HOLDER_COLUMNS: [&str; 2] = ["address", "stamp"];
pub const BALANCE_COLUMNS: [&str; 4] = ["Address", "Ticker", "Amount", "Block Time"];
pub const ACTION_COLUMNS: [&str; 5] = ["tx_hash", "creator", "destination", "tick", "amt"];

/// Record types with a fixed persisted projection.
pub trait Persisted: Fields + Sized + 'static {
    fn projection() -> Projection<Self>;
}

/// Projection of `R`, keeping only records whose allow-listed field matches.
pub fn filtered<R: Persisted>(allow: Option<AllowList>) -> Projection<R> {
    match allow {
        Some(allow) => R::projection().filter(move |record: &R| {
            record
                .field(allow.field())
                .is_some_and(|value| allow.contains(value))
        }),
        None => R::projection(),
    }
}

impl Persisted for HolderBalance {
    fn projection() -> Projection<Self> {
        Projection::new(HOLDER_COLUMNS, |h: &HolderBalance| {
            Ok(vec![
                h.tick.clone(),
                h.address.clone(),
                h.balance.clone(),
                h.block_height.to_string(),
            ])
        })
    }
}

impl Persisted for StampHolder {
    fn projection() -> Projection<Self> {
        Projection::new(STAMP_HOLDER_COLUMNS, |h: &StampHolder| {
            Ok(vec![h.address.clone(), h.stamp.clone()])
        })
    }
}

impl Persisted for TokenBalance {
    fn projection() -> Projection<Self> {
        Projection::new(BALANCE_COLUMNS, |b: &TokenBalance| {
            Ok(vec![
                b.address.clone(),
                b.tick.clone(),
                round_amount(&b.amt)?,
                b.block_time.clone(),
            ])
        })
    }
}

impl Persisted for TickAction {
    fn projection() -> Projection<Self> {
        Projection::new(ACTION_COLUMNS, |a: &TickAction| {
            Ok(vec![
                a.tx_hash.clone(),
                a.creator.clone(),
                a.destination.clone(),
                a.tick.clone(),
                a.amt.clone(),
            ])
        })
    }
}

/// Amount rounded to two decimals; a non-numeric amount rejects the record.
pub fn round_amount(amt: &str) -> Result<String, String> {
    let value: f64 = amt
        .trim()
        .parse()
        .map_err(|_| format!("amount '{amt}' is not a number"))?;
    if !value.is_finite() {
        return Err(format!("amount '{amt}' is not finite"));
    }
    Ok(format!("{value:.2}"))
}
