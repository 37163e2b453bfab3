//! Error handling - one recoverable taxonomy for every engine operation

use crate::core::types::{Phase, Symbol, TradeAction};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every way an inbound event can fail. All variants are caller-local and
/// recoverable; no failure path leaves the session partially mutated.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown team, symbol, or trade request
    #[error("{0} not found")]
    NotFound(String),

    /// Buyer cannot afford the trade
    #[error("insufficient funds: required {required:.2}, available {available:.2}")]
    InsufficientFunds { required: f64, available: f64 },

    /// Seller does not hold enough of the symbol
    #[error("insufficient holdings of {symbol}: held {held}, requested {requested}")]
    InsufficientHoldings {
        symbol: Symbol,
        held: u64,
        requested: u64,
    },

    /// Short book does not cover the requested quantity
    #[error("insufficient short position in {symbol}: held {held}, requested {requested}")]
    InsufficientShortPosition {
        symbol: Symbol,
        held: u64,
        requested: u64,
    },

    /// Action not legal in the current phase
    #[error("action not allowed in phase {0}")]
    WrongPhase(Phase),

    /// Short selling is globally frozen
    #[error("short selling is frozen")]
    ShortSellingFrozen,

    /// A short may not raise cash above what is already held
    #[error("short proceeds {proceeds:.2} exceed current cash {cash:.2}")]
    OverCollateralized { proceeds: f64, cash: f64 },

    /// Negotiated price outside the circuit band
    #[error("price {proposed:.2} outside circuit band [{lower:.2}, {upper:.2}]")]
    CircuitViolation {
        proposed: f64,
        lower: f64,
        upper: f64,
    },

    /// Internal-only trade actions cannot be submitted directly
    #[error("action {0} cannot be submitted directly")]
    UnsupportedAction(TradeAction),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Platform actor has shut down
    #[error("platform offline")]
    Offline,
}
