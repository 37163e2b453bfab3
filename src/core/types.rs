//! Core types - strong typing for the session state

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Tradeable symbol (e.g., "ACME")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a trade request, from the requester's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Every ledger mutation a Trade record can describe.
///
/// `CoverShortForced` and `FundAllocation` are produced internally (by the
/// short-position enforcer and team creation) and cannot be submitted
/// through `execute_trade`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Buy,
    Sell,
    ShortSell,
    CoverShort,
    CoverShortForced,
    FundAllocation,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TradeAction::Buy => "buy",
            TradeAction::Sell => "sell",
            TradeAction::ShortSell => "short_sell",
            TradeAction::CoverShort => "cover_short",
            TradeAction::CoverShortForced => "cover_short_forced",
            TradeAction::FundAllocation => "fund_allocation",
        };
        write!(f, "{}", s)
    }
}

/// Global session stage gating which actions are legal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Waiting,
    PortfolioAllocation,
    Trading,
    Ended,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Waiting => "waiting",
            Phase::PortfolioAllocation => "portfolio_allocation",
            Phase::Trading => "trading",
            Phase::Ended => "ended",
        };
        write!(f, "{}", s)
    }
}

/// A tradable instrument with its admin-controlled live price.
/// No price history is retained beyond the current value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: Symbol,
    pub display_name: String,
    pub price: f64,
}

/// Immutable record of one settled trade leg
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub team_id: Uuid,
    pub team_name: String,
    pub action: TradeAction,
    pub symbol: Symbol,
    pub quantity: u64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub note: Option<String>,
    pub counterparty: Option<String>,
}

impl Trade {
    pub fn new(
        team_id: Uuid,
        team_name: impl Into<String>,
        action: TradeAction,
        symbol: Symbol,
        quantity: u64,
        price: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            team_id,
            team_name: team_name.into(),
            action,
            symbol,
            quantity,
            price,
            timestamp: Utc::now(),
            note: None,
            counterparty: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_counterparty(mut self, counterparty: impl Into<String>) -> Self {
        self.counterparty = Some(counterparty.into());
        self
    }
}

/// One team's ledger: cash, inventory, and its append-only trade history.
///
/// Invariant: `holdings` and `short_holdings` never carry a zero quantity;
/// entries are removed the moment they hit zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub cash: f64,
    pub holdings: HashMap<Symbol, u64>,
    pub short_holdings: HashMap<Symbol, u64>,
    pub join_code: String,
    pub trade_history: Vec<Trade>,
}

impl Team {
    pub fn new(name: impl Into<String>, cash: f64, join_code: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            cash,
            holdings: HashMap::new(),
            short_holdings: HashMap::new(),
            join_code: join_code.into(),
            trade_history: Vec::new(),
        }
    }

    /// Long quantity held for a symbol (absent = zero)
    pub fn held(&self, symbol: &Symbol) -> u64 {
        self.holdings.get(symbol).copied().unwrap_or(0)
    }

    /// Short quantity held for a symbol (absent = zero)
    pub fn short_held(&self, symbol: &Symbol) -> u64 {
        self.short_holdings.get(symbol).copied().unwrap_or(0)
    }
}

/// A pending bilateral offer. Lives only in the session's pending map;
/// removed on accept, reject, or expiry, whichever comes first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRequest {
    pub id: Uuid,
    pub from_team_id: Uuid,
    pub to_team_id: Uuid,
    pub action: Side,
    pub symbol: Symbol,
    pub quantity: u64,
    pub price: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TradeRequest {
    pub fn new(
        from_team_id: Uuid,
        to_team_id: Uuid,
        action: Side,
        symbol: Symbol,
        quantity: u64,
        price: f64,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            from_team_id,
            to_team_id,
            action,
            symbol,
            quantity,
            price,
            created_at: now,
            expires_at: now + ttl,
        }
    }
}

/// The global session configuration singleton. Owned by the `Session`,
/// reinitialised only by `reset`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub phase: Phase,
    pub current_round: u32,
    pub total_rounds: u32,
    pub time_remaining: u32,
    pub trading_round_time: u32,
    pub portfolio_allocation_time: u32,
    pub circuit_limit_frozen: bool,
    pub market_trading_enabled: bool,
    pub short_selling_frozen: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            phase: Phase::Waiting,
            current_round: 0,
            total_rounds: 0,
            time_remaining: 0,
            trading_round_time: 600,
            portfolio_allocation_time: 300,
            circuit_limit_frozen: false,
            market_trading_enabled: true,
            short_selling_frozen: false,
        }
    }
}
