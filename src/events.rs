//! Inbound commands and outbound notifications - the seam the transport
//! layer (HTTP/WebSocket, out of scope here) plugs into.

use crate::core::{
    GameConfig, Instrument, Phase, Result, Side, Symbol, Team, Trade, TradeAction, TradeRequest,
};
use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Reply channel for commands with a request/response contract
pub type Reply<T> = oneshot::Sender<Result<T>>;

/// Inbound events consumed by the platform actor. `Tick` and
/// `ExpireRequest` are internal: the scheduled timer tasks re-enter through
/// the same channel so every mutation is serialised by arrival order.
#[derive(Debug)]
pub enum Command {
    CreateTeam {
        name: String,
        starting_balance: f64,
        reply: Reply<Team>,
    },
    JoinTeam {
        join_code: String,
        reply: Reply<Team>,
    },
    ExecuteTrade {
        team_id: Uuid,
        action: TradeAction,
        symbol: Symbol,
        quantity: u64,
        price: f64,
        reply: Reply<Team>,
    },
    SendTradeRequest {
        from_team_id: Uuid,
        to_team_id: Uuid,
        action: Side,
        symbol: Symbol,
        quantity: u64,
        price: f64,
        reply: Reply<TradeRequest>,
    },
    RespondTradeRequest {
        request_id: Uuid,
        accept: bool,
        reply: Reply<()>,
    },
    StartPhase {
        phase: Phase,
        duration: u32,
        rounds: Option<u32>,
        trading_round_time: Option<u32>,
    },
    ToggleCircuitFreeze {
        reply: Reply<bool>,
    },
    ToggleMarketTrading {
        reply: Reply<bool>,
    },
    ToggleShortFreeze {
        reply: Reply<bool>,
    },
    UpdateStockPrice {
        symbol: Symbol,
        price: f64,
    },
    ResetPlatform,
    Tick,
    ExpireRequest(Uuid),
    Shutdown,
}

/// Outbound state-change notifications. Broadcast variants go to every hub
/// subscriber; the trade-request variants are delivered only to the two
/// involved teams' channels.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    TeamCreated {
        team: Team,
    },
    TeamUpdated {
        team: Team,
    },
    TradeExecuted {
        trade: Trade,
    },
    TradeRequestSent {
        request: TradeRequest,
    },
    TradeRequestReceived {
        request: TradeRequest,
        from_team: String,
    },
    /// Carries the receiving team's own leg of the settlement
    TradeRequestCompleted {
        request_id: Uuid,
        trade: Trade,
    },
    TradeRequestCancelled {
        request_id: Uuid,
    },
    TradeRequestExpired {
        request_id: Uuid,
    },
    TradeRequestFailed {
        request_id: Uuid,
        reason: String,
    },
    PhaseChange {
        config: GameConfig,
    },
    TimerUpdate {
        time_remaining: u32,
        current_round: u32,
    },
    ConfigUpdate {
        config: GameConfig,
        instruments: Vec<Instrument>,
    },
    PlatformReset,
}
