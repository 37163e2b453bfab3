//! Session state - the single owned context object every handler mutates.
//!
//! One `Session` spans the whole event: the instrument registry, the team
//! ledger map, the global trade log, the pending negotiation map, and the
//! game config singleton. It is owned by the platform actor task, so all
//! mutations are serialised by event-arrival order and no locking is needed.

use crate::core::config::Settings;
use crate::core::{
    Error, GameConfig, Instrument, Result, Symbol, Team, Trade, TradeAction, TradeRequest,
};
use rand::{RngExt, distr::Alphanumeric};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

const JOIN_CODE_LEN: usize = 6;

pub struct Session {
    pub settings: Settings,
    pub game: GameConfig,
    pub instruments: HashMap<Symbol, Instrument>,
    pub teams: HashMap<Uuid, Team>,
    /// Global trade log, newest first
    pub trade_log: VecDeque<Trade>,
    pub pending_requests: HashMap<Uuid, TradeRequest>,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        let instruments = seed_instruments(&settings);
        Self {
            settings,
            game: GameConfig::default(),
            instruments,
            teams: HashMap::new(),
            trade_log: VecDeque::new(),
            pending_requests: HashMap::new(),
        }
    }

    /// Reinitialise everything to session defaults. The caller is responsible
    /// for cancelling outstanding timers before invoking this.
    pub fn reset(&mut self) {
        self.game = GameConfig::default();
        self.instruments = seed_instruments(&self.settings);
        self.teams.clear();
        self.trade_log.clear();
        self.pending_requests.clear();
    }

    pub fn instrument(&self, symbol: &Symbol) -> Result<&Instrument> {
        self.instruments
            .get(symbol)
            .ok_or_else(|| Error::NotFound(format!("symbol {}", symbol)))
    }

    pub fn team(&self, team_id: Uuid) -> Result<&Team> {
        self.teams
            .get(&team_id)
            .ok_or_else(|| Error::NotFound(format!("team {}", team_id)))
    }

    pub fn team_mut(&mut self, team_id: Uuid) -> Result<&mut Team> {
        self.teams
            .get_mut(&team_id)
            .ok_or_else(|| Error::NotFound(format!("team {}", team_id)))
    }

    /// Case-insensitive join-code lookup
    pub fn team_by_join_code(&self, code: &str) -> Result<&Team> {
        self.teams
            .values()
            .find(|t| t.join_code.eq_ignore_ascii_case(code))
            .ok_or_else(|| Error::NotFound(format!("join code {}", code)))
    }

    /// Create a team with a unique join code and record the starting balance
    /// as a `fund_allocation` trade.
    pub fn create_team(&mut self, name: impl Into<String>, starting_balance: f64) -> Team {
        let join_code = self.generate_join_code();
        let team = Team::new(name, starting_balance, join_code);
        let team_id = team.id;
        self.teams.insert(team_id, team);

        let allocation = Trade::new(
            team_id,
            self.teams[&team_id].name.clone(),
            TradeAction::FundAllocation,
            Symbol::new("CASH"),
            1,
            starting_balance,
        )
        .with_note("initial portfolio allocation");
        self.record_trade(allocation);

        self.teams[&team_id].clone()
    }

    /// Admin price update. Trusted: no bounds validation.
    pub fn update_price(&mut self, symbol: &Symbol, price: f64) -> Result<()> {
        let instrument = self
            .instruments
            .get_mut(symbol)
            .ok_or_else(|| Error::NotFound(format!("symbol {}", symbol)))?;
        instrument.price = price;
        Ok(())
    }

    pub fn toggle_circuit_freeze(&mut self) -> bool {
        self.game.circuit_limit_frozen = !self.game.circuit_limit_frozen;
        self.game.circuit_limit_frozen
    }

    pub fn toggle_market_trading(&mut self) -> bool {
        self.game.market_trading_enabled = !self.game.market_trading_enabled;
        self.game.market_trading_enabled
    }

    /// Append a settled trade to the owning team's history and to the front
    /// of the global reverse-chronological log.
    pub fn record_trade(&mut self, trade: Trade) {
        if let Some(team) = self.teams.get_mut(&trade.team_id) {
            team.trade_history.push(trade.clone());
        }
        self.trade_log.push_front(trade);
    }

    fn generate_join_code(&self) -> String {
        loop {
            let code: String = rand::rng()
                .sample_iter(Alphanumeric)
                .take(JOIN_CODE_LEN)
                .map(char::from)
                .collect::<String>()
                .to_uppercase();
            if !self
                .teams
                .values()
                .any(|t| t.join_code.eq_ignore_ascii_case(&code))
            {
                return code;
            }
        }
    }
}

fn seed_instruments(settings: &Settings) -> HashMap<Symbol, Instrument> {
    settings
        .market
        .instruments
        .iter()
        .map(|seed| {
            let symbol = Symbol::new(&seed.symbol);
            (
                symbol.clone(),
                Instrument {
                    symbol,
                    display_name: seed.name.clone(),
                    price: seed.price,
                },
            )
        })
        .collect()
}
