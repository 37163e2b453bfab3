//! Trade Execution Engine - direct buy/sell/short/cover against the ledger.
//!
//! Every path validates fully before touching the ledger, so a rejected
//! trade leaves the team exactly as it found it. The price is caller-supplied
//! and trusted (admin-set or negotiated); the registry price is only read by
//! the circuit guard and the short enforcer.

use crate::core::{Error, Phase, Result, Symbol, Trade, TradeAction};
use crate::session::Session;
use std::collections::HashMap;
use uuid::Uuid;

/// Debit `quantity` from an inventory map, removing the entry when it hits
/// zero. Callers must have checked the balance first.
pub(crate) fn debit_inventory(map: &mut HashMap<Symbol, u64>, symbol: &Symbol, quantity: u64) {
    if let Some(held) = map.get_mut(symbol) {
        *held -= quantity;
        if *held == 0 {
            map.remove(symbol);
        }
    }
}

/// Credit `quantity` to an inventory map
pub(crate) fn credit_inventory(map: &mut HashMap<Symbol, u64>, symbol: &Symbol, quantity: u64) {
    *map.entry(symbol.clone()).or_insert(0) += quantity;
}

impl Session {
    /// Validate and apply one direct trade. Returns the settled Trade record,
    /// already appended to the team history and the global log.
    pub fn execute_trade(
        &mut self,
        team_id: Uuid,
        action: TradeAction,
        symbol: &Symbol,
        quantity: u64,
        price: f64,
    ) -> Result<Trade> {
        self.team(team_id)?;
        self.instrument(symbol)?;
        let total = quantity as f64 * price;

        match action {
            TradeAction::Buy => {
                let team = self.team(team_id)?;
                if team.cash < total {
                    return Err(Error::InsufficientFunds {
                        required: total,
                        available: team.cash,
                    });
                }
                let team = self.team_mut(team_id)?;
                team.cash -= total;
                credit_inventory(&mut team.holdings, symbol, quantity);
            }
            TradeAction::Sell => {
                let held = self.team(team_id)?.held(symbol);
                if held < quantity {
                    return Err(Error::InsufficientHoldings {
                        symbol: symbol.clone(),
                        held,
                        requested: quantity,
                    });
                }
                let team = self.team_mut(team_id)?;
                team.cash += total;
                debit_inventory(&mut team.holdings, symbol, quantity);
            }
            TradeAction::ShortSell => {
                if self.game.short_selling_frozen {
                    return Err(Error::ShortSellingFrozen);
                }
                if self.game.phase != Phase::Trading {
                    return Err(Error::WrongPhase(self.game.phase));
                }
                // Short proceeds may not raise cash above what is already held
                let cash = self.team(team_id)?.cash;
                if total > cash {
                    return Err(Error::OverCollateralized {
                        proceeds: total,
                        cash,
                    });
                }
                let team = self.team_mut(team_id)?;
                team.cash += total;
                credit_inventory(&mut team.short_holdings, symbol, quantity);
            }
            TradeAction::CoverShort => {
                let team = self.team(team_id)?;
                let held = team.short_held(symbol);
                if held < quantity {
                    return Err(Error::InsufficientShortPosition {
                        symbol: symbol.clone(),
                        held,
                        requested: quantity,
                    });
                }
                if team.cash < total {
                    return Err(Error::InsufficientFunds {
                        required: total,
                        available: team.cash,
                    });
                }
                let team = self.team_mut(team_id)?;
                team.cash -= total;
                debit_inventory(&mut team.short_holdings, symbol, quantity);
            }
            other => return Err(Error::UnsupportedAction(other)),
        }

        let team_name = self.team(team_id)?.name.clone();
        let trade = Trade::new(team_id, team_name, action, symbol.clone(), quantity, price);
        self.record_trade(trade.clone());
        Ok(trade)
    }
}
