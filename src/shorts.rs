//! Short-Position Enforcer - platform-wide forced cover on freeze.

use crate::core::{Symbol, Trade, TradeAction};
use crate::session::Session;
use std::collections::HashMap;

impl Session {
    /// Flip the short-selling freeze. The false→true transition force-closes
    /// every short position platform-wide; returns the new flag state and the
    /// forced-cover trades.
    pub fn toggle_short_freeze(&mut self) -> (bool, Vec<Trade>) {
        self.game.short_selling_frozen = !self.game.short_selling_frozen;
        let forced = if self.game.short_selling_frozen {
            self.force_close_shorts()
        } else {
            Vec::new()
        };
        (self.game.short_selling_frozen, forced)
    }

    /// Buy back every open short at the live registry price: debit cash by
    /// quantity * current price, emit one forced-cover trade per symbol, and
    /// clear each team's short book in one step. No-op for empty books.
    pub fn force_close_shorts(&mut self) -> Vec<Trade> {
        let prices: HashMap<Symbol, f64> = self
            .instruments
            .iter()
            .map(|(symbol, inst)| (symbol.clone(), inst.price))
            .collect();

        let mut trades = Vec::new();
        for team in self.teams.values_mut() {
            if team.short_holdings.is_empty() {
                continue;
            }
            let mut positions: Vec<(Symbol, u64)> = team.short_holdings.drain().collect();
            positions.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
            for (symbol, quantity) in positions {
                // Shorts only ever open against registered symbols
                let price = prices.get(&symbol).copied().unwrap_or(0.0);
                team.cash -= quantity as f64 * price;
                trades.push(
                    Trade::new(
                        team.id,
                        team.name.clone(),
                        TradeAction::CoverShortForced,
                        symbol,
                        quantity,
                        price,
                    )
                    .with_note("forced cover: short selling frozen"),
                );
            }
        }

        for trade in &trades {
            self.record_trade(trade.clone());
        }
        trades
    }
}
