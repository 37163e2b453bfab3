//! Circuit Limit Guard - bounds negotiated prices around the live price.
//!
//! Applies only to negotiated trades. Direct engine trades trust the
//! caller-supplied price unconditionally; admin-mediated prices are already
//! trusted.

use crate::core::{Error, Result, Symbol};
use crate::session::Session;

impl Session {
    /// Reject `proposed` unless it falls within
    /// `[price * circuit_lower, price * circuit_upper]` of the instrument's
    /// current price. Bypassed entirely while the circuit limit is frozen.
    pub fn check_circuit(&self, symbol: &Symbol, proposed: f64) -> Result<()> {
        if self.game.circuit_limit_frozen {
            return Ok(());
        }

        let current = self.instrument(symbol)?.price;
        let lower = current * self.settings.market.circuit_lower;
        let upper = current * self.settings.market.circuit_upper;

        if proposed < lower || proposed > upper {
            return Err(Error::CircuitViolation {
                proposed,
                lower,
                upper,
            });
        }
        Ok(())
    }
}
