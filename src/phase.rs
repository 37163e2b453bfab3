//! Phase/Timer Controller - the global countdown state machine.
//!
//! `tick` is a pure transition on `GameConfig` so phase logic is testable
//! without wall-clock delay; the platform runtime owns the single interval
//! task that calls it (cancel-and-replace on `start_phase`).

use crate::core::{GameConfig, Phase};

/// What one countdown tick did to the game config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Current phase does not consume countdown time
    Idle,
    /// Countdown decremented; carries the time remaining
    Counting(u32),
    /// A trading round completed and the next one started
    RoundAdvanced(u32),
    /// Countdown ran out and the phase changed
    Transitioned(Phase),
}

impl GameConfig {
    /// Enter a phase with a fresh countdown. Trading initialises the round
    /// counters; every other phase zeroes them.
    pub fn start_phase(
        &mut self,
        phase: Phase,
        duration: u32,
        rounds: Option<u32>,
        trading_round_time: Option<u32>,
    ) {
        self.phase = phase;
        match phase {
            Phase::Trading => {
                self.time_remaining = duration;
                self.current_round = 1;
                self.total_rounds = rounds.unwrap_or(1);
                self.trading_round_time = trading_round_time.unwrap_or(duration);
            }
            Phase::PortfolioAllocation => {
                self.time_remaining = duration;
                self.portfolio_allocation_time = duration;
                self.current_round = 0;
                self.total_rounds = 0;
            }
            Phase::Waiting | Phase::Ended => {
                self.time_remaining = 0;
                self.current_round = 0;
                self.total_rounds = 0;
            }
        }
    }

    /// Consume one second of countdown. Only `PortfolioAllocation` and
    /// `Trading` tick; at zero, allocation falls back to `Waiting` and
    /// trading either advances a round or ends the session for good.
    pub fn tick(&mut self) -> TickOutcome {
        if !matches!(self.phase, Phase::PortfolioAllocation | Phase::Trading) {
            return TickOutcome::Idle;
        }

        if self.time_remaining > 1 {
            self.time_remaining -= 1;
            return TickOutcome::Counting(self.time_remaining);
        }
        self.time_remaining = 0;

        if self.phase == Phase::PortfolioAllocation {
            self.phase = Phase::Waiting;
            return TickOutcome::Transitioned(Phase::Waiting);
        }

        if self.current_round < self.total_rounds {
            self.current_round += 1;
            self.time_remaining = self.trading_round_time;
            TickOutcome::RoundAdvanced(self.current_round)
        } else {
            self.phase = Phase::Ended;
            TickOutcome::Transitioned(Phase::Ended)
        }
    }
}
