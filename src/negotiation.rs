//! Negotiation Protocol - bilateral trade requests with timed expiry.
//!
//! A request is Pending from `propose` until exactly one of accept, reject,
//! or expiry removes it from the pending map. Presence in that map is the
//! single authoritative check, so the manual-response path and the expiry
//! path can race freely: whichever observes the request first consumes it,
//! the other sees `NotFound` (or a no-op for expiry).

use crate::core::{Error, Result, Side, Symbol, Trade, TradeAction, TradeRequest};
use crate::engine::{credit_inventory, debit_inventory};
use crate::session::Session;
use chrono::Duration;
use uuid::Uuid;

/// Terminal transition of a responded-to request. `Declined` and `Failed`
/// leave both ledgers untouched.
#[derive(Debug)]
pub enum RequestOutcome {
    Declined {
        request: TradeRequest,
    },
    Settled {
        request: TradeRequest,
        buyer_trade: Trade,
        seller_trade: Trade,
    },
    Failed {
        request: TradeRequest,
        error: Error,
    },
}

impl Session {
    /// Create a Pending request. The circuit guard runs here, before any
    /// Pending state exists; a violating price never enters the map.
    pub fn propose_request(
        &mut self,
        from_team_id: Uuid,
        to_team_id: Uuid,
        action: Side,
        symbol: &Symbol,
        quantity: u64,
        price: f64,
    ) -> Result<TradeRequest> {
        self.team(from_team_id)?;
        self.team(to_team_id)?;
        self.instrument(symbol)?;
        self.check_circuit(symbol, price)?;

        let ttl = Duration::milliseconds(self.settings.session.request_ttl_ms as i64);
        let request = TradeRequest::new(
            from_team_id,
            to_team_id,
            action,
            symbol.clone(),
            quantity,
            price,
            ttl,
        );
        self.pending_requests.insert(request.id, request.clone());
        Ok(request)
    }

    /// Consume a pending request. Fails with `NotFound` once the request has
    /// reached any terminal state. An accept that fails settlement still
    /// consumes the request; the outcome carries the error.
    pub fn respond_request(&mut self, request_id: Uuid, accept: bool) -> Result<RequestOutcome> {
        let request = self
            .pending_requests
            .remove(&request_id)
            .ok_or_else(|| Error::NotFound(format!("trade request {}", request_id)))?;

        if !accept {
            return Ok(RequestOutcome::Declined { request });
        }

        match self.settle(&request) {
            Ok((buyer_trade, seller_trade)) => Ok(RequestOutcome::Settled {
                request,
                buyer_trade,
                seller_trade,
            }),
            Err(error) => Ok(RequestOutcome::Failed { request, error }),
        }
    }

    /// Expiry path: remove the request if it is still pending. Returns `None`
    /// when a response already won the race.
    pub fn expire_request(&mut self, request_id: Uuid) -> Option<TradeRequest> {
        self.pending_requests.remove(&request_id)
    }

    /// Atomic settlement of an accepted request. Both legs are validated
    /// against pre-trade state before either ledger is touched. Settlement is
    /// long-only: the seller's short book is never consulted.
    fn settle(&mut self, request: &TradeRequest) -> Result<(Trade, Trade)> {
        let (buyer_id, seller_id) = match request.action {
            Side::Buy => (request.from_team_id, request.to_team_id),
            Side::Sell => (request.to_team_id, request.from_team_id),
        };
        let total = request.quantity as f64 * request.price;

        let buyer_cash = self.team(buyer_id)?.cash;
        if buyer_cash < total {
            return Err(Error::InsufficientFunds {
                required: total,
                available: buyer_cash,
            });
        }
        let seller_held = self.team(seller_id)?.held(&request.symbol);
        if seller_held < request.quantity {
            return Err(Error::InsufficientHoldings {
                symbol: request.symbol.clone(),
                held: seller_held,
                requested: request.quantity,
            });
        }

        let buyer = self.team_mut(buyer_id)?;
        buyer.cash -= total;
        credit_inventory(&mut buyer.holdings, &request.symbol, request.quantity);
        let buyer_name = buyer.name.clone();

        let seller = self.team_mut(seller_id)?;
        seller.cash += total;
        debit_inventory(&mut seller.holdings, &request.symbol, request.quantity);
        let seller_name = seller.name.clone();

        let buyer_trade = Trade::new(
            buyer_id,
            buyer_name.clone(),
            TradeAction::Buy,
            request.symbol.clone(),
            request.quantity,
            request.price,
        )
        .with_note("negotiated trade")
        .with_counterparty(seller_name.clone());

        let seller_trade = Trade::new(
            seller_id,
            seller_name,
            TradeAction::Sell,
            request.symbol.clone(),
            request.quantity,
            request.price,
        )
        .with_note("negotiated trade")
        .with_counterparty(buyer_name);

        self.record_trade(buyer_trade.clone());
        self.record_trade(seller_trade.clone());
        Ok((buyer_trade, seller_trade))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Settings;

    fn setup() -> (Session, Uuid, Uuid, Symbol) {
        let mut session = Session::new(Settings::default());
        let a = session.create_team("Alpha", 100_000.0).id;
        let b = session.create_team("Beta", 100_000.0).id;
        let sym = Symbol::new("ACME");
        (session, a, b, sym)
    }

    #[test]
    fn test_circuit_violation_creates_no_pending_state() {
        let (mut session, a, b, sym) = setup();

        // ACME is at 400; 10% above is out of band
        let err = session
            .propose_request(a, b, Side::Sell, &sym, 5, 440.0)
            .unwrap_err();
        assert!(matches!(err, Error::CircuitViolation { .. }));
        assert!(session.pending_requests.is_empty());
    }

    #[test]
    fn test_settlement_moves_value_symmetrically() {
        let (mut session, a, b, sym) = setup();
        session
            .execute_trade(b, TradeAction::Buy, &sym, 10, 400.0)
            .unwrap();

        // A proposes to buy 10 from B at 410
        let request = session
            .propose_request(a, b, Side::Buy, &sym, 10, 410.0)
            .unwrap();
        let outcome = session.respond_request(request.id, true).unwrap();

        let (buyer_trade, seller_trade) = match outcome {
            RequestOutcome::Settled {
                buyer_trade,
                seller_trade,
                ..
            } => (buyer_trade, seller_trade),
            other => panic!("expected settlement, got {:?}", other),
        };

        let alpha = session.team(a).unwrap();
        let beta = session.team(b).unwrap();
        assert_eq!(alpha.cash, 100_000.0 - 4_100.0);
        assert_eq!(alpha.held(&sym), 10);
        // Beta paid 4000 for the stock earlier, then sold for 4100
        assert_eq!(beta.cash, 100_000.0 - 4_000.0 + 4_100.0);
        assert!(beta.holdings.is_empty());

        assert_eq!(buyer_trade.action, TradeAction::Buy);
        assert_eq!(buyer_trade.counterparty.as_deref(), Some("Beta"));
        assert_eq!(seller_trade.action, TradeAction::Sell);
        assert_eq!(seller_trade.counterparty.as_deref(), Some("Alpha"));
        assert!(session.pending_requests.is_empty());
    }

    #[test]
    fn test_sell_request_resolves_requester_as_seller() {
        let (mut session, a, b, sym) = setup();
        session
            .execute_trade(a, TradeAction::Buy, &sym, 4, 400.0)
            .unwrap();

        let request = session
            .propose_request(a, b, Side::Sell, &sym, 4, 400.0)
            .unwrap();
        let outcome = session.respond_request(request.id, true).unwrap();
        assert!(matches!(outcome, RequestOutcome::Settled { .. }));

        assert_eq!(session.team(a).unwrap().held(&sym), 0);
        assert_eq!(session.team(b).unwrap().held(&sym), 4);
    }

    #[test]
    fn test_request_reaches_exactly_one_terminal_state() {
        let (mut session, a, b, sym) = setup();
        let request = session
            .propose_request(a, b, Side::Buy, &sym, 1, 400.0)
            .unwrap();

        let outcome = session.respond_request(request.id, false).unwrap();
        assert!(matches!(outcome, RequestOutcome::Declined { .. }));

        // Second response and late expiry both observe absence
        assert!(matches!(
            session.respond_request(request.id, true),
            Err(Error::NotFound(_))
        ));
        assert!(session.expire_request(request.id).is_none());
    }

    #[test]
    fn test_decline_has_no_ledger_effect() {
        let (mut session, a, b, sym) = setup();
        let request = session
            .propose_request(a, b, Side::Buy, &sym, 5, 400.0)
            .unwrap();
        session.respond_request(request.id, false).unwrap();

        assert_eq!(session.team(a).unwrap().cash, 100_000.0);
        assert_eq!(session.team(b).unwrap().cash, 100_000.0);
    }

    #[test]
    fn test_failed_settlement_consumes_request_and_leaves_state() {
        let (mut session, a, b, sym) = setup();

        // B holds nothing, so A's buy cannot settle
        let request = session
            .propose_request(a, b, Side::Buy, &sym, 5, 400.0)
            .unwrap();
        let outcome = session.respond_request(request.id, true).unwrap();
        match outcome {
            RequestOutcome::Failed { error, .. } => {
                assert!(matches!(error, Error::InsufficientHoldings { .. }))
            }
            other => panic!("expected failure, got {:?}", other),
        }

        assert!(session.pending_requests.is_empty());
        assert_eq!(session.team(a).unwrap().cash, 100_000.0);
        assert_eq!(session.team(b).unwrap().cash, 100_000.0);
    }

    #[test]
    fn test_settlement_is_long_only() {
        let (mut session, a, b, sym) = setup();
        session.game.phase = crate::core::Phase::Trading;

        // B is short 10 ACME but holds no long position
        session
            .execute_trade(b, TradeAction::ShortSell, &sym, 10, 400.0)
            .unwrap();

        let request = session
            .propose_request(a, b, Side::Buy, &sym, 5, 400.0)
            .unwrap();
        let outcome = session.respond_request(request.id, true).unwrap();
        assert!(matches!(outcome, RequestOutcome::Failed { .. }));
        assert_eq!(session.team(b).unwrap().short_held(&sym), 10);
    }

    #[test]
    fn test_buyer_insufficient_funds() {
        let (mut session, a, b, sym) = setup();
        session
            .execute_trade(b, TradeAction::Buy, &sym, 10, 400.0)
            .unwrap();
        session.team_mut(a).unwrap().cash = 100.0;

        let request = session
            .propose_request(a, b, Side::Buy, &sym, 10, 400.0)
            .unwrap();
        let outcome = session.respond_request(request.id, true).unwrap();
        match outcome {
            RequestOutcome::Failed { error, .. } => {
                assert!(matches!(error, Error::InsufficientFunds { .. }))
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_expiry_removes_pending_request() {
        let (mut session, a, b, sym) = setup();
        let request = session
            .propose_request(a, b, Side::Buy, &sym, 1, 400.0)
            .unwrap();

        let expired = session.expire_request(request.id).unwrap();
        assert_eq!(expired.id, request.id);
        assert!(session.pending_requests.is_empty());

        // A respond arriving after expiry loses the race
        assert!(matches!(
            session.respond_request(request.id, true),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_propose_unknown_parties_or_symbol() {
        let (mut session, a, _b, sym) = setup();

        assert!(matches!(
            session.propose_request(a, Uuid::new_v4(), Side::Buy, &sym, 1, 400.0),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            session.propose_request(Uuid::new_v4(), a, Side::Buy, &sym, 1, 400.0),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            session.propose_request(a, a, Side::Buy, &Symbol::new("VOID"), 1, 400.0),
            Err(Error::NotFound(_))
        ));
    }
}
