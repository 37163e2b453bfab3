//! Platform runtime - one actor task owns the session.
//!
//! All mutations flow through a single mpsc command stream, so every handler
//! runs to completion against a consistent snapshot; "concurrent" client
//! actions are ordered by arrival. The only scheduled work is the global
//! phase ticker (cancel-and-replace, at most one alive) and one expiry sleep
//! per pending trade request; both re-enter through the same command channel.

use crate::core::config::Settings;
use crate::core::{Error, Phase, Result, Side, Symbol, Team, TradeAction, TradeRequest};
use crate::events::{Command, Notification, Reply};
use crate::negotiation::RequestOutcome;
use crate::phase::TickOutcome;
use crate::session::Session;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

const BROADCAST_CAPACITY: usize = 256;
const TEAM_CHANNEL_CAPACITY: usize = 64;

/// Notification fan-out: one broadcast channel for platform-wide events plus
/// a per-team channel registry for the negotiation-targeted ones.
pub struct Hub {
    broadcast_tx: broadcast::Sender<Notification>,
    team_channels: RwLock<HashMap<Uuid, broadcast::Sender<Notification>>>,
}

impl Hub {
    fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            broadcast_tx,
            team_channels: RwLock::new(HashMap::new()),
        }
    }

    /// Observe every broadcast notification
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.broadcast_tx.subscribe()
    }

    /// Observe one team's targeted notifications
    pub fn subscribe_team(&self, team_id: Uuid) -> broadcast::Receiver<Notification> {
        self.team_channels
            .write()
            .entry(team_id)
            .or_insert_with(|| broadcast::channel(TEAM_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    fn register_team(&self, team_id: Uuid) {
        self.team_channels
            .write()
            .entry(team_id)
            .or_insert_with(|| broadcast::channel(TEAM_CHANNEL_CAPACITY).0);
    }

    fn publish(&self, notification: Notification) {
        let _ = self.broadcast_tx.send(notification);
    }

    fn notify_team(&self, team_id: Uuid, notification: Notification) {
        if let Some(tx) = self.team_channels.read().get(&team_id) {
            let _ = tx.send(notification);
        }
    }

    fn clear_teams(&self) {
        self.team_channels.write().clear();
    }
}

/// Cloneable API surface for the transport layer. Methods with a reply
/// contract resolve when the actor has fully applied (or rejected) the
/// mutation.
#[derive(Clone)]
pub struct PlatformHandle {
    tx: mpsc::UnboundedSender<Command>,
    hub: Arc<Hub>,
}

impl PlatformHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.hub.subscribe()
    }

    pub fn subscribe_team(&self, team_id: Uuid) -> broadcast::Receiver<Notification> {
        self.hub.subscribe_team(team_id)
    }

    pub async fn create_team(&self, name: impl Into<String>, starting_balance: f64) -> Result<Team> {
        self.request(|reply| Command::CreateTeam {
            name: name.into(),
            starting_balance,
            reply,
        })
        .await
    }

    pub async fn join_team(&self, join_code: impl Into<String>) -> Result<Team> {
        self.request(|reply| Command::JoinTeam {
            join_code: join_code.into(),
            reply,
        })
        .await
    }

    pub async fn execute_trade(
        &self,
        team_id: Uuid,
        action: TradeAction,
        symbol: Symbol,
        quantity: u64,
        price: f64,
    ) -> Result<Team> {
        self.request(|reply| Command::ExecuteTrade {
            team_id,
            action,
            symbol,
            quantity,
            price,
            reply,
        })
        .await
    }

    pub async fn send_trade_request(
        &self,
        from_team_id: Uuid,
        to_team_id: Uuid,
        action: Side,
        symbol: Symbol,
        quantity: u64,
        price: f64,
    ) -> Result<TradeRequest> {
        self.request(|reply| Command::SendTradeRequest {
            from_team_id,
            to_team_id,
            action,
            symbol,
            quantity,
            price,
            reply,
        })
        .await
    }

    pub async fn respond_trade_request(&self, request_id: Uuid, accept: bool) -> Result<()> {
        self.request(|reply| Command::RespondTradeRequest {
            request_id,
            accept,
            reply,
        })
        .await
    }

    pub async fn toggle_circuit_freeze(&self) -> Result<bool> {
        self.request(|reply| Command::ToggleCircuitFreeze { reply }).await
    }

    pub async fn toggle_market_trading(&self) -> Result<bool> {
        self.request(|reply| Command::ToggleMarketTrading { reply }).await
    }

    pub async fn toggle_short_freeze(&self) -> Result<bool> {
        self.request(|reply| Command::ToggleShortFreeze { reply }).await
    }

    /// No reply contract; the result is broadcast
    pub fn start_phase(
        &self,
        phase: Phase,
        duration: u32,
        rounds: Option<u32>,
        trading_round_time: Option<u32>,
    ) -> Result<()> {
        self.send(Command::StartPhase {
            phase,
            duration,
            rounds,
            trading_round_time,
        })
    }

    /// Admin-trusted, no validation reply
    pub fn update_stock_price(&self, symbol: Symbol, price: f64) -> Result<()> {
        self.send(Command::UpdateStockPrice { symbol, price })
    }

    pub fn reset_platform(&self) -> Result<()> {
        self.send(Command::ResetPlatform)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| Error::Offline)
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply))?;
        rx.await.map_err(|_| Error::Offline)?
    }
}

/// Spawn the platform actor; the returned handle is the only way in.
pub fn spawn(settings: Settings) -> PlatformHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let hub = Arc::new(Hub::new());
    let actor = Actor {
        session: Session::new(settings),
        hub: hub.clone(),
        tx: tx.clone(),
        ticker: None,
        expiries: HashMap::new(),
    };
    tokio::spawn(actor.run(rx));
    PlatformHandle { tx, hub }
}

struct Actor {
    session: Session,
    hub: Arc<Hub>,
    /// Re-entry point for scheduled tick/expiry tasks
    tx: mpsc::UnboundedSender<Command>,
    ticker: Option<JoinHandle<()>>,
    expiries: HashMap<Uuid, JoinHandle<()>>,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        info!("platform actor started");
        while let Some(command) = rx.recv().await {
            if matches!(command, Command::Shutdown) {
                break;
            }
            self.handle(command);
        }
        self.stop_ticker();
        self.abort_expiries();
        info!("platform actor stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::CreateTeam {
                name,
                starting_balance,
                reply,
            } => {
                let team = self.session.create_team(name, starting_balance);
                self.hub.register_team(team.id);
                info!(team = %team.name, id = %team.id, "team created");
                self.hub.publish(Notification::TeamCreated { team: team.clone() });
                let _ = reply.send(Ok(team));
            }

            Command::JoinTeam { join_code, reply } => {
                let result = self.session.team_by_join_code(&join_code).cloned();
                let _ = reply.send(result);
            }

            Command::ExecuteTrade {
                team_id,
                action,
                symbol,
                quantity,
                price,
                reply,
            } => {
                let result = self
                    .session
                    .execute_trade(team_id, action, &symbol, quantity, price);
                match result {
                    Ok(trade) => {
                        debug!(team = %trade.team_name, %action, %symbol, quantity, price, "trade executed");
                        let team = self.session.teams[&team_id].clone();
                        self.hub.publish(Notification::TradeExecuted { trade });
                        self.hub.publish(Notification::TeamUpdated { team: team.clone() });
                        let _ = reply.send(Ok(team));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }

            Command::SendTradeRequest {
                from_team_id,
                to_team_id,
                action,
                symbol,
                quantity,
                price,
                reply,
            } => {
                let result = self.session.propose_request(
                    from_team_id,
                    to_team_id,
                    action,
                    &symbol,
                    quantity,
                    price,
                );
                match result {
                    Ok(request) => {
                        self.schedule_expiry(request.id);
                        let from_team = self.session.teams[&from_team_id].name.clone();
                        debug!(request = %request.id, %from_team, "trade request sent");
                        self.hub.notify_team(
                            from_team_id,
                            Notification::TradeRequestSent {
                                request: request.clone(),
                            },
                        );
                        self.hub.notify_team(
                            to_team_id,
                            Notification::TradeRequestReceived {
                                request: request.clone(),
                                from_team,
                            },
                        );
                        let _ = reply.send(Ok(request));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }

            Command::RespondTradeRequest {
                request_id,
                accept,
                reply,
            } => {
                // The response consumes the request either way; its expiry
                // task must not fire afterwards.
                if let Some(handle) = self.expiries.remove(&request_id) {
                    handle.abort();
                }
                match self.session.respond_request(request_id, accept) {
                    Ok(outcome) => self.finish_request(outcome, reply),
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }

            Command::ExpireRequest(request_id) => {
                self.expiries.remove(&request_id);
                if let Some(request) = self.session.expire_request(request_id) {
                    debug!(request = %request_id, "trade request expired");
                    let expired = Notification::TradeRequestExpired { request_id };
                    self.hub.notify_team(request.from_team_id, expired.clone());
                    self.hub.notify_team(request.to_team_id, expired);
                }
            }

            Command::StartPhase {
                phase,
                duration,
                rounds,
                trading_round_time,
            } => {
                self.session
                    .game
                    .start_phase(phase, duration, rounds, trading_round_time);
                info!(%phase, duration, "phase started");
                self.hub.publish(Notification::PhaseChange {
                    config: self.session.game.clone(),
                });
                if matches!(phase, Phase::PortfolioAllocation | Phase::Trading) {
                    self.start_ticker();
                } else {
                    self.stop_ticker();
                }
            }

            Command::Tick => match self.session.game.tick() {
                TickOutcome::Idle => {}
                TickOutcome::Counting(time_remaining) => {
                    self.hub.publish(Notification::TimerUpdate {
                        time_remaining,
                        current_round: self.session.game.current_round,
                    });
                }
                TickOutcome::RoundAdvanced(round) => {
                    info!(round, "trading round advanced");
                    self.hub.publish(Notification::TimerUpdate {
                        time_remaining: self.session.game.time_remaining,
                        current_round: round,
                    });
                    self.publish_config();
                }
                TickOutcome::Transitioned(phase) => {
                    info!(%phase, "phase transition");
                    self.stop_ticker();
                    self.hub.publish(Notification::PhaseChange {
                        config: self.session.game.clone(),
                    });
                }
            },

            Command::ToggleCircuitFreeze { reply } => {
                let frozen = self.session.toggle_circuit_freeze();
                info!(frozen, "circuit limit toggled");
                self.publish_config();
                let _ = reply.send(Ok(frozen));
            }

            Command::ToggleMarketTrading { reply } => {
                let enabled = self.session.toggle_market_trading();
                info!(enabled, "market trading toggled");
                self.publish_config();
                let _ = reply.send(Ok(enabled));
            }

            Command::ToggleShortFreeze { reply } => {
                let (frozen, forced) = self.session.toggle_short_freeze();
                info!(frozen, forced = forced.len(), "short selling toggled");
                let mut touched: Vec<Uuid> = forced.iter().map(|t| t.team_id).collect();
                touched.dedup();
                for trade in forced {
                    self.hub.publish(Notification::TradeExecuted { trade });
                }
                for team_id in touched {
                    let team = self.session.teams[&team_id].clone();
                    self.hub.publish(Notification::TeamUpdated { team });
                }
                self.publish_config();
                let _ = reply.send(Ok(frozen));
            }

            Command::UpdateStockPrice { symbol, price } => {
                match self.session.update_price(&symbol, price) {
                    Ok(()) => {
                        debug!(%symbol, price, "price updated");
                        self.publish_config();
                    }
                    Err(e) => warn!(%symbol, "price update rejected: {}", e),
                }
            }

            Command::ResetPlatform => {
                info!("platform reset");
                self.stop_ticker();
                self.abort_expiries();
                self.session.reset();
                self.hub.clear_teams();
                self.hub.publish(Notification::PlatformReset);
            }

            // Consumed in run()
            Command::Shutdown => {}
        }
    }

    fn finish_request(&mut self, outcome: RequestOutcome, reply: Reply<()>) {
        match outcome {
            RequestOutcome::Declined { request } => {
                let cancelled = Notification::TradeRequestCancelled {
                    request_id: request.id,
                };
                self.hub.notify_team(request.from_team_id, cancelled.clone());
                self.hub.notify_team(request.to_team_id, cancelled);
                let _ = reply.send(Ok(()));
            }
            RequestOutcome::Settled {
                request,
                buyer_trade,
                seller_trade,
            } => {
                debug!(request = %request.id, "trade request settled");
                self.hub.notify_team(
                    buyer_trade.team_id,
                    Notification::TradeRequestCompleted {
                        request_id: request.id,
                        trade: buyer_trade.clone(),
                    },
                );
                self.hub.notify_team(
                    seller_trade.team_id,
                    Notification::TradeRequestCompleted {
                        request_id: request.id,
                        trade: seller_trade.clone(),
                    },
                );
                for trade in [buyer_trade, seller_trade] {
                    let team = self.session.teams[&trade.team_id].clone();
                    self.hub.publish(Notification::TradeExecuted { trade });
                    self.hub.publish(Notification::TeamUpdated { team });
                }
                let _ = reply.send(Ok(()));
            }
            RequestOutcome::Failed { request, error } => {
                debug!(request = %request.id, "trade request failed: {}", error);
                let failed = Notification::TradeRequestFailed {
                    request_id: request.id,
                    reason: error.to_string(),
                };
                self.hub.notify_team(request.from_team_id, failed.clone());
                self.hub.notify_team(request.to_team_id, failed);
                let _ = reply.send(Err(error));
            }
        }
    }

    fn publish_config(&self) {
        self.hub.publish(Notification::ConfigUpdate {
            config: self.session.game.clone(),
            instruments: self.session.instruments.values().cloned().collect(),
        });
    }

    fn start_ticker(&mut self) {
        self.stop_ticker();
        let tx = self.tx.clone();
        let period = Duration::from_millis(self.session.settings.session.tick_interval_ms);
        self.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // the first interval tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                if tx.send(Command::Tick).is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }

    fn schedule_expiry(&mut self, request_id: Uuid) {
        let tx = self.tx.clone();
        let ttl = Duration::from_millis(self.session.settings.session.request_ttl_ms);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let _ = tx.send(Command::ExpireRequest(request_id));
        });
        self.expiries.insert(request_id, handle);
    }

    fn abort_expiries(&mut self) {
        for (_, handle) in self.expiries.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;

    fn test_settings(request_ttl_ms: u64, tick_interval_ms: u64) -> Settings {
        let mut settings = Settings::default();
        settings.session.request_ttl_ms = request_ttl_ms;
        settings.session.tick_interval_ms = tick_interval_ms;
        settings
    }

    async fn next(rx: &mut broadcast::Receiver<Notification>) -> Notification {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for notification")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_trade_flow_notifications() {
        let platform = spawn(test_settings(20_000, 1_000));
        let mut events = platform.subscribe();

        let team = platform.create_team("Alpha", 100_000.0).await.unwrap();
        assert!(matches!(next(&mut events).await, Notification::TeamCreated { .. }));

        let updated = platform
            .execute_trade(team.id, TradeAction::Buy, Symbol::new("ACME"), 10, 400.0)
            .await
            .unwrap();
        assert_eq!(updated.cash, 96_000.0);

        assert!(matches!(next(&mut events).await, Notification::TradeExecuted { .. }));
        match next(&mut events).await {
            Notification::TeamUpdated { team } => assert_eq!(team.cash, 96_000.0),
            other => panic!("expected TeamUpdated, got {:?}", other),
        }

        platform.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_request_expires_and_late_response_loses() {
        let platform = spawn(test_settings(50, 1_000));
        let alpha = platform.create_team("Alpha", 100_000.0).await.unwrap();
        let beta = platform.create_team("Beta", 100_000.0).await.unwrap();
        let mut alpha_rx = platform.subscribe_team(alpha.id);
        let mut beta_rx = platform.subscribe_team(beta.id);

        let request = platform
            .send_trade_request(alpha.id, beta.id, Side::Buy, Symbol::new("ACME"), 5, 400.0)
            .await
            .unwrap();

        assert!(matches!(
            next(&mut alpha_rx).await,
            Notification::TradeRequestSent { .. }
        ));
        assert!(matches!(
            next(&mut beta_rx).await,
            Notification::TradeRequestReceived { .. }
        ));

        tokio::time::sleep(Duration::from_millis(150)).await;

        // Expiry won; both parties heard about it and a late accept is a NotFound
        assert!(matches!(
            next(&mut alpha_rx).await,
            Notification::TradeRequestExpired { .. }
        ));
        assert!(matches!(
            next(&mut beta_rx).await,
            Notification::TradeRequestExpired { .. }
        ));
        assert!(matches!(
            platform.respond_trade_request(request.id, true).await,
            Err(Error::NotFound(_))
        ));

        platform.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_response_cancels_expiry() {
        let platform = spawn(test_settings(80, 1_000));
        let alpha = platform.create_team("Alpha", 100_000.0).await.unwrap();
        let beta = platform.create_team("Beta", 100_000.0).await.unwrap();
        let mut beta_rx = platform.subscribe_team(beta.id);

        let request = platform
            .send_trade_request(alpha.id, beta.id, Side::Buy, Symbol::new("ACME"), 5, 400.0)
            .await
            .unwrap();
        platform.respond_trade_request(request.id, false).await.unwrap();

        // Past the TTL: the reject already consumed the request, so no
        // expiry notification may follow the cancellation.
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(matches!(
            next(&mut beta_rx).await,
            Notification::TradeRequestReceived { .. }
        ));
        assert!(matches!(
            next(&mut beta_rx).await,
            Notification::TradeRequestCancelled { .. }
        ));
        assert!(matches!(
            beta_rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));

        platform.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_settlement_through_handle() {
        let platform = spawn(test_settings(20_000, 1_000));
        let alpha = platform.create_team("Alpha", 100_000.0).await.unwrap();
        let beta = platform.create_team("Beta", 100_000.0).await.unwrap();
        let mut alpha_rx = platform.subscribe_team(alpha.id);

        platform
            .execute_trade(beta.id, TradeAction::Buy, Symbol::new("ACME"), 10, 400.0)
            .await
            .unwrap();
        let request = platform
            .send_trade_request(alpha.id, beta.id, Side::Buy, Symbol::new("ACME"), 10, 410.0)
            .await
            .unwrap();
        platform.respond_trade_request(request.id, true).await.unwrap();

        assert!(matches!(
            next(&mut alpha_rx).await,
            Notification::TradeRequestSent { .. }
        ));
        match next(&mut alpha_rx).await {
            Notification::TradeRequestCompleted { trade, .. } => {
                assert_eq!(trade.action, TradeAction::Buy);
                assert_eq!(trade.counterparty.as_deref(), Some("Beta"));
            }
            other => panic!("expected completion, got {:?}", other),
        }

        platform.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_trading_rounds_tick_to_ended() {
        let platform = spawn(test_settings(20_000, 10));
        let mut events = platform.subscribe();

        platform
            .start_phase(Phase::Trading, 2, Some(2), Some(2))
            .unwrap();

        let mut saw_round_two = false;
        loop {
            match next(&mut events).await {
                Notification::PhaseChange { config } if config.phase == Phase::Ended => break,
                Notification::PhaseChange { config } => {
                    assert_eq!(config.phase, Phase::Trading);
                    assert_eq!(config.current_round, 1);
                }
                Notification::TimerUpdate { current_round, .. } => {
                    if current_round == 2 {
                        saw_round_two = true;
                    }
                }
                _ => {}
            }
        }
        assert!(saw_round_two);

        // Terminal: no further timer updates arrive
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));

        platform.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_reset_cancels_pending_requests_and_timers() {
        let platform = spawn(test_settings(60, 10));
        let alpha = platform.create_team("Alpha", 100_000.0).await.unwrap();
        let beta = platform.create_team("Beta", 100_000.0).await.unwrap();

        let request = platform
            .send_trade_request(alpha.id, beta.id, Side::Buy, Symbol::new("ACME"), 1, 400.0)
            .await
            .unwrap();
        platform.start_phase(Phase::Trading, 100, Some(1), None).unwrap();

        let mut events = platform.subscribe();
        platform.reset_platform().unwrap();

        loop {
            if matches!(next(&mut events).await, Notification::PlatformReset) {
                break;
            }
        }

        assert!(matches!(
            platform.respond_trade_request(request.id, true).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            platform.join_team(alpha.join_code.clone()).await,
            Err(Error::NotFound(_))
        ));

        // Ticker was cancelled with the reset
        tokio::time::sleep(Duration::from_millis(80)).await;
        while let Ok(n) = events.try_recv() {
            assert!(!matches!(n, Notification::TimerUpdate { .. }));
        }

        platform.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_short_freeze_toggle_force_closes() {
        let platform = spawn(test_settings(20_000, 1_000));
        let alpha = platform.create_team("Alpha", 100_000.0).await.unwrap();
        platform.start_phase(Phase::Trading, 600, Some(1), None).unwrap();
        platform
            .execute_trade(alpha.id, TradeAction::ShortSell, Symbol::new("ACME"), 10, 400.0)
            .await
            .unwrap();

        let frozen = platform.toggle_short_freeze().await.unwrap();
        assert!(frozen);

        let err = platform
            .execute_trade(alpha.id, TradeAction::ShortSell, Symbol::new("ACME"), 1, 400.0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ShortSellingFrozen));

        // Book was force-closed at the live price
        let team = platform.join_team(alpha.join_code.clone()).await.unwrap();
        assert!(team.short_holdings.is_empty());
        assert_eq!(team.cash, 100_000.0);

        platform.shutdown().unwrap();
    }
}
