//! Admission control between signal validation and execution.
//!
//! Checks run in a fixed order and the first failure wins:
//! pause, real-money confirmation, position sizing, daily loss ceiling,
//! consecutive-loss breaker.

use chrono::NaiveDate;
use common::config::RiskConfig;
use common::models::{TradeCandidate, TradeMode, TradeOutcome, TradeRequest};
use tracing::{info, warn};
use uuid::Uuid;

use crate::rejection::{Rejection, RejectionReason};
use crate::state::{PauseReason, RiskMetrics, RiskState};

pub struct RiskGate {
    config: RiskConfig,
    state: RiskState,
}

impl RiskGate {
    pub fn new(config: RiskConfig, balance: f64, trading_day: NaiveDate) -> Self {
        info!(
            "Risk gate ready: balance {:.2}, max trade {}%, max daily loss {}%, loss streak limit {}",
            balance,
            config.max_trade_percent,
            config.max_daily_loss_percent,
            config.consecutive_loss_limit
        );
        Self {
            config,
            state: RiskState::new(balance, trading_day),
        }
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    pub fn metrics(&self) -> RiskMetrics {
        RiskMetrics::from(&self.state)
    }

    pub fn admit(&mut self, candidate: &TradeCandidate) -> Result<TradeRequest, Rejection> {
        let instrument = &candidate.signal.signal.instrument;

        if self.state.paused {
            let reason = match self.state.pause_reason {
                Some(PauseReason::ConsecutiveLosses(_)) => RejectionReason::CircuitOpen,
                _ => RejectionReason::Paused,
            };
            let detail = self
                .state
                .pause_reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "trading is paused".to_string());
            return Err(self.reject(instrument, Rejection::new(reason, detail)));
        }

        if candidate.mode == TradeMode::Real {
            if !self.config.allow_real {
                return Err(self.reject(
                    instrument,
                    Rejection::new(
                        RejectionReason::DemoOnly,
                        "real trading is disabled, system is in demo mode",
                    ),
                ));
            }
            if !self.state.real_mode_confirmed {
                return Err(self.reject(
                    instrument,
                    Rejection::new(
                        RejectionReason::ConfirmationRequired,
                        "real-money trading has not been confirmed",
                    ),
                ));
            }
        }

        let cap = self.max_stake();
        let stake = candidate.requested_stake.min(cap);
        let stake_clamped = candidate.requested_stake > cap;
        if stake_clamped {
            info!(
                "Stake for {} clamped from {:.2} to {:.2} ({}% of {:.2})",
                instrument,
                candidate.requested_stake,
                stake,
                self.config.max_trade_percent,
                self.state.balance
            );
        }
        if stake <= 0.0 {
            return Err(self.reject(
                instrument,
                Rejection::new(
                    RejectionReason::InsufficientBalance,
                    format!("no stake available from balance {:.2}", self.state.balance),
                ),
            ));
        }

        let daily_limit = self.state.day_start_balance * self.config.max_daily_loss_percent / 100.0;
        if self.state.daily_loss >= daily_limit {
            return Err(self.reject(
                instrument,
                Rejection::new(
                    RejectionReason::DailyLimit,
                    format!(
                        "daily loss {:.2} reached limit {:.2} ({}% of {:.2})",
                        self.state.daily_loss,
                        daily_limit,
                        self.config.max_daily_loss_percent,
                        self.state.day_start_balance
                    ),
                ),
            ));
        }

        if self.state.consecutive_losses >= self.config.consecutive_loss_limit {
            self.pause(PauseReason::ConsecutiveLosses(self.state.consecutive_losses));
            return Err(self.reject(
                instrument,
                Rejection::new(
                    RejectionReason::CircuitOpen,
                    format!(
                        "{} consecutive losses (limit {})",
                        self.state.consecutive_losses, self.config.consecutive_loss_limit
                    ),
                ),
            ));
        }

        let request = TradeRequest {
            id: Uuid::new_v4(),
            instrument: instrument.clone(),
            direction: candidate.signal.signal.direction,
            stake,
            expiration: candidate.expiration,
            mode: candidate.mode,
            stake_clamped,
            confidence: candidate.signal.confidence,
            price: candidate.signal.signal.price,
        };
        info!(
            "Trade admitted: {} {} stake {:.2} ({})",
            request.direction, request.instrument, request.stake, request.mode
        );
        Ok(request)
    }

    /// Folds a settled trade into the running figures. Called exactly once
    /// per outcome.
    pub fn record_outcome(&mut self, outcome: &TradeOutcome) {
        self.state.balance += outcome.profit_loss;
        self.state.trades_today += 1;

        if outcome.is_win {
            self.state.consecutive_losses = 0;
        } else {
            self.state.consecutive_losses += 1;
            self.state.daily_loss += outcome.loss();
            self.state.last_loss_at = Some(outcome.timestamp);
        }

        info!(
            "Recorded {} on {}: P/L {:+.2}, balance {:.2}, daily loss {:.2}, loss streak {}",
            if outcome.is_win { "WIN" } else { "LOSS" },
            outcome.request.instrument,
            outcome.profit_loss,
            self.state.balance,
            self.state.daily_loss,
            self.state.consecutive_losses
        );

        if !self.state.paused && self.state.consecutive_losses >= self.config.consecutive_loss_limit {
            self.pause(PauseReason::ConsecutiveLosses(self.state.consecutive_losses));
        }
    }

    /// Resets the per-day counters. A pause survives the day boundary.
    pub fn start_day(&mut self, day: NaiveDate, balance: f64) {
        info!(
            "New trading day {}: day-start balance {:.2} (previous day loss {:.2})",
            day, balance, self.state.daily_loss
        );
        self.state.trading_day = day;
        self.state.balance = balance;
        self.state.day_start_balance = balance;
        self.state.daily_loss = 0.0;
        self.state.trades_today = 0;
        self.state.consecutive_losses = 0;
    }

    /// Replaces the tracked balance with the venue's figure.
    pub fn sync_balance(&mut self, balance: f64) {
        if self.state.trades_today == 0 && self.state.daily_loss == 0.0 {
            self.state.day_start_balance = balance;
        }
        self.state.balance = balance;
    }

    pub fn pause(&mut self, reason: PauseReason) {
        self.state.paused = true;
        self.state.pause_reason = Some(reason);
        warn!("Trading paused: {}", reason);
    }

    /// Operator override. Clears the loss streak too, otherwise the next
    /// admission would trip the breaker again straight away.
    pub fn resume(&mut self) -> bool {
        if !self.state.paused {
            return false;
        }
        self.state.paused = false;
        self.state.pause_reason = None;
        self.state.consecutive_losses = 0;
        info!("Trading manually resumed");
        true
    }

    pub fn confirm_real_mode(&mut self) {
        self.state.real_mode_confirmed = true;
        warn!("Real-money trading confirmed");
    }

    fn max_stake(&self) -> f64 {
        (self.state.balance * self.config.max_trade_percent / 100.0).max(0.0)
    }

    fn reject(&self, instrument: &str, rejection: Rejection) -> Rejection {
        info!("Trade on {} rejected: {}", instrument, rejection);
        rejection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use common::models::{Direction, IndicatorSnapshot, Signal, ValidatedSignal};
    use std::time::Duration;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn gate(balance: f64) -> RiskGate {
        RiskGate::new(RiskConfig::default(), balance, day())
    }

    fn candidate(stake: f64, mode: TradeMode) -> TradeCandidate {
        let signal = Signal {
            instrument: "EURUSD".into(),
            direction: Direction::Buy,
            confidence: 0.7,
            snapshot: IndicatorSnapshot {
                rsi: 25.0,
                sma: 100.0,
                rsi_period: 14,
                sma_period: 20,
            },
            price: 105.0,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap(),
        };
        TradeCandidate {
            signal: ValidatedSignal {
                signal,
                confirmed: true,
                confidence: 0.7,
                unverified: false,
            },
            requested_stake: stake,
            expiration: Duration::from_secs(60),
            mode,
        }
    }

    fn outcome(request: &TradeRequest, profit_loss: f64) -> TradeOutcome {
        TradeOutcome {
            request: request.clone(),
            entry_price: 105.0,
            exit_price: 105.0,
            profit_loss,
            is_win: profit_loss > 0.0,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 10, 1, 0).unwrap(),
        }
    }

    fn lose(gate: &mut RiskGate) {
        let request = gate.admit(&candidate(10.0, TradeMode::Demo)).unwrap();
        gate.record_outcome(&outcome(&request, -request.stake));
    }

    #[test]
    fn oversized_stake_is_clamped_to_two_percent() {
        let mut gate = gate(1000.0);
        let request = gate.admit(&candidate(100.0, TradeMode::Demo)).unwrap();
        assert_eq!(request.stake, 20.0);
        assert!(request.stake_clamped);
    }

    #[test]
    fn small_stake_passes_unchanged() {
        let mut gate = gate(1000.0);
        let request = gate.admit(&candidate(10.0, TradeMode::Demo)).unwrap();
        assert_eq!(request.stake, 10.0);
        assert!(!request.stake_clamped);
        assert_eq!(request.direction, Direction::Buy);
        assert_eq!(request.confidence, 0.7);
    }

    #[test]
    fn three_losses_pause_and_reject_with_circuit_open() {
        let mut gate = gate(1000.0);
        for _ in 0..3 {
            lose(&mut gate);
        }
        assert!(gate.state().paused);
        assert_eq!(gate.state().consecutive_losses, 3);

        // A real-mode request would fail the confirmation check, but the
        // pause is evaluated first.
        let rejection = gate.admit(&candidate(10.0, TradeMode::Real)).unwrap_err();
        assert_eq!(rejection.reason, RejectionReason::CircuitOpen);
        assert_eq!(rejection.reason.code(), "CIRCUIT_OPEN");
    }

    #[test]
    fn manual_pause_rejects_with_paused() {
        let mut gate = gate(1000.0);
        gate.pause(PauseReason::Manual);
        let rejection = gate.admit(&candidate(10.0, TradeMode::Demo)).unwrap_err();
        assert_eq!(rejection.reason, RejectionReason::Paused);
    }

    #[test]
    fn real_mode_needs_confirmation() {
        let config = RiskConfig {
            allow_real: true,
            ..RiskConfig::default()
        };
        let mut gate = RiskGate::new(config, 1000.0, day());
        let rejection = gate.admit(&candidate(10.0, TradeMode::Real)).unwrap_err();
        assert_eq!(rejection.reason, RejectionReason::ConfirmationRequired);

        gate.confirm_real_mode();
        let request = gate.admit(&candidate(10.0, TradeMode::Real)).unwrap();
        assert_eq!(request.mode, TradeMode::Real);
    }

    #[test]
    fn real_mode_is_refused_when_gate_is_demo_only() {
        let mut gate = gate(1000.0);
        gate.confirm_real_mode();
        let rejection = gate.admit(&candidate(10.0, TradeMode::Real)).unwrap_err();
        assert_eq!(rejection.reason, RejectionReason::DemoOnly);
    }

    #[test]
    fn daily_loss_ceiling_rejects() {
        let mut gate = gate(1000.0);
        let request = gate.admit(&candidate(10.0, TradeMode::Demo)).unwrap();
        gate.record_outcome(&outcome(&request, -50.0));
        assert_eq!(gate.state().daily_loss, 50.0);

        let rejection = gate.admit(&candidate(10.0, TradeMode::Demo)).unwrap_err();
        assert_eq!(rejection.reason, RejectionReason::DailyLimit);
        assert!(!gate.state().paused);
    }

    #[test]
    fn resume_clears_pause_and_streak() {
        let config = RiskConfig {
            consecutive_loss_limit: 2,
            ..RiskConfig::default()
        };
        let mut gate = RiskGate::new(config, 1000.0, day());
        lose(&mut gate);
        lose(&mut gate);
        assert!(gate.state().paused);
        assert_eq!(
            gate.state().pause_reason,
            Some(PauseReason::ConsecutiveLosses(2))
        );

        assert!(gate.resume());
        assert!(!gate.resume());
        assert_eq!(gate.state().consecutive_losses, 0);
        assert!(gate.admit(&candidate(10.0, TradeMode::Demo)).is_ok());
    }

    #[test]
    fn streak_at_limit_trips_breaker_on_admission() {
        let config = RiskConfig {
            consecutive_loss_limit: 1,
            ..RiskConfig::default()
        };
        let mut gate = RiskGate::new(config, 1000.0, day());
        let request = gate.admit(&candidate(10.0, TradeMode::Demo)).unwrap();
        gate.record_outcome(&outcome(&request, -10.0));
        assert!(gate.state().paused);
        let rejection = gate.admit(&candidate(10.0, TradeMode::Demo)).unwrap_err();
        assert_eq!(rejection.reason, RejectionReason::CircuitOpen);
    }

    #[test]
    fn win_resets_streak_and_adds_no_daily_loss() {
        let mut gate = gate(1000.0);
        lose(&mut gate);
        lose(&mut gate);
        let request = gate.admit(&candidate(10.0, TradeMode::Demo)).unwrap();
        gate.record_outcome(&outcome(&request, 8.0));

        let state = gate.state();
        assert_eq!(state.consecutive_losses, 0);
        assert_eq!(state.daily_loss, 20.0);
        assert_eq!(state.balance, 988.0);
        assert_eq!(state.trades_today, 3);
        assert!(!state.paused);
    }

    #[test]
    fn new_day_resets_counters_but_not_pause() {
        let mut gate = gate(1000.0);
        for _ in 0..3 {
            lose(&mut gate);
        }
        let balance = gate.state().balance;
        gate.start_day(NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(), balance);

        let state = gate.state();
        assert_eq!(state.daily_loss, 0.0);
        assert_eq!(state.trades_today, 0);
        assert_eq!(state.day_start_balance, 970.0);
        assert!(state.paused);
        assert!(gate.admit(&candidate(10.0, TradeMode::Demo)).is_err());
    }

    #[test]
    fn empty_balance_has_no_stake() {
        let mut gate = gate(0.0);
        let rejection = gate.admit(&candidate(10.0, TradeMode::Demo)).unwrap_err();
        assert_eq!(rejection.reason, RejectionReason::InsufficientBalance);
    }

    #[test]
    fn metrics_report_loss_percentage() {
        let mut gate = gate(1000.0);
        lose(&mut gate);
        let metrics = gate.metrics();
        assert_eq!(metrics.daily_loss, 10.0);
        assert!((metrics.daily_loss_percent - 1.0).abs() < 1e-12);
        assert_eq!(metrics.consecutive_losses, 1);
        assert!(metrics.last_loss_at.is_some());
    }
}
