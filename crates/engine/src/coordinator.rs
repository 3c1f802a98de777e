//! The trading cycle.
//!
//! One engine task owns the risk gate and walks each instrument through
//! FETCHING → SIGNALING → VALIDATING → RISK_CHECK → EXECUTING → RECORDING.
//! Operator commands are applied only between phases, and never between
//! EXECUTING and RECORDING, so a placed trade is always recorded.

use std::sync::Arc;
use std::time::Instant;

use common::config::{AppConfig, EngineConfig};
use common::error::{IndicatorError, ProviderError};
use common::events::TradingEvent;
use common::models::{PriceSeries, TradeCandidate, TradeOutcome};
use market_data::{
    CallError, ExecutionProvider, Guard, MarketDataProvider, RetryOn, RetryPolicy,
    retry_with_backoff,
};
use risk::{PauseReason, Rejection, RiskGate, RiskState};
use storage::TradeStore;
use strategy::{StrategyService, strength_label};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::commands::{EngineCommand, EngineHandle};
use crate::guards::EngineGuards;
use crate::notifier::NotificationSink;
use crate::phase::CyclePhase;

/// External collaborators the engine drives.
pub struct Collaborators {
    pub primary: Arc<dyn MarketDataProvider>,
    pub secondary: Arc<dyn MarketDataProvider>,
    pub execution: Arc<dyn ExecutionProvider>,
    pub store: Arc<dyn TradeStore>,
    pub notifier: Arc<dyn NotificationSink>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    CircuitOpen(String),
    Provider(ProviderError),
    InsufficientData(IndicatorError),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CircuitOpen(dependency) => write!(f, "circuit breaker for {} is open", dependency),
            Self::Provider(err) => write!(f, "{}", err),
            Self::InsufficientData(err) => write!(f, "{}", err),
        }
    }
}

impl From<CallError> for SkipReason {
    fn from(err: CallError) -> Self {
        match err {
            CallError::CircuitOpen(open) => Self::CircuitOpen(open.dependency),
            CallError::Provider(err) => Self::Provider(err),
        }
    }
}

/// How a single cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    NoSignal,
    /// The secondary source disagreed, or could not be consulted in real mode.
    Unconfirmed,
    Rejected(Rejection),
    Completed(TradeOutcome),
    Skipped(SkipReason),
    /// Submission failed and the trade's fate is unknown or it was refused.
    ExecutionFailed(CallError),
    Paused,
    Stopped,
}

pub struct TradingEngine {
    config: EngineConfig,
    strategy: StrategyService,
    candles_needed: usize,
    secondary_candles: usize,
    risk: RiskGate,
    collaborators: Collaborators,
    primary_guard: Arc<Guard>,
    secondary_guard: Arc<Guard>,
    execution_guard: Arc<Guard>,
    fetch_policy: RetryPolicy,
    submit_policy: RetryPolicy,
    commands: mpsc::Receiver<EngineCommand>,
    state_tx: watch::Sender<RiskState>,
    phase_tx: watch::Sender<CyclePhase>,
    stopped: bool,
}

impl TradingEngine {
    pub fn new(config: &AppConfig, collaborators: Collaborators) -> (Self, EngineHandle) {
        let guards = EngineGuards::from_config(
            config,
            collaborators.primary.name(),
            collaborators.secondary.name(),
            collaborators.execution.name(),
        );
        Self::with_guards(config, collaborators, guards)
    }

    /// Builds the engine around guards that are shared with other callers
    /// of the same dependencies.
    pub fn with_guards(
        config: &AppConfig,
        collaborators: Collaborators,
        guards: EngineGuards,
    ) -> (Self, EngineHandle) {
        let resilience = &config.resilience;
        let today = collaborators.clock.today();
        let risk = RiskGate::new(config.risk.clone(), config.engine.starting_balance, today);

        let (command_tx, commands) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(risk.state().clone());
        let (phase_tx, phase_rx) = watch::channel(CyclePhase::Idle);

        let handle = EngineHandle::new(
            command_tx,
            state_rx,
            phase_rx,
            guards.all(),
        );

        let engine = Self {
            config: config.engine.clone(),
            strategy: StrategyService::new(&config.strategy),
            candles_needed: config.strategy.candles_needed(),
            secondary_candles: config.strategy.validation_lookback + 1,
            risk,
            collaborators,
            primary_guard: guards.primary,
            secondary_guard: guards.secondary,
            execution_guard: guards.execution,
            fetch_policy: RetryPolicy::new(&resilience.retry, RetryOn::Transient),
            submit_policy: RetryPolicy::new(&resilience.retry, RetryOn::NeverSent),
            commands,
            state_tx,
            phase_tx,
            stopped: false,
        };
        (engine, handle)
    }

    pub fn risk_state(&self) -> &RiskState {
        self.risk.state()
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase_tx.borrow()
    }

    /// Runs cycles on every tick until a `Stop` command arrives or every
    /// handle is dropped.
    pub async fn run(mut self) -> RiskState {
        info!(
            "Trading engine starting: {} instrument(s), {} mode, tick {:?}",
            self.config.instruments.len(),
            self.config.mode,
            self.config.poll_interval
        );
        if self.config.mode.is_real() {
            self.sync_balance().await;
        }

        let mut ticker = time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !self.stopped {
            tokio::select! {
                _ = ticker.tick() => {
                    let instruments = self.config.instruments.clone();
                    for instrument in &instruments {
                        if self.run_cycle(instrument).await == CycleOutcome::Stopped {
                            break;
                        }
                    }
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.apply_command(command).await,
                    None => {
                        info!("All engine handles dropped, stopping");
                        self.stopped = true;
                    }
                },
            }
        }

        self.set_phase(CyclePhase::Stopped);
        self.notify(TradingEvent::EngineStopped);
        info!("Trading engine stopped");
        self.risk.state().clone()
    }

    /// One full cycle for `instrument`.
    pub async fn run_cycle(&mut self, instrument: &str) -> CycleOutcome {
        let outcome = self.cycle(instrument).await;
        match &outcome {
            CycleOutcome::Stopped => self.set_phase(CyclePhase::Stopped),
            CycleOutcome::Paused => self.set_phase(CyclePhase::Paused),
            _ if self.risk.state().paused => self.set_phase(CyclePhase::Paused),
            _ => self.set_phase(CyclePhase::Idle),
        }
        outcome
    }

    async fn cycle(&mut self, instrument: &str) -> CycleOutcome {
        if !self.at_boundary().await {
            return CycleOutcome::Stopped;
        }
        self.roll_day_if_needed().await;

        if self.risk.state().paused {
            debug!("Trading paused, skipping cycle for {}", instrument);
            return CycleOutcome::Paused;
        }

        self.set_phase(CyclePhase::Fetching);
        let (primary, secondary) =
            tokio::join!(self.fetch_primary(instrument), self.fetch_secondary(instrument));
        let primary = match primary {
            Ok(series) => series,
            Err(err) => return self.skip(instrument, err.into()),
        };
        let secondary = match secondary {
            Ok(series) => Some(series),
            Err(err) => {
                warn!("Secondary source unavailable for {}: {}", instrument, err);
                None
            }
        };

        if !self.at_boundary().await {
            return CycleOutcome::Stopped;
        }

        self.set_phase(CyclePhase::Signaling);
        let compute_started = Instant::now();
        let signal = match self.strategy.evaluate(instrument, &primary) {
            Ok(Some(signal)) => signal,
            Ok(None) => {
                debug!("No signal for {}", instrument);
                return CycleOutcome::NoSignal;
            }
            Err(err) => return self.skip(instrument, SkipReason::InsufficientData(err)),
        };
        info!(
            "Signal: {} {} @ {:.5}, confidence {:.3} ({})",
            signal.direction,
            instrument,
            signal.price,
            signal.confidence,
            strength_label(signal.confidence)
        );
        self.notify(TradingEvent::SignalGenerated(signal.clone()));

        self.set_phase(CyclePhase::Validating);
        let validated = self
            .strategy
            .validate(signal, secondary.as_ref(), self.config.mode);
        if !validated.confirmed {
            self.check_compute_budget(instrument, compute_started);
            return CycleOutcome::Unconfirmed;
        }

        self.set_phase(CyclePhase::RiskCheck);
        let candidate = TradeCandidate {
            signal: validated,
            requested_stake: self.config.stake,
            expiration: self.config.expiration,
            mode: self.config.mode,
        };
        let was_paused = self.risk.state().paused;
        let admitted = self.risk.admit(&candidate);
        self.check_compute_budget(instrument, compute_started);

        let request = match admitted {
            Ok(request) => request,
            Err(rejection) => {
                self.publish_state();
                self.notify(TradingEvent::TradeRejected {
                    instrument: instrument.to_string(),
                    reason: rejection.to_string(),
                });
                if !was_paused {
                    self.announce_pause();
                }
                return CycleOutcome::Rejected(rejection);
            }
        };
        self.notify(TradingEvent::TradeAdmitted(request.clone()));

        if !self.at_boundary().await {
            info!("Stop requested before execution, trade {} dropped", request.id);
            return CycleOutcome::Stopped;
        }

        self.set_phase(CyclePhase::Executing);
        let execution = &self.collaborators.execution;
        let guard = &self.execution_guard;
        let request_ref = &request;
        let submitted = retry_with_backoff(
            &self.submit_policy,
            move || async move { guard.call(execution.submit_trade(request_ref)).await },
            |_, _, _| {},
        )
        .await;

        let outcome = match submitted {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    "Execution of trade {} on {} failed: {}",
                    request.id, instrument, err
                );
                self.notify(TradingEvent::CycleSkipped {
                    instrument: instrument.to_string(),
                    reason: format!("execution failed: {}", err),
                });
                return CycleOutcome::ExecutionFailed(err);
            }
        };

        self.set_phase(CyclePhase::Recording);
        self.record(outcome.clone()).await;
        CycleOutcome::Completed(outcome)
    }

    async fn record(&mut self, outcome: TradeOutcome) {
        let was_paused = self.risk.state().paused;
        self.risk.record_outcome(&outcome);
        self.publish_state();
        self.notify(TradingEvent::TradeCompleted(outcome.clone()));

        let store = &self.collaborators.store;
        if let Err(e) = store.append_trade(&outcome).await {
            error!("Failed to log trade {}: {}", outcome.request.id, e);
        }
        match store.read_daily_metrics(outcome.timestamp.date_naive()).await {
            Ok(daily) => info!(
                "Today: {} trades, {} wins, win rate {:.1}%, P/L {:+.2}",
                daily.total_trades, daily.winning_trades, daily.win_rate, daily.profit_loss
            ),
            Err(e) => error!("Failed to read daily metrics: {}", e),
        }

        if !was_paused {
            self.announce_pause();
        }
    }

    async fn fetch_primary(&self, instrument: &str) -> Result<PriceSeries, CallError> {
        self.fetch(
            &self.collaborators.primary,
            &self.primary_guard,
            instrument,
            self.candles_needed,
        )
        .await
    }

    async fn fetch_secondary(&self, instrument: &str) -> Result<PriceSeries, CallError> {
        self.fetch(
            &self.collaborators.secondary,
            &self.secondary_guard,
            instrument,
            self.secondary_candles,
        )
        .await
    }

    async fn fetch(
        &self,
        provider: &Arc<dyn MarketDataProvider>,
        guard: &Guard,
        instrument: &str,
        count: usize,
    ) -> Result<PriceSeries, CallError> {
        let timeframe = self.config.timeframe.as_str();
        retry_with_backoff(
            &self.fetch_policy,
            move || async move {
                guard
                    .call(provider.fetch_candles(instrument, timeframe, count))
                    .await
            },
            |_, _, _| self.set_phase(CyclePhase::Retry),
        )
        .await
    }

    /// Applies queued commands. Returns false when the engine must stop.
    async fn at_boundary(&mut self) -> bool {
        while let Ok(command) = self.commands.try_recv() {
            self.apply_command(command).await;
        }
        !self.stopped
    }

    async fn apply_command(&mut self, command: EngineCommand) {
        info!("Applying command {:?}", command);
        match command {
            EngineCommand::Stop => self.stopped = true,
            EngineCommand::Resume => {
                if self.risk.resume() {
                    self.set_phase(CyclePhase::Idle);
                    self.notify(TradingEvent::TradingResumed);
                }
            }
            EngineCommand::Pause => {
                if !self.risk.state().paused {
                    self.risk.pause(PauseReason::Manual);
                    self.set_phase(CyclePhase::Paused);
                    self.announce_pause();
                }
            }
            EngineCommand::ConfirmRealMode => self.risk.confirm_real_mode(),
            EngineCommand::ResetDay => {
                let today = self.collaborators.clock.today();
                self.start_day(today).await;
            }
        }
        self.publish_state();
    }

    async fn roll_day_if_needed(&mut self) {
        let today = self.collaborators.clock.today();
        if today != self.risk.state().trading_day {
            self.start_day(today).await;
            self.publish_state();
        }
    }

    async fn start_day(&mut self, today: chrono::NaiveDate) {
        if self.config.mode.is_real() {
            self.sync_balance().await;
        }
        let balance = self.risk.state().balance;
        self.risk.start_day(today, balance);
    }

    async fn sync_balance(&mut self) {
        let execution = &self.collaborators.execution;
        let guard = &self.execution_guard;
        let fetched = retry_with_backoff(
            &self.fetch_policy,
            move || async move { guard.call(execution.balance()).await },
            |_, _, _| {},
        )
        .await;

        match fetched {
            Ok(balance) => {
                info!("Venue balance: {:.2}", balance);
                self.risk.sync_balance(balance);
                self.publish_state();
            }
            Err(e) => warn!("Could not refresh balance, keeping {:.2}: {}", self.risk.state().balance, e),
        }
    }

    fn skip(&self, instrument: &str, reason: SkipReason) -> CycleOutcome {
        warn!("Cycle for {} skipped: {}", instrument, reason);
        self.notify(TradingEvent::CycleSkipped {
            instrument: instrument.to_string(),
            reason: reason.to_string(),
        });
        CycleOutcome::Skipped(reason)
    }

    fn check_compute_budget(&self, instrument: &str, started: Instant) {
        let elapsed = started.elapsed();
        if elapsed > self.config.compute_budget {
            warn!(
                "Computation for {} took {:?}, over the {:?} budget",
                instrument, elapsed, self.config.compute_budget
            );
        } else {
            debug!("Computation for {} took {:?}", instrument, elapsed);
        }
    }

    fn announce_pause(&self) {
        let state = self.risk.state();
        if state.paused {
            let reason = state
                .pause_reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "paused".to_string());
            self.notify(TradingEvent::TradingPaused { reason });
        }
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.risk.state().clone());
    }

    fn set_phase(&self, phase: CyclePhase) {
        self.phase_tx.send_if_modified(|current| {
            if *current == phase {
                false
            } else {
                debug!("Phase {} -> {}", current, phase);
                *current = phase;
                true
            }
        });
    }

    fn notify(&self, event: TradingEvent) {
        self.collaborators.notifier.notify(event);
    }
}
