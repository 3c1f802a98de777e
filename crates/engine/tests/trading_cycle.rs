use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use common::config::AppConfig;
use common::error::ProviderError;
use common::events::TradingEvent;
use common::models::{PricePoint, PriceSeries, TradeOutcome, TradeRequest};
use engine::{
    BroadcastNotifier, Collaborators, CycleOutcome, EngineCommand, FixedClock, TradingEngine,
};
use market_data::{ExecutionProvider, MarketDataProvider};
use risk::{PauseReason, RejectionReason};
use storage::{DataManager, TradeStore};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

fn series(closes: &[f64]) -> PriceSeries {
    PriceSeries::new(
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PricePoint {
                timestamp: start() + ChronoDuration::minutes(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect(),
    )
    .unwrap()
}

fn buy_series() -> PriceSeries {
    let mut closes: Vec<f64> = (0..15).map(|i| 200.0 - 10.0 * i as f64).collect();
    closes.extend((1..=20).map(|i| 60.0 + 0.5 * i as f64));
    series(&closes)
}

fn sell_series() -> PriceSeries {
    let mut closes: Vec<f64> = (0..15).map(|i| 60.0 + 10.0 * i as f64).collect();
    closes.extend((1..=20).map(|i| 200.0 - 0.5 * i as f64));
    series(&closes)
}

/// Serves whatever series the test has put on the shared board.
struct BoardMarket {
    name: String,
    board: Arc<Mutex<PriceSeries>>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl MarketDataProvider for BoardMarket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_candles(
        &self,
        _instrument: &str,
        _timeframe: &str,
        _count: usize,
    ) -> Result<PriceSeries, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.board.lock().unwrap().clone())
    }
}

/// Settles trades with a scripted sequence of profits and losses, taking
/// `hold` to do so.
struct ScriptedVenue {
    results: Mutex<VecDeque<f64>>,
    hold: Duration,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ExecutionProvider for ScriptedVenue {
    fn name(&self) -> &str {
        "execution"
    }

    async fn submit_trade(&self, request: &TradeRequest) -> Result<TradeOutcome, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        let profit_loss = self.results.lock().unwrap().pop_front().unwrap_or(8.0);
        Ok(TradeOutcome {
            request: request.clone(),
            entry_price: request.price,
            exit_price: request.price + profit_loss.signum() * request.direction.sign(),
            profit_loss,
            is_win: profit_loss > 0.0,
            timestamp: start(),
        })
    }

    async fn balance(&self) -> Result<f64, ProviderError> {
        Ok(1000.0)
    }
}

struct Harness {
    engine: TradingEngine,
    handle: engine::EngineHandle,
    board: Arc<Mutex<PriceSeries>>,
    market_calls: Arc<AtomicUsize>,
    venue_calls: Arc<AtomicUsize>,
    store: Arc<DataManager>,
    notifier: BroadcastNotifier,
}

async fn harness(results: &[f64]) -> Harness {
    harness_holding(results, Duration::ZERO).await
}

async fn harness_holding(results: &[f64], hold: Duration) -> Harness {
    let board = Arc::new(Mutex::new(buy_series()));
    let market_calls = Arc::new(AtomicUsize::new(0));
    let venue_calls = Arc::new(AtomicUsize::new(0));
    let store = DataManager::in_memory().await.unwrap();
    let notifier = BroadcastNotifier::new(256);

    let mut config = AppConfig::default();
    config.engine.instruments = vec!["BTCUSDT".to_string()];
    config.engine.stake = 10.0;
    config.engine.starting_balance = 1000.0;

    let collaborators = Collaborators {
        primary: Arc::new(BoardMarket {
            name: "primary".into(),
            board: board.clone(),
            calls: market_calls.clone(),
        }),
        secondary: Arc::new(BoardMarket {
            name: "secondary".into(),
            board: board.clone(),
            calls: market_calls.clone(),
        }),
        execution: Arc::new(ScriptedVenue {
            results: Mutex::new(results.iter().copied().collect()),
            hold,
            calls: venue_calls.clone(),
        }),
        store: store.clone(),
        notifier: Arc::new(notifier.clone()),
        clock: Arc::new(FixedClock::new(start())),
    };
    let (engine, handle) = TradingEngine::new(&config, collaborators);

    Harness {
        engine,
        handle,
        board,
        market_calls,
        venue_calls,
        store,
        notifier,
    }
}

#[tokio::test]
async fn loss_streak_pauses_trading_until_resumed_then_daily_limit_holds() {
    // Runs on the real clock: the engine's store writes time out under paused time (F10).
    let mut h = harness(&[8.0, -10.0, -10.0, 8.0, -10.0, -10.0, -10.0]).await;
    let mut events = h.notifier.subscribe();

    for cycle in 0..7 {
        let next = if cycle % 2 == 0 { buy_series() } else { sell_series() };
        *h.board.lock().unwrap() = next;
        let outcome = h.engine.run_cycle("BTCUSDT").await;
        assert!(
            matches!(outcome, CycleOutcome::Completed(_)),
            "cycle {} ended with {:?}",
            cycle + 1,
            outcome
        );
    }

    let state = h.handle.risk_state();
    assert_eq!(state.balance, 966.0);
    assert_eq!(state.daily_loss, 50.0);
    assert_eq!(state.consecutive_losses, 3);
    assert_eq!(state.trades_today, 7);
    assert!(state.paused);
    assert_eq!(state.pause_reason, Some(PauseReason::ConsecutiveLosses(3)));

    let calls_before = h.market_calls.load(Ordering::SeqCst);
    for _ in 0..3 {
        assert_eq!(h.engine.run_cycle("BTCUSDT").await, CycleOutcome::Paused);
    }
    assert_eq!(h.market_calls.load(Ordering::SeqCst), calls_before);
    assert_eq!(h.venue_calls.load(Ordering::SeqCst), 7);

    assert!(h.handle.send(EngineCommand::Resume).await);
    let outcome = h.engine.run_cycle("BTCUSDT").await;
    let CycleOutcome::Rejected(rejection) = outcome else {
        panic!("expected a rejection after resume, got {:?}", outcome);
    };
    assert_eq!(rejection.reason, RejectionReason::DailyLimit);
    assert_eq!(h.venue_calls.load(Ordering::SeqCst), 7);

    let daily = h
        .store
        .read_daily_metrics(start().date_naive())
        .await
        .unwrap();
    assert_eq!(daily.total_trades, 7);
    assert_eq!(daily.winning_trades, 2);
    assert_eq!(daily.losing_trades, 5);
    assert!((daily.profit_loss - (-34.0)).abs() < 1e-9);

    let mut saw_pause = false;
    let mut saw_resume = false;
    while let Ok(event) = events.try_recv() {
        match event {
            TradingEvent::TradingPaused { .. } => saw_pause = true,
            TradingEvent::TradingResumed => saw_resume = true,
            _ => {}
        }
    }
    assert!(saw_pause);
    assert!(saw_resume);
}

#[tokio::test]
async fn run_loop_trades_on_each_tick_and_stops_on_command() {
    let h = harness(&[]).await;
    // Pause only once the SQLite store is open; see F10.
    tokio::time::pause();
    let mut events = h.notifier.subscribe();
    let handle = h.handle.clone();

    let task = tokio::spawn(h.engine.run());
    tokio::time::sleep(Duration::from_secs(150)).await;
    assert!(handle.stop().await);
    let state = task.await.unwrap();

    assert!(state.trades_today >= 2);
    assert_eq!(state.trades_today as usize, h.venue_calls.load(Ordering::SeqCst));
    assert_eq!(handle.phase(), engine::CyclePhase::Stopped);

    let mut stopped = false;
    while let Ok(event) = events.try_recv() {
        stopped |= event == TradingEvent::EngineStopped;
    }
    assert!(stopped);
}

#[tokio::test]
async fn trade_settling_after_close_retries_is_not_cut_off() {
    // Held past expiry by a minute of close retries, still inside the budget.
    let hold = AppConfig::default().engine.expiration + Duration::from_secs(60);
    let mut h = harness_holding(&[8.0], hold).await;
    // Pause only once the SQLite store is open; see F10.
    tokio::time::pause();

    let started = tokio::time::Instant::now();
    let outcome = h.engine.run_cycle("BTCUSDT").await;
    assert!(
        matches!(outcome, CycleOutcome::Completed(_)),
        "slow settlement ended with {:?}",
        outcome
    );
    assert!(started.elapsed() >= hold);
    assert_eq!(h.venue_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.handle.risk_state().balance, 1008.0);
}
