use std::sync::Arc;

use anyhow::Context;
use common::config::AppConfig;
use common::logger;
use engine::{
    BroadcastNotifier, Collaborators, EngineCommand, EngineGuards, SystemClock, TradingEngine,
};
use futures_util::future::join_all;
use market_data::{
    BinanceClient, BinanceMarketData, ExecutionProvider, Guard, MarketDataProvider,
};
use storage::DataManager;
use tracing::{debug, error, info, warn};

use crate::services::binance_execution::BinanceExecution;
use crate::services::paper_execution::PaperExecution;
use crate::services::telegram_service::TelegramService;

mod services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    logger::setup_logger(&config.log_level);
    debug!("System starting up...");
    info!(
        "Trading {} on {} in {} mode",
        config.engine.instruments.join(","),
        config.engine.timeframe,
        config.engine.mode
    );

    let store = DataManager::new(&config.storage.database_path).await?;
    match store.cleanup_old_data(config.storage.retention_days).await {
        Ok(removed) if removed > 0 => info!("Pruned {} old trades", removed),
        Ok(_) => {}
        Err(e) => warn!("Retention cleanup failed: {}", e),
    }

    let timeout = config.resilience.call_timeout;
    let primary: Arc<dyn MarketDataProvider> = Arc::new(BinanceMarketData::new(
        BinanceClient::new("primary", &config.api.primary_base_url, timeout)?,
    ));
    let secondary: Arc<dyn MarketDataProvider> = Arc::new(BinanceMarketData::new(
        BinanceClient::new("secondary", &config.api.secondary_base_url, timeout)?,
    ));
    let real = config.engine.mode.is_real();
    let guards = EngineGuards::from_config(
        &config,
        primary.name(),
        secondary.name(),
        if real { "execution" } else { "paper" },
    );
    warm_up(&config, primary.as_ref(), &guards.primary).await;

    let execution: Arc<dyn ExecutionProvider> = if real {
        let (Some(api_key), Some(secret_key)) =
            (config.api.api_key.clone(), config.api.secret_key.clone())
        else {
            anyhow::bail!("real mode needs BINANCE_API_KEY and BINANCE_SECRET_KEY");
        };
        let client = BinanceClient::new("execution", &config.api.primary_base_url, timeout)?
            .with_credentials(api_key, secret_key);
        Arc::new(BinanceExecution::new(
            client,
            &config.api.quote_asset,
            &config.resilience,
        ))
    } else {
        Arc::new(PaperExecution::new(
            primary.clone(),
            guards.primary.clone(),
            &config.engine.timeframe,
            config.api.paper_payout,
            config.engine.starting_balance,
            &config.resilience,
        ))
    };

    let notifier = BroadcastNotifier::new(1_000);
    let telegram = match (&config.api.telegram_bot_token, config.api.telegram_chat_id) {
        (Some(token), Some(chat_id)) => {
            let guard = Arc::new(Guard::new(
                "telegram",
                config.resilience.breaker,
                config.resilience.notify_rate,
                timeout,
            ));
            let service = TelegramService::new(token.clone(), chat_id, guard);
            Some(tokio::spawn(service.start(notifier.subscribe())))
        }
        _ => {
            info!("Telegram not configured, notifications go to the log only");
            None
        }
    };

    let collaborators = Collaborators {
        primary,
        secondary,
        execution,
        store: store.clone(),
        notifier: Arc::new(notifier.clone()),
        clock: Arc::new(SystemClock),
    };
    let (engine, handle) = TradingEngine::with_guards(&config, collaborators, guards);

    if real {
        if !config.risk.allow_real {
            warn!("ALLOW_REAL_TRADING is not set; every trade will be rejected as demo only");
        }
        if config.engine.confirm_real_mode {
            handle.send(EngineCommand::ConfirmRealMode).await;
            warn!("Real-money trading confirmed by configuration");
        } else {
            warn!("Real mode is not confirmed; every trade will be rejected");
        }
    }

    let mut monitor = handle.clone();
    tokio::spawn(async move {
        while let Some(state) = monitor.state_changed().await {
            let metrics = monitor.risk_metrics();
            info!(
                "Balance {:.2}, {} trades today, daily loss {:.2} ({:.1}%), streak {}{}",
                state.balance,
                metrics.trades_today,
                metrics.daily_loss,
                metrics.daily_loss_percent,
                metrics.consecutive_losses,
                if metrics.is_paused { ", PAUSED" } else { "" }
            );
        }
    });

    let mut engine_task = tokio::spawn(engine.run());
    let final_state = tokio::select! {
        result = &mut engine_task => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            handle.stop().await;
            engine_task.await?
        }
    };

    for breaker in handle.breakers().await {
        debug!(
            "Breaker {}: {} ({} failures)",
            breaker.dependency, breaker.state, breaker.failure_count
        );
    }

    match store.performance_metrics(30).await {
        Ok(perf) => info!(
            "Last 30 days: {} trades, win rate {:.1}%, P/L {:+.2}",
            perf.total_trades, perf.win_rate, perf.total_profit_loss
        ),
        Err(e) => error!("Could not read performance metrics: {}", e),
    }
    info!("Final balance {:.2}", final_state.balance);

    if let Some(task) = telegram {
        // The worker exits after relaying EngineStopped.
        let _ = task.await;
    }
    Ok(())
}

/// One fetch per instrument so misconfigured symbols show up at startup
/// instead of on the first tick. Goes through the engine's primary guard.
async fn warm_up(config: &AppConfig, primary: &dyn MarketDataProvider, guard: &Guard) {
    let fetches = config.engine.instruments.iter().map(|instrument| async move {
        let result = guard
            .call(primary.fetch_candles(instrument, &config.engine.timeframe, 1))
            .await;
        (instrument, result)
    });

    for (instrument, result) in join_all(fetches).await {
        match result {
            Ok(_) => debug!("{} reachable on {}", instrument, primary.name()),
            Err(e) => warn!("Warm-up fetch for {} failed: {}", instrument, e),
        }
    }
}
