use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::TradeMode;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub instruments: Vec<String>,
    pub timeframe: String,
    pub poll_interval: Duration,
    pub compute_budget: Duration,
    pub mode: TradeMode,
    pub stake: f64,
    pub expiration: Duration,
    pub starting_balance: f64,
    /// Operator pre-confirmation of real-money trading, applied at startup.
    pub confirm_real_mode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instruments: vec!["BTCUSDT".to_string()],
            timeframe: "1m".to_string(),
            poll_interval: Duration::from_secs(60),
            compute_budget: Duration::from_millis(50),
            mode: TradeMode::Demo,
            stake: 10.0,
            expiration: Duration::from_secs(60),
            starting_balance: 1000.0,
            confirm_real_mode: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub rsi_period: usize,
    pub sma_period: usize,
    pub oversold: f64,
    pub overbought: f64,
    pub rsi_weight: f64,
    pub sma_weight: f64,
    pub validation_weight: f64,
    /// Price/SMA divergence (fraction) that earns the full SMA score.
    pub sma_full_divergence: f64,
    pub validation_lookback: usize,
    /// Secondary-source move (fraction) that earns full confirmation.
    pub trend_full_scale: f64,
    pub max_price_divergence: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            sma_period: 20,
            oversold: 30.0,
            overbought: 70.0,
            rsi_weight: 0.4,
            sma_weight: 0.3,
            validation_weight: 0.3,
            sma_full_divergence: 0.01,
            validation_lookback: 5,
            trend_full_scale: 0.005,
            max_price_divergence: 0.01,
        }
    }
}

impl StrategyConfig {
    /// Candles to request per cycle: enough for both indicators plus slack.
    pub fn candles_needed(&self) -> usize {
        (self.rsi_period + 1).max(self.sma_period) + 10
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    pub max_trade_percent: f64,
    pub max_daily_loss_percent: f64,
    pub consecutive_loss_limit: u32,
    pub allow_real: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_trade_percent: 2.0,
            max_daily_loss_percent: 5.0,
            consecutive_loss_limit: 3,
            allow_real: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub max_requests: usize,
    pub window: Duration,
}

impl RateLimit {
    pub const fn per_minute(max_requests: usize) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResilienceConfig {
    pub breaker: BreakerConfig,
    pub retry: RetryConfig,
    pub call_timeout: Duration,
    pub market_rate: RateLimit,
    pub secondary_rate: RateLimit,
    pub execution_rate: RateLimit,
    pub notify_rate: RateLimit,
}

impl ResilienceConfig {
    /// Upper bound on settling a trade once it expires: every attempt timing
    /// out plus the capped backoff between attempts.
    pub fn settlement_budget(&self) -> Duration {
        let attempts = self.retry.max_attempts.max(1);
        self.call_timeout * attempts + self.retry.max_delay * (attempts - 1)
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            breaker: BreakerConfig::default(),
            retry: RetryConfig::default(),
            call_timeout: Duration::from_secs(10),
            market_rate: RateLimit::per_minute(60),
            secondary_rate: RateLimit::per_minute(5),
            execution_rate: RateLimit::per_minute(60),
            notify_rate: RateLimit::per_minute(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub primary_base_url: String,
    pub secondary_base_url: String,
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
    pub quote_asset: String,
    pub paper_payout: f64,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<i64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            primary_base_url: "https://api.binance.com".to_string(),
            secondary_base_url: "https://api.binance.us".to_string(),
            api_key: None,
            secret_key: None,
            quote_asset: "USDT".to_string(),
            paper_payout: 0.8,
            telegram_bot_token: None,
            telegram_chat_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    pub database_path: String,
    pub retention_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "data/trading_bot.db".to_string(),
            retention_days: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub resilience: ResilienceConfig,
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub log_level: String,
}

impl AppConfig {
    /// Reads `.env` (if any) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = AppConfig::default();
        let instruments = match lookup("INSTRUMENTS") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            None => d.engine.instruments.clone(),
        };

        let mode: TradeMode = get(&lookup, "TRADING_MODE", d.engine.mode)?;

        let engine = EngineConfig {
            instruments,
            timeframe: lookup("TIMEFRAME").unwrap_or(d.engine.timeframe),
            poll_interval: secs(&lookup, "POLL_INTERVAL_SECS", d.engine.poll_interval)?,
            compute_budget: millis(&lookup, "COMPUTE_BUDGET_MS", d.engine.compute_budget)?,
            mode,
            stake: get(&lookup, "DEFAULT_TRADE_AMOUNT", d.engine.stake)?,
            expiration: secs(&lookup, "EXPIRATION_SECS", d.engine.expiration)?,
            starting_balance: get(&lookup, "STARTING_BALANCE", d.engine.starting_balance)?,
            confirm_real_mode: get(&lookup, "CONFIRM_REAL_MODE", d.engine.confirm_real_mode)?,
        };

        let strategy = StrategyConfig {
            rsi_period: get(&lookup, "RSI_PERIOD", d.strategy.rsi_period)?,
            sma_period: get(&lookup, "SMA_PERIOD", d.strategy.sma_period)?,
            oversold: get(&lookup, "RSI_OVERSOLD", d.strategy.oversold)?,
            overbought: get(&lookup, "RSI_OVERBOUGHT", d.strategy.overbought)?,
            rsi_weight: get(&lookup, "CONFIDENCE_RSI_WEIGHT", d.strategy.rsi_weight)?,
            sma_weight: get(&lookup, "CONFIDENCE_SMA_WEIGHT", d.strategy.sma_weight)?,
            validation_weight: get(
                &lookup,
                "CONFIDENCE_VALIDATION_WEIGHT",
                d.strategy.validation_weight,
            )?,
            validation_lookback: get(&lookup, "VALIDATION_LOOKBACK", d.strategy.validation_lookback)?,
            max_price_divergence: get(
                &lookup,
                "VALIDATION_MAX_PRICE_DIVERGENCE",
                d.strategy.max_price_divergence,
            )?,
            ..d.strategy
        };

        let risk = RiskConfig {
            max_trade_percent: get(&lookup, "MAX_TRADE_PERCENT", d.risk.max_trade_percent)?,
            max_daily_loss_percent: get(
                &lookup,
                "MAX_DAILY_LOSS_PERCENT",
                d.risk.max_daily_loss_percent,
            )?,
            consecutive_loss_limit: get(
                &lookup,
                "CONSECUTIVE_LOSS_LIMIT",
                d.risk.consecutive_loss_limit,
            )?,
            allow_real: get(&lookup, "ALLOW_REAL_TRADING", d.risk.allow_real)?,
        };

        let resilience = ResilienceConfig {
            breaker: BreakerConfig {
                failure_threshold: get(
                    &lookup,
                    "BREAKER_FAILURE_THRESHOLD",
                    d.resilience.breaker.failure_threshold,
                )?,
                cooldown: secs(&lookup, "BREAKER_COOLDOWN_SECS", d.resilience.breaker.cooldown)?,
            },
            retry: RetryConfig {
                max_attempts: get(&lookup, "RETRY_MAX_ATTEMPTS", d.resilience.retry.max_attempts)?,
                base_delay: millis(&lookup, "RETRY_BASE_DELAY_MS", d.resilience.retry.base_delay)?,
                max_delay: millis(&lookup, "RETRY_MAX_DELAY_MS", d.resilience.retry.max_delay)?,
            },
            call_timeout: secs(&lookup, "CALL_TIMEOUT_SECS", d.resilience.call_timeout)?,
            ..d.resilience
        };

        let api = ApiConfig {
            primary_base_url: lookup("PRIMARY_BASE_URL").unwrap_or(d.api.primary_base_url),
            secondary_base_url: lookup("SECONDARY_BASE_URL").unwrap_or(d.api.secondary_base_url),
            api_key: lookup("BINANCE_API_KEY").filter(|s| !s.is_empty()),
            secret_key: lookup("BINANCE_SECRET_KEY").filter(|s| !s.is_empty()),
            quote_asset: lookup("QUOTE_ASSET").unwrap_or(d.api.quote_asset),
            paper_payout: get(&lookup, "PAPER_PAYOUT", d.api.paper_payout)?,
            telegram_bot_token: lookup("TELEGRAM_BOT_TOKEN").filter(|s| !s.is_empty()),
            telegram_chat_id: match lookup("TELEGRAM_CHAT_ID").filter(|s| !s.is_empty()) {
                Some(raw) => Some(parse_value("TELEGRAM_CHAT_ID", &raw)?),
                None => None,
            },
        };

        let storage = StorageConfig {
            database_path: lookup("DATABASE_PATH").unwrap_or(d.storage.database_path),
            retention_days: get(&lookup, "RETENTION_DAYS", d.storage.retention_days)?,
        };

        let config = Self {
            engine,
            strategy,
            risk,
            resilience,
            api,
            storage,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.strategy;
        ensure(s.rsi_period > 0, "RSI_PERIOD", s.rsi_period, "must be positive")?;
        ensure(s.sma_period > 0, "SMA_PERIOD", s.sma_period, "must be positive")?;
        ensure(
            (0.0..=100.0).contains(&s.oversold),
            "RSI_OVERSOLD",
            s.oversold,
            "must be within 0..=100",
        )?;
        ensure(
            (0.0..=100.0).contains(&s.overbought),
            "RSI_OVERBOUGHT",
            s.overbought,
            "must be within 0..=100",
        )?;
        ensure(
            s.oversold < s.overbought,
            "RSI_OVERSOLD",
            s.oversold,
            "must be below RSI_OVERBOUGHT",
        )?;
        ensure(
            s.max_price_divergence >= 0.0,
            "VALIDATION_MAX_PRICE_DIVERGENCE",
            s.max_price_divergence,
            "cannot be negative",
        )?;
        ensure(
            s.trend_full_scale > 0.0,
            "trend_full_scale",
            s.trend_full_scale,
            "must be positive",
        )?;
        ensure(
            s.sma_full_divergence > 0.0,
            "sma_full_divergence",
            s.sma_full_divergence,
            "must be positive",
        )?;
        ensure(
            s.validation_lookback > 0,
            "VALIDATION_LOOKBACK",
            s.validation_lookback,
            "must be positive",
        )?;

        let r = &self.risk;
        ensure(
            r.max_trade_percent > 0.0 && r.max_trade_percent <= 100.0,
            "MAX_TRADE_PERCENT",
            r.max_trade_percent,
            "must be within (0, 100]",
        )?;
        ensure(
            r.max_daily_loss_percent > 0.0 && r.max_daily_loss_percent <= 100.0,
            "MAX_DAILY_LOSS_PERCENT",
            r.max_daily_loss_percent,
            "must be within (0, 100]",
        )?;
        ensure(
            r.consecutive_loss_limit > 0,
            "CONSECUTIVE_LOSS_LIMIT",
            r.consecutive_loss_limit,
            "must be positive",
        )?;

        let e = &self.engine;
        ensure(
            !e.instruments.is_empty(),
            "INSTRUMENTS",
            e.instruments.join(","),
            "at least one instrument is required",
        )?;
        ensure(e.stake > 0.0, "DEFAULT_TRADE_AMOUNT", e.stake, "must be positive")?;
        ensure(
            e.starting_balance >= 0.0,
            "STARTING_BALANCE",
            e.starting_balance,
            "cannot be negative",
        )?;
        ensure(
            !e.expiration.is_zero(),
            "EXPIRATION_SECS",
            e.expiration.as_secs(),
            "must be positive",
        )?;
        ensure(
            !e.poll_interval.is_zero(),
            "POLL_INTERVAL_SECS",
            e.poll_interval.as_secs(),
            "must be positive",
        )?;

        let b = &self.resilience;
        ensure(
            b.breaker.failure_threshold > 0,
            "BREAKER_FAILURE_THRESHOLD",
            b.breaker.failure_threshold,
            "must be positive",
        )?;
        ensure(
            b.retry.max_attempts > 0,
            "RETRY_MAX_ATTEMPTS",
            b.retry.max_attempts,
            "must be positive",
        )?;
        ensure(
            b.retry.base_delay <= b.retry.max_delay,
            "RETRY_BASE_DELAY_MS",
            b.retry.base_delay.as_millis(),
            "cannot exceed RETRY_MAX_DELAY_MS",
        )?;
        ensure(
            !b.call_timeout.is_zero(),
            "CALL_TIMEOUT_SECS",
            b.call_timeout.as_secs(),
            "must be positive",
        )?;

        if e.mode.is_real() {
            if self.api.api_key.is_none() {
                return Err(ConfigError::Missing("BINANCE_API_KEY".to_string()));
            }
            if self.api.secret_key.is_none() {
                return Err(ConfigError::Missing("BINANCE_SECRET_KEY".to_string()));
            }
        }
        Ok(())
    }
}

fn ensure(ok: bool, key: &str, value: impl Display, reason: &str) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        })
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        key: key.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn get<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn secs<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    get(lookup, key, default.as_secs()).map(Duration::from_secs)
}

fn millis<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    get(lookup, key, default.as_millis() as u64).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_the_documented_risk_posture() {
        let config = load(&[]).unwrap();
        assert_eq!(config.strategy.rsi_period, 14);
        assert_eq!(config.strategy.sma_period, 20);
        assert_eq!(config.risk.max_trade_percent, 2.0);
        assert_eq!(config.risk.max_daily_loss_percent, 5.0);
        assert_eq!(config.risk.consecutive_loss_limit, 3);
        assert_eq!(config.engine.mode, TradeMode::Demo);
        assert_eq!(config.engine.poll_interval, Duration::from_secs(60));
        assert_eq!(config.resilience.breaker.failure_threshold, 5);
        assert!(!config.risk.allow_real);
    }

    #[test]
    fn parses_instrument_list() {
        let config = load(&[("INSTRUMENTS", "btcusdt, ethusdt,,")]).unwrap();
        assert_eq!(config.engine.instruments, vec!["BTCUSDT", "ETHUSDT"]);
    }

    #[test]
    fn zero_period_is_a_configuration_error() {
        let err = load(&[("RSI_PERIOD", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "RSI_PERIOD"));
    }

    #[test]
    fn unparsable_number_is_a_configuration_error() {
        let err = load(&[("SMA_PERIOD", "twenty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "SMA_PERIOD"));
    }

    #[test]
    fn thresholds_must_be_ordered() {
        let err = load(&[("RSI_OVERSOLD", "80"), ("RSI_OVERBOUGHT", "70")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn real_mode_requires_credentials() {
        let err = load(&[("TRADING_MODE", "real")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("BINANCE_API_KEY".to_string()));

        let config = load(&[
            ("TRADING_MODE", "real"),
            ("BINANCE_API_KEY", "key"),
            ("BINANCE_SECRET_KEY", "secret"),
        ])
        .unwrap();
        assert!(!config.engine.confirm_real_mode);
    }

    #[test]
    fn real_trading_must_be_allowed_separately() {
        let real = [
            ("TRADING_MODE", "real"),
            ("BINANCE_API_KEY", "key"),
            ("BINANCE_SECRET_KEY", "secret"),
        ];
        assert!(!load(&real).unwrap().risk.allow_real);

        let mut allowed = real.to_vec();
        allowed.push(("ALLOW_REAL_TRADING", "true"));
        assert!(load(&allowed).unwrap().risk.allow_real);
    }

    #[test]
    fn trading_mode_accepts_only_demo_or_real() {
        assert_eq!(load(&[("TRADING_MODE", "DEMO")]).unwrap().engine.mode, TradeMode::Demo);
        for typo in ["false", "true", "live"] {
            let err = load(&[("TRADING_MODE", typo)]).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "TRADING_MODE"));
        }
    }

    #[test]
    fn zero_poll_interval_is_a_configuration_error() {
        let err = load(&[("POLL_INTERVAL_SECS", "0")]).unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { ref key, .. } if key == "POLL_INTERVAL_SECS")
        );
    }

    #[test]
    fn negative_price_divergence_is_rejected() {
        let err = load(&[("VALIDATION_MAX_PRICE_DIVERGENCE", "-0.01")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn retry_base_delay_cannot_exceed_the_cap() {
        let err = load(&[("RETRY_BASE_DELAY_MS", "5000"), ("RETRY_MAX_DELAY_MS", "1000")])
            .unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { ref key, .. } if key == "RETRY_BASE_DELAY_MS")
        );
    }

    #[test]
    fn unusable_scales_fail_validation() {
        let mut config = AppConfig::default();
        config.strategy.trend_full_scale = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.strategy.sma_full_divergence = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn real_mode_confirmation_is_opt_in() {
        let config = load(&[("CONFIRM_REAL_MODE", "true")]).unwrap();
        assert!(config.engine.confirm_real_mode);
        assert!(load(&[("CONFIRM_REAL_MODE", "yes")]).is_err());
    }

    #[test]
    fn settlement_budget_covers_every_attempt() {
        let resilience = ResilienceConfig::default();
        // 3 attempts of 10s plus two waits capped at 30s.
        assert_eq!(resilience.settlement_budget(), Duration::from_secs(90));
    }

    #[test]
    fn candle_count_covers_both_indicators() {
        let config = StrategyConfig::default();
        assert_eq!(config.candles_needed(), 30);
    }
}
