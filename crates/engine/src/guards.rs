use std::sync::Arc;

use common::config::AppConfig;
use market_data::Guard;

/// One guard per external dependency. Anything that calls a dependency
/// outside the engine must go through the same guard so the breaker and
/// rate limit see every call.
#[derive(Debug, Clone)]
pub struct EngineGuards {
    pub primary: Arc<Guard>,
    pub secondary: Arc<Guard>,
    pub execution: Arc<Guard>,
}

impl EngineGuards {
    pub fn from_config(
        config: &AppConfig,
        primary: &str,
        secondary: &str,
        execution: &str,
    ) -> Self {
        let resilience = &config.resilience;
        let guard = |name: &str, rate, timeout| {
            Arc::new(Guard::new(name, resilience.breaker, rate, timeout))
        };
        Self {
            primary: guard(primary, resilience.market_rate, resilience.call_timeout),
            secondary: guard(secondary, resilience.secondary_rate, resilience.call_timeout),
            // A submission opens the trade, holds it until expiry, then settles.
            execution: guard(
                execution,
                resilience.execution_rate,
                resilience.call_timeout
                    + config.engine.expiration
                    + resilience.settlement_budget(),
            ),
        }
    }

    pub fn all(&self) -> Vec<Arc<Guard>> {
        vec![
            self.primary.clone(),
            self.secondary.clone(),
            self.execution.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn guards_are_named_after_their_dependency() {
        let guards =
            EngineGuards::from_config(&AppConfig::default(), "primary", "secondary", "paper");
        let names: Vec<String> = guards
            .all()
            .iter()
            .map(|g| g.dependency().to_string())
            .collect();
        assert_eq!(names, vec!["primary", "secondary", "paper"]);
    }

    #[test]
    fn execution_timeout_covers_expiry_and_settlement() {
        let config = AppConfig::default();
        let guards = EngineGuards::from_config(&config, "primary", "secondary", "execution");
        // 10s open + 60s expiry + 90s settlement.
        assert_eq!(guards.execution.call_timeout(), Duration::from_secs(160));
        assert_eq!(guards.primary.call_timeout(), Duration::from_secs(10));
    }
}
