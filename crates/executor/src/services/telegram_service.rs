use std::sync::Arc;

use common::error::ProviderError;
use common::events::TradingEvent;
use market_data::{CallError, Guard};
use teloxide::RequestError;
use teloxide::prelude::*;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const DEPENDENCY: &str = "telegram";

pub struct TelegramService {
    bot: Bot,
    chat_id: ChatId,
    guard: Arc<Guard>,
}

impl TelegramService {
    pub fn new(token: String, chat_id: i64, guard: Arc<Guard>) -> Self {
        Self {
            bot: Bot::new(token),
            chat_id: ChatId(chat_id),
            guard,
        }
    }

    pub async fn start(self, mut rx: broadcast::Receiver<TradingEvent>) {
        info!("Starting Telegram Notification Service");

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let stopping = event == TradingEvent::EngineStopped;
                    self.send(&event).await;
                    if stopping {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    error!("Telegram service lagged behind. Missed {} messages.", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Telegram notification channel closed. Stopping service.");
                    break;
                }
            }
        }
    }

    async fn send(&self, event: &TradingEvent) {
        let text = render(event);
        let result = self
            .guard
            .call(async {
                self.bot
                    .send_message(self.chat_id, text)
                    .await
                    .map(|_| ())
                    .map_err(provider_error)
            })
            .await;

        // Notifications are best effort; the engine never waits on them.
        match result {
            Ok(()) => {}
            Err(CallError::CircuitOpen(_)) => {
                warn!("Telegram breaker open, dropped: {}", event);
            }
            Err(e) => error!("Failed to send Telegram message: {}", e),
        }
    }
}

fn render(event: &TradingEvent) -> String {
    if event.is_critical() {
        format!("⚠️ {}", event)
    } else {
        event.to_string()
    }
}

fn provider_error(err: RequestError) -> ProviderError {
    let dependency = DEPENDENCY.to_string();
    match err {
        RequestError::RetryAfter(_) => ProviderError::RateLimited { dependency },
        RequestError::Network(e) => ProviderError::Connect {
            dependency,
            reason: e.to_string(),
        },
        other => ProviderError::Rejected {
            dependency,
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_events_are_flagged() {
        assert!(render(&TradingEvent::EngineStopped).starts_with("⚠️"));
        assert_eq!(render(&TradingEvent::TradingResumed), "Trading resumed");
    }
}
