use std::sync::Arc;

use market_data::{BreakerSnapshot, Guard};
use risk::{RiskMetrics, RiskState};
use tokio::sync::{mpsc, watch};

use crate::phase::CyclePhase;

/// Operator instructions. The engine applies them between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    Stop,
    Resume,
    Pause,
    ConfirmRealMode,
    ResetDay,
}

/// Control and monitoring side of a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    state: watch::Receiver<RiskState>,
    phase: watch::Receiver<CyclePhase>,
    guards: Vec<Arc<Guard>>,
}

impl EngineHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<EngineCommand>,
        state: watch::Receiver<RiskState>,
        phase: watch::Receiver<CyclePhase>,
        guards: Vec<Arc<Guard>>,
    ) -> Self {
        Self {
            commands,
            state,
            phase,
            guards,
        }
    }

    /// Returns false once the engine has gone away.
    pub async fn send(&self, command: EngineCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    pub async fn stop(&self) -> bool {
        self.send(EngineCommand::Stop).await
    }

    pub async fn resume(&self) -> bool {
        self.send(EngineCommand::Resume).await
    }

    pub fn risk_state(&self) -> RiskState {
        self.state.borrow().clone()
    }

    pub fn risk_metrics(&self) -> RiskMetrics {
        RiskMetrics::from(&*self.state.borrow())
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase.borrow()
    }

    /// Waits for the next published risk state.
    pub async fn state_changed(&mut self) -> Option<RiskState> {
        self.state.changed().await.ok()?;
        Some(self.state.borrow_and_update().clone())
    }

    pub async fn breakers(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots = Vec::with_capacity(self.guards.len());
        for guard in &self.guards {
            snapshots.push(guard.breaker_snapshot().await);
        }
        snapshots
    }
}
