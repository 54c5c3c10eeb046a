use crate::aggregator::CycleScore;
use crate::controller::SwitchControllerAdapter;
use interfaces::defs::ControllerError;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Accumulating,
    Deciding,
}

/// Result of a decision point.
#[derive(Debug, Clone, PartialEq)]
pub enum ArbitrationOutcome {
    Switched { from: String, to: String },
    /// The winner is already the active scene; nothing was sent.
    Unchanged { scene: String },
    /// No source produced a score this cycle.
    NoScores,
    /// The controller call failed; the decision was dropped.
    Skipped(ControllerError),
}

/// Counts cycles and picks the next scene every `cadence + 1` cycles.
///
/// The counter resets after every decision point, whatever the outcome.
#[derive(Debug)]
pub struct ArbitrationScheduler {
    cadence: u32,
    cycle_counter: u32,
    phase: Phase,
    current_selection: Option<String>,
}

impl ArbitrationScheduler {
    pub fn new(cadence: u32) -> Self {
        Self {
            cadence,
            cycle_counter: 0,
            phase: Phase::Accumulating,
            current_selection: None,
        }
    }

    pub fn cadence(&self) -> u32 {
        self.cadence
    }

    pub fn cycle_counter(&self) -> u32 {
        self.cycle_counter
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Last scene known to be active.
    pub fn current_selection(&self) -> Option<&str> {
        self.current_selection.as_deref()
    }

    /// Advances one cycle and reports whether this cycle is a decision point.
    pub fn tick(&mut self) -> Phase {
        if self.cycle_counter >= self.cadence {
            self.phase = Phase::Deciding;
        } else {
            self.cycle_counter += 1;
            self.phase = Phase::Accumulating;
        }
        self.phase
    }

    /// Runs one cycle of the state machine. Returns an outcome only on
    /// decision points.
    pub async fn on_cycle(
        &mut self,
        scores: &CycleScore,
        controller: &mut SwitchControllerAdapter,
    ) -> Option<ArbitrationOutcome> {
        match self.tick() {
            Phase::Accumulating => None,
            Phase::Deciding => {
                let outcome = self.decide(scores, controller).await;
                self.cycle_counter = 0;
                self.phase = Phase::Accumulating;
                Some(outcome)
            }
        }
    }

    async fn decide(
        &mut self,
        scores: &CycleScore,
        controller: &mut SwitchControllerAdapter,
    ) -> ArbitrationOutcome {
        let winner = match scores.winner() {
            Some(winner) => winner.to_string(),
            None => {
                debug!("No scores this cycle; skipping arbitration");
                return ArbitrationOutcome::NoScores;
            }
        };

        let current = match controller.current().await {
            Ok(current) => current,
            Err(e) => {
                warn!("Could not query the active scene, skipping decision: {}", e);
                return ArbitrationOutcome::Skipped(e);
            }
        };
        self.current_selection = Some(current.clone());

        if winner == current {
            debug!("{} is already active", current);
            return ArbitrationOutcome::Unchanged { scene: current };
        }

        match controller.switch_to(&winner).await {
            Ok(()) => {
                info!(
                    "Switched scene {} -> {} ({} detections)",
                    current,
                    winner,
                    scores.get(&winner).unwrap_or_default()
                );
                self.current_selection = Some(winner.clone());
                ArbitrationOutcome::Switched {
                    from: current,
                    to: winner,
                }
            }
            Err(e) => {
                warn!("Failed to switch scene to {}: {}", winner, e);
                ArbitrationOutcome::Skipped(e)
            }
        }
    }
}
