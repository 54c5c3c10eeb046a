use crate::types::{SourceFailure, SourceReading, SwitcherConfig};
use interfaces::defs::Observation;

/// Occupancy count for one source in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreEntry {
    pub label: String,
    pub order: usize,
    pub count: u32,
}

/// Per-cycle occupancy, holding at most one entry per label.
///
/// Sources that failed this cycle have no entry at all, which is different
/// from an entry with a count of zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleScore {
    entries: Vec<ScoreEntry>,
}

impl CycleScore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a count. Returns false if the label already has an entry this cycle.
    pub fn record(&mut self, label: impl Into<String>, order: usize, count: u32) -> bool {
        let label = label.into();
        if self.entries.iter().any(|e| e.label == label) {
            return false;
        }
        self.entries.push(ScoreEntry { label, order, count });
        true
    }

    pub fn get(&self, label: &str) -> Option<u32> {
        self.entries.iter().find(|e| e.label == label).map(|e| e.count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ScoreEntry] {
        &self.entries
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.label.as_str())
    }

    /// Label with the highest count. Ties go to the source configured first.
    pub fn winner(&self) -> Option<&str> {
        let mut best: Option<&ScoreEntry> = None;
        for entry in &self.entries {
            best = match best {
                None => Some(entry),
                Some(current)
                    if entry.count > current.count
                        || (entry.count == current.count && entry.order < current.order) =>
                {
                    Some(entry)
                }
                keep => keep,
            };
        }
        best.map(|e| e.label.as_str())
    }
}

/// Counts qualifying observations and folds source readings into a [`CycleScore`].
#[derive(Debug, Clone)]
pub struct OccupancyScorer {
    target_class: String,
    confidence_threshold: f32,
}

impl OccupancyScorer {
    pub fn new(target_class: impl Into<String>, confidence_threshold: f32) -> Self {
        Self {
            target_class: target_class.into(),
            confidence_threshold,
        }
    }

    pub fn from_config(config: &SwitcherConfig) -> Self {
        Self::new(config.target_class.clone(), config.confidence_threshold)
    }

    pub fn target_class(&self) -> &str {
        &self.target_class
    }

    /// Exact class match and confidence strictly above the threshold.
    pub fn qualifies(&self, observation: &Observation) -> bool {
        observation.class_label == self.target_class
            && observation.confidence > self.confidence_threshold
    }

    pub fn score(&self, observations: &[Observation]) -> u32 {
        observations.iter().filter(|o| self.qualifies(o)).count() as u32
    }

    /// Scores successful readings and sets failures aside.
    pub fn aggregate(
        &self,
        readings: &[SourceReading],
    ) -> (CycleScore, Vec<(String, SourceFailure)>) {
        let mut scores = CycleScore::new();
        let mut failures = Vec::new();

        for reading in readings {
            match &reading.outcome {
                Ok(observations) => {
                    scores.record(reading.label.clone(), reading.order, self.score(observations));
                }
                Err(failure) => failures.push((reading.label.clone(), failure.clone())),
            }
        }

        (scores, failures)
    }
}
