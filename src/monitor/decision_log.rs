use crate::models::Decision;

/// Append-only, stream-ordered record of decisions.
#[derive(Debug, Default)]
pub struct DecisionLog {
    entries: Vec<Decision>,
}

impl DecisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, decision: Decision) {
        debug_assert!(
            self.entries
                .last()
                .map(|last| last.reading_ref.sequence < decision.reading_ref.sequence)
                .unwrap_or(true),
            "decisions must be appended in stream order"
        );
        self.entries.push(decision);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<Decision> {
        self.entries
    }
}
