use std::collections::HashMap;

/// Per-model response-time history, keyed by the model display name.
///
/// One sample is appended per settled session, whatever the outcome. The log
/// survives conversation clears; only [`ResponseTimeLog::clear`] empties it.
#[derive(Debug, Default)]
pub struct ResponseTimeLog {
    samples: HashMap<String, Vec<f64>>,
}

impl ResponseTimeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, model: &str, elapsed_secs: f64) {
        self.samples
            .entry(model.to_string())
            .or_default()
            .push(elapsed_secs);
    }

    /// Full copy of the log, pushed to the visualization layer after every
    /// completed turn so charts update turn-by-turn.
    pub fn snapshot(&self) -> HashMap<String, Vec<f64>> {
        self.samples.clone()
    }

    pub fn samples_for(&self, model: &str) -> &[f64] {
        self.samples.get(model).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_append_in_order() {
        let mut log = ResponseTimeLog::new();
        log.record("gpt-4o", 1.5);
        log.record("gpt-4o", 0.8);
        log.record("claude-3-haiku-20240307", 2.0);
        assert_eq!(log.samples_for("gpt-4o"), &[1.5, 0.8]);
        assert_eq!(log.samples_for("claude-3-haiku-20240307"), &[2.0]);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut log = ResponseTimeLog::new();
        log.record("m", 1.0);
        let snap = log.snapshot();
        log.record("m", 2.0);
        assert_eq!(snap["m"], vec![1.0]);
        assert_eq!(log.samples_for("m"), &[1.0, 2.0]);
    }

    #[test]
    fn unknown_model_has_no_samples() {
        assert!(ResponseTimeLog::new().samples_for("nope").is_empty());
    }
}
