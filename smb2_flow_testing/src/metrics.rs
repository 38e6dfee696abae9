//! Helpers for asserting on metrics recorded during a test.

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

/// A local recorder and the snapshotter that reads it.
pub struct MetricsCapture {
    recorder: DebuggingRecorder,
    snapshotter: Snapshotter,
}

impl Default for MetricsCapture {
    fn default() -> Self { Self::new() }
}

impl MetricsCapture {
    #[must_use]
    pub fn new() -> Self {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        Self {
            recorder,
            snapshotter,
        }
    }

    /// Run `f` with this capture installed as the thread's recorder.
    pub fn record<T>(&self, f: impl FnOnce() -> T) -> T {
        metrics::with_local_recorder(&self.recorder, f)
    }

    /// Current values as `(name, value)` pairs.
    #[must_use]
    pub fn values(&self) -> Vec<(String, DebugValue)> {
        self.snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _, _, value)| (key.key().name().to_owned(), value))
            .collect()
    }
}

/// Sum of every counter named `name` in `values`.
#[must_use]
pub fn counter_value(values: &[(String, DebugValue)], name: &str) -> u64 {
    values
        .iter()
        .filter(|(key, _)| key == name)
        .map(|(_, value)| match value {
            DebugValue::Counter(count) => *count,
            _ => 0,
        })
        .sum()
}
