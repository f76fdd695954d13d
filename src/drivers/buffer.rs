/// One timestamped reading. `timestamp` is seconds since the session started.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub timestamp: f64,
    pub raw: f64,
    pub filtered: f64,
}

impl Sample {
    pub fn new(timestamp: f64, raw: f64, filtered: f64) -> Self {
        Self {
            timestamp,
            raw,
            filtered,
        }
    }
}

/// Append-only capture buffer. Insertion order is time order; no upper bound.
#[derive(Clone, Debug, Default)]
pub struct SampleStore {
    samples: Vec<Sample>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// Owned copy, safe to hand to another thread while capture continues.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.clone()
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.last().map(|s| s.timestamp).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_keeps_insertion_order() {
        let mut store = SampleStore::new();
        store.append(Sample::new(0.0, 1.0, 0.5));
        store.append(Sample::new(0.1, 2.0, 0.7));
        store.append(Sample::new(0.2, 3.0, 0.9));
        let raws: Vec<f64> = store.as_slice().iter().map(|s| s.raw).collect();
        assert_eq!(raws, vec![1.0, 2.0, 3.0]);
        assert_eq!(store.duration_seconds(), 0.2);
    }

    #[test]
    fn snapshot_is_detached_from_later_appends() {
        let mut store = SampleStore::new();
        store.append(Sample::new(0.0, 1.0, 1.0));
        let snap = store.snapshot();
        store.append(Sample::new(0.5, 2.0, 2.0));
        assert_eq!(snap.len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn clear_resets_to_empty() {
        let mut store = SampleStore::new();
        store.append(Sample::new(0.0, 1.0, 1.0));
        store.clear();
        assert!(store.is_empty());
        assert!(store.last().is_none());
        assert_eq!(store.duration_seconds(), 0.0);
    }
}
