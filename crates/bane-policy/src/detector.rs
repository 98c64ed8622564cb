// detector.rs — Detector trait and the ordered registry.
//
// Detectors are pure classifiers: given normalized text and policy hints,
// they return zero or more findings. They must not touch the network, the
// filesystem, or any shared state.
//
// The registry keeps detectors sorted by (order, id) at all times. Running
// concatenates results in that order, so output is identical no matter how
// many detectors exist or in which order they were registered.

use crate::error::PolicyError;
use crate::finding::Finding;
use crate::profile::PolicyHints;

/// Text as seen by detectors.
#[derive(Debug, Clone)]
pub struct DetectionInput<'a> {
    /// Lower-cased, whitespace-collapsed text.
    pub text: &'a str,
    /// The original, unmodified text (for shape matches such as PII).
    pub raw: &'a str,
    /// Route or tool the request targets.
    pub route: &'a str,
}

/// A pluggable content-risk classifier.
pub trait Detector: Send + Sync {
    /// Stable identifier; also the tie-breaker for equal `order`.
    fn id(&self) -> &str;

    /// Position in the pipeline (ascending).
    fn order(&self) -> i32;

    fn detect(&self, input: &DetectionInput<'_>, hints: &PolicyHints) -> Vec<Finding>;
}

/// Ordered set of detectors.
#[derive(Default)]
pub struct DetectorRegistry {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectorRegistry {
    /// An empty registry (detects nothing).
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with the baseline detectors.
    pub fn baseline() -> Self {
        let mut registry = Self::new();
        for detector in crate::baseline::baseline_detectors() {
            registry.insert_sorted(detector);
        }
        registry
    }

    /// Add a detector. Ids must be unique.
    pub fn register(&mut self, detector: Box<dyn Detector>) -> Result<(), PolicyError> {
        if self.detectors.iter().any(|d| d.id() == detector.id()) {
            return Err(PolicyError::DuplicateDetector {
                id: detector.id().to_string(),
            });
        }
        self.insert_sorted(detector);
        Ok(())
    }

    fn insert_sorted(&mut self, detector: Box<dyn Detector>) {
        self.detectors.push(detector);
        // Stable sort: previously registered detectors keep their relative order.
        self.detectors
            .sort_by(|a, b| a.order().cmp(&b.order()).then_with(|| a.id().cmp(b.id())));
    }

    /// Detector ids in execution order.
    pub fn ids(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Run every detector in (order, id) order and concatenate the findings.
    pub fn run(&self, input: &DetectionInput<'_>, hints: &PolicyHints) -> Vec<Finding> {
        self.detectors
            .iter()
            .flat_map(|d| d.detect(input, hints))
            .collect()
    }
}

/// Lower-case and collapse all runs of whitespace to a single space.
pub fn normalize_for_detection(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
