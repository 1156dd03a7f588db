//! Transform Registry
//!
//! Maps operation names (e.g. "smooth") to element-wise transforms. The compute
//! engine only knows the `Transform` trait, so new operations are added by
//! registering another implementation.

use crate::array::{ElementKind, SegmentData};
use crate::error::{ClusterError, Result};

use dashmap::DashMap;
use std::sync::Arc;

/// An element-wise, order-preserving transform over one element kind.
pub trait Transform: Send + Sync {
    fn name(&self) -> &'static str;

    fn element_kind(&self) -> ElementKind;

    /// Transforms one chunk. The output has the same length and order.
    fn apply(&self, chunk: &SegmentData) -> Result<SegmentData>;
}

/// `(sin x + cos x)^2 / (sqrt|x| + 1)` over doubles.
pub struct Smooth;

/// Reduces multiples of 3 and values in `[500, 1000]` to
/// `floor(x * ln x) mod 7`; other integers pass through.
pub struct Classify;

pub fn smooth(x: f64) -> f64 {
    (x.sin() + x.cos()).powi(2) / (x.abs().sqrt() + 1.0)
}

pub fn classify(x: i64) -> i64 {
    if x % 3 != 0 && !(500..=1000).contains(&x) {
        return x;
    }
    // ln is undefined here; such values collapse to 0.
    if x <= 0 {
        return 0;
    }
    let x = x as f64;
    ((x * x.ln()).floor() as i64).rem_euclid(7)
}

impl Transform for Smooth {
    fn name(&self) -> &'static str {
        "smooth"
    }

    fn element_kind(&self) -> ElementKind {
        ElementKind::Double
    }

    fn apply(&self, chunk: &SegmentData) -> Result<SegmentData> {
        match chunk {
            SegmentData::Double(values) => {
                Ok(SegmentData::Double(values.iter().map(|&x| smooth(x)).collect()))
            }
            other => Err(kind_mismatch(self, other)),
        }
    }
}

impl Transform for Classify {
    fn name(&self) -> &'static str {
        "classify"
    }

    fn element_kind(&self) -> ElementKind {
        ElementKind::Int
    }

    fn apply(&self, chunk: &SegmentData) -> Result<SegmentData> {
        match chunk {
            SegmentData::Int(values) => {
                Ok(SegmentData::Int(values.iter().map(|&x| classify(x)).collect()))
            }
            other => Err(kind_mismatch(self, other)),
        }
    }
}

fn kind_mismatch(transform: &dyn Transform, data: &SegmentData) -> ClusterError {
    ClusterError::InvalidInput(format!(
        "'{}' operates on {} elements, segment holds {}",
        transform.name(),
        transform.element_kind(),
        data.kind()
    ))
}

pub struct TransformRegistry {
    transforms: DashMap<String, Arc<dyn Transform>>,
}

impl TransformRegistry {
    /// Creates an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            transforms: DashMap::new(),
        })
    }

    /// Registry preloaded with `smooth` and `classify`.
    pub fn with_builtins() -> Arc<Self> {
        let registry = Self::new();
        registry.register(Arc::new(Smooth));
        registry.register(Arc::new(Classify));
        registry
    }

    pub fn register(&self, transform: Arc<dyn Transform>) {
        let name = transform.name();
        self.transforms.insert(name.to_string(), transform);
        tracing::debug!("Registered transform: {}", name);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Transform>> {
        self.transforms
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ClusterError::UnknownOperation(name.to_string()))
    }

    pub fn has_transform(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .transforms
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self {
            transforms: DashMap::new(),
        }
    }
}
