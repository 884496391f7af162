//! Labeled datasets, random splitting and text output.

pub mod split;
pub mod writer;

pub use split::{SplitOutcome, split_dataset};
pub use writer::{DatasetWriter, WriteReport, format_line, is_complete};

/// A class code and its feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledPoint {
    pub label: u32,
    pub features: Vec<f64>,
}

impl LabeledPoint {
    pub fn new(label: u32, features: Vec<f64>) -> Self {
        Self { label, features }
    }
}

/// Ordered collection of labeled points sharing one feature width.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    pub points: Vec<LabeledPoint>,
}

impl Dataset {
    pub fn new(points: Vec<LabeledPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Feature width of the first point, `None` for an empty dataset.
    pub fn feature_width(&self) -> Option<usize> {
        self.points.first().map(|p| p.features.len())
    }
}

impl FromIterator<LabeledPoint> for Dataset {
    fn from_iter<I: IntoIterator<Item = LabeledPoint>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
