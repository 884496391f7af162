//! One-hot encoding of indexed categorical columns.

use crate::error::{GearboxError, Result};
use crate::record::{Record, Value};

/// Expands an index column into a one-hot vector column.
///
/// `category_size` counts every code the upstream indexer can emit, including
/// its unknown code when unseen values are kept. With `drop_last` the final
/// slot is omitted and that code encodes as all zeros.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneHotEncoder {
    pub input: String,
    pub output: String,
    pub category_size: usize,
    pub drop_last: bool,
}

impl OneHotEncoder {
    pub fn new(
        input: impl Into<String>,
        output: impl Into<String>,
        category_size: usize,
        drop_last: bool,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            category_size,
            drop_last,
        }
    }

    /// Width of every vector this encoder produces.
    pub fn width(&self) -> usize {
        if self.drop_last {
            self.category_size.saturating_sub(1)
        } else {
            self.category_size
        }
    }

    /// One-hot vector for `code`.
    ///
    /// # Errors
    ///
    /// `Encoding` if `code` is outside `[0, category_size)`.
    pub fn encode(&self, code: usize) -> Result<Vec<f64>> {
        if code >= self.category_size {
            return Err(GearboxError::Encoding(format!(
                "code {code} out of range for '{}' with {} categories",
                self.input, self.category_size
            )));
        }

        let mut vector = vec![0.0; self.width()];
        if let Some(slot) = vector.get_mut(code) {
            *slot = 1.0;
        }
        Ok(vector)
    }

    /// Read the index column and write the one-hot vector column.
    ///
    /// # Errors
    ///
    /// `SchemaMismatch` if the index column is absent or not an integral
    /// number, `Encoding` if the code is out of range.
    pub fn apply(&self, record: &mut Record) -> Result<()> {
        let code = match record.get(&self.input).and_then(Value::as_f64) {
            Some(v) if v >= 0.0 && v.fract() == 0.0 => v as usize,
            _ => {
                return Err(GearboxError::SchemaMismatch(format!(
                    "index column '{}' is missing or not a category code",
                    self.input
                )));
            }
        };

        let vector = self.encode(code)?;
        record.set(self.output.clone(), Value::Vector(vector));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_with_and_without_drop_last() {
        assert_eq!(OneHotEncoder::new("i", "o", 4, false).width(), 4);
        assert_eq!(OneHotEncoder::new("i", "o", 4, true).width(), 3);
        assert_eq!(OneHotEncoder::new("i", "o", 0, true).width(), 0);
    }

    #[test]
    fn test_encode_sets_single_slot() {
        let encoder = OneHotEncoder::new("indexed_wind_direction", "wind_dir", 4, false);
        assert_eq!(encoder.encode(2).unwrap(), vec![0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_drop_last_encodes_last_code_as_zeros() {
        let encoder = OneHotEncoder::new("i", "o", 3, true);
        assert_eq!(encoder.encode(0).unwrap(), vec![1.0, 0.0]);
        assert_eq!(encoder.encode(2).unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_width_constant_for_every_code() {
        for drop_last in [false, true] {
            let encoder = OneHotEncoder::new("i", "o", 5, drop_last);
            for code in 0..5 {
                assert_eq!(encoder.encode(code).unwrap().len(), encoder.width());
            }
        }
    }

    #[test]
    fn test_out_of_range_code_fails() {
        let encoder = OneHotEncoder::new("i", "o", 2, false);
        assert!(matches!(encoder.encode(2), Err(GearboxError::Encoding(_))));
    }

    #[test]
    fn test_apply_writes_vector_column() {
        let encoder = OneHotEncoder::new("indexed_turbine_type", "turb_type", 3, false);
        let mut record = Record::new().with("indexed_turbine_type", 1.0);

        encoder.apply(&mut record).unwrap();
        assert_eq!(
            record.get("turb_type"),
            Some(&Value::Vector(vec![0.0, 1.0, 0.0]))
        );
    }

    #[test]
    fn test_apply_requires_index_column() {
        let encoder = OneHotEncoder::new("indexed_turbine_type", "turb_type", 3, false);
        let mut record = Record::new().with("indexed_turbine_type", "HAWT");
        assert!(matches!(
            encoder.apply(&mut record),
            Err(GearboxError::SchemaMismatch(_))
        ));
    }
}
