//! Concatenation of scalar and vector columns into one feature vector.

use crate::error::{GearboxError, Result};
use crate::record::{Record, Value};

/// One input of the assembler with its expected width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerInput {
    pub column: String,
    pub width: usize,
}

/// Builds a fixed-width feature vector from columns in a fixed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureAssembler {
    inputs: Vec<AssemblerInput>,
}

impl FeatureAssembler {
    pub fn new(inputs: Vec<AssemblerInput>) -> Self {
        Self { inputs }
    }

    pub fn inputs(&self) -> &[AssemblerInput] {
        &self.inputs
    }

    /// Total vector width, the sum of all input widths.
    pub fn width(&self) -> usize {
        self.inputs.iter().map(|i| i.width).sum()
    }

    /// Assemble the feature vector for one record.
    ///
    /// # Errors
    ///
    /// `SchemaMismatch` if a named column is absent, null, a string, or a
    /// vector of unexpected width.
    pub fn assemble(&self, record: &Record) -> Result<Vec<f64>> {
        let mut features = Vec::with_capacity(self.width());

        for input in &self.inputs {
            match record.get(&input.column) {
                Some(Value::Vector(v)) if v.len() == input.width => features.extend_from_slice(v),
                Some(Value::Vector(v)) => {
                    return Err(GearboxError::SchemaMismatch(format!(
                        "column '{}' has width {}, expected {}",
                        input.column,
                        v.len(),
                        input.width
                    )));
                }
                Some(value @ (Value::Double(_) | Value::Float(_))) if input.width == 1 => {
                    features.extend(value.as_f64());
                }
                Some(Value::Null) => {
                    return Err(GearboxError::SchemaMismatch(format!(
                        "column '{}' is null",
                        input.column
                    )));
                }
                Some(_) => {
                    return Err(GearboxError::SchemaMismatch(format!(
                        "column '{}' is not numeric",
                        input.column
                    )));
                }
                None => {
                    return Err(GearboxError::SchemaMismatch(format!(
                        "column '{}' is absent from the record",
                        input.column
                    )));
                }
            }
        }

        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler() -> FeatureAssembler {
        FeatureAssembler::new(vec![
            AssemblerInput {
                column: "turb_type".to_owned(),
                width: 2,
            },
            AssemblerInput {
                column: "oil_temperature".to_owned(),
                width: 1,
            },
            AssemblerInput {
                column: "humidity".to_owned(),
                width: 1,
            },
        ])
    }

    #[test]
    fn test_concatenates_in_order() {
        let record = Record::new()
            .with("humidity", 0.5_f32)
            .with("turb_type", Value::Vector(vec![0.0, 1.0]))
            .with("oil_temperature", 37.0);

        assert_eq!(
            assembler().assemble(&record).unwrap(),
            vec![0.0, 1.0, 37.0, 0.5]
        );
    }

    #[test]
    fn test_width_is_constant() {
        let a = assembler();
        let records = [
            Record::new()
                .with("turb_type", Value::Vector(vec![1.0, 0.0]))
                .with("oil_temperature", 1.0)
                .with("humidity", 2.0),
            Record::new()
                .with("turb_type", Value::Vector(vec![0.0, 0.0]))
                .with("oil_temperature", -4.0)
                .with("humidity", 0.0),
        ];
        for record in &records {
            assert_eq!(a.assemble(record).unwrap().len(), a.width());
        }
    }

    #[test]
    fn test_absent_column_is_schema_mismatch() {
        let record = Record::new()
            .with("turb_type", Value::Vector(vec![1.0, 0.0]))
            .with("oil_temperature", 1.0);

        let err = assembler().assemble(&record).unwrap_err();
        assert!(matches!(err, GearboxError::SchemaMismatch(_)));
        assert!(err.to_string().contains("humidity"));
    }

    #[test]
    fn test_rejects_null_and_text() {
        let null = Record::new()
            .with("turb_type", Value::Vector(vec![1.0, 0.0]))
            .with("oil_temperature", Value::Null)
            .with("humidity", 1.0);
        assert!(assembler().assemble(&null).is_err());

        let text = Record::new()
            .with("turb_type", Value::Vector(vec![1.0, 0.0]))
            .with("oil_temperature", "hot")
            .with("humidity", 1.0);
        assert!(assembler().assemble(&text).is_err());
    }

    #[test]
    fn test_rejects_wrong_vector_width() {
        let record = Record::new()
            .with("turb_type", Value::Vector(vec![1.0, 0.0, 0.0]))
            .with("oil_temperature", 1.0)
            .with("humidity", 1.0);
        assert!(assembler().assemble(&record).is_err());
    }
}
