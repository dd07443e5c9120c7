//! Descriptive statistics over the columns of a [`Dataset`].

use std::collections::HashSet;
use std::fmt;

use num_traits::Float;

use crate::dataset::{Attribute, AttributeType, Dataset, Value};

pub struct DatasetStats {
    pub attributes: Vec<AttributeStats>,
}

pub struct AttributeStats {
    pub attribute: Attribute,

    /// Number of distinct values in the column.
    pub unique: usize,

    /// Only present for numerical attributes.
    pub numeric: Option<NumericStats>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericStats {
    pub kurtosis: f64,
    pub mean: f64,
    pub variance: f64,
    pub min: f64,
    pub max: f64,
}

impl Dataset {
    pub fn stats(&self) -> DatasetStats {
        let attributes = self
            .attributes()
            .iter()
            .enumerate()
            .map(|(position, attribute)| {
                let column = self.column_at(position);
                match attribute.kind() {
                    AttributeType::Categorical => AttributeStats {
                        attribute: attribute.clone(),
                        unique: column
                            .iter()
                            .filter_map(Value::as_str)
                            .collect::<HashSet<_>>()
                            .len(),
                        numeric: None,
                    },
                    AttributeType::Numerical => {
                        let values: Vec<f64> = column.iter().filter_map(Value::as_num).collect();
                        AttributeStats {
                            attribute: attribute.clone(),
                            // -0.0 and 0.0 count as one value
                            unique: values
                                .iter()
                                .map(|v| (*v + 0.0).to_bits())
                                .collect::<HashSet<_>>()
                                .len(),
                            numeric: Some(NumericStats {
                                kurtosis: kurtosis(&values),
                                mean: mean(&values),
                                variance: variance(&values),
                                min: min(&values),
                                max: max(&values),
                            }),
                        }
                    }
                }
            })
            .collect();
        DatasetStats { attributes }
    }
}

impl fmt::Display for DatasetStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<20} {:<20} {:<20} {:<20} {:<20} {:<20} {:<20}",
            "Attribute", "Kurtosis", "Mean", "Variance", "Min", "Max", "Unique"
        )?;
        for stats in self.attributes.iter() {
            match stats.numeric {
                Some(numeric) => writeln!(
                    f,
                    "{:<20} {:<20.4} {:<20.4} {:<20.4} {:<20.4} {:<20.4} {:<20}",
                    stats.attribute.name(),
                    numeric.kurtosis,
                    numeric.mean,
                    numeric.variance,
                    numeric.min,
                    numeric.max,
                    stats.unique
                )?,
                None => writeln!(
                    f,
                    "{:<20} {:<20} {:<20} {:<20} {:<20} {:<20} {:<20}",
                    stats.attribute.name(),
                    "-",
                    "-",
                    "-",
                    "-",
                    "-",
                    stats.unique
                )?,
            }
        }
        Ok(())
    }
}

/// Smallest value, `+inf` for an empty slice.
pub fn min<T: Float>(values: &[T]) -> T {
    values.iter().fold(T::infinity(), |acc, v| acc.min(*v))
}

/// Largest value, `-inf` for an empty slice.
pub fn max<T: Float>(values: &[T]) -> T {
    values.iter().fold(T::neg_infinity(), |acc, v| acc.max(*v))
}

/// Arithmetic mean, zero for an empty slice.
pub fn mean<T: Float>(values: &[T]) -> T {
    if values.is_empty() {
        return T::zero();
    }
    let n = T::from(values.len()).unwrap_or_else(T::infinity);
    values.iter().fold(T::zero(), |acc, v| acc + *v) / n
}

/// Sample variance (divides by `n - 1`), zero for fewer than two values.
pub fn variance<T: Float>(values: &[T]) -> T {
    if values.len() < 2 {
        return T::zero();
    }
    let mean = mean(values);
    let n = T::from(values.len()).unwrap_or_else(T::infinity);
    values
        .iter()
        .fold(T::zero(), |acc, v| acc + (*v - mean).powi(2))
        / (n - T::one())
}

/// Sample excess kurtosis. Zero for fewer than four values or a constant column.
pub fn kurtosis(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 4 {
        return 0.0;
    }

    let mean = mean(values);
    let std_dev = variance(values).sqrt();
    if std_dev == 0.0 {
        return 0.0;
    }

    let fourth_moments: f64 = values
        .iter()
        .map(|v| ((v - mean) / std_dev).powi(4))
        .sum();

    fourth_moments * (n * (n + 1.0)) / ((n - 1.0) * (n - 2.0) * (n - 3.0))
        - (3.0 * (n - 1.0).powi(2)) / ((n - 2.0) * (n - 3.0))
}

#[cfg(test)]
mod tests {
    use super::{kurtosis, max, mean, min, variance};
    use crate::{Attribute, Dataset};

    fn within(actual: f64, expected: f64, tolerance: f64) -> bool {
        (actual - expected).abs() < tolerance
    }

    #[test]
    fn kurtosis_of_known_samples() {
        let cases: [(&[f64], f64); 3] = [
            (&[1.0, 2.0, 3.0, 4.0, 5.0], -1.2),
            (
                &[100.0, 102.0, 98.0, 101.0, 99.0, 97.0, 103.0, 101.0, 98.0, 100.0],
                -0.87,
            ),
            (&[1.0, 2.0, 2.0, 3.0, 3.0, 3.0, 3.0, 4.0, 4.0, 5.0], 0.0),
        ];
        for (values, expected) in cases {
            let actual = kurtosis(values);
            assert!(
                within(actual, expected, 0.1),
                "kurtosis of {:?}: expected {}, got {}",
                values,
                expected,
                actual
            );
        }
        assert_eq!(kurtosis(&[1.0, 2.0]), 0.0);
        assert_eq!(kurtosis(&[3.0; 6]), 0.0);
    }

    #[test]
    fn basic_aggregations() {
        let values = [2.0f64, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(min(&values), 2.0);
        assert_eq!(max(&values), 9.0);
        assert_eq!(mean(&values), 5.0);
        assert!(within(variance(&values), 32.0 / 7.0, 1e-12));
        assert_eq!(mean::<f32>(&[]), 0.0);
        assert_eq!(min::<f64>(&[]), f64::INFINITY);
    }

    #[test]
    fn dataset_stats_table() {
        let ds = Dataset::from_rows(
            vec![Attribute::categorical("Color"), Attribute::numerical("Cost")],
            vec![
                vec!["red", "1"],
                vec!["red", "2"],
                vec!["green", "3"],
                vec!["blue", "3"],
            ],
        )
        .unwrap();
        let stats = ds.stats();
        assert_eq!(stats.attributes.len(), 2);
        assert_eq!(stats.attributes[0].unique, 3);
        assert!(stats.attributes[0].numeric.is_none());

        let cost = stats.attributes[1].numeric.unwrap();
        assert_eq!(stats.attributes[1].unique, 3);
        assert_eq!(cost.min, 1.0);
        assert_eq!(cost.max, 3.0);
        assert_eq!(cost.mean, 2.25);

        let table = stats.to_string();
        assert_eq!(table.lines().count(), 3);
        assert!(table.lines().nth(2).unwrap().starts_with("Cost"));
    }
}
