use std::collections::HashSet;
use std::fmt;

use log::trace;
use rand::{distributions::Uniform, seq::SliceRandom, Rng};

use crate::dataset::{Attribute, AttributeType, Dataset, Value};
use crate::error::Error;

/// Single attribute predicate partitioning a dataset in two.
///
/// Categorical attributes test for equality with the threshold, numerical
/// attributes for `value >= threshold`.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitCondition {
    attribute: Attribute,
    threshold: Value,
}

impl SplitCondition {
    pub fn new(attribute: Attribute, threshold: Value) -> Result<Self, Error> {
        attribute.validate(&threshold)?;
        Ok(Self {
            attribute,
            threshold,
        })
    }

    pub fn attribute(&self) -> &Attribute {
        &self.attribute
    }

    pub fn threshold(&self) -> &Value {
        &self.threshold
    }

    pub fn check(&self, value: &Value) -> bool {
        match (&self.threshold, value) {
            (Value::Str(threshold), Value::Str(value)) => value == threshold,
            (Value::Num(threshold), Value::Num(value)) => value >= threshold,
            _ => false,
        }
    }

    /// Human readable form of the condition, or of its negation when `inverse` is set.
    pub fn describe(&self, inverse: bool) -> String {
        let operator = match (self.attribute.kind(), inverse) {
            (AttributeType::Categorical, false) => "==",
            (AttributeType::Categorical, true) => "!=",
            (AttributeType::Numerical, false) => ">=",
            (AttributeType::Numerical, true) => "<",
        };
        format!(
            "{} {} {}",
            self.attribute.name(),
            operator,
            self.attribute.format_value(&self.threshold)
        )
    }
}

impl fmt::Display for SplitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe(false))
    }
}

/// Outcome of [`Dataset::split`].
#[derive(Debug, Clone)]
pub struct Split {
    pub condition: SplitCondition,

    /// Rows passing the condition, in their original order.
    pub matched: Dataset,

    /// Rows failing the condition, in their original order.
    pub unmatched: Dataset,
}

impl Dataset {
    /// Partition the rows using a randomly generated [`SplitCondition`].
    ///
    /// The attribute is drawn uniformly from the attributes not in `excluded`. For a
    /// categorical attribute the threshold is one of the column's values, so frequent
    /// categories are picked more often. For a numerical attribute it is drawn
    /// uniformly from `[min, max]` of the column.
    ///
    /// Fails with [`Error::NotSplittable`] when every attribute is excluded or the
    /// dataset has no rows.
    pub fn split<R: Rng + ?Sized>(
        &self,
        excluded: &HashSet<Attribute>,
        rng: &mut R,
    ) -> Result<Split, Error> {
        self.random_split(excluded, rng)
            .map(|(_, split)| split)
            .ok_or(Error::NotSplittable)
    }

    /// Partition the rows into those passing `condition` and the rest.
    pub fn split_on(&self, condition: &SplitCondition) -> Result<(Dataset, Dataset), Error> {
        let position = self
            .schema()
            .position(&condition.attribute)
            .ok_or_else(|| Error::UnknownAttribute(condition.attribute.name().to_string()))?;
        Ok(self.partition(position, condition))
    }

    /// Like [`Dataset::split`], also returning the column position of the split attribute.
    pub(crate) fn random_split<R: Rng + ?Sized>(
        &self,
        excluded: &HashSet<Attribute>,
        rng: &mut R,
    ) -> Option<(usize, Split)> {
        if self.is_empty() {
            return None;
        }

        let splittable: Vec<usize> = self
            .attributes()
            .iter()
            .enumerate()
            .filter(|(_, attribute)| !excluded.contains(*attribute))
            .map(|(position, _)| position)
            .collect();
        let position = *splittable.choose(rng)?;

        let attribute = self.attributes()[position].clone();
        let column = self.column_at(position);
        let threshold = match attribute.kind() {
            AttributeType::Categorical => column.choose(rng)?.clone(),
            AttributeType::Numerical => {
                let (min, max) = column
                    .iter()
                    .filter_map(Value::as_num)
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
                        (min.min(v), max.max(v))
                    });
                Value::Num(random_threshold(rng, min, max))
            }
        };

        trace!(
            "splitting dataset of size {} on {} ({} splittable attributes)",
            self.len(),
            attribute.name(),
            splittable.len()
        );

        let condition = SplitCondition {
            attribute,
            threshold,
        };
        let (matched, unmatched) = self.partition(position, &condition);
        Some((
            position,
            Split {
                condition,
                matched,
                unmatched,
            },
        ))
    }

    fn partition(&self, position: usize, condition: &SplitCondition) -> (Dataset, Dataset) {
        let (matched, unmatched): (Vec<usize>, Vec<usize>) =
            (0..self.len()).partition(|idx| condition.check(&self.column_at(position)[*idx]));
        (self.gather(matched), self.gather(unmatched))
    }
}

/// Uniform draw from `[min, max]`.
fn random_threshold<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> f64 {
    if min >= max {
        min
    } else if (max - min).is_finite() {
        rng.sample(Uniform::new_inclusive(min, max))
    } else {
        // the span overflows, interpolate instead
        let t: f64 = rng.gen();
        min * (1.0 - t) + max * t
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::SplitCondition;
    use crate::{Attribute, Dataset, Error, Value};

    fn fruits() -> Dataset {
        Dataset::from_rows(
            vec![Attribute::categorical("Name"), Attribute::categorical("Color")],
            vec![
                vec!["apple", "red"],
                vec!["raspberry", "red"],
                vec!["pear", "green"],
            ],
        )
        .unwrap()
    }

    #[test]
    fn split_on_categorical_equality() {
        let ds = fruits();
        let condition =
            SplitCondition::new(Attribute::categorical("Color"), Value::from("red")).unwrap();
        let (matched, unmatched) = ds.split_on(&condition).unwrap();

        let expected_matched = Dataset::from_rows(
            ds.attributes().to_vec(),
            vec![vec!["apple", "red"], vec!["raspberry", "red"]],
        )
        .unwrap();
        let expected_unmatched =
            Dataset::from_rows(ds.attributes().to_vec(), vec![vec!["pear", "green"]]).unwrap();
        assert_eq!(matched, expected_matched);
        assert_eq!(unmatched, expected_unmatched);
    }

    #[test]
    fn numerical_condition_is_a_threshold() {
        let condition = SplitCondition::new(Attribute::numerical("Cost"), Value::Num(1.0)).unwrap();
        assert!(condition.check(&Value::Num(1.0)));
        assert!(condition.check(&Value::Num(3.5)));
        assert!(!condition.check(&Value::Num(0.99)));
        assert_eq!(condition.to_string(), "Cost >= 1");
        assert_eq!(condition.describe(true), "Cost < 1");

        assert!(SplitCondition::new(Attribute::numerical("Cost"), Value::from("x")).is_err());
    }

    #[test]
    fn split_is_total_and_disjoint() {
        let ds = Dataset::from_rows(
            vec![Attribute::categorical("Color"), Attribute::numerical("Size")],
            (0..50).map(|i| {
                vec![
                    ["red", "green", "blue"][i % 3].to_string(),
                    format!("{}", (i * 7) % 13),
                ]
            }),
        )
        .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        for _ in 0..100 {
            let split = ds.split(&HashSet::new(), &mut rng).unwrap();
            assert_eq!(split.matched.len() + split.unmatched.len(), ds.len());
            assert!(split.matched.rows().all(|row| {
                split
                    .condition
                    .check(row.value(split.condition.attribute()).unwrap())
            }));
            assert!(split.unmatched.rows().all(|row| {
                !split
                    .condition
                    .check(row.value(split.condition.attribute()).unwrap())
            }));
            // matched never empty: thresholds are taken from the observed values
            assert!(!split.matched.is_empty());
        }
        assert_eq!(ds.len(), 50);
    }

    #[test]
    fn split_respects_exclusions() {
        let ds = fruits();
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        let excluded: HashSet<_> = [Attribute::categorical("Name")].into_iter().collect();
        for _ in 0..20 {
            let split = ds.split(&excluded, &mut rng).unwrap();
            assert_eq!(split.condition.attribute().name(), "Color");
        }

        let all: HashSet<_> = ds.attributes().iter().cloned().collect();
        assert!(matches!(ds.split(&all, &mut rng), Err(Error::NotSplittable)));
        assert!(matches!(
            ds.copy_no_values().split(&HashSet::new(), &mut rng),
            Err(Error::NotSplittable)
        ));
    }

    #[test]
    fn constant_numerical_column_splits_degenerately() {
        let ds = Dataset::from_rows(
            vec![Attribute::numerical("Size")],
            vec![vec!["2.5"], vec!["2.5"], vec!["2.5"]],
        )
        .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let split = ds.split(&HashSet::new(), &mut rng).unwrap();
        assert_eq!(split.condition.threshold(), &Value::Num(2.5));
        assert_eq!(split.matched.len(), 3);
        assert!(split.unmatched.is_empty());
    }
}
