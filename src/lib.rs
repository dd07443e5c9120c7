//! # Tabular Isolation Forest
//!
//! Anomaly detection over typed tabular data, following the algorithm described in
//! [Isolation Forest](https://doi.org/10.1109/ICDM.2008.17). Attributes are either
//! categorical (split by equality with a value drawn from the data) or numerical
//! (split by a threshold drawn uniformly from the observed range).
//!
//! Records which are isolated after only a few random splits get a score close to 1,
//! records indistinguishable from the bulk of the training data score at or below 0.5.
//!
//! ## Example
//!
//! ```rust
//! use std::collections::HashMap;
//!
//! use rand::distributions::Uniform;
//! use rand::{Rng, SeedableRng};
//! use rand_chacha::ChaCha8Rng;
//! use tabular_isolation_forest::{Attribute, Dataset, Forest, ForestOptions};
//!
//! let rng = &mut ChaCha8Rng::seed_from_u64(42);
//! let distribution = Uniform::new(-4., 4.);
//! let rows: Vec<_> = (0..3000)
//!     .map(|i| {
//!         vec![
//!             rng.sample(distribution).to_string(),
//!             rng.sample(distribution).to_string(),
//!             ["tcp", "udp"][i % 2].to_string(),
//!         ]
//!     })
//!     .collect();
//! let training_data = Dataset::from_rows(
//!     vec![
//!         Attribute::numerical("x"),
//!         Attribute::numerical("y"),
//!         Attribute::categorical("protocol"),
//!     ],
//!     rows,
//! )
//! .unwrap();
//!
//! let options = ForestOptions {
//!     n_trees: 150,
//!     sample_size: 200,
//!     max_tree_depth: None,
//! };
//! let forest = Forest::from_dataset_with_rng(&training_data, &options, rng).unwrap();
//!
//! let record = |x: &str, y: &str, protocol: &str| -> HashMap<String, String> {
//!     [("x", x), ("y", y), ("protocol", protocol)]
//!         .into_iter()
//!         .map(|(k, v)| (k.to_string(), v.to_string()))
//!         .collect()
//! };
//!
//! // no anomaly
//! assert!(forest.score(&record("0.5", "-0.5", "tcp")).unwrap() < 0.5);
//!
//! // anomalies
//! assert!(forest.score(&record("-12.0", "6.0", "tcp")).unwrap() > 0.5);
//! assert!(forest.score(&record("30.0", "40.0", "icmp")).unwrap() > 0.5);
//! ```

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use log::{debug, trace};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use crate::dataset::{Attribute, AttributeType, Dataset, Row, Value};
pub use crate::error::Error;
#[cfg(feature = "csv")]
pub use crate::ingest::CsvOptions;
pub use crate::split::{Split, SplitCondition};
pub use crate::stats::{AttributeStats, DatasetStats, NumericStats};
pub use crate::tree::Tree;

use crate::dataset::Schema;

mod dataset;
mod error;
#[cfg(feature = "csv")]
mod ingest;
mod split;
pub mod stats;
mod tree;

/// Euler-Mascheroni constant.
const EULER_GAMMA: f64 = 0.5772156649;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ForestOptions {
    /// `n_trees` is the number of trees to be created.
    pub n_trees: usize,

    /// `sample_size` is the number of rows of the training data drawn for the
    /// creation of each tree. Training data with fewer rows is used in full.
    pub sample_size: usize,

    /// `max_tree_depth` is the max. allowed tree depth. This is by default set to
    /// `ceil(log2(sample_size))`.
    pub max_tree_depth: Option<usize>,
}

impl Default for ForestOptions {
    fn default() -> Self {
        Self {
            n_trees: 100,
            sample_size: 256,
            max_tree_depth: None,
        }
    }
}

impl ForestOptions {
    /// The configured depth limit, or the default one for `sample_size`.
    pub fn effective_max_tree_depth(&self) -> usize {
        self.max_tree_depth
            .unwrap_or_else(|| (self.sample_size as f64).log2().ceil() as usize)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.n_trees == 0 {
            Err(Error::InvalidOptions("n_trees must be positive".to_string()))
        } else if self.sample_size < 2 {
            Err(Error::InvalidOptions(
                "sample_size must be at least 2".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

pub struct Forest {
    /// Multiplicative factor used in computing the anomaly scores.
    avg_path_length_c: f64,

    trees: Vec<Tree>,

    /// Attributes of the training data, every scored record has to provide them.
    schema: Arc<Schema>,
}

/// Detailed outcome of [`Forest::explain`].
#[derive(Debug, Clone)]
pub struct ScoreResult {
    pub score: f64,

    /// Average of the path lengths over all trees.
    pub average_path_length: f64,

    /// The typed record which has been scored.
    pub record: Row,

    /// Per tree, the conditions taken from the root down to the leaf.
    pub traces: Vec<Vec<String>>,
}

impl Forest {
    /// Build a new forest from the given training data, seeded from the thread local generator.
    pub fn from_dataset(training_data: &Dataset, options: &ForestOptions) -> Result<Self, Error> {
        Self::from_dataset_with_rng(training_data, options, &mut rand::thread_rng())
    }

    /// Build a new forest from the given training data.
    ///
    /// One seed per tree is drawn from `rng`, every tree then samples and splits using
    /// its own stream. The same `rng` state always yields the same forest.
    pub fn from_dataset_with_rng<R: Rng + ?Sized>(
        training_data: &Dataset,
        options: &ForestOptions,
        rng: &mut R,
    ) -> Result<Self, Error> {
        options.validate()?;
        if training_data.is_empty() {
            return Err(Error::InsufficientTrainingData);
        }

        let max_tree_depth = options.effective_max_tree_depth();
        debug!(
            "building {} trees from {} rows (sample size {}, max depth {})",
            options.n_trees,
            training_data.len(),
            options.sample_size,
            max_tree_depth
        );

        let seeds: Vec<u64> = (0..options.n_trees).map(|_| rng.gen()).collect();
        let build_tree = |(tree_idx, seed): (usize, u64)| {
            let rng = &mut ChaCha8Rng::seed_from_u64(seed);
            let tree_sample = training_data.sample(options.sample_size, rng);
            let tree = Tree::new(&tree_sample, rng, max_tree_depth);
            trace!(
                "tree {} built: depth {}, {} leaves",
                tree_idx,
                tree.depth(),
                tree.leaf_count()
            );
            tree
        };

        #[cfg(feature = "rayon")]
        let trees = seeds.into_par_iter().enumerate().map(build_tree).collect();
        #[cfg(not(feature = "rayon"))]
        let trees = seeds.into_iter().enumerate().map(build_tree).collect();

        debug!("forest built");
        Ok(Self {
            avg_path_length_c: c_factor(options.sample_size),
            trees,
            schema: training_data.schema().clone(),
        })
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    /// The attributes every scored record has to carry.
    pub fn attributes(&self) -> &[Attribute] {
        self.schema.attributes()
    }

    /// Expected average path length for the configured sample size.
    pub fn avg_path_length_c(&self) -> f64 {
        self.avg_path_length_c
    }

    /// Compute the anomaly score of a record given as attribute name to text.
    ///
    /// Keys which are not attributes of the training data are ignored. Fails with
    /// [`Error::MissingAttribute`] when an attribute of the training data has no key,
    /// and with [`Error::Parse`] when a numerical value does not parse.
    pub fn score<K, V, S>(&self, record: &HashMap<K, V, S>) -> Result<f64, Error>
    where
        K: Borrow<str> + Hash + Eq,
        V: AsRef<str>,
        S: BuildHasher,
    {
        let values = self.typed_record(record)?;
        Ok(self.score_values(&values))
    }

    /// Like [`Forest::score`], also returning the average path length and the
    /// conditions taken in every tree.
    pub fn explain<K, V, S>(&self, record: &HashMap<K, V, S>) -> Result<ScoreResult, Error>
    where
        K: Borrow<str> + Hash + Eq,
        V: AsRef<str>,
        S: BuildHasher,
    {
        let values = self.typed_record(record)?;
        let (path_length, traces) = self.trees.iter().map(|tree| tree.trace_values(&values)).fold(
            (0.0, Vec::with_capacity(self.trees.len())),
            |(sum, mut traces), (path_length, trace)| {
                traces.push(trace);
                (sum + path_length, traces)
            },
        );
        let average_path_length = path_length / self.trees.len() as f64;
        Ok(ScoreResult {
            score: self.anomaly_score(average_path_length),
            average_path_length,
            record: Row::from_parts(self.schema.clone(), values),
            traces,
        })
    }

    /// Compute the anomaly score of a typed row, e.g. a row of an evaluation dataset.
    pub fn score_row(&self, row: &Row) -> Result<f64, Error> {
        let values = tree::align_row(&self.schema, row)?;
        Ok(self.score_values(&values))
    }

    /// Scores of every row of `dataset`, in row order.
    pub fn score_dataset(&self, dataset: &Dataset) -> Result<Vec<f64>, Error> {
        let positions = self
            .attributes()
            .iter()
            .map(|attribute| {
                dataset
                    .schema()
                    .position(attribute)
                    .ok_or_else(|| Error::MissingAttribute(attribute.name().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let score_row = |row_idx: usize| {
            let values: Vec<Value> = positions
                .iter()
                .map(|position| dataset.column_at(*position)[row_idx].clone())
                .collect();
            self.score_values(&values)
        };

        #[cfg(feature = "rayon")]
        let scores = (0..dataset.len()).into_par_iter().map(score_row).collect();
        #[cfg(not(feature = "rayon"))]
        let scores = (0..dataset.len()).map(score_row).collect();

        Ok(scores)
    }

    fn typed_record<K, V, S>(&self, record: &HashMap<K, V, S>) -> Result<Vec<Value>, Error>
    where
        K: Borrow<str> + Hash + Eq,
        V: AsRef<str>,
        S: BuildHasher,
    {
        self.attributes()
            .iter()
            .map(|attribute| {
                let text = record
                    .get(attribute.name())
                    .ok_or_else(|| Error::MissingAttribute(attribute.name().to_string()))?;
                attribute.parse_value(text.as_ref())
            })
            .collect()
    }

    fn score_values(&self, values: &[Value]) -> f64 {
        let path_length: f64 = self
            .trees
            .iter()
            .map(|tree| tree.path_length_values(values))
            .sum();

        // Average of path length travelled by the point in all trees.
        self.anomaly_score(path_length / self.trees.len() as f64)
    }

    fn anomaly_score(&self, eh: f64) -> f64 {
        2.0_f64.powf(-eh / self.avg_path_length_c)
    }
}

/// Average path length of unsuccessful search in a binary search tree given n points
/// n: Number of data points for the BST.
///
/// Returns the average path length of unsuccessful search in a BST, zero for `n <= 1`.
pub fn c_factor(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    2.0 * harmonic_number(n - 1) - (2.0 * (n as f64 - 1.0) / n as f64)
}

/// Approximation of the n-th harmonic number.
fn harmonic_number(n: usize) -> f64 {
    (n as f64).ln() + EULER_GAMMA
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rand::distributions::Uniform;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use crate::{c_factor, Attribute, Dataset, Error, Forest, ForestOptions};

    fn make_forest(seed: u64) -> Forest {
        let rng = &mut ChaCha8Rng::seed_from_u64(seed);
        let distribution = Uniform::new(-4., 4.);
        let distribution2 = Uniform::new(10., 50.);

        let rows: Vec<_> = (0..6000)
            .map(|_| {
                vec![
                    rng.sample(distribution),
                    rng.sample(distribution),
                    rng.sample(distribution2),
                ]
                .into_iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
            })
            .collect();
        let training_data = Dataset::from_rows(
            vec![
                Attribute::numerical("a"),
                Attribute::numerical("b"),
                Attribute::numerical("c"),
            ],
            rows,
        )
        .unwrap();

        let options = ForestOptions {
            n_trees: 150,
            sample_size: 200,
            max_tree_depth: None,
        };
        Forest::from_dataset_with_rng(&training_data, &options, rng).unwrap()
    }

    fn record(values: [f64; 3]) -> HashMap<String, String> {
        ["a", "b", "c"]
            .iter()
            .zip(values)
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn score_forest_3d_f64() {
        let forest = make_forest(1);

        // no anomaly
        assert!(forest.score(&record([0.0, 0.0, 30.0])).unwrap() < 0.5);
        assert!(forest.score(&record([0.5, -0.5, 28.0])).unwrap() < 0.5);

        // anomalies
        assert!(forest.score(&record([-12.0, 6.0, 25.0])).unwrap() > 0.5);
        assert!(forest.score(&record([-1.0, 2.0, 60.0])).unwrap() > 0.5);
        assert!(forest.score(&record([-1.0, 2.0, 0.0])).unwrap() > 0.5);
    }

    #[test]
    fn build_and_score_are_reproducible() {
        let forest = make_forest(9);
        let forest2 = make_forest(9);
        for values in [[1.0, 3.0, 25.0], [-12.0, 6.0, 25.0], [0.0, 0.0, 0.0]] {
            assert_eq!(
                forest.score(&record(values)).unwrap().to_bits(),
                forest2.score(&record(values)).unwrap().to_bits()
            );
        }
    }

    #[test]
    fn c_factor_values() {
        assert_eq!(c_factor(0), 0.0);
        assert_eq!(c_factor(1), 0.0);
        assert!((c_factor(2) - 0.1544313298).abs() < 1e-9);
        assert!((c_factor(256) - 10.2448).abs() < 0.01);
        for n in 2..1000 {
            let expected =
                2.0 * ((n as f64 - 1.0).ln() + 0.5772156649) - 2.0 * (n as f64 - 1.0) / n as f64;
            assert!((c_factor(n) - expected).abs() < 1e-12);
            assert!(c_factor(n + 1) > c_factor(n));
        }
    }

    #[test]
    fn default_depth_limit() {
        let options = ForestOptions::default();
        assert_eq!(options.sample_size, 256);
        assert_eq!(options.effective_max_tree_depth(), 8);
        assert_eq!(
            ForestOptions {
                sample_size: 200,
                ..Default::default()
            }
            .effective_max_tree_depth(),
            8
        );
    }

    #[test]
    fn invalid_build_input() {
        let ds = Dataset::new(vec![Attribute::numerical("a")]).unwrap();
        assert!(matches!(
            Forest::from_dataset(&ds, &ForestOptions::default()),
            Err(Error::InsufficientTrainingData)
        ));
        assert!(matches!(
            Forest::from_dataset(
                &ds,
                &ForestOptions {
                    n_trees: 0,
                    ..Default::default()
                }
            ),
            Err(Error::InvalidOptions(_))
        ));
        assert!(matches!(
            Forest::from_dataset(
                &ds,
                &ForestOptions {
                    sample_size: 1,
                    ..Default::default()
                }
            ),
            Err(Error::InvalidOptions(_))
        ));
    }

    #[test]
    fn score_rejects_incomplete_records() {
        let forest = make_forest(2);
        let mut incomplete = record([1.0, 3.0, 25.0]);
        incomplete.remove("b");
        assert!(matches!(
            forest.score(&incomplete),
            Err(Error::MissingAttribute(name)) if name == "b"
        ));

        let mut malformed = record([1.0, 3.0, 25.0]);
        malformed.insert("c".to_string(), "twenty".to_string());
        assert!(matches!(forest.score(&malformed), Err(Error::Parse { .. })));

        let mut extended = record([1.0, 3.0, 25.0]);
        extended.insert("label".to_string(), "normal".to_string());
        assert!(forest.score(&extended).is_ok());
    }

    #[test]
    fn explain_matches_score() {
        let forest = make_forest(3);
        let point = record([-12.0, 6.0, 25.0]);
        let result = forest.explain(&point).unwrap();
        assert_eq!(result.score, forest.score(&point).unwrap());
        assert_eq!(result.traces.len(), 150);
        assert!(result
            .traces
            .iter()
            .all(|trace| trace.last().unwrap().starts_with("leaf reached")));
        assert_eq!(forest.score_row(&result.record).unwrap(), result.score);
        assert!(result.average_path_length > 0.0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serialize_options_and_schema() {
        let options = ForestOptions {
            n_trees: 10,
            sample_size: 64,
            max_tree_depth: Some(4),
        };
        let options_json = serde_json::to_string(&options).unwrap();
        let options2: ForestOptions = serde_json::from_str(options_json.as_str()).unwrap();
        assert_eq!(options, options2);

        let attributes = vec![Attribute::categorical("Color"), Attribute::numerical("Cost")];
        let attributes_json = serde_json::to_string(&attributes).unwrap();
        let attributes2: Vec<Attribute> = serde_json::from_str(attributes_json.as_str()).unwrap();
        assert_eq!(attributes, attributes2);
    }
}
