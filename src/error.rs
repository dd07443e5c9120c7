#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The shape of a row or a column set disagrees with the dataset schema.
    #[error("schema error: {0}")]
    Schema(String),

    #[error("error parsing value {value:?} of attribute {attribute} as a finite float")]
    Parse { attribute: String, value: String },

    #[error("attribute {0} does not exist in the dataset")]
    UnknownAttribute(String),

    #[error("attribute {0} is missing in the row")]
    MissingAttribute(String),

    #[error("row index {index} is out of range for a dataset of size {size}")]
    Index { index: usize, size: usize },

    #[error("cannot exclude all attributes")]
    EmptyProjection,

    /// Raised by merge. `dataset` is the position of the offending argument.
    #[error("data set {dataset} attributes do not match: {attributes:?}")]
    SchemaMismatch {
        dataset: usize,
        attributes: Vec<String>,
    },

    /// Every attribute is excluded or there are no rows left. Tree construction
    /// turns this into a leaf.
    #[error("dataset not splittable")]
    NotSplittable,

    #[error("insufficient training data")]
    InsufficientTrainingData,

    #[error("invalid forest options: {0}")]
    InvalidOptions(String),

    #[error("empty input")]
    EmptyInput,

    #[cfg(feature = "csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
