//! Column oriented storage of typed tabular data.
//!
//! A [`Dataset`] holds one column per [`Attribute`]. Rows are not stored, they are
//! materialized on demand as [`Row`] values by reading every column at the same
//! position. Derived datasets (filtered, sampled, split) share the attribute list
//! of their source.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use rand::{
    seq::{index, SliceRandom},
    Rng,
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AttributeType {
    /// Values are compared for equality only.
    #[default]
    Categorical,

    /// Values are finite floats compared against a threshold.
    Numerical,
}

/// A named, typed column of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Attribute {
    name: String,
    kind: AttributeType,
}

impl Attribute {
    pub fn new(name: impl Into<String>, kind: AttributeType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn categorical(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Categorical)
    }

    pub fn numerical(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Numerical)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AttributeType {
        self.kind
    }

    /// Convert the textual representation of a value into a typed value of this attribute.
    ///
    /// Categorical text is trimmed. Numerical text must parse as a finite float.
    pub fn parse_value(&self, text: &str) -> Result<Value, Error> {
        let text = text.trim();
        match self.kind {
            AttributeType::Categorical => Ok(Value::Str(text.to_string())),
            AttributeType::Numerical => match text.parse::<f64>() {
                Ok(num) if num.is_finite() => Ok(Value::Num(num)),
                _ => Err(self.parse_error(text)),
            },
        }
    }

    /// Textual representation of `value`, the inverse of [`Attribute::parse_value`].
    pub fn format_value(&self, value: &Value) -> String {
        value.to_string()
    }

    pub(crate) fn validate(&self, value: &Value) -> Result<(), Error> {
        match (self.kind, value) {
            (AttributeType::Categorical, Value::Str(_)) => Ok(()),
            (AttributeType::Numerical, Value::Num(num)) if num.is_finite() => Ok(()),
            (AttributeType::Numerical, Value::Num(num)) => Err(self.parse_error(&num.to_string())),
            _ => Err(Error::Schema(format!(
                "value {} does not match the type of attribute {}",
                value, self
            ))),
        }
    }

    fn parse_error(&self, text: &str) -> Error {
        Error::Parse {
            attribute: self.name.clone(),
            value: text.to_string(),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AttributeType::Categorical => write!(f, "{} (categorical)", self.name),
            AttributeType::Numerical => write!(f, "{} (numerical)", self.name),
        }
    }
}

/// A single cell of a dataset. The variant always agrees with the type of the
/// attribute owning the column.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Value {
    Str(String),
    Num(f64),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            Self::Num(_) => None,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Self::Str(_) => None,
            Self::Num(num) => Some(*num),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Num(num) => write!(f, "{}", num),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<f64> for Value {
    fn from(num: f64) -> Self {
        Self::Num(num)
    }
}

/// Ordered attribute list plus a name lookup table.
#[derive(Debug, PartialEq)]
pub(crate) struct Schema {
    attributes: Vec<Attribute>,
    positions: HashMap<String, usize>,
}

impl Schema {
    pub(crate) fn new(attributes: Vec<Attribute>) -> Result<Self, Error> {
        let mut positions = HashMap::with_capacity(attributes.len());
        for (position, attribute) in attributes.iter().enumerate() {
            if positions.insert(attribute.name.clone(), position).is_some() {
                return Err(Error::Schema(format!(
                    "attribute {} is declared more than once",
                    attribute.name
                )));
            }
        }
        Ok(Self {
            attributes,
            positions,
        })
    }

    pub(crate) fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub(crate) fn position_by_name(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Position of an attribute matching both name and type.
    pub(crate) fn position(&self, attribute: &Attribute) -> Option<usize> {
        self.position_by_name(&attribute.name)
            .filter(|position| self.attributes[*position].kind == attribute.kind)
    }
}

/// A materialized row. Values are kept in the order of the owning dataset's attributes.
#[derive(Debug, Clone)]
pub struct Row {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn from_parts(schema: Arc<Schema>, values: Vec<Value>) -> Self {
        debug_assert_eq!(schema.attributes.len(), values.len());
        Self { schema, values }
    }

    /// Value of the attribute with the given name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema
            .position_by_name(name)
            .map(|position| &self.values[position])
    }

    /// Value of the attribute, matching both name and type.
    pub fn value(&self, attribute: &Attribute) -> Option<&Value> {
        self.schema
            .position(attribute)
            .map(|position| &self.values[position])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Attribute, &Value)> {
        self.schema.attributes.iter().zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.schema.attributes == other.schema.attributes && self.values == other.values
    }
}

impl IntoIterator for Row {
    type Item = (Attribute, Value);
    type IntoIter = std::iter::Zip<std::vec::IntoIter<Attribute>, std::vec::IntoIter<Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.schema
            .attributes
            .clone()
            .into_iter()
            .zip(self.values)
    }
}

/// Typed, column oriented table.
///
/// Every column has exactly `len()` values. Apart from [`Dataset::add_row`] all
/// operations leave the dataset untouched and return new instances.
#[derive(Debug, Clone)]
pub struct Dataset {
    schema: Arc<Schema>,
    columns: Vec<Vec<Value>>,
    size: usize,
}

impl Dataset {
    /// Create an empty dataset with the given attributes. Attribute names must be unique.
    pub fn new(attributes: Vec<Attribute>) -> Result<Self, Error> {
        Ok(Self::with_schema(Arc::new(Schema::new(attributes)?)))
    }

    /// Build a dataset from rows of text, given positionally in attribute order.
    pub fn from_rows<I, R, S>(attributes: Vec<Attribute>, rows: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut dataset = Self::new(attributes)?;
        for (row_idx, row) in rows.into_iter().enumerate() {
            let mut fields = row.into_iter();
            let mut values = Vec::with_capacity(dataset.columns.len());
            for attribute in dataset.schema.attributes.iter() {
                let field = fields.next().ok_or_else(|| {
                    Error::Schema(format!(
                        "row {} has no value for attribute {}",
                        row_idx,
                        attribute.name()
                    ))
                })?;
                values.push(attribute.parse_value(field.as_ref())?);
            }
            if fields.next().is_some() {
                return Err(Error::Schema(format!(
                    "row {} has more than {} values",
                    row_idx,
                    dataset.columns.len()
                )));
            }
            dataset.push_values(values);
        }
        Ok(dataset)
    }

    pub(crate) fn with_schema(schema: Arc<Schema>) -> Self {
        let columns = vec![Vec::new(); schema.attributes.len()];
        Self {
            schema,
            columns,
            size: 0,
        }
    }

    pub(crate) fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn attributes(&self) -> &[Attribute] {
        self.schema.attributes()
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.schema
            .position_by_name(name)
            .map(|position| &self.schema.attributes[position])
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// All values of the named attribute, in row order.
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.schema
            .position_by_name(name)
            .map(|position| self.columns[position].as_slice())
    }

    pub(crate) fn column_at(&self, position: usize) -> &[Value] {
        &self.columns[position]
    }

    /// A dataset with the same attributes and no rows.
    pub fn copy_no_values(&self) -> Self {
        Self::with_schema(self.schema.clone())
    }

    pub fn row(&self, idx: usize) -> Result<Row, Error> {
        self.check_index(idx)?;
        Ok(Row::from_parts(self.schema.clone(), self.values_at(idx)))
    }

    /// The row at `idx` keyed by attribute name.
    pub fn row_by_name(&self, idx: usize) -> Result<BTreeMap<String, Value>, Error> {
        self.check_index(idx)?;
        Ok(self
            .schema
            .attributes
            .iter()
            .zip(self.columns.iter())
            .map(|(attribute, column)| (attribute.name.clone(), column[idx].clone()))
            .collect())
    }

    /// The row at `idx` keyed by attribute name, with every value formatted as text.
    pub fn plain_row(&self, idx: usize) -> Result<BTreeMap<String, String>, Error> {
        self.check_index(idx)?;
        Ok(self
            .schema
            .attributes
            .iter()
            .zip(self.columns.iter())
            .map(|(attribute, column)| {
                (attribute.name.clone(), attribute.format_value(&column[idx]))
            })
            .collect())
    }

    pub fn rows(&self) -> impl Iterator<Item = Row> + '_ {
        (0..self.size).map(move |idx| Row::from_parts(self.schema.clone(), self.values_at(idx)))
    }

    /// Append a row. The row has to carry exactly one value for every attribute.
    ///
    /// Nothing is appended when the row is rejected.
    pub fn add_row<I>(&mut self, row: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (Attribute, Value)>,
    {
        let mut values: Vec<Option<Value>> = vec![None; self.columns.len()];
        for (attribute, value) in row {
            let position = self
                .schema
                .position(&attribute)
                .ok_or_else(|| Error::UnknownAttribute(attribute.name.clone()))?;
            attribute.validate(&value)?;
            if values[position].replace(value).is_some() {
                return Err(Error::Schema(format!(
                    "attribute {} given more than once",
                    attribute.name
                )));
            }
        }

        let values = values
            .into_iter()
            .zip(self.schema.attributes.iter())
            .map(|(value, attribute)| {
                value.ok_or_else(|| Error::MissingAttribute(attribute.name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.push_values(values);
        Ok(())
    }

    /// Rows for which `predicate` returns true, in their original order.
    pub fn filter<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&Row) -> bool,
    {
        let mut filtered = self.copy_no_values();
        for row in self.rows() {
            if predicate(&row) {
                filtered.push_values(row.values);
            }
        }
        filtered
    }

    /// The first `min(n, len())` rows.
    pub fn limit(&self, n: usize) -> Self {
        self.gather(0..n.min(self.size))
    }

    /// A copy with the rows in random order.
    pub fn shuffle<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        let mut order: Vec<usize> = (0..self.size).collect();
        order.shuffle(rng);
        self.gather(order)
    }

    /// Draw `min(n, len())` distinct rows uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Self {
        let amount = n.min(self.size);
        self.gather(index::sample(rng, self.size, amount).into_iter())
    }

    /// Rows of `self` followed by the rows of every dataset in `others`, in order.
    ///
    /// All datasets have to declare the same attributes, the order may differ.
    pub fn merge(&self, others: &[&Dataset]) -> Result<Self, Error> {
        // resolve every column mapping up front so a failure leaves nothing half merged
        let mappings = others
            .iter()
            .enumerate()
            .map(|(dataset_idx, other)| self.column_mapping(dataset_idx, other))
            .collect::<Result<Vec<_>, _>>()?;

        let mut merged = self.clone();
        for (other, mapping) in others.iter().zip(mappings) {
            for (column, other_position) in merged.columns.iter_mut().zip(mapping) {
                column.extend_from_slice(&other.columns[other_position]);
            }
            merged.size += other.size;
        }
        Ok(merged)
    }

    /// Project onto the named attributes, in the given order.
    pub fn select_attributes<I, S>(&self, names: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let positions = names
            .into_iter()
            .map(|name| {
                let name = name.as_ref();
                self.schema
                    .position_by_name(name)
                    .ok_or_else(|| Error::UnknownAttribute(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if positions.is_empty() {
            return Err(Error::EmptyProjection);
        }
        self.project(positions)
    }

    /// Project onto every attribute except the named ones.
    pub fn excluding_attributes<I, S>(&self, names: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut excluded = HashSet::new();
        for name in names {
            let name = name.as_ref();
            let position = self
                .schema
                .position_by_name(name)
                .ok_or_else(|| Error::UnknownAttribute(name.to_string()))?;
            excluded.insert(position);
        }
        if excluded.len() == self.columns.len() {
            return Err(Error::EmptyProjection);
        }
        self.project(
            (0..self.columns.len())
                .filter(|position| !excluded.contains(position))
                .collect(),
        )
    }

    fn project(&self, positions: Vec<usize>) -> Result<Self, Error> {
        let attributes = positions
            .iter()
            .map(|position| self.schema.attributes[*position].clone())
            .collect();
        let columns = positions
            .iter()
            .map(|position| self.columns[*position].clone())
            .collect();
        Ok(Self {
            schema: Arc::new(Schema::new(attributes)?),
            columns,
            size: self.size,
        })
    }

    fn column_mapping(&self, dataset_idx: usize, other: &Dataset) -> Result<Vec<usize>, Error> {
        let mut mismatched: Vec<String> = self
            .schema
            .attributes
            .iter()
            .filter(|attribute| other.schema.position(attribute).is_none())
            .chain(
                other
                    .schema
                    .attributes
                    .iter()
                    .filter(|attribute| self.schema.position(attribute).is_none()),
            )
            .map(|attribute| attribute.name.clone())
            .collect();

        if !mismatched.is_empty() {
            mismatched.sort();
            mismatched.dedup();
            return Err(Error::SchemaMismatch {
                dataset: dataset_idx,
                attributes: mismatched,
            });
        }

        Ok(self
            .schema
            .attributes
            .iter()
            .filter_map(|attribute| other.schema.position(attribute))
            .collect())
    }

    /// New dataset sharing the schema, holding the rows at `indices`.
    pub(crate) fn gather<I>(&self, indices: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut gathered = self.copy_no_values();
        for idx in indices {
            gathered.push_values(self.values_at(idx));
        }
        gathered
    }

    fn values_at(&self, idx: usize) -> Vec<Value> {
        self.columns.iter().map(|column| column[idx].clone()).collect()
    }

    fn push_values(&mut self, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.columns.len());
        for (column, value) in self.columns.iter_mut().zip(values) {
            column.push(value);
        }
        self.size += 1;
    }

    fn check_index(&self, idx: usize) -> Result<(), Error> {
        if idx < self.size {
            Ok(())
        } else {
            Err(Error::Index {
                index: idx,
                size: self.size,
            })
        }
    }
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.schema.attributes == other.schema.attributes && self.columns == other.columns
    }
}
