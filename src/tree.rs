use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use rand::Rng;

use crate::dataset::{Attribute, Dataset, Row, Schema, Value};
use crate::error::Error;
use crate::split::{Split, SplitCondition};
use crate::c_factor;

enum Node {
    Ex(ExNode),
    In(InNode),
}

struct InNode {
    /// Child receiving the rows passing `condition`.
    left: Box<Node>,

    /// Child receiving the rows failing `condition`.
    right: Box<Node>,

    condition: SplitCondition,

    /// Column position of the split attribute in the training schema.
    position: usize,

    /// Size of the dataset present at the node.
    num_samples: usize,
}

struct ExNode {
    /// Size of the dataset present at the node.
    num_samples: usize,
}

/// A randomly grown isolation tree.
pub struct Tree {
    root: Node,
    schema: Arc<Schema>,
}

impl Tree {
    /// Grow a tree from `samples` until every leaf holds at most one row, reached
    /// `max_tree_depth` or has no attribute left to split on.
    pub fn new<R: Rng + ?Sized>(samples: &Dataset, rng: &mut R, max_tree_depth: usize) -> Self {
        Self {
            root: Self::make_tree(samples, rng, 0, max_tree_depth, &HashSet::new()),
            schema: samples.schema().clone(),
        }
    }

    fn make_tree<R: Rng + ?Sized>(
        samples: &Dataset,
        rng: &mut R,
        current_tree_depth: usize,
        max_tree_depth: usize,
        excluded: &HashSet<Attribute>,
    ) -> Node {
        let num_samples = samples.len();
        if current_tree_depth >= max_tree_depth || num_samples <= 1 {
            return Node::Ex(ExNode { num_samples });
        }

        let Some((position, split)) = samples.random_split(excluded, rng) else {
            return Node::Ex(ExNode { num_samples });
        };
        let Split {
            condition,
            matched,
            unmatched,
        } = split;

        // An attribute that sent every row to one side cannot separate the rows of
        // this branch any further. Only the subtree below sees the extended set.
        let excluded = if matched.is_empty() || unmatched.is_empty() {
            let mut extended = excluded.clone();
            extended.insert(condition.attribute().clone());
            Cow::Owned(extended)
        } else {
            Cow::Borrowed(excluded)
        };

        Node::In(InNode {
            left: Box::new(Self::make_tree(
                &matched,
                rng,
                current_tree_depth + 1,
                max_tree_depth,
                &excluded,
            )),
            right: Box::new(Self::make_tree(
                &unmatched,
                rng,
                current_tree_depth + 1,
                max_tree_depth,
                &excluded,
            )),
            condition,
            position,
            num_samples,
        })
    }

    /// Estimated path length of `row`: the number of splits from the root to the
    /// leaf the row falls into, plus `c(n)` for the `n` rows left unresolved at that leaf.
    ///
    /// `row` needs a value for every attribute the tree was trained on.
    pub fn path_length(&self, row: &Row) -> Result<f64, Error> {
        let values = align_row(&self.schema, row)?;
        Ok(self.path_length_values(&values))
    }

    /// Path length of a record aligned with the training schema.
    pub(crate) fn path_length_values(&self, values: &[Value]) -> f64 {
        let mut path_length = 0.0;
        let mut node = &self.root;
        loop {
            match node {
                Node::Ex(ex_node) => return path_length + c_factor(ex_node.num_samples),
                Node::In(in_node) => {
                    node = in_node.next(values);
                    path_length += 1.0;
                }
            }
        }
    }

    /// Like [`Tree::path_length_values`], also listing the conditions taken.
    pub(crate) fn trace_values(&self, values: &[Value]) -> (f64, Vec<String>) {
        let mut traces = Vec::new();
        let mut path_length = 0.0;
        let mut node = &self.root;
        loop {
            match node {
                Node::Ex(ex_node) => {
                    traces.push(format!(
                        "leaf reached, path length {}, remaining size {}",
                        path_length, ex_node.num_samples
                    ));
                    return (path_length + c_factor(ex_node.num_samples), traces);
                }
                Node::In(in_node) => {
                    let value = &values[in_node.position];
                    let passed = in_node.condition.check(value);
                    traces.push(format!(
                        "{} ({})",
                        in_node.condition.describe(!passed),
                        in_node.condition.attribute().format_value(value)
                    ));
                    node = in_node.next(values);
                    path_length += 1.0;
                }
            }
        }
    }

    /// Depth of the deepest leaf.
    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    pub fn leaf_count(&self) -> usize {
        self.root.leaf_count()
    }

    /// Number of rows the tree was grown from.
    pub fn num_samples(&self) -> usize {
        self.root.num_samples()
    }
}

impl InNode {
    fn next(&self, values: &[Value]) -> &Node {
        if self.condition.check(&values[self.position]) {
            self.left.as_ref()
        } else {
            self.right.as_ref()
        }
    }
}

impl Node {
    fn depth(&self) -> usize {
        match self {
            Self::Ex(_) => 0,
            Self::In(in_node) => 1 + in_node.left.depth().max(in_node.right.depth()),
        }
    }

    fn leaf_count(&self) -> usize {
        match self {
            Self::Ex(_) => 1,
            Self::In(in_node) => in_node.left.leaf_count() + in_node.right.leaf_count(),
        }
    }

    fn num_samples(&self) -> usize {
        match self {
            Self::Ex(ex_node) => ex_node.num_samples,
            Self::In(in_node) => in_node.num_samples,
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match self {
            Self::Ex(ex_node) => writeln!(f, "{}Leaf [{}]", indent, ex_node.num_samples),
            Self::In(in_node) => {
                writeln!(f, "{}Node [{}]", indent, in_node.num_samples)?;
                writeln!(f, "{}{}", indent, in_node.condition.describe(false))?;
                in_node.left.write_indented(f, depth + 1)?;
                writeln!(f, "{}{}", indent, in_node.condition.describe(true))?;
                in_node.right.write_indented(f, depth + 1)
            }
        }
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.write_indented(f, 0)
    }
}

/// Values of `row` in the order of `schema`. Fails before anything is traversed when
/// an attribute is absent.
pub(crate) fn align_row(schema: &Schema, row: &Row) -> Result<Vec<Value>, Error> {
    schema
        .attributes()
        .iter()
        .map(|attribute| {
            row.value(attribute)
                .cloned()
                .ok_or_else(|| Error::MissingAttribute(attribute.name().to_string()))
        })
        .collect()
}
