//! CSV reading and writing for [`Dataset`].

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;

use log::debug;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::dataset::{Attribute, AttributeType, Dataset};
use crate::error::Error;

/// Column configuration for [`Dataset::from_csv_reader`].
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CsvOptions {
    /// Declared type per column name. Columns without a declared type are categorical.
    pub types: HashMap<String, AttributeType>,

    /// Columns which are skipped entirely.
    pub exclude: HashSet<String>,
}

impl CsvOptions {
    pub fn with_type(mut self, name: impl Into<String>, kind: AttributeType) -> Self {
        self.types.insert(name.into(), kind);
        self
    }

    pub fn excluding(mut self, name: impl Into<String>) -> Self {
        self.exclude.insert(name.into());
        self
    }
}

impl Dataset {
    /// Read a dataset from CSV data with a header row.
    ///
    /// Fields are trimmed. A record with a different number of fields than the
    /// header is rejected, as is any declared or excluded column missing from the header.
    pub fn from_csv_reader<R: io::Read>(reader: R, options: &CsvOptions) -> Result<Self, Error> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut records = csv_reader.records();

        let header = match records.next() {
            Some(header) => header?,
            None => return Err(Error::EmptyInput),
        };

        let mut missing: Vec<&str> = options
            .types
            .keys()
            .chain(options.exclude.iter())
            .filter(|name| !header.iter().any(|column| column == name.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            missing.dedup();
            return Err(Error::Schema(format!(
                "attributes not found in the CSV header: {:?}",
                missing
            )));
        }

        let columns: Vec<(usize, Attribute)> = header
            .iter()
            .enumerate()
            .filter(|(_, name)| !options.exclude.contains(*name))
            .map(|(column_idx, name)| {
                let kind = options.types.get(name).copied().unwrap_or_default();
                (column_idx, Attribute::new(name, kind))
            })
            .collect();
        let mut dataset = Self::new(columns.iter().map(|(_, a)| a.clone()).collect())?;

        let width = header.len();
        for (row_idx, record) in records.enumerate() {
            let record = record?;
            if record.len() != width {
                return Err(Error::Schema(format!(
                    "row {} has {} columns, expected {}",
                    row_idx + 1,
                    record.len(),
                    width
                )));
            }
            let values = columns
                .iter()
                .map(|(column_idx, attribute)| {
                    attribute
                        .parse_value(&record[*column_idx])
                        .map(|value| (attribute.clone(), value))
                })
                .collect::<Result<Vec<_>, _>>()?;
            dataset.add_row(values)?;
        }

        debug!(
            "read {} rows with {} attributes from CSV",
            dataset.len(),
            dataset.attributes().len()
        );
        Ok(dataset)
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P, options: &CsvOptions) -> Result<Self, Error> {
        let file = std::fs::File::open(path).map_err(csv::Error::from)?;
        Self::from_csv_reader(io::BufReader::new(file), options)
    }

    /// Write the header and all rows, values in attribute order.
    pub fn to_csv_writer<W: io::Write>(&self, writer: W) -> Result<(), Error> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(self.attributes().iter().map(Attribute::name))?;
        for row in self.rows() {
            csv_writer.write_record(
                row.iter()
                    .map(|(attribute, value)| attribute.format_value(value)),
            )?;
        }
        csv_writer.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::CsvOptions;
    use crate::{Attribute, AttributeType, Dataset, Error, Value};

    const FRUITS: &str = "Name,Color,Ignore,Cost
        apple,red,x,0.5
        banana,yellow,x,0.2
        pear,green,x,0.8";

    fn options() -> CsvOptions {
        CsvOptions::default()
            .with_type("Cost", AttributeType::Numerical)
            .excluding("Ignore")
    }

    #[test]
    fn read_typed_columns() {
        let ds = Dataset::from_csv_reader(FRUITS.as_bytes(), &options()).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(
            ds.attributes(),
            &[
                Attribute::categorical("Name"),
                Attribute::categorical("Color"),
                Attribute::numerical("Cost"),
            ]
        );
        assert_eq!(
            ds.column("Name").unwrap(),
            &[
                Value::from("apple"),
                Value::from("banana"),
                Value::from("pear")
            ]
        );
        assert_eq!(
            ds.column("Cost").unwrap(),
            &[Value::Num(0.5), Value::Num(0.2), Value::Num(0.8)]
        );
    }

    #[test]
    fn read_errors_are_typed() {
        assert!(matches!(
            Dataset::from_csv_reader("".as_bytes(), &options()),
            Err(Error::EmptyInput)
        ));
        assert!(matches!(
            Dataset::from_csv_reader("Name,Color\napple,red\n".as_bytes(), &options()),
            Err(Error::Schema(_))
        ));
        assert!(matches!(
            Dataset::from_csv_reader(
                "Name,Color,Ignore,Cost\napple,red,x\n".as_bytes(),
                &options()
            ),
            Err(Error::Schema(_))
        ));
        assert!(matches!(
            Dataset::from_csv_reader(
                "Name,Color,Ignore,Cost\napple,red,x,cheap\n".as_bytes(),
                &options()
            ),
            Err(Error::Parse { attribute, value }) if attribute == "Cost" && value == "cheap"
        ));
    }

    #[test]
    fn write_then_read_back() {
        let ds = Dataset::from_csv_reader(FRUITS.as_bytes(), &options()).unwrap();
        let mut buffer = Vec::new();
        ds.to_csv_writer(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("Name,Color,Cost\napple,red,0.5\n"));

        let read_back = Dataset::from_csv_reader(
            text.as_bytes(),
            &CsvOptions::default().with_type("Cost", AttributeType::Numerical),
        )
        .unwrap();
        assert_eq!(read_back, ds);
    }
}
