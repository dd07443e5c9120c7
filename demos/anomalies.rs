use std::path::{Path, PathBuf};

use eyre::{eyre, Result};

use tabular_isolation_forest::{AttributeType, CsvOptions, Dataset, Forest, ForestOptions};

/// Reads the header of `path` and declares every column except `label` as numerical.
fn numerical_options(path: &Path, label: Option<&str>) -> Result<CsvOptions> {
    let mut csv_reader = csv::Reader::from_path(path)?;
    let mut options = CsvOptions::default();
    for name in csv_reader.headers()?.iter().map(str::trim) {
        if Some(name) == label {
            options = options.excluding(name);
        } else {
            options = options.with_type(name, AttributeType::Numerical);
        }
    }
    Ok(options)
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let file_path: PathBuf = args
        .next()
        .ok_or_else(|| eyre!("usage: anomalies <csv file> [label column]"))?
        .into();
    let label = args.next();

    let training_data = Dataset::from_csv_path(
        &file_path,
        &numerical_options(&file_path, label.as_deref())?,
    )?;
    println!("{}", training_data.stats());

    // train a forest
    let forest = Forest::from_dataset(&training_data, &ForestOptions::default())?;

    // score every row, labels are read from a second pass over the file
    let scores = forest.score_dataset(&training_data)?;
    let labels = match label.as_deref() {
        Some(label) => {
            let labelled = Dataset::from_csv_path(&file_path, &CsvOptions::default())?;
            labelled
                .column(label)
                .ok_or_else(|| eyre!("label column {} not found", label))?
                .iter()
                .map(|value| value.to_string())
                .collect()
        }
        None => vec![String::new(); scores.len()],
    };

    let mut ranked: Vec<_> = scores.iter().zip(labels.iter()).enumerate().collect();
    ranked.sort_by(|(_, (a, _)), (_, (b, _))| b.total_cmp(a));

    println!("{:<10} {:<10} {}", "Row", "Score", "Label");
    for (row_idx, (score, label)) in ranked.into_iter().take(20) {
        println!("{:<10} {:<10.4} {}", row_idx, score, label);
    }
    Ok(())
}
