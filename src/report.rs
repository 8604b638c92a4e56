// report.rs

use crate::matrix::RoleMatrix;
use crate::scoring::{mismatched_columns, round_to, ConsistencyScores};
use anyhow::{anyhow, Result};
use log::{debug, info};
use ndarray::ArrayView2;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

pub(crate) const SUMMARY_FILE: &str = "summary.out";

/// Decimal places used in the per-genome text and the summary file.
const TEXT_DECIMALS: i32 = 1;
/// Decimal places of the score table written to the debug log.
const TABLE_DECIMALS: i32 = 2;

fn format_score(value: f64) -> String {
    format!("{:.1}", round_to(value, TEXT_DECIMALS))
}

/// Renders a count the way the pipeline expects it: truncated toward zero.
fn format_count(value: f64) -> String {
    format!("{}", value.trunc() as i64)
}

/// Builds the block appended to one genome's `.out` file.
pub(crate) fn genome_block(
    matrix: &RoleMatrix,
    predictions: ArrayView2<f64>,
    scores: &ConsistencyScores,
    row: usize,
) -> Vec<String> {
    let mut lines = vec![
        format!("Coarse Consistency: {}", format_score(scores.coarse[row])),
        format!("Fine Consistency: {}", format_score(scores.fine[row])),
    ];
    for col in mismatched_columns(matrix.x.view(), predictions, row) {
        lines.push(format!(
            "{}\t{}\t{}",
            matrix.role_id(col),
            format_count(predictions[[row, col]]),
            format_count(matrix.x[[row, col]])
        ));
    }
    lines
}

fn append_lines(path: &Path, lines: &[String]) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| anyhow!("Failed to open {} for appending: {}", path.display(), e))?;
    let mut writer = BufWriter::new(file);
    for line in lines {
        writeln!(writer, "{}", line)?;
    }
    writer.flush()?;
    Ok(())
}

/// Appends a consistency block to `<out_dir>/<genome>.out` for every genome,
/// creating `out_dir` when it is missing. Existing file content is kept.
pub(crate) fn write_genome_reports(
    out_dir: &Path,
    matrix: &RoleMatrix,
    predictions: ArrayView2<f64>,
    scores: &ConsistencyScores,
) -> Result<()> {
    if !out_dir.is_dir() {
        fs::create_dir_all(out_dir)
            .map_err(|e| anyhow!("Failed to create output directory {}: {}", out_dir.display(), e))?;
        info!("Created output directory: {}", out_dir.display());
    }

    for (row, genome) in matrix.genomes.iter().enumerate() {
        let path = out_dir.join(format!("{}.out", genome.id));
        let block = genome_block(matrix, predictions, scores, row);
        debug!(
            "Appending {} mismatch line(s) to {}",
            block.len() - 2,
            path.display()
        );
        append_lines(&path, &block)?;
    }
    info!(
        "Appended consistency blocks for {} genome(s) in {}",
        matrix.num_genomes(),
        out_dir.display()
    );
    Ok(())
}

/// Overwrites `<test_dir>/summary.out` with `genome\tcoarse\tfine` per genome.
pub(crate) fn write_summary(
    test_dir: &Path,
    matrix: &RoleMatrix,
    scores: &ConsistencyScores,
) -> Result<()> {
    let path = test_dir.join(SUMMARY_FILE);
    let file = File::create(&path)
        .map_err(|e| anyhow!("Failed to create summary file {}: {}", path.display(), e))?;
    let mut writer = BufWriter::new(file);
    for (row, genome) in matrix.genomes.iter().enumerate() {
        writeln!(
            writer,
            "{}\t{}\t{}",
            genome.id,
            format_score(scores.coarse[row]),
            format_score(scores.fine[row])
        )?;
    }
    writer.flush()?;
    info!("Wrote consistency summary to {}", path.display());
    Ok(())
}

/// Logs the score table at two decimals.
pub(crate) fn log_score_table(matrix: &RoleMatrix, scores: &ConsistencyScores) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    for (row, genome) in matrix.genomes.iter().enumerate() {
        debug!(
            "{}\t{:.2}\t{:.2}",
            genome.id,
            round_to(scores.coarse[row], TABLE_DECIMALS),
            round_to(scores.fine[row], TABLE_DECIMALS)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Label;
    use crate::scoring::consistency;
    use ndarray::array;
    use tempfile::tempdir;

    fn labels(ids: &[&str]) -> Vec<Label> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| Label {
                index: i.to_string(),
                id: id.to_string(),
            })
            .collect()
    }

    fn fixture() -> (RoleMatrix, ndarray::Array2<f64>) {
        let matrix = RoleMatrix {
            x: array![[1.0, 0.0, 2.0], [2.0, 1.0, 0.0]],
            roles: labels(&["A", "B", "C"]),
            genomes: labels(&["G1", "G2"]),
        };
        let predictions = array![[1.0, 0.0, 2.0], [0.0, 1.0, 3.0]];
        (matrix, predictions)
    }

    #[test]
    fn block_lists_headers_then_mismatches() {
        let (matrix, predictions) = fixture();
        let scores = consistency(matrix.x.view(), predictions.view());
        assert_eq!(
            genome_block(&matrix, predictions.view(), &scores, 0),
            vec!["Coarse Consistency: 100.0", "Fine Consistency: 100.0"]
        );
        assert_eq!(
            genome_block(&matrix, predictions.view(), &scores, 1),
            vec![
                "Coarse Consistency: 33.3",
                "Fine Consistency: 33.3",
                "A\t0\t2",
                "C\t3\t0",
            ]
        );
    }

    #[test]
    fn counts_truncate_toward_zero() {
        assert_eq!(format_count(2.9), "2");
        assert_eq!(format_count(-1.5), "-1");
        assert_eq!(format_score(66.666), "66.7");
        assert_eq!(format_score(0.0), "0.0");
        assert_eq!(format_score(6.25), "6.2");
        assert_eq!(format_score(18.75), "18.8");
    }

    #[test]
    fn sixteen_role_genome_with_one_exact_count() {
        let mut x = ndarray::Array2::<f64>::ones((1, 16));
        x[[0, 0]] = 2.0;
        let mut predictions = ndarray::Array2::<f64>::from_elem((1, 16), 3.0);
        predictions[[0, 0]] = 2.0;
        let roles: Vec<String> = (0..16).map(|r| format!("R{r}")).collect();
        let role_refs: Vec<&str> = roles.iter().map(String::as_str).collect();
        let matrix = RoleMatrix {
            x,
            roles: labels(&role_refs),
            genomes: labels(&["G1"]),
        };
        let scores = consistency(matrix.x.view(), predictions.view());
        let block = genome_block(&matrix, predictions.view(), &scores, 0);
        assert_eq!(block[0], "Coarse Consistency: 100.0");
        assert_eq!(block[1], "Fine Consistency: 6.2");
        assert_eq!(block.len(), 2 + 15);
    }

    #[test]
    fn genome_reports_append_to_existing_content() {
        let tmp = tempdir().unwrap();
        let out_dir = tmp.path().join("nested").join("out");
        let (matrix, predictions) = fixture();
        let scores = consistency(matrix.x.view(), predictions.view());

        fs::create_dir_all(&out_dir).unwrap();
        fs::write(out_dir.join("G1.out"), "Completeness: 98.1\n").unwrap();

        write_genome_reports(&out_dir, &matrix, predictions.view(), &scores).unwrap();
        write_genome_reports(&out_dir, &matrix, predictions.view(), &scores).unwrap();

        let g1 = fs::read_to_string(out_dir.join("G1.out")).unwrap();
        assert_eq!(
            g1,
            "Completeness: 98.1\n\
             Coarse Consistency: 100.0\nFine Consistency: 100.0\n\
             Coarse Consistency: 100.0\nFine Consistency: 100.0\n"
        );
        let g2 = fs::read_to_string(out_dir.join("G2.out")).unwrap();
        assert!(g2.starts_with("Coarse Consistency: 33.3\n"));
        assert_eq!(g2.matches("C\t3\t0").count(), 2);
    }

    #[test]
    fn missing_output_directory_is_created() {
        let tmp = tempdir().unwrap();
        let out_dir = tmp.path().join("a").join("b");
        let (matrix, predictions) = fixture();
        let scores = consistency(matrix.x.view(), predictions.view());
        write_genome_reports(&out_dir, &matrix, predictions.view(), &scores).unwrap();
        assert!(out_dir.join("G1.out").is_file());
        assert!(out_dir.join("G2.out").is_file());
    }

    #[test]
    fn summary_is_overwritten() {
        let tmp = tempdir().unwrap();
        let (matrix, predictions) = fixture();
        let scores = consistency(matrix.x.view(), predictions.view());
        fs::write(tmp.path().join(SUMMARY_FILE), "stale\tline\n").unwrap();

        write_summary(tmp.path(), &matrix, &scores).unwrap();
        assert_eq!(
            fs::read_to_string(tmp.path().join(SUMMARY_FILE)).unwrap(),
            "G1\t100.0\t100.0\nG2\t33.3\t33.3\n"
        );
    }
}
