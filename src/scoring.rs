// scoring.rs

use ndarray::{Array1, ArrayView2, Zip};

/// Per-genome agreement between the observed and the predicted matrix, in percent.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ConsistencyScores {
    /// Share of roles whose presence (count > 0) matches.
    pub(crate) coarse: Array1<f64>,
    /// Share of roles whose count matches exactly.
    pub(crate) fine: Array1<f64>,
}

fn row_agreement<F>(actual: ArrayView2<f64>, predicted: ArrayView2<f64>, agree: F) -> Array1<f64>
where
    F: Fn(f64, f64) -> bool,
{
    let ncols = actual.ncols() as f64;
    let mut scores = Array1::<f64>::zeros(actual.nrows());
    Zip::from(&mut scores)
        .and(actual.rows())
        .and(predicted.rows())
        .for_each(|score, a_row, p_row| {
            let matches = a_row
                .iter()
                .zip(p_row.iter())
                .filter(|(a, p)| agree(**a, **p))
                .count();
            *score = 100.0 * matches as f64 / ncols;
        });
    scores
}

/// Scores each genome (row). Both matrices must have the same shape.
pub(crate) fn consistency(actual: ArrayView2<f64>, predicted: ArrayView2<f64>) -> ConsistencyScores {
    debug_assert_eq!(actual.dim(), predicted.dim());
    ConsistencyScores {
        coarse: row_agreement(actual, predicted, |a, p| (a > 0.0) == (p > 0.0)),
        fine: row_agreement(actual, predicted, |a, p| a == p),
    }
}

/// Rounds to `decimals` places, ties to the even digit.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

/// Columns where prediction and observation differ for one genome.
pub(crate) fn mismatched_columns(
    actual: ArrayView2<f64>,
    predicted: ArrayView2<f64>,
    row: usize,
) -> Vec<usize> {
    actual
        .row(row)
        .iter()
        .zip(predicted.row(row).iter())
        .enumerate()
        .filter(|(_, (a, p))| a != p)
        .map(|(col, _)| col)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    #[test]
    fn two_genome_example() {
        let x = array![[1.0, 0.0], [2.0, 1.0]];
        let p = array![[1.0, 0.0], [0.0, 1.0]];
        let scores = consistency(x.view(), p.view());
        assert_eq!(scores.coarse, array![100.0, 50.0]);
        assert_eq!(scores.fine, array![100.0, 50.0]);
    }

    #[test]
    fn presence_can_agree_when_counts_do_not() {
        let x = array![[3.0, 0.0, 1.0]];
        let p = array![[1.0, 0.0, 2.0]];
        let scores = consistency(x.view(), p.view());
        assert_abs_diff_eq!(scores.coarse[0], 100.0);
        assert_abs_diff_eq!(scores.fine[0], 100.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn scores_are_bounded_and_fine_never_exceeds_coarse() {
        let x = Array2::from_shape_fn((6, 7), |(g, r)| ((g * 7 + r * 3) % 4) as f64);
        let p = Array2::from_shape_fn((6, 7), |(g, r)| ((g * 5 + r) % 3) as f64);
        let scores = consistency(x.view(), p.view());
        for g in 0..6 {
            assert!((0.0..=100.0).contains(&scores.coarse[g]));
            assert!((0.0..=100.0).contains(&scores.fine[g]));
            assert!(scores.fine[g] <= scores.coarse[g]);
        }
    }

    #[test]
    fn scoring_is_repeatable() {
        let x = array![[1.0, 4.0, 0.0], [0.0, 0.0, 2.0]];
        let p = array![[1.0, 0.0, 0.0], [1.0, 0.0, 2.0]];
        let first = consistency(x.view(), p.view());
        let second = consistency(x.view(), p.view());
        assert_eq!(first, second);
    }

    #[test]
    fn rounding_precision() {
        assert_abs_diff_eq!(round_to(66.666_666, 1), 66.7);
        assert_abs_diff_eq!(round_to(66.666_666, 2), 66.67);
        assert_abs_diff_eq!(round_to(100.0, 1), 100.0);
    }

    #[test]
    fn rounding_ties_go_to_even_digit() {
        assert_abs_diff_eq!(round_to(6.25, 1), 6.2);
        assert_abs_diff_eq!(round_to(0.75, 1), 0.8);
        assert_abs_diff_eq!(round_to(0.25, 1), 0.2);
        assert_abs_diff_eq!(round_to(12.5, 0), 12.0);
    }

    #[test]
    fn mismatches_list_differing_columns() {
        let x = array![[1.0, 0.0, 2.0], [2.0, 1.0, 0.0]];
        let p = array![[1.0, 1.0, 2.0], [0.0, 1.0, 0.0]];
        assert_eq!(mismatched_columns(x.view(), p.view(), 0), vec![1]);
        assert_eq!(mismatched_columns(x.view(), p.view(), 1), vec![0]);
    }
}
