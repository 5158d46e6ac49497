//! # Scorer Module
//!
//! Folds a submission's grade details into its totals. Details are summed in the order they
//! were produced and no rounding is applied, so the same details always give bit-identical
//! totals.

use crate::types::{GradeDetail, Metadata, StudentResult};

/// Sums awarded and maximum points over `details`.
///
/// # Returns
///
/// `(total_points, max_points, percentage)`, where `percentage` is `0.0` when `max_points` is
/// zero.
///
/// # Example
///
/// ```
/// use marker::scorer::compute_totals;
/// use marker::types::GradeDetail;
///
/// let details = vec![
///     GradeDetail { points_awarded: 3.0, max_points: 4.0, ..GradeDetail::default() },
///     GradeDetail { points_awarded: 0.0, max_points: 4.0, ..GradeDetail::default() },
/// ];
/// assert_eq!(compute_totals(&details), (3.0, 8.0, 37.5));
/// assert_eq!(compute_totals(&[]), (0.0, 0.0, 0.0));
/// ```
pub fn compute_totals(details: &[GradeDetail]) -> (f64, f64, f64) {
    let mut total_points = 0.0;
    let mut max_points = 0.0;
    for detail in details {
        total_points += detail.points_awarded;
        max_points += detail.max_points;
    }
    let percentage = if max_points > 0.0 {
        total_points / max_points * 100.0
    } else {
        0.0
    };
    (total_points, max_points, percentage)
}

/// Builds the [`StudentResult`] for one submission.
///
/// # Arguments
///
/// * `student_id` - The submission's student.
/// * `details` - Every detail produced for the submission, in rubric order.
/// * `metadata` - Copied from the submission.
pub fn summarize(student_id: &str, details: Vec<GradeDetail>, metadata: Metadata) -> StudentResult {
    let (total_points, max_points, percentage) = compute_totals(&details);
    StudentResult {
        student_id: student_id.to_string(),
        total_points,
        max_points,
        percentage,
        grade_details: details,
        metadata,
    }
}
