//! Grade and solution-length summaries for an assignment.

use crate::submission::Submission;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GradeSummary {
    pub count: usize,
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

impl GradeSummary {
    pub fn from_grades(grades: &[f64]) -> Self {
        if grades.is_empty() {
            return Self::default();
        }

        let count = grades.len();
        let mean = grades.iter().sum::<f64>() / count as f64;
        let std_dev = if count < 2 {
            0.0
        } else {
            let variance = grades
                .iter()
                .map(|grade| (grade - mean).powi(2))
                .sum::<f64>()
                / count as f64;
            variance.sqrt()
        };

        Self {
            count,
            mean,
            max: grades.iter().copied().fold(f64::MIN, f64::max),
            min: grades.iter().copied().fold(f64::MAX, f64::min),
            std_dev,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LengthSummary {
    pub mean: f64,
    pub median: f64,
    pub max: usize,
    pub min: usize,
    /// Sample standard deviation.
    pub std_dev: f64,
}

impl LengthSummary {
    pub fn from_lengths(lengths: &[usize]) -> Self {
        if lengths.is_empty() {
            return Self::default();
        }

        let mut sorted = lengths.to_vec();
        sorted.sort_unstable();

        let count = sorted.len();
        let mean = sorted.iter().sum::<usize>() as f64 / count as f64;
        let median = if count % 2 == 1 {
            sorted[count / 2] as f64
        } else {
            (sorted[count / 2 - 1] + sorted[count / 2]) as f64 / 2.0
        };
        let std_dev = if count < 2 {
            0.0
        } else {
            let variance = sorted
                .iter()
                .map(|length| (*length as f64 - mean).powi(2))
                .sum::<f64>()
                / (count - 1) as f64;
            variance.sqrt()
        };

        Self {
            mean,
            median,
            max: sorted[count - 1],
            min: sorted[0],
            std_dev,
        }
    }
}

/// Equal-width histogram. `edges` has one more element than `counts`; every
/// bin is half-open except the last, which also holds its right edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    pub fn new(values: &[f64], bins: usize, low: f64, high: f64) -> Self {
        let bins = bins.max(1);
        let width = (high - low) / bins as f64;
        let edges = (0..=bins).map(|step| low + width * step as f64).collect();

        let mut counts = vec![0usize; bins];
        for value in values {
            if !value.is_finite() || *value < low || *value > high {
                continue;
            }
            let bin = if *value == high {
                bins - 1
            } else {
                (((value - low) / width) as usize).min(bins - 1)
            };
            counts[bin] += 1;
        }

        Self { edges, counts }
    }

    fn empty(low: f64, high: f64) -> Self {
        Self {
            edges: vec![low, high],
            counts: vec![0],
        }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Histogram of grades over the fixed `[0, 100]` range.
pub fn grade_distribution(grades: &[f64], bins: usize) -> Histogram {
    if grades.is_empty() {
        return Histogram::empty(0.0, 100.0);
    }
    Histogram::new(grades, bins, 0.0, 100.0)
}

/// Histogram of solution lengths over their observed range.
pub fn length_distribution(lengths: &[usize], bins: usize) -> Histogram {
    let (Some(min), Some(max)) = (lengths.iter().min(), lengths.iter().max()) else {
        return Histogram::empty(0.0, 1.0);
    };

    let (low, high) = if min == max {
        (*min as f64 - 0.5, *max as f64 + 0.5)
    } else {
        (*min as f64, *max as f64)
    };
    let values: Vec<f64> = lengths.iter().map(|length| *length as f64).collect();
    Histogram::new(&values, bins, low, high)
}

/// Everything the statistics report shows.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionStatistics {
    pub total_submissions: usize,
    pub graded_submissions: usize,
    pub grades: GradeSummary,
    pub lengths: LengthSummary,
    pub grade_histogram: Histogram,
    pub length_histogram: Histogram,
}

impl SubmissionStatistics {
    pub fn compute(submissions: &[Submission], bins: usize) -> Self {
        let grades: Vec<f64> = submissions.iter().filter_map(Submission::grade).collect();
        let lengths: Vec<usize> = submissions
            .iter()
            .map(Submission::solution_length)
            .filter(|length| *length > 0)
            .collect();

        Self {
            total_submissions: submissions.len(),
            graded_submissions: grades.len(),
            grades: GradeSummary::from_grades(&grades),
            lengths: LengthSummary::from_lengths(&lengths),
            grade_histogram: grade_distribution(&grades, bins),
            length_histogram: length_distribution(&lengths, bins),
        }
    }

    pub fn graded_percent(&self) -> f64 {
        if self.total_submissions == 0 {
            0.0
        } else {
            self.graded_submissions as f64 / self.total_submissions as f64 * 100.0
        }
    }

    /// Report rows in display order.
    pub fn metrics(&self) -> Vec<(String, String)> {
        let mut rows = vec![
            (
                "Total Submissions".to_string(),
                self.total_submissions.to_string(),
            ),
            (
                "Graded Submissions".to_string(),
                format!(
                    "{} ({:.1}%)",
                    self.graded_submissions,
                    self.graded_percent()
                ),
            ),
        ];

        if self.grades.count > 0 {
            rows.extend([
                ("Average Grade".to_string(), format!("{:.2}", self.grades.mean)),
                ("Highest Grade".to_string(), format!("{:.2}", self.grades.max)),
                ("Lowest Grade".to_string(), format!("{:.2}", self.grades.min)),
                (
                    "Grade Standard Deviation".to_string(),
                    format!("{:.2}", self.grades.std_dev),
                ),
            ]);
        }

        rows.extend([
            (
                "Average Solution Length".to_string(),
                format!("{:.1} characters", self.lengths.mean),
            ),
            (
                "Median Solution Length".to_string(),
                format!("{:.1} characters", self.lengths.median),
            ),
            (
                "Longest Solution".to_string(),
                format!("{} characters", self.lengths.max),
            ),
            (
                "Shortest Solution".to_string(),
                format!("{} characters", self.lengths.min),
            ),
        ]);

        rows
    }
}
