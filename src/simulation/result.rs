//! Simulation Result Module
//!
//! This module provides the [`Report`] produced by executing a simulation task: the
//! output time grid and one value column per declared output, in declaration order.
//!
//! # Invariants
//!
//! A valid report (see [`Report::validate`]) has
//! - exactly one value per time point in every column
//! - a non-decreasing, evenly spaced time grid
//! - unique column names, none of them `time`

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::report::error::ReportError;

/// Name of the mandatory first column
pub const TIME_COLUMN: &str = "time";

/// A named column of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportColumn {
    pub id: String,
    pub values: Vec<f64>,
}

/// The result of executing one simulation task
///
/// # Fields
///
/// * `id` - Report id; names the output subdirectory and CSV file
/// * `time` - Output time points
/// * `columns` - Output variables over time, in declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub time: Vec<f64>,
    pub columns: Vec<ReportColumn>,
}

impl Report {
    pub fn new(id: impl Into<String>, time: Vec<f64>) -> Self {
        Self {
            id: id.into(),
            time,
            columns: Vec::new(),
        }
    }

    /// Appends a column
    pub fn push_column(&mut self, id: impl Into<String>, values: Vec<f64>) {
        self.columns.push(ReportColumn {
            id: id.into(),
            values,
        });
    }

    /// Looks up a column by name
    pub fn column(&self, id: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|column| column.id == id)
            .map(|column| column.values.as_slice())
    }

    /// Column names, starting with `time`
    pub fn header(&self) -> Vec<&str> {
        std::iter::once(TIME_COLUMN)
            .chain(self.columns.iter().map(|column| column.id.as_str()))
            .collect()
    }

    /// Checks the report invariants
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Invalid`] naming the first violated invariant.
    pub fn validate(&self) -> Result<(), ReportError> {
        let invalid = |reason: String| ReportError::Invalid {
            id: self.id.clone(),
            reason,
        };

        let mut names = HashSet::new();
        for column in &self.columns {
            if column.id == TIME_COLUMN {
                return Err(invalid(format!(
                    "column '{}' clashes with the time column",
                    TIME_COLUMN
                )));
            }
            if !names.insert(column.id.as_str()) {
                return Err(invalid(format!("duplicate column '{}'", column.id)));
            }
            if column.values.len() != self.time.len() {
                return Err(invalid(format!(
                    "column '{}' has {} values for {} time points",
                    column.id,
                    column.values.len(),
                    self.time.len()
                )));
            }
        }

        if let (Some(first), Some(last)) = (self.time.first(), self.time.last()) {
            let span = last - first;
            let tolerance = 1e-9 * span.abs().max(1.0);
            let expected_step = match self.time.len() {
                0 | 1 => 0.0,
                n => span / (n - 1) as f64,
            };

            for (i, pair) in self.time.windows(2).enumerate() {
                let step = pair[1] - pair[0];
                if step < 0.0 {
                    return Err(invalid(format!("time decreases after index {}", i)));
                }
                if (step - expected_step).abs() > tolerance {
                    return Err(invalid(format!(
                        "time points are not evenly spaced at index {}",
                        i
                    )));
                }
            }
        }

        Ok(())
    }
}
