//! Schema validation of raw datasets.
//!
//! Every rule is evaluated and recorded in a [`ValidationReport`]; nothing
//! short-circuits, so one pass reports every problem with a dataset.

use arrow::record_batch::RecordBatch;
use log::{debug, info};

use super::columns;
use super::error::SchemaValidationError;
use super::report::{ValidationCheck, ValidationReport};
use super::standardize::Standardizer;
use super::{CellDataset, ExpressionMatrix, RawDataset};
use crate::matrix::{self, Compression};
use crate::schema::GENE_COLUMN;

impl Standardizer<'_> {
    /// Run every validation rule against `dataset` without consuming it.
    pub fn check(&self, dataset: &RawDataset, subject: &str) -> ValidationReport {
        let mut report = ValidationReport::new(subject);
        let rules = &self.schema().validation;

        for column in &rules.required_obs_columns {
            report.add_check(check_required_column(&dataset.obs, "obs", column));
        }
        for column in &rules.required_var_columns {
            report.add_check(check_required_column(&dataset.var, "var", column));
        }
        if let Some(check) = self.check_gene_intersection(&dataset.var) {
            report.add_check(check);
        }
        check_matrix(dataset, &mut report);

        debug!(
            "Validation of {}: {} passed, {} warnings, {} failed",
            subject,
            report.success_count(),
            report.warning_count(),
            report.failure_count()
        );
        report
    }

    /// Validate a raw dataset, promoting the raw slot to the primary matrix.
    ///
    /// Fails with every violated rule at once.
    pub fn validate(
        &self,
        dataset: RawDataset,
        subject: &str,
    ) -> Result<CellDataset, SchemaValidationError> {
        let report = self.check(&dataset, subject);
        if report.has_failures() {
            return Err(SchemaValidationError { report });
        }

        let RawDataset {
            obs,
            var,
            x,
            raw_x,
            layers,
        } = dataset;
        // Checks above guarantee a sparse primary matrix exists.
        let x = match raw_x.or(x) {
            Some(ExpressionMatrix::Sparse(m)) if m.is_csr() => m,
            Some(ExpressionMatrix::Sparse(m)) => matrix::with_storage(&m, Compression::Csr),
            Some(ExpressionMatrix::Dense { .. }) | None => {
                return Err(SchemaValidationError { report });
            }
        };

        info!(
            "Validated {}: {} cells x {} genes",
            subject,
            x.rows(),
            x.cols()
        );
        Ok(CellDataset::from_parts(obs, var, x, layers, false))
    }

    fn check_gene_intersection(&self, var: &RecordBatch) -> Option<ValidationCheck> {
        const NAME: &str = "var.gene_intersection";
        let threshold = self.schema().validation.gene_intersection_threshold_frac;
        if threshold == 0.0 {
            return Some(ValidationCheck::warning(NAME, "check disabled (threshold is 0)"));
        }
        let genes = columns::column_strings(var, GENE_COLUMN).ok()?;
        let frac = self
            .universe()
            .intersection_frac(genes.iter().map(String::as_str));
        if frac < threshold {
            Some(ValidationCheck::failed(
                NAME,
                format!(
                    "only {:.1}% of core genes present in var `{}` (threshold {:.1}%)",
                    frac * 100.0,
                    GENE_COLUMN,
                    threshold * 100.0
                ),
            ))
        } else {
            Some(ValidationCheck::ok(NAME))
        }
    }
}

fn check_required_column(batch: &RecordBatch, table: &str, column: &str) -> ValidationCheck {
    let name = format!("{table}.{column}");
    let Some(array) = batch.column_by_name(column) else {
        return ValidationCheck::failed(name, format!("Missing col in {table}: `{column}`"));
    };

    let mut problems = Vec::new();
    let missing = columns::missing_count(array);
    if missing > 0 {
        problems.push(format!("{missing} missing value(s)"));
    }
    match columns::empty_string_count(array) {
        Ok(0) => {}
        Ok(empty) => problems.push(format!("{empty} empty value(s)")),
        Err(e) => problems.push(format!("unreadable values ({e})")),
    }

    if problems.is_empty() {
        ValidationCheck::ok(name)
    } else {
        ValidationCheck::failed(
            name,
            format!("{table} column `{column}` has {}", problems.join(" and ")),
        )
    }
}

fn check_matrix(dataset: &RawDataset, report: &mut ValidationReport) {
    let promoted = dataset.raw_x.is_some();
    let Some(matrix) = dataset.raw_x.as_ref().or(dataset.x.as_ref()) else {
        report.add_check(ValidationCheck::failed("X.present", "No expression matrix found"));
        return;
    };
    if promoted {
        report.add_check(ValidationCheck::warning(
            "X.present",
            "raw counts promoted to the primary matrix; processed matrix discarded",
        ));
    } else {
        report.add_check(ValidationCheck::ok("X.present"));
    }

    let (rows, cols) = matrix.shape();
    let (n_obs, n_var) = (dataset.obs.num_rows(), dataset.var.num_rows());
    if rows == n_obs && cols == n_var {
        report.add_check(ValidationCheck::ok("X.shape"));
    } else {
        report.add_check(ValidationCheck::failed(
            "X.shape",
            format!("X is {rows} x {cols} but obs has {n_obs} rows and var has {n_var} rows"),
        ));
    }

    let ExpressionMatrix::Sparse(m) = matrix else {
        report.add_check(ValidationCheck::failed("X.sparse", "X matrix is not sparse"));
        return;
    };
    report.add_check(ValidationCheck::ok("X.sparse"));

    let fractional = matrix::fractional_sum(m);
    if fractional > 0.0 {
        report.add_check(ValidationCheck::failed(
            "X.integer",
            format!("counts are not integer values (fractional sum {fractional})"),
        ));
    } else {
        report.add_check(ValidationCheck::ok("X.integer"));
    }

    match matrix::negative_count(m) {
        0 => report.add_check(ValidationCheck::ok("X.nonnegative")),
        n => report.add_check(ValidationCheck::failed(
            "X.nonnegative",
            format!("{n} negative count(s)"),
        )),
    }
    match matrix::non_finite_count(m) {
        0 => report.add_check(ValidationCheck::ok("X.finite")),
        n => report.add_check(ValidationCheck::failed(
            "X.finite",
            format!("{n} NaN or infinite value(s)"),
        )),
    }
}
