//! Reporting and export — JSON, CSV, and Markdown artifact generation.
//!
//! Provides three export formats for experiment reports:
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: one row per model × data fraction, for plotting tools
//! - **Markdown**: human-readable summary table
//!
//! Persisted reports include a `schema_version` field. Newer versions are
//! rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::aggregate::{ExperimentReport, REPORT_SCHEMA_VERSION};

pub const REPORT_JSON: &str = "report.json";
pub const REPORT_CSV: &str = "report.csv";
pub const REPORT_MD: &str = "report.md";

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(report: &ExperimentReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize ExperimentReport to JSON")
}

/// Deserialize a report, rejecting schema versions newer than this build.
pub fn import_json(json: &str) -> Result<ExperimentReport> {
    let report: ExperimentReport =
        serde_json::from_str(json).context("failed to deserialize ExperimentReport from JSON")?;
    if report.schema_version > REPORT_SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            REPORT_SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Columns: model, data_frac, n_trials, n_accepted, n_no_solution, n_failed,
/// perf_mean, perf_std, perf_p25, perf_median, perf_p75, solution_rate,
/// failure_rate, mean_n_samples. Performance cells are empty when no trial
/// returned a solution.
pub fn export_csv(report: &ExperimentReport) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record([
        "model",
        "data_frac",
        "n_trials",
        "n_accepted",
        "n_no_solution",
        "n_failed",
        "perf_mean",
        "perf_std",
        "perf_p25",
        "perf_median",
        "perf_p75",
        "solution_rate",
        "failure_rate",
        "mean_n_samples",
    ])
    .context("failed to write CSV header")?;

    for row in &report.rows {
        let perf: [String; 5] = match row.performance {
            Some(s) => [s.mean, s.std, s.p25, s.median, s.p75].map(|v| v.to_string()),
            None => Default::default(),
        };
        let mut record = vec![
            row.model.name().to_string(),
            row.data_frac.to_string(),
            row.n_trials.to_string(),
            row.n_accepted.to_string(),
            row.n_no_solution.to_string(),
            row.n_failed.to_string(),
        ];
        record.extend(perf);
        record.extend([
            row.solution_rate.to_string(),
            row.failure_rate.to_string(),
            row.mean_n_samples.to_string(),
        ]);
        wtr.write_record(&record)
            .with_context(|| format!("failed to write CSV row for {}", row.model))?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Markdown report ────────────────────────────────────────────────

pub fn generate_report(report: &ExperimentReport) -> String {
    let mut md = String::new();
    md.push_str("# Experiment Report\n\n");
    md.push_str(&format!(
        "Metric: **{}** ({}). {} trials.\n\n",
        report.metric.name(),
        if report.metric.higher_is_better() {
            "higher is better"
        } else {
            "lower is better"
        },
        report.total_trials()
    ));
    md.push_str(
        "| Model | Data frac | Trials | Accepted | NSF | Failed | Performance | Solution rate | Failure rate | Mean n |\n",
    );
    md.push_str("|---|---|---|---|---|---|---|---|---|---|\n");

    for row in &report.rows {
        let perf = row
            .performance
            .map_or_else(|| "-".to_string(), |s| format!("{:.3} ± {:.3}", s.mean, s.std));
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {:.0} |\n",
            row.model,
            frac(row.data_frac),
            row.n_trials,
            row.n_accepted,
            row.n_no_solution,
            row.n_failed,
            perf,
            pct(row.solution_rate),
            pct(row.failure_rate),
            row.mean_n_samples,
        ));
    }
    md
}

fn pct(v: f64) -> String {
    format!("{:.1}%", v * 100.0)
}

fn frac(v: f64) -> String {
    if v < 0.01 {
        format!("{v:.2e}")
    } else {
        format!("{v:.3}")
    }
}

// ─── Artifact directory ─────────────────────────────────────────────

/// Write `report.json`, `report.csv`, and `report.md` into `dir`.
pub fn save_report(report: &ExperimentReport, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create report dir: {}", dir.display()))?;

    let json_path = dir.join(REPORT_JSON);
    std::fs::write(&json_path, export_json(report)?)
        .with_context(|| format!("failed to write {}", json_path.display()))?;

    let csv_path = dir.join(REPORT_CSV);
    std::fs::write(&csv_path, export_csv(report)?)
        .with_context(|| format!("failed to write {}", csv_path.display()))?;

    let md_path = dir.join(REPORT_MD);
    std::fs::write(&md_path, generate_report(report))
        .with_context(|| format!("failed to write {}", md_path.display()))?;

    Ok(json_path)
}

/// Load a report from a directory written by [`save_report`] or a JSON file.
pub fn load_report(path: &Path) -> Result<ExperimentReport> {
    let file = if path.is_dir() {
        path.join(REPORT_JSON)
    } else {
        path.to_path_buf()
    };
    let json = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    import_json(&json)
}
