//! SeldonLab Runner — experiment orchestration, result store, aggregation, export.
//!
//! This crate builds on `seldonlab-core` to provide:
//! - TOML experiment configuration (fractions, trials, models, workers, datagen)
//! - Per-trial training of the constrained engine and unconstrained baselines
//! - A parallel, resumable harness backed by a write-once JSON result store
//! - Order-independent aggregation per (model, data fraction)
//! - JSON, CSV, and Markdown report export

pub mod aggregate;
pub mod config;
pub mod export;
pub mod harness;
pub mod metrics;
pub mod store;
pub mod trial;

pub use aggregate::{aggregate, ExperimentReport, ReportRow};
pub use config::{
    logspace, ConfigError, DataGenMethod, ExperimentConfig, ModelId, PerformanceMetric,
};
pub use harness::{plan_units, run_experiment, ExperimentRun, HarnessError, HarnessProgress};
pub use metrics::Summary;
pub use store::{ResultStore, StoreError};
pub use trial::{run_unit, TrialContext, TrialKey, TrialResult, TrialStatus, WorkUnit};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn trial_context_is_send_sync() {
        assert_send::<TrialContext>();
        assert_sync::<TrialContext>();
    }

    #[test]
    fn trial_result_is_send_sync() {
        assert_send::<TrialResult>();
        assert_sync::<TrialResult>();
    }

    #[test]
    fn work_unit_is_send_sync() {
        assert_send::<WorkUnit>();
        assert_sync::<WorkUnit>();
    }

    #[test]
    fn config_is_send_sync() {
        assert_send::<ExperimentConfig>();
        assert_sync::<ExperimentConfig>();
    }

    #[test]
    fn report_is_send_sync() {
        assert_send::<ExperimentReport>();
        assert_sync::<ExperimentReport>();
    }

    #[test]
    fn store_is_send_sync() {
        assert_send::<ResultStore>();
        assert_sync::<ResultStore>();
    }
}
