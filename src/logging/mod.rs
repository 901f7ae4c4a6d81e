//! Logging setup and the structured events emitted by the delta manager.

use tracing::{info, warn};
use tracing_subscriber::{fmt, util::SubscriberInitExt, EnvFilter};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// Outcome of one delta manager flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub part_files_combined: usize,
    pub part_files_saved: usize,
    pub delta_files_finished: usize,
    pub delta_files_saved: usize,
    pub groups_canceled: usize,
    pub locations_finished: usize,
    pub save_failures: usize,
}

/// Install the global subscriber, writing to stderr. Later calls are no-ops.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`.
pub fn init_logging(format: LogFormat) -> Result<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Human => {
            let _ = builder.finish().try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().finish().try_init();
        }
    };

    Ok(())
}

/// One event per flush; failures escalate it to `warn`.
pub fn log_flush_summary(summary: FlushSummary) {
    if summary.save_failures > 0 {
        warn!(
            target = "pgdelta::delta",
            part_files_saved = summary.part_files_saved,
            delta_files_saved = summary.delta_files_saved,
            groups_canceled = summary.groups_canceled,
            save_failures = summary.save_failures,
            "delta_flush_save_failures"
        );
    }
    info!(
        target = "pgdelta::delta",
        part_files_combined = summary.part_files_combined,
        part_files_saved = summary.part_files_saved,
        delta_files_finished = summary.delta_files_finished,
        delta_files_saved = summary.delta_files_saved,
        groups_canceled = summary.groups_canceled,
        locations_finished = summary.locations_finished,
        save_failures = summary.save_failures,
        "delta_flush_summary"
    );
}
