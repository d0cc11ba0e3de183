//! Feedback flow replay tool
//!
//! Replays a JSONL flow script against a coordinator with the configured
//! listeners attached, then reports metrics.
//!
//! Module structure:
//! - `domain/` - Core types (ids, flow kinds, feedback payloads, errors)
//! - `services/` - Flow sessions, listener registry, coordinator
//! - `io/` - Egress file writer and script replay
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use feedback_flow::domain::{FeedbackEvents, FeedbackItem};
use feedback_flow::infra::{Config, Metrics};
use feedback_flow::io::{load_script, FeedbackEgress, Replayer};
use feedback_flow::services::{FeedbackCoordinator, FeedbackFlowListener};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Replay feedback flow scripts through the coordinator
#[derive(Parser, Debug)]
#[command(name = "feedback-flow", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "FEEDBACK_CONFIG", default_value = "config/dev.toml")]
    config: String,

    /// JSONL script of flow actions to replay
    script: String,
}

/// Logs every finished flow
struct FlowLogListener;

impl FeedbackFlowListener for FlowLogListener {
    fn on_detailed_feedback_flow_finished(&self, events: FeedbackEvents) -> anyhow::Result<()> {
        for event in events.iter() {
            info!(
                session_id = %event.session_id,
                category = %event.category,
                sub_types = ?event.sub_types,
                "detailed_feedback_event"
            );
        }
        Ok(())
    }

    fn on_arrival_experience_feedback_finished(&self, item: &FeedbackItem) -> anyhow::Result<()> {
        info!(rating = %item.rating, comment = ?item.comment, "arrival_feedback");
        Ok(())
    }

    fn name(&self) -> &str {
        "flow_log"
    }
}

fn init_logging(config: &Config) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);

    if config.log_json() {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load_from_path(&args.config);
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        "feedback_flow_starting"
    );
    info!(
        config_file = %config.config_file(),
        app_id = %config.app_id(),
        egress_enabled = %config.egress_enabled(),
        egress_file = %config.egress_file(),
        retain_completed_flows = %config.retain_completed_flows(),
        "config_loaded"
    );

    let actions = load_script(&args.script)?;
    info!(script = %args.script, actions = %actions.len(), "script_loaded");

    let metrics = Arc::new(Metrics::new());
    let coordinator = FeedbackCoordinator::with_metrics(metrics.clone())
        .with_retained_completed(config.retain_completed_flows());

    coordinator.register_listener(Arc::new(FlowLogListener));
    if config.egress_enabled() {
        coordinator
            .register_listener(Arc::new(FeedbackEgress::new(config.egress_file(), config.app_id())));
    }

    let summary = Replayer::new(&coordinator).run(&actions);
    info!(
        applied = %summary.applied,
        rejected = %summary.rejected,
        open_flows = %coordinator.active_flow_count(),
        "replay_complete"
    );

    if config.log_metrics_summary() {
        metrics.report(coordinator.active_flow_count()).log();
    }

    info!("feedback-flow shutdown complete");
    Ok(())
}
