use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use sweep_core::{
    actions,
    config::Config,
    orchestrator::{SweepReport, Sweeper},
    ports::ChannelService,
    throttle::{RateLimiter, ThrottledService},
};
use sweep_slack::SlackClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sweep_core::logging::init("sweep")?;

    let cfg = Config::load().context("failed to load configuration")?;
    let cancel = CancellationToken::new();
    spawn_deadline(cancel.clone(), cfg.sweep_timeout);

    let slack = Arc::new(
        SlackClient::new(&cfg.slack_api_base, &cfg.slack_bot_token, cfg.request_timeout)
            .context("failed to build slack client")?,
    );
    let limiter = Arc::new(RateLimiter::new(cfg.limiter_config()));
    let service: Arc<dyn ChannelService> = Arc::new(ThrottledService::new(
        slack,
        limiter,
        cfg.retry_policy(),
        cancel.clone(),
    ));

    let identity = match service.authenticate().await {
        Ok(id) => id,
        Err(e) => return Err(fatal(e)),
    };
    tracing::info!(
        user = %identity.user_id,
        team = %identity.team_id,
        dry_run = cfg.dry_run,
        "authenticated"
    );

    let sweeper = Sweeper::new(service.clone(), identity, cfg.sweep_settings());
    let report = sweeper.sweep().await;
    log_plan(&report);

    if let Some(e) = report.aborted {
        tracing::warn!("sweep incomplete; no actions taken");
        return Err(fatal(e));
    }

    let summary = actions::apply(&report, service.as_ref(), &cfg.action_settings()).await;
    println!("sweep: {}", report.summary());
    println!("actions: {}", summary.summary());
    for (name, why) in &summary.failed {
        println!("  failed #{name}: {why}");
    }

    match summary.aborted {
        Some(e) => Err(fatal(e)),
        None => Ok(()),
    }
}

/// Cancel all pending waits once the deadline passes or on Ctrl-C.
fn spawn_deadline(cancel: CancellationToken, timeout: std::time::Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(?timeout, "sweep deadline reached; cancelling");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted; cancelling");
            }
            _ = cancel.cancelled() => return,
        }
        cancel.cancel();
    });
}

fn log_plan(report: &SweepReport) {
    for d in &report.to_warn {
        tracing::info!(
            channel = %d.channel.name,
            last_activity = ?d.activity.last_activity,
            "planned: warn"
        );
    }
    for d in &report.to_archive {
        tracing::info!(
            channel = %d.channel.name,
            warned_at = ?d.activity.warning,
            "planned: archive"
        );
    }
}

fn fatal(e: sweep_core::Error) -> anyhow::Error {
    if let Some(fix) = e.remediation() {
        tracing::error!(error = %e, "{fix}");
    }
    anyhow::Error::new(e)
}
