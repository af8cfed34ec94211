//! Execute a sweep report: post warnings, post archive notices, archive.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{
    decision::{LifecycleDecision, Thresholds},
    domain::{User, UserId},
    errors::ErrorKind,
    formatting::{creator_mention, render, TemplateVars},
    orchestrator::SweepReport,
    ports::ChannelService,
    Error, Result,
};

#[derive(Clone, Debug)]
pub struct ActionSettings {
    /// Log intended actions without touching the workspace.
    pub dry_run: bool,
    pub warning_template: String,
    pub archive_template: String,
    pub thresholds: Thresholds,
}

#[derive(Debug, Default)]
pub struct ActionSummary {
    pub dry_run: bool,
    pub warned: Vec<String>,
    pub archived: Vec<String>,
    /// Channel name and reason for per-channel failures.
    pub failed: Vec<(String, String)>,
    pub aborted: Option<Error>,
}

impl ActionSummary {
    pub fn summary(&self) -> String {
        format!(
            "{}warned={} archived={} failed={}{}",
            if self.dry_run { "[dry-run] " } else { "" },
            self.warned.len(),
            self.archived.len(),
            self.failed.len(),
            if self.aborted.is_some() {
                " (aborted)"
            } else {
                ""
            }
        )
    }
}

pub async fn apply(
    report: &SweepReport,
    service: &dyn ChannelService,
    settings: &ActionSettings,
) -> ActionSummary {
    apply_at(report, service, settings, Utc::now()).await
}

pub async fn apply_at(
    report: &SweepReport,
    service: &dyn ChannelService,
    settings: &ActionSettings,
    now: DateTime<Utc>,
) -> ActionSummary {
    let mut summary = ActionSummary {
        dry_run: settings.dry_run,
        ..Default::default()
    };
    if report.to_warn.is_empty() && report.to_archive.is_empty() {
        return summary;
    }

    let users = load_directory(service).await;
    if let Err(e) = run(report, service, settings, now, &users, &mut summary).await {
        tracing::error!(error = %e, "actions aborted");
        summary.aborted = Some(e);
    }
    tracing::info!(summary = %summary.summary(), "actions finished");
    summary
}

/// Best-effort: without a directory every creator renders as the fallback text.
async fn load_directory(service: &dyn ChannelService) -> HashMap<UserId, User> {
    match service.list_users().await {
        Ok(users) => users.into_iter().map(|u| (u.id.clone(), u)).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "user directory unavailable; creators won't be mentioned");
            HashMap::new()
        }
    }
}

fn vars_for(
    d: &LifecycleDecision,
    settings: &ActionSettings,
    now: DateTime<Utc>,
    users: &HashMap<UserId, User>,
) -> TemplateVars {
    let idle_days = d
        .activity
        .last_activity
        .map(|t| (now - t).num_days())
        .unwrap_or_else(|| settings.thresholds.warn_after.num_days());
    TemplateVars {
        channel: d.channel.name.clone(),
        days: idle_days,
        grace_days: settings.thresholds.archive_grace.num_days(),
        creator: creator_mention(d.channel.creator.as_ref(), users),
    }
}

async fn run(
    report: &SweepReport,
    service: &dyn ChannelService,
    settings: &ActionSettings,
    now: DateTime<Utc>,
    users: &HashMap<UserId, User>,
    summary: &mut ActionSummary,
) -> Result<()> {
    for d in &report.to_warn {
        let name = d.channel.name.clone();
        let text = render(&settings.warning_template, &vars_for(d, settings, now, users));
        if settings.dry_run {
            tracing::info!(channel = %name, %text, "[dry-run] would warn");
            summary.warned.push(name);
            continue;
        }
        match service.post_message(&d.channel.id, &text).await {
            Ok(()) => {
                tracing::info!(channel = %name, "warned");
                summary.warned.push(name);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(channel = %name, error = %e, "warning not posted");
                summary.failed.push((name, e.to_string()));
            }
        }
    }

    for d in &report.to_archive {
        let name = d.channel.name.clone();
        let text = render(&settings.archive_template, &vars_for(d, settings, now, users));
        if settings.dry_run {
            tracing::info!(channel = %name, %text, "[dry-run] would archive");
            summary.archived.push(name);
            continue;
        }

        match service.post_message(&d.channel.id, &text).await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) if e.kind() == Some(ErrorKind::IsArchived) => {
                tracing::info!(channel = %name, "already archived");
                summary.archived.push(name);
                continue;
            }
            // The notice is a courtesy; archive anyway.
            Err(e) => tracing::warn!(channel = %name, error = %e, "archive notice not posted"),
        }

        match service.archive_channel(&d.channel.id).await {
            Ok(()) => {
                tracing::info!(channel = %name, "archived");
                summary.archived.push(name);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) if e.kind().is_some_and(ErrorKind::is_already_satisfied) => {
                summary.archived.push(name);
            }
            Err(e) => {
                tracing::warn!(channel = %name, error = %e, "archive failed");
                summary.failed.push((name, e.to_string()));
            }
        }
    }
    Ok(())
}
