// parity-core/src/application/orchestrator.rs

use chrono::Utc;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::application::checks;
use crate::application::context::{ContextOptions, RunContext, drivers_from_settings};
use crate::application::results::ResultAggregator;
use crate::domain::rule::RuleDefinition;
use crate::domain::verdict::{RunSummary, Verdict};
use crate::error::ParityError;
use crate::infrastructure::config::{
    ProjectSettings, RuleFilter, check_stores, load_project_settings, load_rules, select_rules,
};

/// Caller-side knobs that win over the project settings.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub filter: RuleFilter,
    pub max_parallel: Option<usize>,
    pub timeout: Option<Duration>,
}

/// Evaluates `rules` with at most `max_parallel` in flight.
///
/// A failing rule yields an ERROR verdict for that rule only. When the run is
/// cancelled or `timeout` elapses, in-flight work is dropped and the rules
/// that did not finish are listed in [`RunSummary::not_evaluated`].
#[instrument(skip_all, fields(rules = rules.len(), max_parallel = max_parallel))]
pub async fn run_rules(
    ctx: &RunContext,
    rules: &[RuleDefinition],
    max_parallel: usize,
    timeout: Option<Duration>,
) -> RunSummary {
    let started_at = Utc::now();
    let aggregator = Arc::new(Mutex::new(ResultAggregator::new(rules)));
    let cancel = ctx.cancel_token().clone();

    let drive = {
        let aggregator = Arc::clone(&aggregator);
        async move {
            futures::stream::iter(rules.iter().map(|rule| {
                let aggregator = Arc::clone(&aggregator);
                async move {
                    if let Err(e) = aggregator.lock().await.start(&rule.rule_id) {
                        warn!(error = %e, "Rule skipped");
                        return None;
                    }
                    match checks::evaluate(ctx, rule).await {
                        Ok(verdicts) => Some((rule, verdicts)),
                        Err(ParityError::Cancelled) => None,
                        Err(e) => {
                            warn!(rule_id = %rule.rule_id, class = e.class(), error = %e, "Rule errored");
                            Some((rule, vec![Verdict::error(rule, e.class(), e.to_string())]))
                        }
                    }
                }
            }))
            .buffer_unordered(max_parallel.max(1))
            .for_each(|outcome| {
                let aggregator = Arc::clone(&aggregator);
                async move {
                    let Some((rule, verdicts)) = outcome else {
                        return;
                    };
                    for v in &verdicts {
                        info!(
                            rule_id = %v.rule_id(),
                            table = %v.table(),
                            status = %v.status(),
                            violations = v.violation_count(),
                            "Verdict"
                        );
                    }
                    if let Err(e) = aggregator.lock().await.finish(&rule.rule_id, verdicts) {
                        warn!(error = %e, "Verdict dropped");
                    }
                }
            })
            .await;
        }
    };

    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    let cancelled = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!("Run cancelled");
            true
        }
        _ = deadline => {
            warn!(timeout = ?timeout, "Run timed out");
            cancel.cancel();
            true
        }
        _ = drive => false,
    };

    let summary = aggregator.lock().await.summary(cancelled, started_at);
    info!(
        overall = %summary.overall,
        total = summary.counts.total,
        failed = summary.counts.failed,
        errors = summary.counts.errors,
        not_evaluated = summary.not_evaluated.len(),
        "Run finished"
    );
    summary
}

/// Loads settings and rules from `project_dir`, runs the selected rules and
/// closes every connection before returning.
#[instrument(skip_all, fields(project = %project_dir.display()))]
pub async fn run_project(
    project_dir: &Path,
    request: &RunRequest,
    cancel: CancellationToken,
) -> Result<(ProjectSettings, RunSummary), ParityError> {
    let mut settings = load_project_settings(project_dir)?;
    if let Some(n) = request.max_parallel {
        settings.run.max_parallel = n.max(1);
    }
    let timeout = request
        .timeout
        .or(settings.run.timeout_secs.map(Duration::from_secs));

    let rules = load_rules(&settings.rules_path(project_dir))?;
    let rules = select_rules(rules, &request.filter)?;
    check_stores(&rules, &settings)?;
    info!(selected = rules.len(), "Rules selected");

    let ctx = RunContext::open(
        drivers_from_settings(project_dir, &settings),
        ContextOptions::from_settings(&settings),
        cancel,
    )
    .await?;
    let summary = run_rules(&ctx, &rules, settings.run.max_parallel, timeout).await;
    ctx.close();
    Ok((settings, summary))
}
