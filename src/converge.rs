//! The convergence engine: runs a resolved plan against a host.
//!
//! Execution is strictly sequential, in plan order, because resources may depend on the side
//! effects of their predecessors. Each resource is probed, diffed, and (when the delta is
//! non-empty) applied; an error on one resource is recorded and the run continues, so the
//! report always contains exactly one record per planned resource.

pub mod report;

use crate::core::resource::Delta;
use crate::resolve::{PlanStep, ResolvedPlan};
use crate::system::Host;
use chrono::Utc;
use log::{debug, info, warn};

#[doc(inline)]
pub use report::{ActionRecord, Outcome, Report};

/// Options controlling a convergence run.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConvergeOptions {
    /// Probe and diff normally, but apply nothing. Records carry the outcome the change would
    /// have produced, so a dry run reads like the run it predicts.
    pub dry_run: bool,
}

/// Converges `host` to the desired state described by `plan`.
///
/// Never aborts: by the time a plan exists, all structural errors have already surfaced in
/// [resolve](crate::resolve::resolve), and per-resource errors are recorded as
/// [Outcome::Failed] without stopping the run. The returned report's
/// [success](Report::success) is false iff any record failed.
pub fn converge(plan: &ResolvedPlan, host: &Host, options: &ConvergeOptions) -> Report {
    let started = Utc::now();
    let mut records = Vec::with_capacity(plan.len());

    for step in plan {
        records.push(converge_step(step, host, options));
    }

    Report {
        records,
        started,
        finished: Utc::now(),
    }
}

fn converge_step(step: &PlanStep, host: &Host, options: &ConvergeOptions) -> ActionRecord {
    let resource = step.resource.describe();
    debug!("probing {resource} (role '{}')", step.role);

    let actual = match step.resource.probe(host) {
        Ok(actual) => actual,
        Err(err) => return failed(step, resource, None, err),
    };

    let delta = match step.resource.diff(&actual, &step.vars, host) {
        Ok(delta) => delta,
        Err(err) => return failed(step, resource, None, err),
    };

    if delta.is_empty() {
        debug!("unchanged: {resource}");
        return ActionRecord {
            role: step.role.clone(),
            resource,
            outcome: Outcome::Unchanged,
            diff: None,
            error: None,
        };
    }

    let outcome = match &delta {
        Delta::Create { .. } => Outcome::Created,
        Delta::Modify { .. } => Outcome::Modified,
        Delta::Unchanged => unreachable!("empty delta after is_empty check"),
    };
    let diff = delta.summary().map(str::to_string);

    if options.dry_run {
        info!(
            "would have {outcome}: {resource} ({})",
            diff.as_deref().unwrap_or(""),
        );
        return ActionRecord {
            role: step.role.clone(),
            resource,
            outcome,
            diff,
            error: None,
        };
    }

    match step.resource.apply(&delta, host) {
        Ok(()) => {
            info!("{outcome}: {resource} ({})", diff.as_deref().unwrap_or(""));
            ActionRecord {
                role: step.role.clone(),
                resource,
                outcome,
                diff,
                error: None,
            }
        }
        Err(err) => failed(step, resource, diff, err),
    }
}

fn failed(
    step: &PlanStep,
    resource: String,
    diff: Option<String>,
    err: impl Into<anyhow::Error>,
) -> ActionRecord {
    // Flatten the error chain into one line so the record is self-contained.
    let err: anyhow::Error = err.into();
    let error = format!("{err:#}");
    warn!("failed: {resource}: {error}");

    ActionRecord {
        role: step.role.clone(),
        resource,
        outcome: Outcome::Failed,
        diff,
        error: Some(error),
    }
}
