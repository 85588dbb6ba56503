//! First-match policy evaluation.
//!
//! The engine takes a snapshot of the store's current policy set, walks it
//! in manifest order, and stops at the first policy whose pattern matches
//! the request URL. That policy's handler then gates and mutates the
//! request and produces the decision. There is no specificity ranking: an
//! earlier, broader pattern beats a later, more precise one.
//!
//! Evaluation never fails. Every outcome, including a faulting handler, is
//! reported as an [`EvaluationResult`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::handler::Decision;
use super::store::{PolicyStore, PolicySummary};

/// An outbound HTTP request as seen by the policy pipeline.
///
/// Handlers mutate it in place; the mutated value is what gets executed.
/// Each inbound call builds its own context, so nothing here is ever shared
/// across requests.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
    pub query_params: BTreeMap<String, String>,
}

/// Outcome of evaluating one request against the current policy set.
///
/// `error` is set exactly when `allowed` is false. `matched` is present
/// whenever some policy's pattern matched, including denials and faults.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub allowed: bool,
    pub matched: Option<PolicySummary>,
    pub error: Option<String>,
}

impl EvaluationResult {
    fn approved(matched: PolicySummary) -> Self {
        Self {
            allowed: true,
            matched: Some(matched),
            error: None,
        }
    }

    fn denied(matched: Option<PolicySummary>, error: impl Into<String>) -> Self {
        Self {
            allowed: false,
            matched,
            error: Some(error.into()),
        }
    }
}

/// Evaluates requests against the store's current policy set.
#[derive(Clone)]
pub struct PolicyEngine {
    store: Arc<PolicyStore>,
}

impl PolicyEngine {
    pub fn new(store: Arc<PolicyStore>) -> Self {
        Self { store }
    }

    /// Decide whether a request may run.
    ///
    /// The snapshot taken at entry is used for the whole evaluation, so a
    /// concurrent reload never changes the set mid-walk. The matched
    /// handler's mutations are visible in `ctx` after this returns.
    pub fn evaluate(&self, ctx: &mut RequestContext) -> EvaluationResult {
        let set = self.store.current();

        if set.is_empty() {
            return EvaluationResult::denied(None, "no policies configured");
        }

        let Some(policy) = set.policies.iter().find(|p| p.pattern.matches(&ctx.url)) else {
            return EvaluationResult::denied(
                None,
                format!("no policy matches URL: {}", ctx.url),
            );
        };

        debug!("policy '{}' matched {}", policy.title, ctx.url);
        let summary = PolicySummary::from(policy);

        match policy.handler.apply(ctx) {
            Ok(Decision::Bool(true)) => EvaluationResult::approved(summary),
            Ok(Decision::Bool(false)) => EvaluationResult::denied(
                Some(summary),
                format!("policy \"{}\" denied the request", policy.title),
            ),
            Ok(Decision::Verdict { allowed: true, .. }) => EvaluationResult::approved(summary),
            Ok(Decision::Verdict {
                allowed: false,
                reason,
            }) => {
                let error = reason.unwrap_or_else(|| {
                    format!("policy \"{}\" denied the request", policy.title)
                });
                EvaluationResult::denied(Some(summary), error)
            }
            Err(e) => {
                warn!("policy '{}' faulted: {}", policy.title, e);
                EvaluationResult::denied(
                    Some(summary),
                    format!("policy \"{}\" threw an error: {}", policy.title, e),
                )
            }
        }
    }
}
