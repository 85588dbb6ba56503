//! Declarative policy handlers.
//!
//! A policy file carries no executable code. Its `handle` object is a rule
//! the engine interprets: an optional method gate, mutation directives
//! applied to the request before execution, and the decision to return.
//!
//! # Example `handle`
//!
//! ```json
//! {
//!   "methods": ["GET", "POST"],
//!   "set_headers": { "Authorization": "Bearer ${API_TOKEN}" },
//!   "set_query": { "source": "gateway" },
//!   "result": true
//! }
//! ```
//!
//! Header and query values may reference environment variables as `${NAME}`
//! or `$NAME`; they are resolved when the handler runs, so secrets never
//! live in policy files. An unset variable is a handler fault and turns the
//! evaluation into a denial.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;

use crate::error::{FetchgateError, Result};
use crate::policy::engine::RequestContext;

/// A policy's verdict: either a bare boolean or an object carrying a reason.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Decision {
    Bool(bool),
    Verdict {
        allowed: bool,
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Decision and mutation rules for one policy.
#[derive(Debug, Clone, Deserialize)]
pub struct Handler {
    /// Methods this policy accepts. Absent means every method.
    #[serde(default)]
    pub methods: Option<Vec<String>>,
    /// Headers written into the request before execution (overwriting
    /// existing keys). Values may reference environment variables.
    #[serde(default)]
    pub set_headers: BTreeMap<String, String>,
    /// Query parameters written into the request. Values may reference
    /// environment variables.
    #[serde(default)]
    pub set_query: BTreeMap<String, String>,
    /// Replacement request body.
    #[serde(default)]
    pub set_body: Option<serde_json::Value>,
    /// Decision returned once the method gate passes. Defaults to allow.
    #[serde(default = "default_result")]
    pub result: Decision,
}

fn default_result() -> Decision {
    Decision::Bool(true)
}

impl Handler {
    /// Run this handler against a request: gate on method, apply the
    /// mutations in place, return the configured decision.
    ///
    /// A failed method gate returns a denial without touching the request.
    /// An interpolation failure is returned as an error for the engine to
    /// contain.
    pub fn apply(&self, ctx: &mut RequestContext) -> Result<Decision> {
        if let Some(methods) = &self.methods {
            if !methods.iter().any(|m| m == &ctx.method) {
                return Ok(Decision::Verdict {
                    allowed: false,
                    reason: Some(format!(
                        "method {} is not allowed by this policy",
                        ctx.method
                    )),
                });
            }
        }

        for (name, value) in &self.set_headers {
            let value = interpolate_env(value)?;
            ctx.headers.insert(name.clone(), value);
        }

        for (key, value) in &self.set_query {
            let value = interpolate_env(value)?;
            ctx.query_params.insert(key.clone(), value);
        }

        if let Some(body) = &self.set_body {
            ctx.body = Some(body.clone());
        }

        Ok(self.result.clone())
    }
}

/// Replace `${VAR_NAME}` and `$VAR_NAME` placeholders with environment
/// variable values. Returns an error naming the variable if it is not set.
fn interpolate_env(input: &str) -> Result<String> {
    if !input.contains('$') {
        return Ok(input.to_string());
    }

    // Match ${VAR_NAME} (braces form)
    let re_braces = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    // Match $VAR_NAME (no braces, uppercase + underscore only to avoid false positives)
    let re_bare = Regex::new(r"\$([A-Z_][A-Z0-9_]*)").unwrap();

    let mut result = input.to_string();

    for cap in re_braces.captures_iter(input) {
        let var_name = &cap[1];
        let value = std::env::var(var_name)
            .map_err(|_| FetchgateError::EnvVar(var_name.to_string()))?;
        result = result.replace(&cap[0], &value);
    }

    let intermediate = result.clone();
    for cap in re_bare.captures_iter(&intermediate) {
        let var_name = &cap[1];
        let value = std::env::var(var_name)
            .map_err(|_| FetchgateError::EnvVar(var_name.to_string()))?;
        result = result.replace(&cap[0], &value);
    }

    Ok(result)
}
