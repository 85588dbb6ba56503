//! Policy loading and the live policy set.
//!
//! Policies live as JSON files in a configured directory. The manifest file
//! ([`MANIFEST_FILE`]) inside that directory declares which files are active
//! and in what order:
//!
//! ```json
//! { "middlewares": ["github.json", "httpbin.json"] }
//! ```
//!
//! Loading is best-effort: a missing directory, missing or malformed
//! manifest, missing policy file, or invalid policy definition is logged and
//! skipped, and the load still produces a (possibly empty) set. The gateway
//! denies everything when the set is empty, so a broken configuration fails
//! closed.
//!
//! The current set is stored behind `RwLock<Arc<PolicySet>>`: readers clone
//! the `Arc` and evaluate against that snapshot while
//! [`reload`](PolicyStore::reload) installs a replacement with a single
//! swap. Evaluations holding a previous snapshot run to completion against
//! it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::handler::Handler;
use super::pattern::UrlPattern;

/// Name of the manifest file inside the policy directory.
pub const MANIFEST_FILE: &str = "fetchgate.json";

/// Manifest shape: an ordered list of policy filenames relative to the
/// policy directory. The key name is kept for compatibility with existing
/// configuration directories.
#[derive(Debug, Deserialize)]
struct Manifest {
    middlewares: Vec<String>,
}

/// On-disk shape of one policy definition.
#[derive(Debug, Deserialize)]
struct PolicyFile {
    title: String,
    description: String,
    pattern: String,
    handle: Handler,
}

/// One loaded policy. Identity is its position in the set, not a key.
#[derive(Debug, Clone)]
pub struct Policy {
    pub title: String,
    pub description: String,
    pub pattern: UrlPattern,
    pub handler: Handler,
    /// Filename within the policy directory this definition came from.
    pub source: String,
}

/// Caller-facing view of a policy; never exposes the handler rules or the
/// source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicySummary {
    pub title: String,
    pub description: String,
    pub pattern: String,
}

impl From<&Policy> for PolicySummary {
    fn from(policy: &Policy) -> Self {
        Self {
            title: policy.title.clone(),
            description: policy.description.clone(),
            pattern: policy.pattern.as_str().to_string(),
        }
    }
}

/// An ordered set of policies, replaced wholesale on reload.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    pub policies: Vec<Policy>,
}

impl PolicySet {
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn summaries(&self) -> Vec<PolicySummary> {
        self.policies.iter().map(PolicySummary::from).collect()
    }
}

/// Owns the policy directory path and the current [`PolicySet`].
pub struct PolicyStore {
    dir: PathBuf,
    manifest_path: PathBuf,
    current: RwLock<Arc<PolicySet>>,
}

impl PolicyStore {
    /// Create a store for a policy directory. No disk access happens here;
    /// call [`reload`](Self::reload) to perform the initial load.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let manifest_path = dir.join(MANIFEST_FILE);
        Self {
            dir,
            manifest_path,
            current: RwLock::new(Arc::new(PolicySet::default())),
        }
    }

    /// Snapshot of the current set.
    pub fn current(&self) -> Arc<PolicySet> {
        self.current.read().unwrap().clone()
    }

    /// Re-read the directory and manifest and swap the result in. Loading
    /// never fails; the returned set is empty when nothing loads.
    pub fn reload(&self) -> Arc<PolicySet> {
        let set = Arc::new(self.read_policies());
        *self.current.write().unwrap() = set.clone();
        set
    }

    fn read_policies(&self) -> PolicySet {
        if !self.dir.is_dir() {
            warn!("policy directory not found: {}", self.dir.display());
            return PolicySet::default();
        }

        if !self.manifest_path.is_file() {
            warn!(
                "manifest not found: {} (create it with a \"middlewares\" array of policy filenames)",
                self.manifest_path.display()
            );
            return PolicySet::default();
        }

        let text = match std::fs::read_to_string(&self.manifest_path) {
            Ok(text) => text,
            Err(e) => {
                error!(
                    "failed to read manifest {}: {}",
                    self.manifest_path.display(),
                    e
                );
                return PolicySet::default();
            }
        };

        let manifest: Manifest = match serde_json::from_str(&text) {
            Ok(manifest) => manifest,
            Err(e) => {
                error!(
                    "failed to parse manifest {}: {}",
                    self.manifest_path.display(),
                    e
                );
                return PolicySet::default();
            }
        };

        // Manifest order is significant: first match wins at evaluation
        // time, so the list is never sorted or deduplicated.
        let mut policies = Vec::new();
        for name in &manifest.middlewares {
            let path = self.dir.join(name);
            if !path.is_file() {
                warn!("policy file not found: {}", path.display());
                continue;
            }

            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    warn!("failed to read policy file {}: {}", path.display(), e);
                    continue;
                }
            };

            match serde_json::from_str::<PolicyFile>(&text) {
                Ok(file) => {
                    info!("loaded policy: {} ({})", file.title, file.pattern);
                    let pattern = UrlPattern::compile(&file.pattern);
                    policies.push(Policy {
                        title: file.title,
                        description: file.description,
                        pattern,
                        handler: file.handle,
                        source: name.clone(),
                    });
                }
                Err(e) => {
                    warn!("invalid policy definition in {}: {}", path.display(), e);
                }
            }
        }

        info!(
            "loaded {} policies from {}",
            policies.len(),
            self.dir.display()
        );
        PolicySet { policies }
    }
}

/// Start a SIGHUP handler that reloads the store on signal, for manual
/// reload via `kill -HUP <pid>`.
///
/// On non-Unix platforms this is a no-op.
#[cfg(unix)]
pub fn start_sighup_handler(store: Arc<PolicyStore>) {
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sig = signal(SignalKind::hangup()).expect("Failed to register SIGHUP handler");
        loop {
            sig.recv().await;
            let set = store.reload();
            info!("SIGHUP received, reloaded {} policy(s)", set.len());
        }
    });
}

/// No-op SIGHUP handler for non-Unix platforms.
#[cfg(not(unix))]
pub fn start_sighup_handler(_store: Arc<PolicyStore>) {
    // SIGHUP is not available on this platform
}
