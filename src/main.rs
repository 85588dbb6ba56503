use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fetchgate::cli::{Cli, Commands};
use fetchgate::executor::RequestExecutor;
use fetchgate::policy::engine::{PolicyEngine, RequestContext};
use fetchgate::policy::store::{start_sighup_handler, PolicyStore, MANIFEST_FILE};
use fetchgate::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            bind,
            auth_token,
            timeout_secs,
        } => {
            cmd_serve(&cli.policies, port, &bind, auth_token, timeout_secs).await?;
        }
        Commands::Policies => {
            cmd_policies(&cli.policies);
        }
        Commands::Check { url, method } => {
            cmd_check(&cli.policies, &url, &method);
        }
        Commands::Init => {
            cmd_init(&cli.policies)?;
        }
    }

    Ok(())
}

async fn cmd_serve(
    policies: &Path,
    port: u16,
    bind: &str,
    auth_token: Option<String>,
    timeout_secs: Option<u64>,
) -> anyhow::Result<()> {
    let auth_token = auth_token.filter(|t| !t.is_empty());
    let store = Arc::new(PolicyStore::new(policies));
    let set = store.reload();

    let listen_addr = format!("{}:{}", bind, port);
    println!("fetchgate starting...");
    println!("Policies: {} ({} loaded)", policies.display(), set.len());
    println!("Listen: {}", listen_addr);
    if auth_token.is_some() {
        println!("Auth: bearer token required");
    } else {
        println!("Auth: disabled (no token configured)");
    }

    let state = Arc::new(AppState {
        store: store.clone(),
        engine: PolicyEngine::new(store.clone()),
        executor: RequestExecutor::new(timeout_secs.map(Duration::from_secs))?,
        auth_token,
    });

    start_sighup_handler(store);
    server::start(&listen_addr, state).await?;
    Ok(())
}

fn cmd_policies(policies: &Path) {
    let store = PolicyStore::new(policies);
    let set = store.reload();

    if set.is_empty() {
        println!("No policies configured in {}.", policies.display());
        println!(
            "Add policy files to the directory and list them in {}.",
            MANIFEST_FILE
        );
        return;
    }

    println!("Policies ({})", policies.display());
    println!("{}", "─".repeat(60));
    for policy in &set.policies {
        println!("  [{}] {}", policy.title, policy.pattern.as_str());
        println!("      {}", policy.description);
        println!("      source: {}", policy.source);
    }
}

fn cmd_check(policies: &Path, url: &str, method: &str) {
    let store = Arc::new(PolicyStore::new(policies));
    store.reload();
    let engine = PolicyEngine::new(store);

    let mut ctx = RequestContext {
        url: url.to_string(),
        method: method.to_uppercase(),
        headers: BTreeMap::new(),
        body: None,
        query_params: BTreeMap::new(),
    };
    let verdict = engine.evaluate(&mut ctx);

    if verdict.allowed {
        let title = verdict.matched.map(|m| m.title).unwrap_or_default();
        println!("ALLOWED: {} {}", ctx.method, url);
        println!("  Policy: {}", title);
        for (name, value) in &ctx.headers {
            println!("  Sets header: {}: {}", name, value);
        }
        for (key, value) in &ctx.query_params {
            println!("  Sets query: {}={}", key, value);
        }
    } else {
        println!("DENIED: {} {}", ctx.method, url);
        if let Some(error) = verdict.error {
            println!("  Reason: {}", error);
        }
    }
}

fn cmd_init(policies: &Path) -> anyhow::Result<()> {
    println!("Initializing fetchgate policy directory...");

    std::fs::create_dir_all(policies)?;
    println!("  Created policy dir: {}", policies.display());

    let manifest_path = policies.join(MANIFEST_FILE);
    if !manifest_path.exists() {
        std::fs::write(&manifest_path, include_str!("../templates/fetchgate.json"))?;
        println!("  Created manifest: {}", manifest_path.display());
    } else {
        println!("  Manifest already exists: {}", manifest_path.display());
    }

    let example_path = policies.join("httpbin.json");
    if !example_path.exists() {
        std::fs::write(&example_path, include_str!("../templates/httpbin.json"))?;
        println!("  Created example policy: {}", example_path.display());
    } else {
        println!("  Example policy already exists: {}", example_path.display());
    }

    println!("\nDone! Next steps:");
    println!("  1. Review the example policy: {}", example_path.display());
    println!(
        "  2. Start the server: fetchgate --policies {} serve",
        policies.display()
    );
    println!("  3. Try a request:");
    println!("       curl -X POST http://127.0.0.1:3000/api/execute \\");
    println!("         -H 'Content-Type: application/json' \\");
    println!("         -d '{{\"url\": \"https://httpbin.org/get\", \"method\": \"GET\"}}'");
    Ok(())
}
