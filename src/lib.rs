//! # fetchgate
//!
//! **Deny-by-default gateway for outbound HTTP requests.**
//!
//! fetchgate sits between a caller and the internet: every request is first
//! evaluated against an ordered set of JSON policies, and only a request
//! some policy explicitly approves is executed. Matching policies may also
//! rewrite the request (headers, query parameters, body) before it goes
//! out.
//!
//! ## Architecture
//!
//! - **[`policy`]** — JSON policy store, URL pattern matching, and the
//!   first-match evaluation engine
//! - **[`executor`]** — outbound HTTP execution and response normalization
//!   (reqwest)
//! - **[`server`]** — JSON API over axum with optional bearer auth
//! - **[`cli`]** — command-line interface (clap)
//! - **[`error`]** — unified error types using `thiserror`
//!
//! ## Quick Start
//!
//! ```bash
//! # Create a policy directory with an example policy
//! fetchgate --policies ./policies init
//!
//! # Start the API server
//! fetchgate --policies ./policies serve
//!
//! # Execute a request through the gateway
//! curl -X POST http://127.0.0.1:3000/api/execute \
//!   -H 'Content-Type: application/json' \
//!   -d '{"url": "https://httpbin.org/get", "method": "GET"}'
//! ```

pub mod cli;
pub mod error;
pub mod executor;
pub mod policy;
pub mod server;
