//! # Cyber Middleware
//!
//! Middleware composition for the cyber framework.
//!
//! A middleware is a decorator `Handler -> Handler`. Decorators are collected
//! in a [`MiddlewareChain`] and registered in a [`MiddlewareRegistry`] at
//! one of three tiers:
//!
//! ```text
//! Request → global → group(s), shortest prefix first → route → Handler
//!                                                                 ↓
//! Response ← global ← group(s) ← route ←──────────────────────────┘
//! ```
//!
//! Within a tier the first registered middleware is the outermost. The
//! effective chain of a route is resolved once, when the application is
//! built.
//!
//! ## Example
//!
//! ```
//! use cyber_middleware::{stages, MiddlewareRegistry};
//! use http::Method;
//!
//! let mut registry = MiddlewareRegistry::new();
//! registry.use_global([stages::recovery(), stages::logger()]);
//! registry.use_group("/api", [stages::cors()]);
//!
//! assert_eq!(registry.chain_for(&Method::GET, "/api/users").len(), 3);
//! ```

#![doc(html_root_url = "https://docs.rs/cyber-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod registry;
pub mod stages;

pub use chain::MiddlewareChain;
pub use registry::{parse_method, MiddlewareRegistry, SUPPORTED_METHODS};
