//! Mirage: a mock HTTP(S) API server engine.
//!
//! An [`environment::Environment`] describes routes, candidate responses,
//! data buckets and proxy settings. [`server::MockServer`] serves it on one
//! port; [`server::ServerHost`] runs several of them side by side.

pub mod admin_api;
pub mod data;
pub mod environment;
pub mod metrics;
pub mod proxy;
pub mod request;
pub mod routing;
pub mod selector;
pub mod server;
pub mod streaming;
pub mod template;
pub mod transaction;

pub use environment::{Environment, ServerOptions};
pub use server::{MockServer, ServerError, ServerHost};
pub use transaction::{ServerErrorCode, ServerEvent, ServerEventKind};
