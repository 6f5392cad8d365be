//! Admin API request handlers.

pub mod state;
pub mod system;
