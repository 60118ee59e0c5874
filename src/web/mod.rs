//! Browser-facing surface: landing page, WebSocket channel and file delivery

pub mod delivery;
pub mod pages;
pub mod server;
pub mod socket;

pub use server::{create_router, run_server, AppState};
