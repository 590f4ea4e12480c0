pub mod admin;
pub mod pages;
pub mod responses;
pub mod router;
pub mod state;
pub mod webhook;

pub use state::AppState;
