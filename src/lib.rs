pub mod api;
pub mod broadcast;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod routing;
pub mod services;
pub mod store;
pub mod venues;

pub use error::{Result, SwapError};
