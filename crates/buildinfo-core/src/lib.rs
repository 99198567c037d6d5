pub mod aggregator;
pub mod build;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod deploy;
pub mod error;
pub mod export;
pub mod filter;
pub mod http;
pub mod io;
pub mod run;
pub mod tracker;
pub mod unit;

pub use error::{BuildInfoError, Result};
