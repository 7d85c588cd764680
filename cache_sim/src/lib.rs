pub mod addr;
mod bin;
pub mod cache;
pub mod config;
pub mod sim;
pub mod snapshot;
pub mod trace;

#[cfg(feature = "stat")]
pub mod stat;
