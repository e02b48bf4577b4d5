#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod auth;
pub mod comments;
pub mod compose;
pub mod config;
pub mod data;
pub mod format;
pub mod logging;
pub mod markdown;
pub mod nav;
pub mod reddit;
pub mod session;
pub mod storage;
pub mod ui;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::{run, run_with, RunOptions};
