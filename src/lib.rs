pub mod catalog;
pub mod command_reader;
pub mod config;
pub mod console_display;
pub mod controller;
pub mod error;
pub mod estimation;
pub mod evaluator;
pub mod http_client;
pub mod matcher;
pub mod poll_loop;
pub mod simulator;
pub mod types;

pub use error::{Result, TunerError};
