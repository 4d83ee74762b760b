pub mod config;
pub mod error;
pub mod filter;
pub mod http;
pub mod safety;
pub mod scanner;
pub mod types;
pub mod valves;
