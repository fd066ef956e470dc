pub mod config;
pub mod error;
pub mod shared;
pub mod urls;
