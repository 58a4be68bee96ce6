//! Colorization pipeline: configuration, service object and response envelope.

mod colorize;
mod config;
mod response;

pub use colorize::Colorizer;
pub use config::Config;
pub use response::Response;
