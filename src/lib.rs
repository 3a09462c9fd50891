pub mod config;
pub mod error;
pub mod health;
pub mod history;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod normalize;
pub mod payload;
pub mod report;
pub mod severity;
pub mod source;
pub mod trend;
