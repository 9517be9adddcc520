// Kumite scoreboard and single-elimination bracket service.

pub mod api;
pub mod archive;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod export;
pub mod metrics;
pub mod tournament;
