pub mod candidate;
pub mod config;
pub mod error;
pub mod export;
pub mod games;
pub mod history;
pub mod history_store;
pub mod lanes;
pub mod logging;
pub mod overlay;
pub mod pipeline;
pub mod play_type;
pub mod pool;
pub mod scoring;
pub mod selectivity;
pub mod subscriber;
