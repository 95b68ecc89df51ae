pub mod config;
pub mod logging;

pub mod completion;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod pool;
pub mod sink;
pub mod source;
pub mod stats;
pub mod url_model;
