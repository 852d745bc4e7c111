pub mod config;

pub use config::{
    BoardConfig, CacheConfig, LogConfig, LogFormat, SeedConfig, ServerConfig, SessionConfig,
    StorageConfig,
};
