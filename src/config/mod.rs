mod env_overrides;
mod loader;
mod types;

pub use types::{
    AnalysisConfig, AutosaveConfig, BackendConfig, ChatConfig, Config, RateLimitConfig,
    ReliabilityConfig,
};
