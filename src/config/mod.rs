//! Configuration module

mod settings;

pub use settings::CacheConfig;
pub use settings::ContentConfig;
pub use settings::ContentOptions;
pub use settings::FileSystemConfig;
pub use settings::GitHubConfig;
