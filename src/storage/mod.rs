mod migrate;
mod state;
mod types;
mod vault;

pub use migrate::migrate;
pub use state::StateStore;
pub use types::{
    ContentFormat, FeedConfig, FeedMetadata, FetchInterval, FetchedLinks, FolderStructure,
    GlobalConfig, CURRENT_SCHEMA_VERSION, MIN_CUSTOM_INTERVAL_MINUTES,
};
pub use vault::{FilesystemError, FsVault, Vault};
