//! adjoin configuration: environment resolution, generated config files,
//! and the persistent initialization state.

pub mod dirs;
pub mod render;
pub mod settings;
pub mod state;

pub use render::RenderError;
pub use settings::{ConfigError, DnsIdentity, EnvMap, Settings};
pub use state::{FileStateStore, InitRecord, MemoryStateStore, StateStore};
