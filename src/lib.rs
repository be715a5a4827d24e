// Configuration (TOML file + env overrides)
pub mod config;

// Client error taxonomy
pub mod error;

// Wire records and batch decoding
pub mod model;

// Entity registry and handle capabilities
pub mod registry;

// Poll client, loops and driver
pub mod sync;

// Re-export commonly used types
pub use config::SyncConfig;
pub use error::SyncError;
pub use model::{Coordinates, LightColor};
pub use registry::{EntityRegistry, Handle, LightSurface, MirrorObject, Resolve};
pub use sync::{StateSyncClient, SyncDriver};
