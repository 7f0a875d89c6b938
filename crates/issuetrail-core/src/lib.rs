pub mod clock;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod lifecycle;
pub mod render;
pub mod store;
pub mod tracker;
pub mod types;

pub use clock::*;
pub use config::*;
pub use error::*;
pub use fingerprint::*;
pub use lifecycle::*;
pub use render::*;
pub use store::*;
pub use tracker::*;
pub use types::*;
