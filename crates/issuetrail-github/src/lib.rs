pub mod client;
pub mod config;
pub mod requests;
pub mod responses;

pub use client::*;
pub use config::*;
pub use requests::*;
pub use responses::*;
