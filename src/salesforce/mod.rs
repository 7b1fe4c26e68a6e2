mod api;
mod client;

pub use api::*;
pub use client::*;
