//! PrismDrive REST client for everything that is not a streaming upload.

mod client;

pub use client::{ApiError, Client};
