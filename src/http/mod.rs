pub mod client;

pub use client::{classify_status, RateLimitedHttpClient};
