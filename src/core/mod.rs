//! Core abstractions shared by the pricing pipeline

pub mod cache;
pub mod config;
pub mod error;
pub mod log;
pub mod price;
pub mod series;

// Re-export main types for cleaner imports
pub use error::{FetchError, PriceError};
pub use price::{Interval, PricePoint, PriceRequest, PriceSeriesProvider, Timeframe};
