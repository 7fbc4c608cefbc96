//! Redash API interaction module
//!
//! # Module Structure
//!
//! - [`client`] - Data source operations against one collection endpoint
//! - [`http`] - HTTP session with `Key` authentication and status checking
//!
//! # Example
//!
//! ```ignore
//! use dsprune::redash::DataSourceClient;
//!
//! async fn example() -> dsprune::Result<()> {
//!     let client = DataSourceClient::new("https://redash.example.com", "api-key", DEFAULT_TIMEOUT)?;
//!     let all = client.show_all().await?;
//!     client.close();
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod http;

pub use client::DataSourceClient;
pub use http::DEFAULT_TIMEOUT;
