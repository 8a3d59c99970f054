//! Redemption Client SDK.
//!
//! Front ends use this crate to redeem catalog items. One click is one
//! idempotency key: the client reuses it on every retry of the same attempt,
//! so the service collapses them into a single deduction and transfer.
//!
//! # Example
//!
//! ```no_run
//! use redemption_client::{RedeemRequest, RedemptionClient};
//!
//! # async fn example() -> Result<(), redemption_client::ClientError> {
//! let client = RedemptionClient::new("http://redemption.rewards.svc:8080")?;
//!
//! let request = RedeemRequest::new(
//!     "6f9619ff-8b86-d011-b42d-00cf4fc964ff".parse().unwrap(),
//!     "golden-ticket".parse().unwrap(),
//!     "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin",
//! );
//! let outcome = client.redeem(&request).await?;
//!
//! println!("{}", outcome.toast());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, RedemptionClient};
pub use error::{ClientError, Result};
pub use types::*;
