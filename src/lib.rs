//! qbo-gateway — OAuth credential lifecycle for a QuickBooks Online gateway.
//!
//! Acquires, persists, validates, refreshes and revokes the single bearer
//! credential the rest of the gateway calls the accounting API with.
//!
//! # Quick Start
//!
//! ```no_run
//! use qbo_gateway::prelude::*;
//!
//! # async fn example() -> qbo_gateway::error::Result<()> {
//! let config = GatewayConfig::from_env()?;
//! config.validate()?;
//! let manager = TokenManager::from_config(&config)?;
//! match manager.get_current_token().await {
//!     Some(credential) => println!("realm {}", credential.tenant_id),
//!     None => println!("authorization required"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod prelude;

#[cfg(feature = "cli")]
pub mod cli;
