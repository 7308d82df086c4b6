//! mesh-mpm: IEEE 802.11s Mesh Peering Management, AMPE and SAE driver core.
//!
//! # Architecture overview
//!
//! ```text
//! +----------------------+
//! |      MeshStation     |  owns peer table + RSN context, dispatches
//! +----------+-----------+  frames/timers
//!            |
//!   +--------+---------+
//!   |                  |
//! +-v----+        +----v----+
//! | mpm  |        |   sae   |
//! +-v----+        +----v----+
//!   |                  |
//! +-v------------------v--+
//! |     ampe / frame      |
//! +-----------+-----------+
//!             |
//!       +-----v-----+
//!       |   keys    |
//!       +-----+-----+
//!             |
//!       +-----v------+
//!       |   crypto   |
//!       +------------+
//! ```
//!
//! The wireless driver and the SAE cryptographic primitive are external
//! collaborators, consumed here through the [`driver::MeshDriver`] and
//! [`sae::SaeExchange`] traits respectively.

pub mod addr;
pub mod ampe;
pub mod config;
pub mod crypto;
pub mod driver;
pub mod error;
pub mod frame;
pub mod keys;
pub mod mpm;
pub mod peer;
pub mod prelude;
pub mod rsn;
pub mod sae;
pub mod station;

pub use error::{MeshError, Result};

/// Crate version, surfaced for diagnostics/logging at station start.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
