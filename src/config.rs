//! Mesh peering configuration.
//!
//! Covers the peering timers, SAE retry policy, peer table capacity, and
//! SAE group list, plus the two values every mesh interface must supply:
//! the passphrase used to derive SAE's PWE, and the mesh ID carried in
//! peering IEs.

use serde::{Deserialize, Serialize};

/// AEK length in bytes. AES-SIV (the `Aes128SivAead` construction)
/// takes a double-length key: two 128-bit AES subkeys concatenated.
pub const AEK_LEN: usize = 32;
/// MTK length in bytes.
pub const MTK_LEN: usize = 16;
/// MGTK length in bytes, fixed by the static-MGTK non-goal.
pub const MGTK_LEN: usize = 16;
/// Maximum number of supported-rate octets copied into a peer record.
pub const MAX_SUPP_RATES: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Local mesh ID, ≤ 32 bytes, carried in every peering frame.
    pub mesh_id: String,

    /// SAE passphrase. Never logged or displayed.
    #[serde(skip_serializing)]
    pub passphrase: String,

    /// Retry timer duration (OPEN retransmit while in OpenSent/OpenRcvd).
    pub retry_timeout_ms: u64,
    /// Confirm timer duration (CONFIRM retransmit while in CnfRcvd).
    pub confirm_timeout_ms: u64,
    /// Holding timer duration before restarting to Listen.
    pub holding_timeout_ms: u64,
    /// Maximum MPM retry attempts before giving up to Holding.
    pub mpm_retry_max: u32,

    /// SAE commit/confirm retransmit timeout (`MESH_AUTH_TIMEOUT`).
    pub mesh_auth_timeout_ms: u64,
    /// SAE retry attempts before blocking the peer (`MESH_AUTH_RETRY`).
    pub mesh_auth_retry_max: u32,

    /// Ordered list of SAE finite field / ECC groups to try, most
    /// preferred first. No sentinel needed (cf. the `-1`-terminated C
    /// array this replaces).
    pub sae_groups: Vec<u16>,

    /// Upper bound on the number of peer records held at once.
    pub max_peers: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            mesh_id: String::new(),
            passphrase: String::new(),
            retry_timeout_ms: 1_000,
            confirm_timeout_ms: 1_000,
            holding_timeout_ms: 2_000,
            mpm_retry_max: 4,
            mesh_auth_timeout_ms: 10_000,
            mesh_auth_retry_max: 3,
            sae_groups: vec![19, 20, 21],
            max_peers: 32,
        }
    }
}

impl MeshConfig {
    pub fn new(mesh_id: impl Into<String>, passphrase: impl Into<String>) -> Self {
        Self {
            mesh_id: mesh_id.into(),
            passphrase: passphrase.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sae_groups_are_non_empty_and_sentinel_free() {
        let cfg = MeshConfig::default();
        assert!(!cfg.sae_groups.is_empty());
        assert!(cfg.sae_groups.iter().all(|&g| g > 0));
    }
}
