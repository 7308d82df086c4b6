//! Mesh RSN context: the interface-wide state that isn't per-peer —
//! the locally generated group key, the SAE group fallback cursor, and
//! the configured group list. One instance per mesh interface, owned by
//! [`crate::station::MeshStation`].

use crate::addr::MacAddr;
use crate::config::MeshConfig;
use crate::sae::SaeGroupCursor;

pub struct RsnContext {
    pub local_addr: MacAddr,
    /// Locally generated group key, written once at RSN init and
    /// thereafter read-only.
    mgtk: [u8; 16],
    pub sae_groups: Vec<u16>,
    pub sae_group_cursor: SaeGroupCursor,
    /// SAE anti-clogging token handed back by a peer under load, if any.
    pub anti_clogging_token: Option<Vec<u8>>,
}

impl RsnContext {
    pub fn new(local_addr: MacAddr, config: &MeshConfig) -> Self {
        let mut mgtk = [0u8; 16];
        crate::crypto::rand_bytes(&mut mgtk);
        Self {
            local_addr,
            mgtk,
            sae_groups: config.sae_groups.clone(),
            sae_group_cursor: SaeGroupCursor::new(),
            anti_clogging_token: None,
        }
    }

    pub fn mgtk(&self) -> &[u8; 16] {
        &self.mgtk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mgtk_is_generated_and_stable() {
        let config = MeshConfig::default();
        let ctx = RsnContext::new(MacAddr::ZERO, &config);
        let first = *ctx.mgtk();
        assert_eq!(first, *ctx.mgtk());
    }
}
