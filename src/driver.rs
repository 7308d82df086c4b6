//! Driver adapter: the capability trait the core calls out to transmit
//! frames and install keys. Collapses a function-pointer callback table
//! (logger, get_psk, set_key, start_ampe) into a single trait object
//! covering the wireless driver and key-install surface.

use bitflags::bitflags;

use crate::addr::MacAddr;
use crate::error::Result;

bitflags! {
    /// Station flags passed to `sta_add`/`sta_set` (subset of
    /// IEEE 802.11 driver NL80211_STA_FLAG_* needed here).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StaFlags: u32 {
        const AUTHENTICATED = 0b0000_0001;
        const AUTHORIZED    = 0b0000_0010;
        const WMM           = 0b0000_0100;
        const MFP           = 0b0000_1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherSuite {
    Ccmp,
    Gcmp,
}

/// Target of a `set_key` call: a specific peer's pairwise key, or the
/// broadcast/group key for the whole mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTarget {
    Pairwise(MacAddr),
    Group,
}

/// Parameters for adding or updating a station entry in the driver.
#[derive(Debug, Clone)]
pub struct StaAddParams {
    pub addr: MacAddr,
    pub supp_rates: Vec<u8>,
    pub plink_state: crate::mpm::PlinkState,
    pub aid: u16,
    pub listen_interval: u16,
    pub flags: StaFlags,
    /// `true` updates an existing entry in place rather than creating one.
    pub set: bool,
}

/// The out-calls a mesh station makes into the wireless driver. A
/// real binding talks to nl80211; this crate's tests use an in-memory
/// fake that records calls for assertions.
pub trait MeshDriver: Send + Sync {
    fn send_action(&self, freq: u32, dst: MacAddr, src: MacAddr, bssid: MacAddr, frame: &[u8]) -> Result<()>;
    fn send_mlme(&self, frame: &[u8], noack: bool) -> Result<()>;
    fn sta_add(&self, params: &StaAddParams) -> Result<()>;
    fn set_key(
        &self,
        alg: CipherSuite,
        target: KeyTarget,
        idx: u8,
        is_tx: bool,
        seq: [u8; 6],
        key: &[u8],
    ) -> Result<()>;
}
