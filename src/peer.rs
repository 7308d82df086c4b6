//! Peer table: one [`PeerRecord`] per known mesh neighbor, keyed by MAC
//! address. Owned by the MPM layer; every other component reaches a
//! peer record through a single `&mut` borrow handed out for the
//! duration of one event dispatch.

use std::collections::HashMap;

use zeroize::Zeroize;

use crate::addr::MacAddr;
use crate::config::MAX_SUPP_RATES;
use crate::error::{MeshError, Result};
use crate::mpm::PlinkState;
use crate::sae::SaeSession;

/// Authentication algorithm negotiated for a peering instance. This crate
/// only ever uses SAE, but the field is kept explicit so a future caller
/// can tell an unauthenticated test double from a real peering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAlgorithm {
    Sae,
}

/// A generation-tagged timer identity. A timer fired with a stale
/// generation (peer removed or re-created since the timer was armed) is a
/// provable no-op instead of touching a dangling or wrong record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerTimerId {
    pub addr: MacAddr,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Retry,
    Confirm,
    Holding,
    SaeAuth,
}

/// Key material derived for one peering instance. Zeroized on drop so a
/// peer's keys don't linger in freed memory once the record is removed.
#[derive(Default, Zeroize)]
#[zeroize(drop)]
pub struct PeerKeys {
    pub pmk: Option<[u8; 32]>,
    pub aek: Option<Vec<u8>>,
    pub mtk: Option<Vec<u8>>,
    pub mgtk: Option<[u8; 16]>,
}

impl std::fmt::Debug for PeerKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerKeys")
            .field("pmk", &self.pmk.map(|_| "<redacted>"))
            .field("aek", &self.aek.as_ref().map(|_| "<redacted>"))
            .field("mtk", &self.mtk.as_ref().map(|_| "<redacted>"))
            .field("mgtk", &self.mgtk.map(|_| "<redacted>"))
            .finish()
    }
}

/// One known mesh neighbor and everything learned about peering with it.
pub struct PeerRecord {
    pub addr: MacAddr,
    pub plink_state: PlinkState,
    pub my_lid: u16,
    pub peer_lid: u16,
    pub my_nonce: [u8; 32],
    pub peer_nonce: [u8; 32],
    pub reason: Option<u16>,
    pub retries: u32,
    pub generation: u64,
    pub sae: Option<SaeSession>,
    pub sae_auth_retry: u32,
    pub keys: PeerKeys,
    pub supp_rates: Vec<u8>,
    pub auth_alg: AuthAlgorithm,
}

impl PeerRecord {
    fn new(addr: MacAddr, generation: u64) -> Self {
        let mut my_nonce = [0u8; 32];
        crate::crypto::rand_bytes(&mut my_nonce);
        Self {
            addr,
            plink_state: PlinkState::Listen,
            my_lid: 0,
            peer_lid: 0,
            my_nonce,
            peer_nonce: [0u8; 32],
            reason: None,
            retries: 0,
            generation,
            sae: None,
            sae_auth_retry: 0,
            keys: PeerKeys::default(),
            supp_rates: Vec::new(),
            auth_alg: AuthAlgorithm::Sae,
        }
    }

    pub fn timer_id(&self, _kind: TimerKind) -> PeerTimerId {
        PeerTimerId {
            addr: self.addr,
            generation: self.generation,
        }
    }

    /// Invariant 1: established links always carry derived link IDs
    /// and key material.
    pub fn is_established_consistent(&self) -> bool {
        if self.plink_state != PlinkState::Estab {
            return true;
        }
        self.my_lid != 0
            && self.peer_lid != 0
            && self.keys.aek.is_some()
            && self.keys.mtk.is_some()
    }

    /// Replace the peer's supported-rates set, capped at `MAX_SUPP_RATES`
    /// regardless of how many the caller offers.
    pub fn merge_supp_rates(&mut self, rates: &[u8]) {
        self.supp_rates.clear();
        self.supp_rates
            .extend(rates.iter().take(MAX_SUPP_RATES).copied());
    }
}

/// Hash-indexed set of peer records. Enforces `max_peers` and the
/// single-peering-link-per-pair invariant by construction: one entry
/// per `MacAddr`.
#[derive(Default)]
pub struct PeerTable {
    peers: HashMap<MacAddr, PeerRecord>,
    next_generation: u64,
    max_peers: usize,
}

impl PeerTable {
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: HashMap::new(),
            next_generation: 1,
            max_peers,
        }
    }

    pub fn get(&self, addr: &MacAddr) -> Option<&PeerRecord> {
        self.peers.get(addr)
    }

    pub fn get_mut(&mut self, addr: &MacAddr) -> Option<&mut PeerRecord> {
        self.peers.get_mut(addr)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Look up `addr`, creating a fresh `Listen`-state record if this is
    /// the first time we've heard from it and the table has capacity.
    pub fn get_or_insert(&mut self, addr: MacAddr, supp_rates: &[u8]) -> Result<&mut PeerRecord> {
        if !self.peers.contains_key(&addr) {
            if self.peers.len() >= self.max_peers {
                return Err(MeshError::ResourceExhaustion(format!(
                    "peer table full ({} entries)",
                    self.max_peers
                )));
            }
            let generation = self.next_generation;
            self.next_generation += 1;
            let mut record = PeerRecord::new(addr, generation);
            record.merge_supp_rates(supp_rates);
            self.peers.insert(addr, record);
        }
        Ok(self.peers.get_mut(&addr).expect("just inserted or present"))
    }

    /// Remove a peer record entirely. Any timer armed against its
    /// generation becomes a stale no-op the moment this returns.
    pub fn remove(&mut self, addr: &MacAddr) -> Option<PeerRecord> {
        self.peers.remove(addr)
    }

    /// Advance `addr`'s generation in place, without removing the record.
    /// Any timer armed against the prior generation becomes a stale
    /// no-op, while the record itself (and whatever the caller is about
    /// to set on it) survives.
    pub fn bump_generation(&mut self, addr: &MacAddr) {
        let generation = self.next_generation;
        self.next_generation += 1;
        if let Some(peer) = self.peers.get_mut(addr) {
            peer.generation = generation;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.values()
    }
}
