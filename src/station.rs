//! Event loop glue: `MeshStation` owns the peer table and RSN context
//! and dispatches inbound frames/timers into the MPM/SAE/AMPE layers
//! through a single explicit owner rather than back-references threaded
//! through a shared supplicant struct.

use std::collections::BinaryHeap;
use std::cmp::{Ordering, Reverse};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::addr::MacAddr;
use crate::ampe::{process_ampe, protect_frame};
use crate::config::{MeshConfig, AEK_LEN, MTK_LEN};
use crate::driver::{CipherSuite, KeyTarget, MeshDriver, StaAddParams, StaFlags};
use crate::error::{MeshError, Result};
use crate::frame::{
    parse_self_protected, FrameBuilder, SelfProtectedAction, CATEGORY_SELF_PROTECTED,
    EID_MESH_CONFIG, EID_MESH_ID, EID_MESH_PEERING_MGMT,
};
use crate::keys::{derive_aek, derive_mtk};
use crate::mpm::{self, Actions, PlinkEvent, PlinkState, TimeoutKind};
use crate::peer::{PeerTimerId, TimerKind};
use crate::rsn::RsnContext;
use crate::sae::{SaeExchange, SaeOutcome, SaeSession};
use crate::peer::PeerTable;

/// Factory for fresh `SaeExchange` instances, since a trait object can't
/// be `Clone`d and every peering attempt needs its own exchange state.
pub type SaeFactory = Arc<dyn Fn() -> Box<dyn SaeExchange> + Send + Sync>;

/// An armed timer, ordered for a min-heap on deadline (earliest first).
struct ArmedTimer {
    deadline: Instant,
    id: PeerTimerId,
    kind: TimerKind,
}

impl PartialEq for ArmedTimer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}
impl Eq for ArmedTimer {}
impl PartialOrd for ArmedTimer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ArmedTimer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline.cmp(&other.deadline)
    }
}

pub struct MeshStation {
    pub config: MeshConfig,
    pub local_addr: MacAddr,
    driver: Arc<dyn MeshDriver>,
    sae_factory: SaeFactory,
    pub peers: PeerTable,
    pub rsn: RsnContext,
    timers: BinaryHeap<Reverse<ArmedTimer>>,
}

impl MeshStation {
    pub fn new(
        config: MeshConfig,
        local_addr: MacAddr,
        driver: Arc<dyn MeshDriver>,
        sae_factory: SaeFactory,
    ) -> Self {
        let max_peers = config.max_peers;
        let rsn = RsnContext::new(local_addr, &config);
        Self {
            config,
            local_addr,
            driver,
            sae_factory,
            peers: PeerTable::new(max_peers),
            rsn,
            timers: BinaryHeap::new(),
        }
    }

    fn arm(&mut self, id: PeerTimerId, kind: TimerKind, after: Duration) {
        self.timers.push(Reverse(ArmedTimer {
            deadline: Instant::now() + after,
            id,
            kind,
        }));
    }

    /// Peer discovery: create the record if new and
    /// below capacity, announce it to the driver, stay in `Listen`.
    pub fn discover(&mut self, addr: MacAddr, supp_rates: &[u8]) -> Result<()> {
        let peer = self.peers.get_or_insert(addr, supp_rates)?;
        self.driver.sta_add(&StaAddParams {
            addr,
            supp_rates: peer.supp_rates.clone(),
            plink_state: peer.plink_state,
            aid: 0,
            listen_interval: 0,
            flags: StaFlags::WMM | StaFlags::AUTHORIZED,
            set: false,
        })
    }

    /// Start the SAE exchange against `addr`.
    pub fn sae_start(&mut self, addr: MacAddr) -> Result<()> {
        let groups = self.rsn.sae_groups.clone();
        let passphrase = self.config.passphrase.clone();
        let local = self.local_addr;
        let mesh_auth_timeout = Duration::from_millis(self.config.mesh_auth_timeout_ms);

        let peer = self
            .peers
            .get_mut(&addr)
            .ok_or_else(|| MeshError::ResourceExhaustion("unknown peer".into()))?;

        if peer.sae.is_none() {
            peer.sae = Some(SaeSession::new((self.sae_factory)()));
        }
        let session = peer.sae.as_mut().expect("just set");

        let group = self
            .rsn
            .sae_group_cursor
            .select_group(&groups, session.exchange.as_mut())?;
        log::info!("SAE: selected group {group} for {addr}");

        session.exchange.prepare_commit(local, addr, passphrase.as_bytes())?;
        let commit = session.exchange.write_commit(self.rsn.anti_clogging_token.as_deref());
        session.state = crate::sae::SaeState::Committed;

        self.driver.send_mlme(&commit, false)?;

        let timer_id = peer.timer_id(TimerKind::SaeAuth);
        self.arm(timer_id, TimerKind::SaeAuth, mesh_auth_timeout);
        Ok(())
    }

    /// SAE retransmit/give-up timer.
    pub fn sae_on_timer(&mut self, addr: MacAddr) -> Result<()> {
        let retry_max = self.config.mesh_auth_retry_max;
        let already_accepted = matches!(
            self.peers.get(&addr).and_then(|p| p.sae.as_ref()).map(|s| s.state),
            Some(crate::sae::SaeState::Accepted)
        );
        if already_accepted {
            return Ok(());
        }

        let retry = {
            let peer = self
                .peers
                .get_mut(&addr)
                .ok_or_else(|| MeshError::ResourceExhaustion("unknown peer".into()))?;
            peer.sae_auth_retry += 1;
            peer.sae_auth_retry
        };

        if retry < retry_max {
            self.sae_start(addr)
        } else {
            if let Some(peer) = self.peers.get_mut(&addr) {
                peer.plink_state = PlinkState::Blocked;
                peer.sae = None;
                peer.sae_auth_retry = 0;
            }
            log::warn!("SAE: retries exhausted for {addr}, blocking peer");
            Err(MeshError::SaeFailure(format!("retries exhausted for {addr}")))
        }
    }

    /// Feed a raw AUTH frame body (SAE commit or confirm) into the
    /// per-peer SAE session.
    pub fn sae_rx(&mut self, addr: MacAddr, transaction: u16, data: &[u8]) -> Result<()> {
        let peer = self
            .peers
            .get_mut(&addr)
            .ok_or_else(|| MeshError::ResourceExhaustion("unknown peer".into()))?;
        let session = peer
            .sae
            .as_mut()
            .ok_or_else(|| MeshError::SaeFailure("no SAE session in progress".into()))?;

        let outcome = if transaction == 1 {
            session.exchange.process_peer_commit(data)?
        } else {
            session.exchange.process_peer_confirm(data)?
        };

        if let SaeOutcome::Accepted(pmk) = outcome {
            session.state = crate::sae::SaeState::Accepted;
            peer.keys.pmk = Some(pmk);
            let aek = derive_aek(&pmk, self.local_addr, addr, AEK_LEN);
            self.peers.get_mut(&addr).expect("present").keys.aek = Some(aek);
            log::info!("SAE: accepted for {addr}, PMK ready");
            self.authorize_peer(addr)?;
        }
        Ok(())
    }

    /// Entry point for local SAE acceptance: cancels the pending SAE auth
    /// timer and opens the MPM state so this station sends its own OPEN,
    /// rather than waiting to react to one received from the peer.
    fn authorize_peer(&mut self, addr: MacAddr) -> Result<()> {
        let state = self
            .peers
            .get(&addr)
            .map(|p| p.plink_state)
            .ok_or_else(|| MeshError::ResourceExhaustion("unknown peer".into()))?;

        // Invalidates the outstanding SaeAuth timer; it fires as a stale
        // no-op if already queued.
        self.peers.bump_generation(&addr);

        let (next_state, actions) = mpm::transition(state, PlinkEvent::Authorize);
        if actions.send_open {
            self.ensure_my_lid(addr);
        }
        self.apply_actions(addr, next_state, actions)
    }

    /// Build and send an OPEN or CONFIRM frame for `addr` (driven by
    /// `mpm::Actions`).
    fn send_peering_frame(&mut self, addr: MacAddr, action: SelfProtectedAction) -> Result<()> {
        let peer = self
            .peers
            .get(&addr)
            .ok_or_else(|| MeshError::ResourceExhaustion("unknown peer".into()))?;
        let aek = peer
            .keys
            .aek
            .clone()
            .ok_or_else(|| MeshError::SaeFailure("no AEK, SAE not accepted".into()))?;
        let peer_lid = if peer.peer_lid != 0 { Some(peer.peer_lid) } else { None };
        let my_lid = peer.my_lid;
        let my_nonce = peer.my_nonce;
        let peer_nonce = peer.peer_nonce;
        let mgtk = *self.rsn.mgtk();

        let mut builder = FrameBuilder::with_capacity(512);
        let cat_offset = builder.len();
        builder.put_u8(CATEGORY_SELF_PROTECTED)?;
        builder.put_u8(action as u8)?;
        builder.put_ie(EID_MESH_ID, self.config.mesh_id.as_bytes())?;
        builder.put_ie(EID_MESH_CONFIG, &[0u8; 7])?;
        builder.put_ie(
            EID_MESH_PEERING_MGMT,
            &mpm::mesh_peering_ie(my_lid, peer_lid, None).to_bytes(),
        )?;

        protect_frame(&mut builder, cat_offset, &aek, self.local_addr, addr, my_nonce, peer_nonce, mgtk)?;

        let frame = builder.into_vec();
        if let Err(e) = self.driver.send_action(0, addr, self.local_addr, MacAddr::BROADCAST, &frame) {
            log::warn!("driver send_action failed for {addr}: {e}");
        }
        Ok(())
    }

    fn send_close(&mut self, addr: MacAddr, reason: u16) -> Result<()> {
        let peer = self
            .peers
            .get(&addr)
            .ok_or_else(|| MeshError::ResourceExhaustion("unknown peer".into()))?;
        let my_lid = peer.my_lid;
        let peer_lid = if peer.peer_lid != 0 { Some(peer.peer_lid) } else { None };

        let mut builder = FrameBuilder::with_capacity(128);
        builder.put_u8(CATEGORY_SELF_PROTECTED)?;
        builder.put_u8(SelfProtectedAction::Close as u8)?;
        builder.put_ie(
            EID_MESH_PEERING_MGMT,
            &mpm::mesh_peering_ie(my_lid, peer_lid, Some(reason)).to_bytes(),
        )?;
        let frame = builder.into_vec();
        if let Err(e) = self.driver.send_action(0, addr, self.local_addr, MacAddr::BROADCAST, &frame) {
            log::warn!("driver send_action (close) failed for {addr}: {e}");
        }
        Ok(())
    }

    fn apply_actions(&mut self, addr: MacAddr, new_state: PlinkState, actions: Actions) -> Result<()> {
        if let Some(peer) = self.peers.get_mut(&addr) {
            peer.plink_state = new_state;
            // A freshly armed retry/confirm cycle, or a restart back to
            // Listen, starts the attempt counter over.
            if actions.arm_retry || new_state == PlinkState::Listen {
                peer.retries = 0;
            }
        }

        if actions.cancel_timers {
            // Invalidate any Retry/Confirm/Holding timer armed before this
            // restart so it fires as a stale no-op instead of retransmitting
            // or re-arming itself against the peer's new Listen state.
            self.peers.bump_generation(&addr);
        }

        if actions.send_open {
            self.send_peering_frame(addr, SelfProtectedAction::Open)?;
        }
        if actions.send_confirm {
            self.send_peering_frame(addr, SelfProtectedAction::Confirm)?;
        }
        if let Some(reason) = actions.send_close {
            self.send_close(addr, reason)?;
        }
        if actions.install_keys {
            self.install_mtk(addr)?;
        }
        if actions.arm_retry {
            self.arm_mpm_timer(addr, TimerKind::Retry, self.config.retry_timeout_ms);
        }
        if actions.arm_confirm {
            self.arm_mpm_timer(addr, TimerKind::Confirm, self.config.confirm_timeout_ms);
        }
        if actions.arm_holding {
            self.arm_mpm_timer(addr, TimerKind::Holding, self.config.holding_timeout_ms);
        }
        if actions.established {
            log::info!("mesh: peering established with {addr}");
        }
        if new_state == PlinkState::Holding || new_state == PlinkState::Blocked {
            log::warn!("mesh: peer {addr} moved to {new_state:?}");
        }
        Ok(())
    }

    fn arm_mpm_timer(&mut self, addr: MacAddr, kind: TimerKind, millis: u64) {
        if let Some(peer) = self.peers.get(&addr) {
            let id = peer.timer_id(kind);
            self.arm(id, kind, Duration::from_millis(millis));
        }
    }

    fn install_mtk(&mut self, addr: MacAddr) -> Result<()> {
        let (pmk, local_nonce, peer_nonce, my_lid, peer_lid) = {
            let peer = self
                .peers
                .get(&addr)
                .ok_or_else(|| MeshError::ResourceExhaustion("unknown peer".into()))?;
            let pmk = peer
                .keys
                .pmk
                .ok_or_else(|| MeshError::SaeFailure("no PMK at Estab".into()))?;
            (pmk, peer.my_nonce, peer.peer_nonce, peer.my_lid, peer.peer_lid)
        };

        let mtk = derive_mtk(&pmk, self.local_addr, addr, &local_nonce, &peer_nonce, my_lid, peer_lid, MTK_LEN);

        self.driver.set_key(
            CipherSuite::Ccmp,
            KeyTarget::Pairwise(addr),
            0,
            true,
            [0u8; 6],
            &mtk,
        )?;

        if let Some(peer) = self.peers.get_mut(&addr) {
            peer.keys.mtk = Some(mtk);
        }
        Ok(())
    }

    /// Inbound self-protected action frame.
    pub fn action_rx(&mut self, src: MacAddr, frame: &[u8]) -> Result<()> {
        let parsed = parse_self_protected(frame)?;

        let aek = self
            .peers
            .get(&src)
            .and_then(|p| p.keys.aek.clone())
            .ok_or_else(|| MeshError::SaeFailure("no AEK for peer, SAE not accepted".into()))?;
        let our_nonce = self.peers.get(&src).map(|p| p.my_nonce).unwrap_or([0u8; 32]);
        let cat_offset = 0;

        let update = process_ampe(&parsed, frame, cat_offset, &aek, self.local_addr, src, &our_nonce)?;

        // AMPE authentication succeeded: the peer's nonce/mgtk are trusted
        // regardless of what the MPM layer decides to do with the frame.
        if let Some(peer) = self.peers.get_mut(&src) {
            if !parsed.supp_rates.is_empty() {
                peer.merge_supp_rates(&parsed.supp_rates);
            }
            peer.peer_nonce = update.peer_local_nonce;
            peer.keys.mgtk = Some(update.mgtk);
        }

        let free_slot = self.peers.len() < self.config.max_peers;
        let (state, my_lid, peer_lid) = {
            let peer = self
                .peers
                .get(&src)
                .ok_or_else(|| MeshError::ResourceExhaustion("unknown peer".into()))?;
            (peer.plink_state, peer.my_lid, peer.peer_lid)
        };

        let event = mpm::derive_event(&parsed, state, my_lid, peer_lid, free_slot);

        // "store peer_lid = plid" happens only on acceptance, so a
        // rejected/ignored frame never overwrites an already-bound LID.
        if event == PlinkEvent::OpnAcpt {
            if let (Some(mgmt), Some(peer)) = (&parsed.mesh_peering, self.peers.get_mut(&src)) {
                peer.peer_lid = mgmt.local_lid;
            }
        }

        let (next_state, actions) = mpm::transition(state, event);
        if actions.send_open {
            self.ensure_my_lid(src);
        }
        self.apply_actions(src, next_state, actions)
    }

    /// Generate this station's own link ID the first time it needs to
    /// send an OPEN for a peering instance.
    fn ensure_my_lid(&mut self, addr: MacAddr) {
        if let Some(peer) = self.peers.get_mut(&addr) {
            if peer.my_lid == 0 {
                let mut lid_bytes = [0u8; 2];
                crate::crypto::rand_bytes(&mut lid_bytes);
                peer.my_lid = u16::from_be_bytes(lid_bytes).max(1);
            }
        }
    }

    /// Timer callback entry point: a timer firing for a stale generation is a no-op.
    pub fn timer_fire(&mut self, id: PeerTimerId, kind: TimerKind) -> Result<()> {
        let current_generation = self.peers.get(&id.addr).map(|p| p.generation);
        if current_generation != Some(id.generation) {
            log::debug!("timer_fire: stale generation for {}, ignoring", id.addr);
            return Ok(());
        }

        match kind {
            TimerKind::SaeAuth => self.sae_on_timer(id.addr),
            TimerKind::Retry => self.mpm_timeout(id.addr, TimeoutKind::Retry),
            TimerKind::Confirm => self.mpm_timeout(id.addr, TimeoutKind::Confirm),
            TimerKind::Holding => self.mpm_timeout(id.addr, TimeoutKind::Holding),
        }
    }

    /// Retry/Confirm timers retransmit while attempts remain and only
    /// then hand off to the FSM as a `Timeout` event to give up to
    /// `Holding`; the retry budget lives here because
    /// `mpm::transition` has no notion of attempt counts.
    fn mpm_timeout(&mut self, addr: MacAddr, kind: TimeoutKind) -> Result<()> {
        let (state, retries) = {
            let peer = self
                .peers
                .get_mut(&addr)
                .ok_or_else(|| MeshError::ResourceExhaustion("unknown peer".into()))?;
            peer.retries += 1;
            (peer.plink_state, peer.retries)
        };

        if matches!(kind, TimeoutKind::Retry | TimeoutKind::Confirm) && retries < self.config.mpm_retry_max {
            return match kind {
                TimeoutKind::Retry => {
                    self.send_peering_frame(addr, SelfProtectedAction::Open)?;
                    self.arm_mpm_timer(addr, TimerKind::Retry, self.config.retry_timeout_ms);
                    Ok(())
                }
                TimeoutKind::Confirm => {
                    self.send_peering_frame(addr, SelfProtectedAction::Confirm)?;
                    self.arm_mpm_timer(addr, TimerKind::Confirm, self.config.confirm_timeout_ms);
                    Ok(())
                }
                TimeoutKind::Holding => unreachable!(),
            };
        }

        let (next_state, actions) = match kind {
            TimeoutKind::Holding => mpm::transition(state, PlinkEvent::Timeout(TimeoutKind::Holding)),
            TimeoutKind::Retry | TimeoutKind::Confirm => (
                PlinkState::Holding,
                Actions {
                    send_close: Some(crate::mpm::CloseReason::MeshMaxRetries as u16),
                    arm_holding: true,
                    ..Default::default()
                },
            ),
        };
        self.apply_actions(addr, next_state, actions)
    }

    /// Copy WMM QoS info from the peer's WMM element into the driver STA
    /// record on establishment. Never implemented upstream either; left
    /// as an explicit stub rather than guessed.
    pub fn copy_wmm_qos_info(&mut self, _addr: MacAddr) -> Result<()> {
        Err(MeshError::NotImplemented("WMM QoS info copy"))
    }

    /// Recompute and push the mesh's HT operation-mode element after a
    /// peer reaches `Estab`. Out of scope here.
    pub fn update_ht_operation_mode(&mut self) -> Result<()> {
        Err(MeshError::NotImplemented("HT operation mode update"))
    }

    /// Rekey the pairwise (MTK) or group (MGTK) key for an established
    /// peering. Out of scope: this crate treats both as static for the
    /// life of the peering.
    pub fn rekey_peer(&mut self, _addr: MacAddr) -> Result<()> {
        Err(MeshError::NotImplemented("pairwise/group key rekey"))
    }

    /// Drive the timer wheel: run until `inbound` closes, dispatching
    /// whichever of (a) the next expired timer or (b) the next inbound
    /// event comes first. Transitions themselves stay synchronous; only
    /// the wait between them suspends.
    pub async fn run(&mut self, mut inbound: mpsc::Receiver<StationEvent>) {
        loop {
            let next_deadline = self.timers.peek().map(|Reverse(t)| t.deadline);

            let sleep = async {
                match next_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = sleep => {
                    if let Some(Reverse(timer)) = self.timers.pop() {
                        if let Err(e) = self.timer_fire(timer.id, timer.kind) {
                            log::warn!("timer dispatch error for {}: {e}", timer.id.addr);
                        }
                    }
                }
                maybe_event = inbound.recv() => {
                    match maybe_event {
                        Some(event) => self.dispatch(event),
                        None => break,
                    }
                }
            }
        }
    }

    fn dispatch(&mut self, event: StationEvent) {
        let result = match event {
            StationEvent::Discover { addr, supp_rates } => self.discover(addr, &supp_rates),
            StationEvent::StartSae { addr } => self.sae_start(addr),
            StationEvent::SaeRx { addr, transaction, data } => self.sae_rx(addr, transaction, &data),
            StationEvent::ActionRx { src, frame } => self.action_rx(src, &frame),
        };
        if let Err(e) = result {
            log::warn!("station dispatch error: {e}");
        }
    }
}

/// Inbound events a `MeshStation` can be driven with over its channel.
pub enum StationEvent {
    Discover { addr: MacAddr, supp_rates: Vec<u8> },
    StartSae { addr: MacAddr },
    SaeRx { addr: MacAddr, transaction: u16, data: Vec<u8> },
    ActionRx { src: MacAddr, frame: Vec<u8> },
}

