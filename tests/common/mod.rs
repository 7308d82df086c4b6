use std::sync::{Arc, Mutex};

use mesh_mpm::prelude::*;

/// Records every driver out-call so assertions can inspect what the
/// station actually tried to do, without a real wireless interface.
#[derive(Default)]
pub struct RecordingDriver {
    pub sent_actions: Mutex<Vec<Vec<u8>>>,
    pub sent_mlme: Mutex<Vec<Vec<u8>>>,
    pub sta_adds: Mutex<Vec<StaAddParams>>,
    pub installed_keys: Mutex<Vec<(CipherSuite, KeyTarget)>>,
}

impl MeshDriver for RecordingDriver {
    fn send_action(&self, _freq: u32, _dst: MacAddr, _src: MacAddr, _bssid: MacAddr, frame: &[u8]) -> Result<()> {
        self.sent_actions.lock().unwrap().push(frame.to_vec());
        Ok(())
    }

    fn send_mlme(&self, frame: &[u8], _noack: bool) -> Result<()> {
        self.sent_mlme.lock().unwrap().push(frame.to_vec());
        Ok(())
    }

    fn sta_add(&self, params: &StaAddParams) -> Result<()> {
        self.sta_adds.lock().unwrap().push(params.clone());
        Ok(())
    }

    fn set_key(
        &self,
        alg: CipherSuite,
        target: KeyTarget,
        _idx: u8,
        _is_tx: bool,
        _seq: [u8; 6],
        _key: &[u8],
    ) -> Result<()> {
        self.installed_keys.lock().unwrap().push((alg, target));
        Ok(())
    }
}

pub fn station_a() -> (MeshStation, MacAddr, MacAddr, Arc<RecordingDriver>) {
    let local = MacAddr::new([0x02, 0, 0, 0, 0, 0xA1]);
    let peer = MacAddr::new([0x02, 0, 0, 0, 0, 0xB2]);
    let driver = Arc::new(RecordingDriver::default());
    let config = MeshConfig::new("test-mesh", "correct horse battery staple");
    let factory: SaeFactory = Arc::new(|| Box::new(RefSaeExchange::new(vec![19, 20, 21])));
    let station = MeshStation::new(config, local, driver.clone(), factory);
    (station, local, peer, driver)
}

/// Drive `station`'s SAE session against `peer` all the way to
/// `Accepted`, installing a PMK + AEK, the way a successful exchange
/// with a cooperative peer would.
pub fn complete_sae(station: &mut MeshStation, peer: MacAddr) {
    station.discover(peer, &[]).unwrap();
    station.sae_start(peer).unwrap();
    station.sae_rx(peer, 1, &[0xC0, 19]).unwrap();
    station.sae_rx(peer, 2, &[0xCF]).unwrap();
}

pub fn open_frame(local_lid: u16, peer_lid: Option<u16>) -> MeshPeeringMgmt {
    MeshPeeringMgmt {
        local_lid,
        peer_lid,
        reason: None,
    }
}
