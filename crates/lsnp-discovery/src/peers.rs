use std::collections::HashMap;
use std::net::Ipv4Addr;

use parking_lot::Mutex;

use lsnp_core::{Endpoint, UserId};

#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub endpoint: Endpoint,
    pub display_name: String,
    pub status: String,
    pub avatar_type: String,
    pub avatar_data: String,
}

/// Process-lifetime table of known peers, upserted on every PROFILE frame
/// received. Peers are never evicted — there is no persistence across
/// restarts, and no staleness timeout within one.
#[derive(Default)]
pub struct PeerDirectory {
    peers: Mutex<HashMap<UserId, PeerRecord>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        PeerDirectory::default()
    }

    /// Upsert from a PROFILE frame's fields. Port preference order:
    /// advertised PORT field, else the previously known port for this user,
    /// else the UDP source port the datagram actually arrived from.
    pub fn upsert_from_profile(
        &self,
        user_id: UserId,
        addr_ip: Ipv4Addr,
        addr_port: u16,
        advertised_port: Option<u16>,
        display_name: String,
        status: String,
        avatar_type: String,
        avatar_data: String,
    ) {
        let mut peers = self.peers.lock();
        let prev_port = peers.get(&user_id).map(|p| p.endpoint.port);
        let port = advertised_port
            .filter(|p| *p > 0)
            .or(prev_port)
            .unwrap_or(addr_port);

        peers.insert(
            user_id,
            PeerRecord {
                endpoint: Endpoint::new(addr_ip, port),
                display_name,
                status,
                avatar_type,
                avatar_data,
            },
        );
    }

    pub fn get(&self, user_id: &UserId) -> Option<PeerRecord> {
        self.peers.lock().get(user_id).cloned()
    }

    /// `(ip, port)` for a known peer; falls back to the IP embedded in the
    /// user id itself (port 0, meaning "unknown") when the peer has never
    /// been seen.
    pub fn endpoint_of(&self, user_id: &UserId) -> Option<Endpoint> {
        if let Some(rec) = self.peers.lock().get(user_id) {
            return Some(rec.endpoint);
        }
        user_id.ip().map(|ip| Endpoint::new(ip, 0))
    }

    pub fn list(&self) -> Vec<(UserId, PeerRecord)> {
        self.peers
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_prefers_advertised_port() {
        let dir = PeerDirectory::new();
        let uid = UserId::from("alice@10.0.0.1");
        dir.upsert_from_profile(
            uid.clone(),
            Ipv4Addr::new(10, 0, 0, 1),
            4000,
            Some(5000),
            "Alice".into(),
            "".into(),
            "".into(),
            "".into(),
        );
        assert_eq!(dir.get(&uid).unwrap().endpoint.port, 5000);
    }

    #[test]
    fn upsert_without_advertised_port_keeps_previous() {
        let dir = PeerDirectory::new();
        let uid = UserId::from("alice@10.0.0.1");
        dir.upsert_from_profile(
            uid.clone(),
            Ipv4Addr::new(10, 0, 0, 1),
            4000,
            Some(5000),
            "Alice".into(),
            "".into(),
            "".into(),
            "".into(),
        );
        dir.upsert_from_profile(
            uid.clone(),
            Ipv4Addr::new(10, 0, 0, 1),
            4001,
            None,
            "Alice".into(),
            "away".into(),
            "".into(),
            "".into(),
        );
        let rec = dir.get(&uid).unwrap();
        assert_eq!(rec.endpoint.port, 5000);
        assert_eq!(rec.status, "away");
    }

    #[test]
    fn upsert_falls_back_to_source_port_when_never_seen() {
        let dir = PeerDirectory::new();
        let uid = UserId::from("bob@10.0.0.2");
        dir.upsert_from_profile(
            uid.clone(),
            Ipv4Addr::new(10, 0, 0, 2),
            4002,
            None,
            "Bob".into(),
            "".into(),
            "".into(),
            "".into(),
        );
        assert_eq!(dir.get(&uid).unwrap().endpoint.port, 4002);
    }

    #[test]
    fn endpoint_of_unknown_peer_infers_ip_with_zero_port() {
        let dir = PeerDirectory::new();
        let uid = UserId::from("ghost@10.0.0.9");
        let ep = dir.endpoint_of(&uid).unwrap();
        assert_eq!(ep.ip, Ipv4Addr::new(10, 0, 0, 9));
        assert_eq!(ep.port, 0);
    }
}
