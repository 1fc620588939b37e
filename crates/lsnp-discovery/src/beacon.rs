use std::net::Ipv4Addr;
use std::sync::Arc;

use lsnp_core::wire::DISCOVERY_INTERVAL;
use lsnp_core::{Message, UserId};
use lsnp_transport::Transport;

pub fn build_ping(user_id: &UserId) -> Message {
    let mut m = Message::new();
    m.set("TYPE", "PING").set("USER_ID", user_id.as_str());
    m
}

pub fn build_profile(user_id: &UserId, display_name: &str, status: &str, port: u16) -> Message {
    let mut m = Message::new();
    m.set("TYPE", "PROFILE")
        .set("USER_ID", user_id.as_str())
        .set("DISPLAY_NAME", display_name)
        .set("STATUS", status)
        .set("PORT", port.to_string());
    m
}

/// Periodically (and on-demand, in reply to a PING) announces this peer's
/// presence via PING+PROFILE on both the broadcast and multicast channels.
pub struct Beacon {
    transport: Arc<Transport>,
    user_id: UserId,
    display_name: String,
    broadcast_ip: Ipv4Addr,
    include_multicast: bool,
}

impl Beacon {
    pub fn new(
        transport: Arc<Transport>,
        user_id: UserId,
        display_name: String,
        broadcast_ip: Ipv4Addr,
        include_multicast: bool,
    ) -> Self {
        Beacon {
            transport,
            user_id,
            display_name,
            broadcast_ip,
            include_multicast,
        }
    }

    pub async fn announce(&self) {
        let ping = build_ping(&self.user_id).to_wire();
        let profile = build_profile(
            &self.user_id,
            &self.display_name,
            "Exploring LSNP!",
            self.transport.listen_port(),
        )
        .to_wire();

        self.transport.send_broadcast(self.broadcast_ip, &ping).await;
        self.transport.send_broadcast(self.broadcast_ip, &profile).await;
        if self.include_multicast {
            self.transport.send_multicast(&ping).await;
            self.transport.send_multicast(&profile).await;
        }
    }

    /// Spawn the periodic announcement task.
    pub fn spawn_periodic(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(DISCOVERY_INTERVAL);
            loop {
                interval.tick().await;
                self.announce().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_ping_carries_user_id() {
        let uid = UserId::from("alice@10.0.0.1");
        let m = build_ping(&uid);
        assert_eq!(m.message_type(), "PING");
        assert_eq!(m.get("USER_ID"), Some("alice@10.0.0.1"));
    }

    #[test]
    fn build_profile_includes_advertised_port() {
        let uid = UserId::from("alice@10.0.0.1");
        let m = build_profile(&uid, "Alice", "hi", 5001);
        assert_eq!(m.get("PORT"), Some("5001"));
        assert_eq!(m.get("DISPLAY_NAME"), Some("Alice"));
    }
}
