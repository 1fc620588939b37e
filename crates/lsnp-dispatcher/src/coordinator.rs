use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use lsnp_config::Config;
use lsnp_core::{Clock, Display, SystemClock, UserId};
use lsnp_discovery::{Beacon, PeerDirectory};
use lsnp_file::FileTransfers;
use lsnp_game::TicTacToe;
use lsnp_social::Social;
use lsnp_transport::{compute_broadcast, local_ip, AckManager, Transport};

/// The single owner of every piece of process-lifetime shared state.
///
/// Replaces the original's `App.__init__` construction of its peers/ack/
/// files/game/groups/social attributes directly on the app object: here
/// they are grouped behind `Arc`s on one struct so the dispatcher,
/// command surface, and background tasks can all hold a cheap clone of
/// the same handles without a process-wide singleton.
pub struct Coordinator {
    pub user_id: UserId,
    pub display_name: String,
    pub local_ip: Ipv4Addr,
    pub broadcast_ip: Ipv4Addr,
    pub loopback_mode: bool,
    pub default_ttl: i64,

    pub transport: Arc<Transport>,
    pub peers: Arc<PeerDirectory>,
    pub ack: Arc<AckManager>,
    pub revoked: Arc<lsnp_core::RevocationSet>,
    pub clock: Arc<dyn Clock>,
    pub display: Arc<dyn Display>,

    pub files: Arc<FileTransfers>,
    pub game: Arc<TicTacToe>,
    pub social: Arc<Social>,
    pub beacon: Arc<Beacon>,
}

impl Coordinator {
    pub async fn new(config: &Config, display: Arc<dyn Display>) -> anyhow::Result<Arc<Self>> {
        let mut ip = local_ip();
        let loopback_mode = config.loopback || ip.octets()[0] == 127;
        if loopback_mode {
            ip = Ipv4Addr::LOCALHOST;
        }
        let broadcast_ip = compute_broadcast(ip);
        let user_id = UserId::new(&config.display_name, ip);

        let multicast_group: Ipv4Addr = config
            .multicast_group
            .parse()
            .with_context(|| format!("invalid multicast_group {:?}", config.multicast_group))?;
        let transport = Arc::new(
            Transport::bind(config.port, config.loss_probability, config.discovery_port, multicast_group)
                .await
                .context("binding transport sockets")?,
        );
        let peers = Arc::new(PeerDirectory::new());
        let ack = AckManager::new();
        let revoked = Arc::new(lsnp_core::RevocationSet::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let inbox_dir = std::path::PathBuf::from(&config.inbox_dir);
        let files = Arc::new(FileTransfers::new(
            user_id.clone(),
            transport.clone(),
            peers.clone(),
            ack.clone(),
            revoked.clone(),
            clock.clone(),
            inbox_dir,
            display.clone(),
        ));
        let game = Arc::new(TicTacToe::new(
            user_id.clone(),
            transport.clone(),
            peers.clone(),
            ack.clone(),
            revoked.clone(),
            clock.clone(),
            display.clone(),
        ));
        let social = Arc::new(Social::new(
            user_id.clone(),
            transport.clone(),
            peers.clone(),
            ack.clone(),
            revoked.clone(),
            clock.clone(),
            display.clone(),
            broadcast_ip,
        ));
        let beacon = Arc::new(Beacon::new(
            transport.clone(),
            user_id.clone(),
            config.display_name.clone(),
            broadcast_ip,
            true,
        ));

        info!(
            %user_id,
            port = transport.listen_port(),
            loopback = loopback_mode,
            "peer initialized"
        );

        Ok(Arc::new(Coordinator {
            user_id,
            display_name: config.display_name.clone(),
            local_ip: ip,
            broadcast_ip,
            loopback_mode,
            default_ttl: config.token_ttl_secs as i64,
            transport,
            peers,
            ack,
            revoked,
            clock,
            display,
            files,
            game,
            social,
            beacon,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsnp_core::RecordingDisplay;

    #[tokio::test]
    async fn new_binds_an_ephemeral_port_and_derives_a_user_id() {
        let mut config = Config::default();
        config.port = 0;
        config.loopback = true;
        let display = Arc::new(RecordingDisplay::new());
        let coord = Coordinator::new(&config, display).await.unwrap();
        assert!(coord.transport.listen_port() > 0);
        assert_eq!(coord.user_id.ip(), Some(Ipv4Addr::LOCALHOST));
        assert!(coord.loopback_mode);
    }
}
