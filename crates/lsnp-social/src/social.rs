use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::Mutex;

use lsnp_core::message::new_message_id;
use lsnp_core::{Clock, Display, Endpoint, Message, RevocationSet, Scope, Token, UserId};
use lsnp_discovery::PeerDirectory;
use lsnp_transport::{AckManager, ResendHandler, Transport};

use crate::groups::GroupState;

struct DmResend {
    transport: Arc<Transport>,
    ip: Ipv4Addr,
    port: u16,
    wire: String,
}

#[async_trait::async_trait]
impl ResendHandler for DmResend {
    async fn resend(&self) {
        self.transport
            .send_unicast(self.ip, self.port, &self.wire, "chat")
            .await;
    }
}

/// Follow/unfollow, post/like, direct message, and group messaging surface.
/// DMs are the only reliable send here — tracked through [`AckManager`] the
/// same way file chunks and game moves are. FOLLOW/UNFOLLOW/LIKE/POST are
/// fire-and-forget: retrying a social action on packet loss would double the
/// visible effect (a duplicate like, a re-sent follow notice) rather than
/// just delay it, so they go out once.
pub struct Social {
    user_id: UserId,
    transport: Arc<Transport>,
    peers: Arc<PeerDirectory>,
    ack: Arc<AckManager>,
    revoked: Arc<RevocationSet>,
    clock: Arc<dyn Clock>,
    display: Arc<dyn Display>,
    broadcast_ip: Ipv4Addr,
    groups: GroupState,
    following: Mutex<HashSet<UserId>>,
    followers: Mutex<HashSet<UserId>>,
    sent_likes: Mutex<HashSet<(UserId, String)>>,
    likes_by_post: Mutex<std::collections::HashMap<String, HashSet<UserId>>>,
}

impl Social {
    pub fn new(
        user_id: UserId,
        transport: Arc<Transport>,
        peers: Arc<PeerDirectory>,
        ack: Arc<AckManager>,
        revoked: Arc<RevocationSet>,
        clock: Arc<dyn Clock>,
        display: Arc<dyn Display>,
        broadcast_ip: Ipv4Addr,
    ) -> Self {
        Social {
            user_id,
            transport,
            peers,
            ack,
            revoked,
            clock,
            display,
            broadcast_ip,
            groups: GroupState::new(),
            following: Mutex::new(HashSet::new()),
            followers: Mutex::new(HashSet::new()),
            sent_likes: Mutex::new(HashSet::new()),
            likes_by_post: Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn groups(&self) -> &GroupState {
        &self.groups
    }

    pub fn is_following(&self, user_id: &UserId) -> bool {
        self.following.lock().contains(user_id)
    }

    // ---- FOLLOW / UNFOLLOW -------------------------------------------

    pub async fn follow(&self, to_user: &UserId, ttl: i64) {
        if !self.following.lock().insert(to_user.clone()) {
            return; // already following: idempotent no-op
        }
        self.send_follow_frame(to_user, "FOLLOW", ttl).await;
    }

    pub async fn unfollow(&self, to_user: &UserId, ttl: i64) {
        if !self.following.lock().remove(to_user) {
            return;
        }
        self.send_follow_frame(to_user, "UNFOLLOW", ttl).await;
    }

    async fn send_follow_frame(&self, to_user: &UserId, mtype: &str, ttl: i64) {
        let Some(endpoint) = self.peers.endpoint_of(to_user) else {
            return;
        };
        let now = self.clock.now();
        let token = Token::make(&self.user_id, now + ttl, Scope::Follow);
        let mut msg = Message::new();
        msg.set("TYPE", mtype)
            .set("FROM", self.user_id.as_str())
            .set("TO", to_user.as_str())
            .set("TIMESTAMP", now.to_string())
            .set("TOKEN", token.as_str())
            .set("MESSAGE_ID", new_message_id());
        self.transport
            .send_unicast(endpoint.ip, endpoint.port, &msg.to_wire(), "")
            .await;
    }

    pub fn on_follow(&self, msg: &Message) {
        let sender = UserId::from(msg.get_or("FROM", ""));
        let token = Token::from(msg.get_or("TOKEN", ""));
        if !self
            .revoked
            .validate(&token, Scope::Follow, &sender, self.clock.as_ref())
        {
            return;
        }
        if self.followers.lock().insert(sender.clone()) {
            self.display
                .line(format!("{} has followed you.", sender.short_name()));
        }
    }

    pub fn on_unfollow(&self, msg: &Message) {
        let sender = UserId::from(msg.get_or("FROM", ""));
        let token = Token::from(msg.get_or("TOKEN", ""));
        if !self
            .revoked
            .validate(&token, Scope::Follow, &sender, self.clock.as_ref())
        {
            return;
        }
        if self.followers.lock().remove(&sender) {
            self.display
                .line(format!("{} has unfollowed you.", sender.short_name()));
        }
    }

    // ---- POST ----------------------------------------------------------

    /// Unicasts to every known follower; falls back to broadcast+multicast
    /// when there are none, so a lone peer's first post still reaches
    /// whoever happens to be listening.
    pub async fn post(&self, content: &str, ttl: i64) {
        let now = self.clock.now();
        let token = Token::make(&self.user_id, now + ttl, Scope::Broadcast);
        let mut msg = Message::new();
        msg.set("TYPE", "POST")
            .set("FROM", self.user_id.as_str())
            .set("CONTENT", content)
            .set("TTL", ttl.to_string())
            .set("TIMESTAMP", now.to_string())
            .set("MESSAGE_ID", new_message_id())
            .set("TOKEN", token.as_str());
        let wire = msg.to_wire();

        let followers: Vec<UserId> = self.followers.lock().iter().cloned().collect();
        if followers.is_empty() {
            self.transport.send_broadcast(self.broadcast_ip, &wire).await;
            self.transport.send_multicast(&wire).await;
            return;
        }
        for follower in followers {
            if let Some(endpoint) = self.peers.endpoint_of(&follower) {
                self.transport
                    .send_unicast(endpoint.ip, endpoint.port, &wire, "")
                    .await;
            }
        }
    }

    pub fn on_post(&self, msg: &Message) {
        let sender = UserId::from(msg.get_or("FROM", ""));
        let ts: i64 = msg.get_or("TIMESTAMP", "0").parse().unwrap_or(0);
        let ttl: i64 = msg.get_or("TTL", "0").parse().unwrap_or(0);
        if self.clock.now() > ts + ttl {
            return; // expired post, drop
        }
        if sender != self.user_id && !self.is_following(&sender) {
            return; // not a post we subscribed to
        }
        self.display.line(format!(
            "{}: {}",
            sender.short_name(),
            msg.get_or("CONTENT", "")
        ));
    }

    // ---- LIKE ------------------------------------------------------------

    pub async fn like(&self, to_user: &UserId, post_timestamp: &str, unlike: bool, ttl: i64) {
        let key = (to_user.clone(), post_timestamp.to_string());
        let already = self.sent_likes.lock().contains(&key);
        if unlike {
            if !already {
                return;
            }
            self.sent_likes.lock().remove(&key);
        } else {
            if already {
                return;
            }
            self.sent_likes.lock().insert(key);
        }

        let Some(endpoint) = self.peers.endpoint_of(to_user) else {
            return;
        };
        let now = self.clock.now();
        let token = Token::make(&self.user_id, now + ttl, Scope::Broadcast);
        let mut msg = Message::new();
        msg.set("TYPE", "LIKE")
            .set("FROM", self.user_id.as_str())
            .set("TO", to_user.as_str())
            .set("POST_TIMESTAMP", post_timestamp)
            .set("ACTION", if unlike { "UNLIKE" } else { "LIKE" })
            .set("TIMESTAMP", now.to_string())
            .set("TOKEN", token.as_str())
            .set("MESSAGE_ID", new_message_id());
        self.transport
            .send_unicast(endpoint.ip, endpoint.port, &msg.to_wire(), "")
            .await;
    }

    pub fn on_like(&self, msg: &Message) {
        let to = UserId::from(msg.get_or("TO", ""));
        if to != self.user_id {
            return;
        }
        let sender = UserId::from(msg.get_or("FROM", ""));
        let token = Token::from(msg.get_or("TOKEN", ""));
        if !self
            .revoked
            .validate(&token, Scope::Broadcast, &sender, self.clock.as_ref())
        {
            return;
        }
        let post_ts = msg.get_or("POST_TIMESTAMP", "");
        let unlike = msg.get_or("ACTION", "LIKE") == "UNLIKE";

        let mut by_post = self.likes_by_post.lock();
        let likers = by_post.entry(post_ts.clone()).or_default();
        let changed = if unlike {
            likers.remove(&sender)
        } else {
            likers.insert(sender.clone())
        };
        drop(by_post);
        if !changed {
            return;
        }
        self.display.line(format!(
            "{} {} your post.",
            sender.short_name(),
            if unlike { "unliked" } else { "liked" }
        ));
    }

    // ---- DM (reliable) ---------------------------------------------------

    pub async fn dm(&self, to_user: &UserId, content: &str, ttl: i64) {
        let Some(endpoint) = self.peers.endpoint_of(to_user) else {
            return;
        };
        let now = self.clock.now();
        let token = Token::make(&self.user_id, now + ttl, Scope::Chat);
        let mut msg = Message::new();
        msg.set("TYPE", "DM")
            .set("FROM", self.user_id.as_str())
            .set("TO", to_user.as_str())
            .set("CONTENT", content)
            .set("TIMESTAMP", now.to_string())
            .set("TOKEN", token.as_str())
            .set("MESSAGE_ID", new_message_id());
        self.send_and_track(endpoint, msg).await;
    }

    async fn send_and_track(&self, endpoint: Endpoint, msg: Message) {
        let wire = msg.to_wire();
        let mid = msg.message_id().unwrap_or_default().to_string();
        let handler = Arc::new(DmResend {
            transport: self.transport.clone(),
            ip: endpoint.ip,
            port: endpoint.port,
            wire: wire.clone(),
        });
        self.transport
            .send_unicast(endpoint.ip, endpoint.port, &wire, "chat")
            .await;
        self.ack.track(mid, handler);
    }

    pub fn on_dm(&self, msg: &Message) {
        let sender = UserId::from(msg.get_or("FROM", ""));
        let token = Token::from(msg.get_or("TOKEN", ""));
        if !self
            .revoked
            .validate(&token, Scope::Chat, &sender, self.clock.as_ref())
        {
            return;
        }
        self.display.line(format!(
            "DM from {}: {}",
            sender.short_name(),
            msg.get_or("CONTENT", "")
        ));
    }

    // ---- Groups ------------------------------------------------------------

    pub async fn group_create(&self, group_id: &str, name: &str, members: Vec<UserId>, ttl: i64) {
        self.groups.create(group_id, name, members.clone());
        self.notify_group(group_id, "GROUP_CREATE", &members, &[("GROUP_NAME", name)], ttl)
            .await;
    }

    pub async fn group_update(
        &self,
        group_id: &str,
        add: Vec<UserId>,
        remove: Vec<UserId>,
        ttl: i64,
    ) {
        self.groups.update(group_id, add.clone(), remove.clone());
        let members = self.groups.members(group_id);
        let add_field = add.iter().map(UserId::as_str).collect::<Vec<_>>().join(",");
        let remove_field = remove
            .iter()
            .map(UserId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        self.notify_group(
            group_id,
            "GROUP_UPDATE",
            &members,
            &[("ADD", &add_field), ("REMOVE", &remove_field)],
            ttl,
        )
        .await;
    }

    pub async fn group_message(&self, group_id: &str, content: &str, ttl: i64) {
        let members = self.groups.members(group_id);
        self.notify_group(group_id, "GROUP_MESSAGE", &members, &[("CONTENT", content)], ttl)
            .await;
        self.display.line(format!(
            "[{}] you: {}",
            self.groups.name_of(group_id).unwrap_or_default(),
            content
        ));
    }

    async fn notify_group(
        &self,
        group_id: &str,
        mtype: &str,
        members: &[UserId],
        extra: &[(&str, &str)],
        ttl: i64,
    ) {
        let now = self.clock.now();
        let token = Token::make(&self.user_id, now + ttl, Scope::Group);
        for member in members {
            if member == &self.user_id {
                continue;
            }
            let Some(endpoint) = self.peers.endpoint_of(member) else {
                continue;
            };
            let mut msg = Message::new();
            msg.set("TYPE", mtype)
                .set("FROM", self.user_id.as_str())
                .set("GROUP_ID", group_id)
                .set("TIMESTAMP", now.to_string())
                .set("TOKEN", token.as_str())
                .set("MESSAGE_ID", new_message_id());
            for (k, v) in extra {
                msg.set(k, *v);
            }
            self.transport
                .send_unicast(endpoint.ip, endpoint.port, &msg.to_wire(), "")
                .await;
        }
    }

    pub fn on_group_create(&self, msg: &Message) {
        if !self.validate_group_token(msg) {
            return;
        }
        let gid = msg.get_or("GROUP_ID", "");
        let name = msg.get_or("GROUP_NAME", "");
        self.groups.create(&gid, &name, std::iter::once(self.user_id.clone()));
        self.display
            .line(format!("You were added to group \"{name}\"."));
    }

    pub fn on_group_update(&self, msg: &Message) {
        if !self.validate_group_token(msg) {
            return;
        }
        let gid = msg.get_or("GROUP_ID", "");
        let add = parse_userid_list(&msg.get_or("ADD", ""));
        let remove = parse_userid_list(&msg.get_or("REMOVE", ""));
        self.groups.update(&gid, add, remove);
        self.display
            .line(format!("Group \"{gid}\" membership updated."));
    }

    pub fn on_group_message(&self, msg: &Message) {
        if !self.validate_group_token(msg) {
            return;
        }
        let gid = msg.get_or("GROUP_ID", "");
        let sender = UserId::from(msg.get_or("FROM", ""));
        let name = self.groups.name_of(&gid).unwrap_or(gid);
        self.display.line(format!(
            "[{}] {}: {}",
            name,
            sender.short_name(),
            msg.get_or("CONTENT", "")
        ));
    }

    fn validate_group_token(&self, msg: &Message) -> bool {
        let sender = UserId::from(msg.get_or("FROM", ""));
        let token = Token::from(msg.get_or("TOKEN", ""));
        self.revoked
            .validate(&token, Scope::Group, &sender, self.clock.as_ref())
    }
}

fn parse_userid_list(field: &str) -> Vec<UserId> {
    field
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(UserId::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsnp_core::SystemClock;

    async fn harness() -> (Social, Arc<PeerDirectory>, Arc<lsnp_core::RecordingDisplay>) {
        let group = lsnp_core::wire::MULTICAST_GROUP.parse().unwrap();
        let transport = Arc::new(
            Transport::bind(0, 0.0, lsnp_core::wire::DISCOVERY_PORT, group)
                .await
                .unwrap(),
        );
        let peers = Arc::new(PeerDirectory::new());
        let display = Arc::new(lsnp_core::RecordingDisplay::new());
        let social = Social::new(
            UserId::from("me@127.0.0.1"),
            transport,
            peers.clone(),
            AckManager::new(),
            Arc::new(RevocationSet::new()),
            Arc::new(SystemClock),
            display.clone(),
            Ipv4Addr::new(127, 0, 0, 255),
        );
        (social, peers, display)
    }

    #[tokio::test]
    async fn follow_then_follow_again_is_idempotent_locally() {
        let (social, peers, _display) = harness().await;
        let alice = UserId::from("alice@127.0.0.1");
        peers.upsert_from_profile(
            alice.clone(),
            Ipv4Addr::new(127, 0, 0, 1),
            9000,
            Some(9000),
            "Alice".into(),
            "".into(),
            "".into(),
            "".into(),
        );
        social.follow(&alice, 3600).await;
        assert!(social.is_following(&alice));
        social.follow(&alice, 3600).await; // no-op, already following
        assert!(social.is_following(&alice));
    }

    #[tokio::test]
    async fn on_follow_validates_token_and_is_idempotent() {
        let (social, _peers, display) = harness().await;
        let alice = UserId::from("alice@127.0.0.1");
        let token = Token::make(&alice, SystemClock.now() + 3600, Scope::Follow);
        let mut msg = Message::new();
        msg.set("TYPE", "FOLLOW")
            .set("FROM", alice.as_str())
            .set("TOKEN", token.as_str());
        social.on_follow(&msg);
        social.on_follow(&msg); // duplicate follow notice: no second line
        assert_eq!(display.lines().len(), 1);
    }

    #[tokio::test]
    async fn like_then_unlike_toggles_and_is_idempotent() {
        let (social, peers, _display) = harness().await;
        let bob = UserId::from("bob@127.0.0.1");
        peers.upsert_from_profile(
            bob.clone(),
            Ipv4Addr::new(127, 0, 0, 1),
            9001,
            Some(9001),
            "Bob".into(),
            "".into(),
            "".into(),
            "".into(),
        );
        social.like(&bob, "100", false, 3600).await;
        social.like(&bob, "100", false, 3600).await; // already liked: no-op
        social.like(&bob, "100", true, 3600).await; // unlike
        social.like(&bob, "100", true, 3600).await; // already unliked: no-op
    }

    #[tokio::test]
    async fn on_post_drops_expired_posts() {
        let (social, _peers, display) = harness().await;
        let mut msg = Message::new();
        msg.set("TYPE", "POST")
            .set("FROM", "me@127.0.0.1")
            .set("CONTENT", "hi")
            .set("TIMESTAMP", "1")
            .set("TTL", "1");
        social.on_post(&msg);
        assert!(display.lines().is_empty(), "a post past its TTL must not display");
    }

    #[tokio::test]
    async fn on_post_from_self_always_displays() {
        let (social, _peers, display) = harness().await;
        let now = SystemClock.now();
        let mut msg = Message::new();
        msg.set("TYPE", "POST")
            .set("FROM", "me@127.0.0.1")
            .set("CONTENT", "hi")
            .set("TIMESTAMP", now.to_string())
            .set("TTL", "3600");
        social.on_post(&msg);
        assert_eq!(display.lines().len(), 1);
    }
}
