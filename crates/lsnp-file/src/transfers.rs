use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use lsnp_core::wire::FILE_CHUNK_SIZE;
use lsnp_core::{message::new_message_id, Clock, Message, RevocationSet, Scope, UserId};
use lsnp_core::{Display, Token};
use lsnp_discovery::PeerDirectory;
use lsnp_transport::{AckManager, ResendHandler, Transport};

use crate::error::FileError;

struct FileResend {
    transport: Arc<Transport>,
    ip: Ipv4Addr,
    port: u16,
    wire: String,
}

#[async_trait::async_trait]
impl ResendHandler for FileResend {
    async fn resend(&self) {
        self.transport
            .send_unicast(self.ip, self.port, &self.wire, "file")
            .await;
    }
}

struct ReceiveState {
    filename: String,
    sender: UserId,
    accepted: bool,
    chunks: HashMap<usize, Vec<u8>>,
    total: Option<usize>,
}

/// Offer/accept/chunk/reassemble file transfer over unicast, grounded on
/// the [`lsnp_transport::AckManager`] for FILE_OFFER/FILE_CHUNK reliability.
pub struct FileTransfers {
    user_id: UserId,
    transport: Arc<Transport>,
    peers: Arc<PeerDirectory>,
    ack: Arc<AckManager>,
    revoked: Arc<RevocationSet>,
    clock: Arc<dyn Clock>,
    inbox_dir: PathBuf,
    display: Arc<dyn Display>,
    rx: Mutex<HashMap<String, ReceiveState>>,
}

impl FileTransfers {
    pub fn new(
        user_id: UserId,
        transport: Arc<Transport>,
        peers: Arc<PeerDirectory>,
        ack: Arc<AckManager>,
        revoked: Arc<RevocationSet>,
        clock: Arc<dyn Clock>,
        inbox_dir: PathBuf,
        display: Arc<dyn Display>,
    ) -> Self {
        FileTransfers {
            user_id,
            transport,
            peers,
            ack,
            revoked,
            clock,
            inbox_dir,
            display,
            rx: Mutex::new(HashMap::new()),
        }
    }

    async fn send_and_track(&self, endpoint: lsnp_core::Endpoint, msg: Message) {
        let wire = msg.to_wire();
        let mid = msg.message_id().unwrap_or_default().to_string();
        let handler = Arc::new(FileResend {
            transport: self.transport.clone(),
            ip: endpoint.ip,
            port: endpoint.port,
            wire: wire.clone(),
        });
        self.transport
            .send_unicast(endpoint.ip, endpoint.port, &wire, "file")
            .await;
        self.ack.track(mid, handler);
    }

    pub async fn send_offer(
        &self,
        to_user: &UserId,
        fileid: &str,
        filename: &str,
        filesize: usize,
        filetype: &str,
        description: &str,
        ttl: i64,
    ) {
        let Some(endpoint) = self.peers.endpoint_of(to_user) else {
            return;
        };
        let now = self.clock.now();
        let token = Token::make(&self.user_id, now + ttl, Scope::File);
        let mut msg = Message::new();
        msg.set("TYPE", "FILE_OFFER")
            .set("FROM", self.user_id.as_str())
            .set("TO", to_user.as_str())
            .set("FILENAME", filename)
            .set("FILESIZE", filesize.to_string())
            .set("FILETYPE", filetype)
            .set("FILEID", fileid)
            .set("DESCRIPTION", description)
            .set("TIMESTAMP", now.to_string())
            .set("TOKEN", token.as_str())
            .set("MESSAGE_ID", new_message_id());
        self.send_and_track(endpoint, msg).await;
    }

    pub async fn send_chunk(
        &self,
        to_user: &UserId,
        fileid: &str,
        index: usize,
        total: usize,
        chunk_bytes: &[u8],
        ttl: i64,
    ) {
        let Some(endpoint) = self.peers.endpoint_of(to_user) else {
            return;
        };
        let now = self.clock.now();
        let token = Token::make(&self.user_id, now + ttl, Scope::File);
        let b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, chunk_bytes);
        let mut msg = Message::new();
        msg.set("TYPE", "FILE_CHUNK")
            .set("FROM", self.user_id.as_str())
            .set("TO", to_user.as_str())
            .set("FILEID", fileid)
            .set("CHUNK_INDEX", index.to_string())
            .set("TOTAL_CHUNKS", total.to_string())
            .set("CHUNK_SIZE", FILE_CHUNK_SIZE.to_string())
            .set("DATA", b64)
            .set("TOKEN", token.as_str())
            .set("MESSAGE_ID", new_message_id());
        self.send_and_track(endpoint, msg).await;
    }

    /// Send the whole contents of `data` as a FILE_OFFER followed by its
    /// `FILE_CHUNK_SIZE`-byte chunks.
    pub async fn send_file(&self, to_user: &UserId, filename: &str, data: &[u8], ttl: i64) {
        let fileid = new_message_id()[..8].to_string();
        self.send_offer(
            to_user,
            &fileid,
            filename,
            data.len(),
            "application/octet-stream",
            "File via LSNP",
            ttl,
        )
        .await;
        let chunks: Vec<&[u8]> = data.chunks(FILE_CHUNK_SIZE).collect();
        let total = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            self.send_chunk(to_user, &fileid, i, total, chunk, ttl).await;
        }
    }

    pub fn on_offer(&self, msg: &Message) {
        let sender = UserId::from(msg.get_or("FROM", ""));
        let token = Token::from(msg.get_or("TOKEN", ""));
        if !self
            .revoked
            .validate(&token, Scope::File, &sender, self.clock.as_ref())
        {
            return;
        }
        let fileid = msg.get_or("FILEID", "");
        let filename = msg.get_or("FILENAME", "received.bin");
        self.rx.lock().insert(
            fileid.clone(),
            ReceiveState {
                filename,
                sender: sender.clone(),
                accepted: false,
                chunks: HashMap::new(),
                total: None,
            },
        );
        self.display.line(format!(
            "User {} is sending you a file, do you accept? Use: accept {fileid}",
            sender.short_name()
        ));
    }

    pub fn accept(&self, fileid: &str) {
        let mut rx = self.rx.lock();
        if let Some(st) = rx.get_mut(fileid) {
            st.accepted = true;
            self.display.line(format!("Accepted file {fileid}"));
        }
    }

    pub fn ignore(&self, fileid: &str) {
        if self.rx.lock().remove(fileid).is_some() {
            self.display.line(format!("Ignored file {fileid}"));
        }
    }

    pub async fn on_chunk(&self, msg: &Message) {
        let sender = UserId::from(msg.get_or("FROM", ""));
        let token = Token::from(msg.get_or("TOKEN", ""));
        if !self
            .revoked
            .validate(&token, Scope::File, &sender, self.clock.as_ref())
        {
            return;
        }
        let fileid = msg.get_or("FILEID", "");
        let idx: usize = msg.get_or("CHUNK_INDEX", "0").parse().unwrap_or(0);
        let total: usize = msg.get_or("TOTAL_CHUNKS", "1").parse().unwrap_or(1);
        let data_b64 = msg.get_or("DATA", "");
        let Ok(chunk) =
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, data_b64.as_bytes())
        else {
            return;
        };

        let assembled = {
            let mut rx = self.rx.lock();
            let Some(st) = rx.get_mut(&fileid) else {
                return; // unknown FILEID: silently dropped
            };
            if !st.accepted {
                return; // not yet accepted: silently dropped
            }
            st.chunks.insert(idx, chunk);
            st.total = Some(total);

            if st.chunks.len() == total {
                let mut out = Vec::new();
                for i in 0..total {
                    if let Some(c) = st.chunks.get(&i) {
                        out.extend_from_slice(c);
                    } else {
                        return; // still missing an index; wait for more chunks
                    }
                }
                Some((out, st.filename.clone(), st.sender.clone()))
            } else {
                None
            }
        };

        let Some((bytes, filename, sender)) = assembled else {
            return;
        };

        if let Err(e) = self.write_received(&sender, &filename, &bytes) {
            error!(error = %e, fileid, "failed to write received file");
            return;
        }

        if let Some(endpoint) = self.peers.endpoint_of(&sender) {
            let mut ack = Message::new();
            ack.set("TYPE", "FILE_RECEIVED")
                .set("FROM", self.user_id.as_str())
                .set("TO", sender.as_str())
                .set("FILEID", fileid.clone())
                .set("STATUS", "COMPLETE")
                .set("TIMESTAMP", self.clock.now().to_string());
            self.transport
                .send_unicast(endpoint.ip, endpoint.port, &ack.to_wire(), "file")
                .await;
        }

        self.rx.lock().remove(&fileid);
    }

    fn write_received(&self, sender: &UserId, filename: &str, data: &[u8]) -> Result<(), FileError> {
        let base = filename.rsplit('/').next().unwrap_or(filename);
        let dir = self.inbox_dir.join(sender.short_name());
        std::fs::create_dir_all(&dir).map_err(|e| FileError::CreateDir {
            path: dir.clone(),
            source: e,
        })?;
        let path = dir.join(base);
        std::fs::write(&path, data).map_err(|e| FileError::Write {
            path: path.clone(),
            source: e,
        })?;
        self.display.line(format!("\u{1F4E5} File saved to {}", path.display()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsnp_core::SystemClock;

    #[tokio::test]
    async fn offer_then_accept_then_chunk_reassembles_single_chunk_file() {
        let dir = tempfile::tempdir().unwrap();
        let group = lsnp_core::wire::MULTICAST_GROUP.parse().unwrap();
        let transport = Arc::new(
            Transport::bind(0, 0.0, lsnp_core::wire::DISCOVERY_PORT, group)
                .await
                .unwrap(),
        );
        let peers = Arc::new(PeerDirectory::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let revoked = Arc::new(RevocationSet::new());
        let display = Arc::new(lsnp_core::RecordingDisplay::new());

        let sender = UserId::from("alice@127.0.0.1");
        let ft = FileTransfers::new(
            UserId::from("me@127.0.0.1"),
            transport,
            peers,
            AckManager::new(),
            revoked.clone(),
            clock.clone(),
            dir.path().to_path_buf(),
            display.clone(),
        );

        let token = Token::make(&sender, clock.now() + 3600, Scope::File);
        let mut offer = Message::new();
        offer
            .set("TYPE", "FILE_OFFER")
            .set("FROM", sender.as_str())
            .set("FILEID", "f1")
            .set("FILENAME", "hello.txt")
            .set("TOKEN", token.as_str());
        ft.on_offer(&offer);
        ft.accept("f1");

        let data = b"hello world";
        let b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, data);
        let mut chunk = Message::new();
        chunk
            .set("TYPE", "FILE_CHUNK")
            .set("FROM", sender.as_str())
            .set("FILEID", "f1")
            .set("CHUNK_INDEX", "0")
            .set("TOTAL_CHUNKS", "1")
            .set("DATA", b64)
            .set("TOKEN", token.as_str());
        ft.on_chunk(&chunk).await;

        let saved = dir.path().join("alice").join("hello.txt");
        assert_eq!(std::fs::read(saved).unwrap(), data);
    }

    #[tokio::test]
    async fn chunk_for_unknown_fileid_is_silently_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let group = lsnp_core::wire::MULTICAST_GROUP.parse().unwrap();
        let transport = Arc::new(
            Transport::bind(0, 0.0, lsnp_core::wire::DISCOVERY_PORT, group)
                .await
                .unwrap(),
        );
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let sender = UserId::from("alice@127.0.0.1");
        let token = Token::make(&sender, clock.now() + 3600, Scope::File);
        let ft = FileTransfers::new(
            UserId::from("me@127.0.0.1"),
            transport,
            Arc::new(PeerDirectory::new()),
            AckManager::new(),
            Arc::new(RevocationSet::new()),
            clock,
            dir.path().to_path_buf(),
            Arc::new(lsnp_core::RecordingDisplay::new()),
        );
        let mut chunk = Message::new();
        chunk
            .set("TYPE", "FILE_CHUNK")
            .set("FROM", sender.as_str())
            .set("FILEID", "unknown")
            .set("CHUNK_INDEX", "0")
            .set("TOTAL_CHUNKS", "1")
            .set("DATA", "aGVsbG8=")
            .set("TOKEN", token.as_str());
        ft.on_chunk(&chunk).await; // must not panic
        assert!(!dir.path().join("alice").exists());
    }
}
