use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::Mutex;

use lsnp_core::message::new_message_id;
use lsnp_core::{Clock, Display, Message, RevocationSet, Scope, Token, UserId};
use lsnp_discovery::PeerDirectory;
use lsnp_transport::{AckManager, ResendHandler, Transport};

use crate::board::{render_board, result, Outcome};

struct MoveResend {
    transport: Arc<Transport>,
    ip: Ipv4Addr,
    port: u16,
    wire: String,
}

#[async_trait::async_trait]
impl ResendHandler for MoveResend {
    async fn resend(&self) {
        self.transport
            .send_unicast(self.ip, self.port, &self.wire, "game")
            .await;
    }
}

struct GameRecord {
    board: [char; 9],
    my_symbol: char,
    opp_symbol: char,
    last_turn_seen: u64,
    opponent: UserId,
}

impl GameRecord {
    fn board_string(&self) -> String {
        self.board.iter().collect()
    }
}

/// Stateless on the wire, stateful locally: one [`GameRecord`] per GAMEID.
/// Duplicate-move suppression keys off `(GAMEID, TURN)` via a monotonic
/// `last_turn_seen` counter per game.
pub struct TicTacToe {
    user_id: UserId,
    transport: Arc<Transport>,
    peers: Arc<PeerDirectory>,
    ack: Arc<AckManager>,
    revoked: Arc<RevocationSet>,
    clock: Arc<dyn Clock>,
    display: Arc<dyn Display>,
    games: Mutex<HashMap<String, GameRecord>>,
}

impl TicTacToe {
    pub fn new(
        user_id: UserId,
        transport: Arc<Transport>,
        peers: Arc<PeerDirectory>,
        ack: Arc<AckManager>,
        revoked: Arc<RevocationSet>,
        clock: Arc<dyn Clock>,
        display: Arc<dyn Display>,
    ) -> Self {
        TicTacToe {
            user_id,
            transport,
            peers,
            ack,
            revoked,
            clock,
            display,
            games: Mutex::new(HashMap::new()),
        }
    }

    async fn send_and_track(&self, endpoint: lsnp_core::Endpoint, msg: Message) {
        let wire = msg.to_wire();
        let mid = msg.message_id().unwrap_or_default().to_string();
        let handler = Arc::new(MoveResend {
            transport: self.transport.clone(),
            ip: endpoint.ip,
            port: endpoint.port,
            wire: wire.clone(),
        });
        self.transport
            .send_unicast(endpoint.ip, endpoint.port, &wire, "game")
            .await;
        self.ack.track(mid, handler);
    }

    pub async fn invite(&self, to_user: &UserId, gameid: &str, symbol: char, ttl: i64) {
        let Some(endpoint) = self.peers.endpoint_of(to_user) else {
            return;
        };
        let now = self.clock.now();
        let token = Token::make(&self.user_id, now + ttl, Scope::Game);
        let mut msg = Message::new();
        msg.set("TYPE", "TICTACTOE_INVITE")
            .set("FROM", self.user_id.as_str())
            .set("TO", to_user.as_str())
            .set("GAMEID", gameid)
            .set("SYMBOL", symbol.to_string())
            .set("TIMESTAMP", now.to_string())
            .set("TOKEN", token.as_str())
            .set("MESSAGE_ID", new_message_id());
        self.send_and_track(endpoint, msg).await;
    }

    pub async fn make_move(
        &self,
        to_user: &UserId,
        gameid: &str,
        position: usize,
        symbol: char,
        turn: u64,
        ttl: i64,
    ) {
        let Some(endpoint) = self.peers.endpoint_of(to_user) else {
            return;
        };
        let now = self.clock.now();
        let token = Token::make(&self.user_id, now + ttl, Scope::Game);
        let mut msg = Message::new();
        msg.set("TYPE", "TICTACTOE_MOVE")
            .set("FROM", self.user_id.as_str())
            .set("TO", to_user.as_str())
            .set("GAMEID", gameid)
            .set("POSITION", position.to_string())
            .set("SYMBOL", symbol.to_string())
            .set("TURN", turn.to_string())
            .set("TOKEN", token.as_str())
            .set("MESSAGE_ID", new_message_id());
        self.send_and_track(endpoint, msg).await;
    }

    pub fn on_invite(&self, msg: &Message) {
        let sender = UserId::from(msg.get_or("FROM", ""));
        let token = Token::from(msg.get_or("TOKEN", ""));
        if !self
            .revoked
            .validate(&token, Scope::Game, &sender, self.clock.as_ref())
        {
            return;
        }
        let gid = msg.get_or("GAMEID", "");
        let symbol = msg.get_or("SYMBOL", "X").chars().next().unwrap_or('X');
        let opp_symbol = if symbol == 'X' { 'O' } else { 'X' };
        self.games.lock().insert(
            gid,
            GameRecord {
                board: [' '; 9],
                my_symbol: opp_symbol,
                opp_symbol: symbol,
                last_turn_seen: 0,
                opponent: sender.clone(),
            },
        );
        self.display
            .line(format!("{} is inviting you to play tic-tac-toe.", sender.short_name()));
    }

    pub async fn on_move(&self, msg: &Message) {
        let sender = UserId::from(msg.get_or("FROM", ""));
        let token = Token::from(msg.get_or("TOKEN", ""));
        if !self
            .revoked
            .validate(&token, Scope::Game, &sender, self.clock.as_ref())
        {
            return;
        }
        let gid = msg.get_or("GAMEID", "");
        let pos: usize = msg.get_or("POSITION", "0").parse().unwrap_or(0);
        let sym = msg.get_or("SYMBOL", "X").chars().next().unwrap_or('X');
        let turn: u64 = msg.get_or("TURN", "1").parse().unwrap_or(1);

        let outcome_board = {
            let mut games = self.games.lock();
            let st = games.entry(gid.clone()).or_insert_with(|| GameRecord {
                board: [' '; 9],
                my_symbol: 'O',
                opp_symbol: 'X',
                last_turn_seen: 0,
                opponent: sender.clone(),
            });

            if turn <= st.last_turn_seen {
                // duplicate, already-applied turn: re-display, nothing else
                self.display.line(render_board(&st.board_string()));
                return;
            }

            if pos > 8 {
                return;
            }
            if st.board[pos] == 'X' || st.board[pos] == 'O' {
                return; // conflicting placement: ignore
            }
            st.board[pos] = sym;
            st.last_turn_seen = turn;
            st.board_string()
        };

        self.display.line(render_board(&outcome_board));

        if let Some(outcome) = result(&outcome_board) {
            self.send_result(&sender, &gid, outcome, sym).await;
        }
    }

    async fn send_result(&self, to_user: &UserId, gid: &str, outcome: Outcome, symbol: char) {
        let Some(endpoint) = self.peers.endpoint_of(to_user) else {
            return;
        };
        let (result_str, line) = match outcome {
            Outcome::Win { line } => ("WIN".to_string(), format!("{},{},{}", line.0, line.1, line.2)),
            Outcome::Draw => ("DRAW".to_string(), String::new()),
        };
        let mut msg = Message::new();
        msg.set("TYPE", "TICTACTOE_RESULT")
            .set("FROM", self.user_id.as_str())
            .set("TO", to_user.as_str())
            .set("GAMEID", gid)
            .set("RESULT", result_str)
            .set("SYMBOL", symbol.to_string())
            .set("WINNING_LINE", line)
            .set("TIMESTAMP", self.clock.now().to_string());
        self.transport
            .send_unicast(endpoint.ip, endpoint.port, &msg.to_wire(), "game")
            .await;
    }

    /// Render + report the final board on receipt of a TICTACTOE_RESULT,
    /// a supplement carried from the original's `_on_TICTACTOE_RESULT`.
    pub fn on_result(&self, msg: &Message) {
        let gid = msg.get_or("GAMEID", "");
        let board = self
            .games
            .lock()
            .get(&gid)
            .map(|g| g.board_string())
            .unwrap_or_else(|| " ".repeat(9));
        self.display.line(format!("\n{}", render_board(&board)));
        let res = msg.get_or("RESULT", "");
        if !res.is_empty() {
            let sym = msg.get_or("SYMBOL", "");
            let line = msg.get_or("WINNING_LINE", "");
            let extra = if line.is_empty() {
                String::new()
            } else {
                format!(" (line {line})")
            };
            self.display.line(format!("Game over: {res} as {sym}{extra}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsnp_core::SystemClock;

    async fn engine() -> (TicTacToe, Arc<lsnp_core::RecordingDisplay>) {
        let group = lsnp_core::wire::MULTICAST_GROUP.parse().unwrap();
        let transport = Arc::new(
            Transport::bind(0, 0.0, lsnp_core::wire::DISCOVERY_PORT, group)
                .await
                .unwrap(),
        );
        let display = Arc::new(lsnp_core::RecordingDisplay::new());
        let engine = TicTacToe::new(
            UserId::from("me@127.0.0.1"),
            transport,
            Arc::new(PeerDirectory::new()),
            AckManager::new(),
            Arc::new(RevocationSet::new()),
            Arc::new(SystemClock),
            display.clone(),
        );
        (engine, display)
    }

    fn move_msg(from: &UserId, gid: &str, pos: usize, sym: char, turn: u64, token: &Token) -> Message {
        let mut m = Message::new();
        m.set("TYPE", "TICTACTOE_MOVE")
            .set("FROM", from.as_str())
            .set("GAMEID", gid)
            .set("POSITION", pos.to_string())
            .set("SYMBOL", sym.to_string())
            .set("TURN", turn.to_string())
            .set("TOKEN", token.as_str());
        m
    }

    #[tokio::test]
    async fn duplicate_turn_is_suppressed_not_reapplied() {
        let (engine, _display) = engine().await;
        let opp = UserId::from("opp@127.0.0.1");
        let token = Token::make(&opp, SystemClock.now() + 3600, Scope::Game);

        engine.on_move(&move_msg(&opp, "g1", 0, 'X', 1, &token)).await;
        engine.on_move(&move_msg(&opp, "g1", 4, 'X', 1, &token)).await; // same turn again

        let games = engine.games.lock();
        let st = games.get("g1").unwrap();
        assert_eq!(st.board[0], 'X');
        assert_eq!(st.board[4], ' ', "a duplicate TURN must not apply a second move");
    }

    #[tokio::test]
    async fn winning_move_triggers_result_without_panicking() {
        let (engine, _display) = engine().await;
        let opp = UserId::from("opp@127.0.0.1");
        let token = Token::make(&opp, SystemClock.now() + 3600, Scope::Game);
        {
            let mut games = engine.games.lock();
            games.insert(
                "g1".into(),
                GameRecord {
                    board: ['X', 'X', ' ', ' ', ' ', ' ', ' ', ' ', ' '],
                    my_symbol: 'O',
                    opp_symbol: 'X',
                    last_turn_seen: 1,
                    opponent: opp.clone(),
                },
            );
        }
        engine.on_move(&move_msg(&opp, "g1", 2, 'X', 2, &token)).await;
    }
}
