use std::collections::HashSet;
use std::fmt;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::clock::Clock;
use crate::ids::UserId;

/// The five scopes a bearer token can be minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Chat,
    Broadcast,
    Follow,
    Group,
    File,
    Game,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Chat => "chat",
            Scope::Broadcast => "broadcast",
            Scope::Follow => "follow",
            Scope::Group => "group",
            Scope::File => "file",
            Scope::Game => "game",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A bearer token string of the form `user_id|expiry_epoch_seconds|scope`.
/// Kept as an opaque string rather than a parsed struct — the wire value is
/// what gets hashed for revocation, and `parse` tolerates the looser
/// separators seen in the field (`|`, bare spaces, mixed).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Mint a new token string for `user_id`, expiring at `exp_ts` (Unix
    /// seconds), scoped to `scope`.
    pub fn make(user_id: &UserId, exp_ts: i64, scope: Scope) -> Token {
        Token(format!("{}|{}|{}", user_id.as_str(), exp_ts, scope))
    }

    /// Parse into `(user_id, expiry, scope)`. Tolerates `|`-separated,
    /// space-separated, and mixed forms; returns `None` on anything that
    /// doesn't resolve to at least three non-empty parts.
    pub fn parse(&self) -> Option<(UserId, i64, String)> {
        let t = self.0.trim();

        for sep in ['|', ' '] {
            if t.matches(sep).count() >= 2 {
                let parts: Vec<&str> = t.split(sep).filter(|p| !p.is_empty()).collect();
                if parts.len() >= 3 {
                    if let Ok(exp) = parts[1].trim().parse::<i64>() {
                        return Some((
                            UserId::from(parts[0].trim()),
                            exp,
                            parts[2].trim().to_string(),
                        ));
                    }
                }
            }
        }

        let fallback: Vec<&str> = t.replace('|', " ").split_whitespace().collect();
        if fallback.len() >= 3 {
            if let Ok(exp) = fallback[1].parse::<i64>() {
                return Some((UserId::from(fallback[0]), exp, fallback[2].to_string()));
            }
        }
        None
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Token(s)
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Token(s.to_string())
    }
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

/// Process-lifetime set of revoked token digests. Revocation never expires
/// (no eviction) and is checked on every validation, matching the REVOKE
/// handler's effect of immediately invalidating a token regardless of its
/// stated expiry.
#[derive(Debug, Default)]
pub struct RevocationSet(Mutex<HashSet<[u8; 32]>>);

impl RevocationSet {
    pub fn new() -> Self {
        RevocationSet(Mutex::new(HashSet::new()))
    }

    pub fn revoke(&self, token: &Token) {
        self.0.lock().insert(digest(token.as_str()));
    }

    pub fn is_revoked(&self, token: &Token) -> bool {
        self.0.lock().contains(&digest(token.as_str()))
    }

    /// Validate `token` as a pure function of the token itself, the expected
    /// scope, the sender's claimed user id, the current time, and this
    /// revocation set.
    pub fn validate(
        &self,
        token: &Token,
        expected_scope: Scope,
        claimed_sender: &UserId,
        clock: &dyn Clock,
    ) -> bool {
        let Some((user_id, exp_ts, scope)) = token.parse() else {
            return false;
        };
        if &user_id != claimed_sender {
            return false;
        }
        if clock.now() > exp_ts {
            return false;
        }
        if scope != expected_scope.as_str() {
            return false;
        }
        if self.is_revoked(token) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    fn user(s: &str) -> UserId {
        UserId::from(s)
    }

    #[test]
    fn make_then_parse_round_trips() {
        let u = user("alice@10.0.0.1");
        let tok = Token::make(&u, 1000, Scope::Chat);
        let (pu, exp, scope) = tok.parse().unwrap();
        assert_eq!(pu, u);
        assert_eq!(exp, 1000);
        assert_eq!(scope, "chat");
    }

    #[test]
    fn parse_tolerates_space_separated_form() {
        let tok = Token::from("bob@1.1.1.1 500 game");
        let (u, exp, scope) = tok.parse().unwrap();
        assert_eq!(u, user("bob@1.1.1.1"));
        assert_eq!(exp, 500);
        assert_eq!(scope, "game");
    }

    #[test]
    fn parse_returns_none_for_garbage() {
        assert!(Token::from("not-a-token").parse().is_none());
    }

    #[test]
    fn validate_accepts_matching_unexpired_token() {
        let u = user("alice@10.0.0.1");
        let tok = Token::make(&u, 1000, Scope::Broadcast);
        let clock = FixedClock::new(500);
        let revoked = RevocationSet::new();
        assert!(revoked.validate(&tok, Scope::Broadcast, &u, &clock));
    }

    #[test]
    fn validate_rejects_expired_token() {
        let u = user("alice@10.0.0.1");
        let tok = Token::make(&u, 1000, Scope::Broadcast);
        let clock = FixedClock::new(1001);
        let revoked = RevocationSet::new();
        assert!(!revoked.validate(&tok, Scope::Broadcast, &u, &clock));
    }

    #[test]
    fn validate_rejects_sender_mismatch() {
        let u = user("alice@10.0.0.1");
        let other = user("mallory@10.0.0.2");
        let tok = Token::make(&u, 1000, Scope::Broadcast);
        let clock = FixedClock::new(500);
        let revoked = RevocationSet::new();
        assert!(!revoked.validate(&tok, Scope::Broadcast, &other, &clock));
    }

    #[test]
    fn validate_rejects_wrong_scope() {
        let u = user("alice@10.0.0.1");
        let tok = Token::make(&u, 1000, Scope::Chat);
        let clock = FixedClock::new(500);
        let revoked = RevocationSet::new();
        assert!(!revoked.validate(&tok, Scope::Broadcast, &u, &clock));
    }

    #[test]
    fn validate_rejects_revoked_token() {
        let u = user("alice@10.0.0.1");
        let tok = Token::make(&u, 1000, Scope::Game);
        let clock = FixedClock::new(500);
        let revoked = RevocationSet::new();
        revoked.revoke(&tok);
        assert!(!revoked.validate(&tok, Scope::Game, &u, &clock));
    }

    #[test]
    fn revocation_is_keyed_by_exact_token_bytes() {
        let u = user("alice@10.0.0.1");
        let tok_a = Token::make(&u, 1000, Scope::Game);
        let tok_b = Token::make(&u, 2000, Scope::Game);
        let revoked = RevocationSet::new();
        revoked.revoke(&tok_a);
        assert!(revoked.is_revoked(&tok_a));
        assert!(!revoked.is_revoked(&tok_b));
    }
}
