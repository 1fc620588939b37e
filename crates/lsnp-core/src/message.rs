use indexmap::IndexMap;

/// Normalize a raw header key: trim, uppercase, strip internal spaces, then
/// fold known aliases onto their canonical spelling.
fn normalize_key(raw: &str) -> String {
    let k: String = raw
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    match k.as_str() {
        "MESSAGEID" | "MESSAGE_ID" => "MESSAGE_ID".to_string(),
        "GAMEID" | "GAMED" => "GAMEID".to_string(),
        "USERID" | "USER_ID" => "USER_ID".to_string(),
        "GROUPID" | "GROUP_ID" => "GROUP_ID".to_string(),
        "AVATARDATA" | "AVATAR_DATA" => "AVATAR_DATA".to_string(),
        "AVATARENCODING" | "AVATAR_ENCODING" => "AVATAR_ENCODING".to_string(),
        "AVATARTYPE" | "AVATAR_TYPE" => "AVATAR_TYPE".to_string(),
        other => other.to_string(),
    }
}

/// A parsed or to-be-sent LSNP frame: an ordered bag of uppercase-normalized
/// `KEY: VALUE` fields. Parsing never fails — malformed lines are skipped,
/// never rejected, so unrecognized or partial input degrades to an (possibly
/// empty) message rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    fields: IndexMap<String, String>,
}

impl Message {
    pub fn new() -> Self {
        Message::default()
    }

    /// Parse a raw frame body (before the terminating blank line is stripped,
    /// if present). Tolerant of `\r\n` and trailing whitespace.
    pub fn parse(raw: &str) -> Self {
        let mut fields = IndexMap::new();
        for line in raw.replace("\r\n", "\n").split('\n') {
            if let Some((k, v)) = line.split_once(':') {
                fields.insert(normalize_key(k), v.trim().to_string());
            }
        }
        Message { fields }
    }

    /// Serialize to the wire format: `TYPE` first if present, then the
    /// remaining fields in insertion order, terminated by a blank line.
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        if let Some(t) = self.fields.get("TYPE") {
            out.push_str("TYPE: ");
            out.push_str(t);
            out.push('\n');
        }
        for (k, v) in &self.fields {
            if k == "TYPE" {
                continue;
            }
            out.push_str(k);
            out.push_str(": ");
            out.push_str(v);
            out.push('\n');
        }
        out.push('\n');
        out
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.fields.insert(normalize_key(key), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(&normalize_key(key)).map(|s| s.as_str())
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    pub fn message_type(&self) -> &str {
        self.get("TYPE").unwrap_or("")
    }

    pub fn message_id(&self) -> Option<&str> {
        self.get("MESSAGE_ID")
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(&normalize_key(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<Vec<(&str, &str)>> for Message {
    fn from(pairs: Vec<(&str, &str)>) -> Self {
        let mut m = Message::new();
        for (k, v) in pairs {
            m.set(k, v);
        }
        m
    }
}

/// A fresh, random 64-bit hex MESSAGE_ID, matching the width of the original
/// implementation's `random.getrandbits(64):x` identifiers.
pub fn new_message_id() -> String {
    format!("{:x}", rand::random::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_keys_and_trims_values() {
        let raw = "type: POST\nUSER ID: alice@1.2.3.4\ncontent:  hi there \n\n";
        let m = Message::parse(raw);
        assert_eq!(m.message_type(), "POST");
        assert_eq!(m.get("USER_ID"), Some("alice@1.2.3.4"));
        assert_eq!(m.get("CONTENT"), Some("hi there"));
    }

    #[test]
    fn parse_skips_lines_without_colon() {
        let raw = "TYPE: POST\ngarbage line no colon\nCONTENT: hi\n\n";
        let m = Message::parse(raw);
        assert_eq!(m.message_type(), "POST");
        assert_eq!(m.get("CONTENT"), Some("hi"));
    }

    #[test]
    fn parse_of_empty_string_never_panics() {
        let m = Message::parse("");
        assert_eq!(m.message_type(), "");
    }

    #[test]
    fn to_wire_puts_type_first() {
        let mut m = Message::new();
        m.set("CONTENT", "hi").set("TYPE", "POST");
        let wire = m.to_wire();
        assert!(wire.starts_with("TYPE: POST\n"));
        assert!(wire.ends_with("\n\n"));
    }

    #[test]
    fn round_trip_preserves_fields() {
        let mut m = Message::new();
        m.set("TYPE", "DM").set("FROM", "a@1.1.1.1").set("CONTENT", "hello");
        let wire = m.to_wire();
        let back = Message::parse(&wire);
        assert_eq!(back.get("FROM"), Some("a@1.1.1.1"));
        assert_eq!(back.get("CONTENT"), Some("hello"));
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let raw = "TYPE: POST\nFUTURE_FIELD: surprise\n\n";
        let m = Message::parse(raw);
        assert_eq!(m.get("FUTURE_FIELD"), Some("surprise"));
        assert!(m.to_wire().contains("FUTURE_FIELD: surprise"));
    }

    #[test]
    fn message_id_aliases_normalize() {
        let raw = "TYPE: DM\nMessageId: abc\n\n";
        let m = Message::parse(raw);
        assert_eq!(m.message_id(), Some("abc"));
    }
}
