use std::fmt;
use std::net::Ipv4Addr;

/// A user identifier of the form `name@ipv4`. Kept as an opaque string with
/// parsing helpers rather than a structured type — nothing in the protocol
/// depends on the embedded address being anything but a substring, and the
/// wire format never re-derives it from components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    pub fn new(display_name: &str, ip: Ipv4Addr) -> Self {
        UserId(format!("{display_name}@{ip}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The portion before the first `@`, or the whole string if absent.
    pub fn short_name(&self) -> &str {
        self.0.split('@').next().unwrap_or(&self.0)
    }

    /// The IPv4 address embedded after the first `@`, if the string parses.
    pub fn ip(&self) -> Option<Ipv4Addr> {
        let (_, ip) = self.0.split_once('@')?;
        ip.trim().parse().ok()
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        UserId(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId(s.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An address a peer can be reached at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Endpoint { ip, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl From<Endpoint> for std::net::SocketAddr {
    fn from(e: Endpoint) -> Self {
        std::net::SocketAddr::new(std::net::IpAddr::V4(e.ip), e.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_strips_ip() {
        let u = UserId::from("alice@10.0.0.5");
        assert_eq!(u.short_name(), "alice");
    }

    #[test]
    fn short_name_without_at_is_whole_string() {
        let u = UserId::from("alice");
        assert_eq!(u.short_name(), "alice");
    }

    #[test]
    fn ip_parses_embedded_address() {
        let u = UserId::from("bob@192.168.1.2");
        assert_eq!(u.ip(), Some(Ipv4Addr::new(192, 168, 1, 2)));
    }

    #[test]
    fn ip_is_none_for_malformed_id() {
        let u = UserId::from("nope");
        assert_eq!(u.ip(), None);
    }
}
