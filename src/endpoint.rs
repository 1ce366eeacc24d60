use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

use crate::error::Error;

/// Host used when an endpoint is given as a bare port.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// A `(host, port)` destination for MLLP traffic.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }

    /// An endpoint on the loopback interface.
    pub fn local(port: u16) -> Self {
        Endpoint::new(DEFAULT_HOST, port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            // bare IPv6 literal
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Accepts `host:port`, `[v6]:port` or a bare `port`.
impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || Error::InvalidEndpoint(s.to_string());

        let (host, port) = match s.strip_prefix('[') {
            // IPv6 literals need brackets to tell the port apart
            Some(rest) => {
                let (host, port) = rest.split_once(']').ok_or_else(invalid)?;
                (host, port.strip_prefix(':').ok_or_else(invalid)?)
            }
            None => match s.rsplit_once(':') {
                Some((host, _)) if host.contains(':') => return Err(invalid()),
                Some((host, port)) => (host, port),
                None => (DEFAULT_HOST, s),
            },
        };
        if host.is_empty() {
            return Err(invalid());
        }

        let port: u16 = port.parse().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }
        Ok(Endpoint::new(host, port))
    }
}

// Scenario files may list targets as "host:port" strings or bare port numbers.
impl<'de> Deserialize<'de> for Endpoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Port(u16),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Port(port) => Ok(Endpoint::local(port)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("127.0.0.1:2575", "127.0.0.1", 2575)]
    #[case("2576", DEFAULT_HOST, 2576)]
    #[case("mirth.local:2577", "mirth.local", 2577)]
    #[case(" [::1]:2578 ", "::1", 2578)]
    fn parses_endpoints(#[case] input: &str, #[case] host: &str, #[case] port: u16) {
        let endpoint: Endpoint = input.parse().expect("valid endpoint");
        assert_eq!(endpoint, Endpoint::new(host, port));
    }

    #[rstest]
    #[case("")]
    #[case("localhost")]
    #[case(":2575")]
    #[case("127.0.0.1:0")]
    #[case("127.0.0.1:70000")]
    #[case("::1")]
    #[case("::1:2575")]
    #[case("[::1]")]
    #[case("[::1:2575")]
    fn rejects_bad_endpoints(#[case] input: &str) {
        assert!(matches!(input.parse::<Endpoint>(), Err(Error::InvalidEndpoint(_))));
    }

    #[test]
    fn displays_as_socket_address() {
        assert_eq!(Endpoint::local(2575).to_string(), "127.0.0.1:2575");
        assert_eq!(Endpoint::new("::1", 2575).to_string(), "[::1]:2575");
    }
}
