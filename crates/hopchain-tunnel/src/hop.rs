//! Hop specification parsing.
//!
//! A hop spec is a comma-separated list of `user@host[:port]` entries in
//! dial order, e.g. `alice@bastion.example.com,deploy@10.0.0.5:2222`.

use std::fmt;
use std::str::FromStr;

use hopchain_core::DEFAULT_SSH_PORT;

use crate::error::TunnelError;

/// A `host:port` network address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
    ///
    /// A bare IPv6 literal without brackets is taken as a host. When the
    /// input carries no port, `default_port` is used; with no default the
    /// port is required.
    pub fn parse(s: &str, default_port: Option<u16>) -> Result<Self, TunnelError> {
        let s = s.trim();
        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| TunnelError::Config(format!("unterminated IPv6 literal in {s:?}")))?;
            match tail {
                "" => (host, None),
                _ => {
                    let port = tail.strip_prefix(':').ok_or_else(|| {
                        TunnelError::Config(format!("unexpected characters after IPv6 literal in {s:?}"))
                    })?;
                    (host, Some(port))
                }
            }
        } else {
            match s.rsplit_once(':') {
                Some((host, port)) if !host.contains(':') => (host, Some(port)),
                _ => (s, None),
            }
        };

        if host.is_empty() {
            return Err(TunnelError::Config(format!("missing host in {s:?}")));
        }

        let port = match (port, default_port) {
            (Some(p), _) => p
                .parse::<u16>()
                .map_err(|_| TunnelError::Config(format!("invalid port {p:?} in {s:?}")))?,
            (None, Some(default)) => default,
            (None, None) => return Err(TunnelError::Config(format!("missing port in {s:?}"))),
        };

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// One intermediary secure-shell server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    pub user: String,
    pub addr: Endpoint,
}

impl Hop {
    /// Parse a single `user@host[:port]` entry.
    pub fn parse(entry: &str) -> Result<Self, TunnelError> {
        let entry = entry.trim();
        let (user, addr) = entry
            .split_once('@')
            .ok_or_else(|| TunnelError::Config(format!("host {entry:?} does not contain a username")))?;
        if user.is_empty() {
            return Err(TunnelError::Config(format!("host {entry:?} has an empty username")));
        }
        Ok(Self {
            user: user.to_string(),
            addr: Endpoint::parse(addr, Some(DEFAULT_SSH_PORT))?,
        })
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.addr)
    }
}

/// Ordered, non-empty list of hops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopSpec {
    hops: Vec<Hop>,
}

impl HopSpec {
    pub fn new(hops: Vec<Hop>) -> Result<Self, TunnelError> {
        if hops.is_empty() {
            return Err(TunnelError::Config("no hosts provided".into()));
        }
        Ok(Self { hops })
    }

    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// The hop that opens channels to the final destination.
    pub fn last(&self) -> &Hop {
        // non-empty by construction
        &self.hops[self.hops.len() - 1]
    }
}

impl FromStr for HopSpec {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(TunnelError::Config("no hosts provided".into()));
        }
        let hops = s.split(',').map(Hop::parse).collect::<Result<Vec<_>, _>>()?;
        Self::new(hops)
    }
}

impl fmt::Display for HopSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, hop) in self.hops.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{hop}")?;
        }
        Ok(())
    }
}
