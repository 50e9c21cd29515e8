use url::{Host, Url};

/// Certificate verification policy for a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsPolicy {
    Verify,
    /// Development carve-out for loopback hosts, which usually serve
    /// self-signed certificates.
    AcceptInvalidCerts,
}

impl TlsPolicy {
    /// Derive the policy from the parsed URL host: loopback hosts skip
    /// verification, everything else verifies.
    pub fn for_url(url: &Url) -> Self {
        let loopback = match url.host() {
            Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
            Some(Host::Ipv4(ip)) => ip.is_loopback(),
            Some(Host::Ipv6(ip)) => ip.is_loopback(),
            None => false,
        };
        if loopback {
            TlsPolicy::AcceptInvalidCerts
        } else {
            TlsPolicy::Verify
        }
    }

    pub fn accepts_invalid_certs(&self) -> bool {
        matches!(self, TlsPolicy::AcceptInvalidCerts)
    }
}
