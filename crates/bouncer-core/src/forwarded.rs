//! Forwarded-IP trust: resolves the effective client IP from the
//! immediate peer plus `X-Forwarded-For`, honouring a configured trust
//! list. Trust bounds are `ipnet::IpNet` ranges rather than raw
//! `[lo, hi]` string pairs — `IpNet` gives correct IPv4-in-IPv6
//! containment semantics for free.

use std::net::IpAddr;

use ipnet::IpNet;

/// Outcome of a trust resolution, distinguishing a trusted forward from
/// an untrusted one so the caller can log
/// `NON_AUTHORIZED_X_FORWARDED_FOR_USAGE` on the latter.
pub enum ForwardedResolution {
    Trusted(IpAddr),
    Untrusted(IpAddr),
}

impl ForwardedResolution {
    pub fn ip(&self) -> IpAddr {
        match self {
            Self::Trusted(ip) | Self::Untrusted(ip) => *ip,
        }
    }
}

/// Resolves the effective client IP given the immediate peer, the raw
/// `X-Forwarded-For` header value (if any), and the trusted-proxy
/// ranges. `forced_test_forwarded_ip_disabled` short-circuits forwarding
/// entirely.
pub fn resolve_effective_ip(
    peer: IpAddr,
    forwarded_for_header: Option<&str>,
    trust_ranges: &[IpNet],
    forced_test_forwarded_ip_disabled: bool,
) -> ForwardedResolution {
    if forced_test_forwarded_ip_disabled {
        return ForwardedResolution::Untrusted(peer);
    }

    let Some(candidate) = leftmost_nonempty(forwarded_for_header) else {
        return ForwardedResolution::Untrusted(peer);
    };

    let Ok(candidate_ip) = candidate.parse::<IpAddr>() else {
        return ForwardedResolution::Untrusted(peer);
    };

    if trust_ranges.iter().any(|net| net.contains(&peer)) {
        ForwardedResolution::Trusted(candidate_ip)
    } else {
        ForwardedResolution::Untrusted(peer)
    }
}

/// The leftmost element is the original client; each proxy in the chain
/// appends its own peer to the right as the request passes through.
fn leftmost_nonempty(header: Option<&str>) -> Option<&str> {
    header?
        .split(',')
        .map(str::trim)
        .find(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trusted_peer_yields_forwarded_ip() {
        let peer: IpAddr = "10.0.0.1".parse().unwrap();
        let trust: Vec<IpNet> = vec!["10.0.0.0/8".parse().unwrap()];
        let resolution = resolve_effective_ip(
            peer,
            Some("203.0.113.5, 10.0.0.1"),
            &trust,
            false,
        );
        assert_eq!(resolution.ip(), "203.0.113.5".parse::<IpAddr>().unwrap());
        assert!(matches!(resolution, ForwardedResolution::Trusted(_)));
    }

    #[test]
    fn untrusted_peer_yields_peer_ip() {
        let peer: IpAddr = "198.51.100.7".parse().unwrap();
        let trust: Vec<IpNet> = vec!["10.0.0.0/8".parse().unwrap()];
        let resolution = resolve_effective_ip(
            peer,
            Some("203.0.113.5, 10.0.0.1"),
            &trust,
            false,
        );
        assert_eq!(resolution.ip(), peer);
        assert!(matches!(resolution, ForwardedResolution::Untrusted(_)));
    }

    #[test]
    fn disabled_short_circuits_forwarding() {
        let peer: IpAddr = "10.0.0.1".parse().unwrap();
        let trust: Vec<IpNet> = vec!["10.0.0.0/8".parse().unwrap()];
        let resolution = resolve_effective_ip(peer, Some("203.0.113.5"), &trust, true);
        assert_eq!(resolution.ip(), peer);
    }
}
