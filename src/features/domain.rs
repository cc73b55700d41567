//! Host name helpers: literal-address detection, label reversal and
//! registrable (second-level) domain extraction.

use crate::error::DomainError;
use std::net::IpAddr;

/// Two-label public suffixes under which registrations happen at the third level.
const SECOND_LEVEL_SUFFIXES: &[&str] = &[
    "ac.uk", "co.uk", "gov.uk", "ltd.uk", "me.uk", "net.uk", "org.uk", "plc.uk",
    "com.au", "net.au", "org.au", "edu.au", "gov.au", "asn.au", "id.au",
    "co.jp", "ne.jp", "or.jp", "ac.jp", "go.jp",
    "co.kr", "or.kr", "ne.kr",
    "com.br", "net.br", "org.br",
    "com.cn", "net.cn", "org.cn", "gov.cn", "edu.cn",
    "co.in", "net.in", "org.in", "firm.in", "gen.in", "ind.in",
    "co.za", "org.za", "web.za",
    "com.mx", "org.mx", "com.ar", "com.co", "com.tr", "com.tw", "org.tw",
    "com.ru", "net.ru", "org.ru", "com.ua", "co.nz", "org.nz", "net.nz",
    "com.sg", "com.my", "com.hk", "com.vn", "com.pk", "com.ng", "co.id",
    "co.il", "co.th", "in.th", "com.pl", "com.es", "com.pe", "com.ph",
];

/// Host with any `:port` suffix and IPv6 brackets removed, lowercased,
/// trailing dot dropped.
pub fn normalize_host(host: &str) -> String {
    let h = host.trim();
    let h = if let Some(rest) = h.strip_prefix('[') {
        rest.split_once(']').map_or(rest, |(addr, _)| addr)
    } else {
        match h.rsplit_once(':') {
            Some((name, port))
                if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) =>
            {
                name
            }
            _ => h,
        }
    };
    h.trim_end_matches('.').to_ascii_lowercase()
}

/// Literal address of a host, ignoring any port or brackets.
pub fn host_address(host: &str) -> Option<IpAddr> {
    normalize_host(host).parse().ok()
}

/// `www.example.com` -> `com.example.www`.
pub fn reverse_labels(host: &str) -> String {
    host.split('.').rev().collect::<Vec<_>>().join(".")
}

/// Registrable domain of a host name: `dl.cdn.example.co.uk` -> `example.co.uk`.
pub fn registrable_domain(host: &str) -> Result<String, DomainError> {
    let host = normalize_host(host);
    if host.is_empty() {
        return Err(DomainError::Empty);
    }
    let labels: Vec<&str> = host.split('.').collect();
    if labels.iter().any(|l| l.is_empty()) {
        return Err(DomainError::EmptyLabel(host));
    }
    if labels.len() < 2 {
        return Err(DomainError::NoRegistrableDomain(host));
    }

    let n = labels.len();
    let last_two = labels[n - 2..].join(".");
    let keep = if SECOND_LEVEL_SUFFIXES.contains(&last_two.as_str()) {
        3
    } else {
        2
    };
    if n < keep {
        return Err(DomainError::NoRegistrableDomain(host));
    }
    Ok(labels[n - keep..].join("."))
}
