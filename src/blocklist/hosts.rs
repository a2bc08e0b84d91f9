//! Hosts file format parser.
//!
//! Parses `/etc/hosts` style blocklists such as Steven Black's.

use super::BlocklistParser;

/// Parser for hosts file format.
///
/// Only lines mapping a domain to `0.0.0.0` or `127.0.0.1` are used. Inline
/// comments are stripped, several domains per line are allowed, and system
/// names (`localhost`, `broadcasthost`, ...) or IP-like tokens are skipped.
///
/// ```text
/// 127.0.0.1 localhost
/// 0.0.0.0 ads.example.com tracker.example.com # trackers
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct HostsFileParser;

/// Domains to ignore (system entries).
const IGNORED_DOMAINS: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
    "ip6-localnet",
    "ip6-mcastprefix",
    "ip6-allnodes",
    "ip6-allrouters",
    "ip6-allhosts",
];

/// IP addresses that indicate a blocked domain.
const BLOCK_IPS: &[&str] = &["0.0.0.0", "127.0.0.1"];

impl BlocklistParser for HostsFileParser {
    fn parse(&self, content: &str) -> Vec<String> {
        let mut domains = Vec::new();

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();

            let mut parts = line.split_whitespace();
            let Some(ip) = parts.next() else {
                continue;
            };
            if !BLOCK_IPS.contains(&ip) {
                continue;
            }

            domains.extend(
                parts
                    .filter(|domain| {
                        !IGNORED_DOMAINS.contains(&domain.to_ascii_lowercase().as_str())
                    })
                    .filter(|domain| !is_ip_like(domain))
                    .map(str::to_string),
            );
        }

        domains
    }
}

/// Check if a token looks like an IP address rather than a domain.
fn is_ip_like(s: &str) -> bool {
    if s.contains(':') {
        return true;
    }

    s.contains('.') && s.split('.').all(|p| p.parse::<u8>().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Vec<String> {
        HostsFileParser.parse(content)
    }

    #[test]
    fn test_block_ip_lines() {
        let content = "0.0.0.0 ads.example.com\n127.0.0.1 tracking.example.com";
        assert_eq!(
            parse(content),
            vec!["ads.example.com", "tracking.example.com"]
        );
    }

    #[test]
    fn test_multiple_domains_per_line() {
        assert_eq!(
            parse("0.0.0.0 a.example.com b.example.com"),
            vec!["a.example.com", "b.example.com"]
        );
    }

    #[test]
    fn test_skips_system_entries() {
        let content = "127.0.0.1 localhost\n127.0.0.1 LocalHost.localdomain\n0.0.0.0 0.0.0.0";
        assert!(parse(content).is_empty());
    }

    #[test]
    fn test_skips_other_ips() {
        assert!(parse("192.168.1.10 printer.lan").is_empty());
    }

    #[test]
    fn test_inline_comments() {
        assert_eq!(
            parse("# header\n0.0.0.0 ads.example.com # ad server"),
            vec!["ads.example.com"]
        );
    }

    #[test]
    fn test_skips_ipv6_tokens_and_bare_ip_lines() {
        assert!(parse("0.0.0.0 ::1\n0.0.0.0\n").is_empty());
    }

    #[test]
    fn test_ip_like_detection() {
        assert!(is_ip_like("10.0.0.1"));
        assert!(is_ip_like("fe80::1"));
        assert!(!is_ip_like("ads.example.com"));
        assert!(!is_ip_like("1337"));
        assert!(!is_ip_like("1.example"));
    }
}
