//! Domain list format parser.
//!
//! Parses plain blocklists with one domain per line.

use super::BlocklistParser;

/// Parser for simple domain list format.
///
/// # Format
///
/// - One domain per line
/// - Whitespace is trimmed
/// - Empty lines are ignored
/// - Lines starting with `#` are comments
///
/// # Example
///
/// ```text
/// # Ads
/// ads.example.com
/// track.example.com
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainListParser;

impl BlocklistParser for DomainListParser {
    fn parse(&self, content: &str) -> Vec<String> {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    }
}
