//! DNS-related modules.

pub mod upstream;
pub mod wire;

pub use upstream::{DnsResolver, DohResolver, UpstreamResponse};
pub use wire::{DnsQuery, WireError, decode_query, encode_nxdomain};
