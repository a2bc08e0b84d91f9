//! doh-filter - A filtering DNS-over-HTTPS relay.
//!
//! doh-filter accepts RFC 8484 DNS queries over HTTP, answers NXDOMAIN for
//! names on a blocklist, and relays everything else to an upstream DoH
//! resolver. The blocklist is fetched from a URL and stored one entry per
//! domain in a key-value store, keyed by the SHA-256 digest of the name.
//!
//! # Architecture
//!
//! - [`config`]: Configuration loading and validation
//! - [`dns`]: Wire format decoding and upstream resolution
//! - [`blocklist`]: Blocklist parsing, ingest and lookup
//! - [`kv`]: Key-value store backends
//! - [`server`]: Query routing and server orchestration
//! - [`http`]: HTTP routes
//! - [`error`]: Error types
//!
//! # Testing
//!
//! Collaborators sit behind traits so routing can be tested without network
//! access:
//!
//! ```rust
//! use doh_filter::blocklist::domain_key;
//! use doh_filter::dns::{decode_query, encode_nxdomain};
//!
//! let reply = encode_nxdomain(0x1234);
//! assert_eq!(&reply[..4], &[0x12, 0x34, 0x81, 0x83]);
//! assert!(decode_query(&reply).unwrap().name.is_empty());
//! assert_eq!(domain_key("Ads.Example.com."), domain_key("ads.example.com"));
//! ```

pub mod blocklist;
pub mod config;
pub mod dns;
pub mod error;
pub mod http;
pub mod kv;
pub mod metrics;
pub mod server;

pub use config::Config;
pub use error::{Error, Result};
