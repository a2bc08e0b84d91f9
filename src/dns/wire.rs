//! Minimal DNS wire-format codec.
//!
//! Just enough of RFC 1035 to pull the first question name out of a query and
//! to build a synthetic NXDOMAIN answer. Compressed names, resource records
//! and additional questions are not handled.
//!
//! ```text
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |                      ID                       |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |            QDCOUNT / ANCOUNT / NSCOUNT / ARCOUNT
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |                  Question ...                 |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! ```

/// Size of the fixed DNS header.
pub const HEADER_SIZE: usize = 12;

/// Flags word of the synthetic denial: QR=1, RD=1, RA=1, RCODE=3.
pub const NXDOMAIN_FLAGS: u16 = 0x8183;

/// Content type of DNS messages carried over HTTP (RFC 8484).
pub const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";

/// Top two bits of a length byte select the label type.
const LABEL_TYPE_MASK: u8 = 0xC0;

/// Reasons a buffer is not a decodable DNS query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// Buffer cannot hold the fixed header.
    #[error("message is {len} bytes, shorter than the {HEADER_SIZE}-byte header")]
    TooShort {
        /// Actual buffer length.
        len: usize,
    },

    /// A label length points past the end of the buffer.
    #[error("label of {label_len} bytes at offset {offset} overruns a {len}-byte message")]
    LabelOverrun {
        /// Offset of the length byte.
        offset: usize,
        /// Declared label length.
        label_len: usize,
        /// Actual buffer length.
        len: usize,
    },

    /// A compression pointer where a label length was expected.
    #[error("compressed name at offset {offset} is not supported")]
    CompressedName {
        /// Offset of the pointer byte.
        offset: usize,
    },

    /// Extended or reserved label type (0x40 / 0x80 prefixes).
    #[error("unsupported label type {byte:#04x} at offset {offset}")]
    UnsupportedLabelType {
        /// Offset of the offending byte.
        offset: usize,
        /// The byte itself.
        byte: u8,
    },
}

/// The part of a DNS query the filter cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuery {
    /// Transaction ID, echoed back in any synthesized answer.
    pub id: u16,
    /// First question name, labels joined with `.` and no trailing dot.
    pub name: String,
}

/// Decode the transaction ID and first question name of a DNS query.
///
/// Header counts are ignored; decoding starts right after the header. A buffer
/// that ends exactly on a label boundary yields the labels read so far, so a
/// bare header decodes to an empty name.
///
/// # Errors
///
/// Returns a [`WireError`] when the buffer is shorter than the header, when a
/// label runs past the end of the buffer, or when a length byte carries a
/// compression pointer or reserved label type.
pub fn decode_query(buf: &[u8]) -> Result<DnsQuery, WireError> {
    if buf.len() < HEADER_SIZE {
        return Err(WireError::TooShort { len: buf.len() });
    }

    let id = u16::from_be_bytes([buf[0], buf[1]]);
    let mut name = String::new();
    let mut offset = HEADER_SIZE;

    while let Some(&len_byte) = buf.get(offset) {
        if len_byte == 0 {
            break;
        }

        match len_byte & LABEL_TYPE_MASK {
            0 => {}
            LABEL_TYPE_MASK => return Err(WireError::CompressedName { offset }),
            _ => {
                return Err(WireError::UnsupportedLabelType {
                    offset,
                    byte: len_byte,
                });
            }
        }

        let label_len = usize::from(len_byte);
        let start = offset + 1;
        let Some(label) = buf.get(start..start + label_len) else {
            return Err(WireError::LabelOverrun {
                offset,
                label_len,
                len: buf.len(),
            });
        };

        if !name.is_empty() {
            name.push('.');
        }
        name.extend(label.iter().copied().map(char::from));
        offset = start + label_len;
    }

    Ok(DnsQuery { id, name })
}

/// Build the 12-byte NXDOMAIN header answering the query `id`.
///
/// No question section is echoed back and every count is zero. Strict
/// resolvers expect the question to be repeated; filtering clients accept
/// the bare header.
#[must_use]
pub const fn encode_nxdomain(id: u16) -> [u8; HEADER_SIZE] {
    let id = id.to_be_bytes();
    let flags = NXDOMAIN_FLAGS.to_be_bytes();
    [id[0], id[1], flags[0], flags[1], 0, 0, 0, 0, 0, 0, 0, 0]
}
