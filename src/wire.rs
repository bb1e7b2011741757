//! Handshake wire format.
//!
//! Two kinds of traffic cross the pipe pair: fixed-width control tags on the
//! inbound channel and fixed-size link descriptor records on the outbound
//! channel. Both ends of each pipe live on the same machine, so fields are
//! native byte order; the encoding is still spelled out field by field so the
//! layout is a contract rather than a struct copy.

/// Control tag the kernel sends to open the handshake.
pub const START_MAGIC: u32 = 0x5555;

/// Control tag the kernel sends once it has pinned the reported links.
pub const END_MAGIC: u32 = 0xAAAA;

/// Width of one control tag on the wire.
pub const TAG_SIZE: usize = 4;

/// Capacity of a record's name field, NUL terminator included.
pub const LINK_NAME_CAP: usize = 16;

/// Size of one encoded link descriptor record: the padded name field
/// followed by the 32-bit link id.
pub const RECORD_SIZE: usize = LINK_NAME_CAP + 4;

/// One link descriptor: the kernel-assigned link id and the name the kernel
/// will pin it under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDesc {
    /// Numeric link id reported by the info query.
    pub link_id: u32,
    /// Pin name; must fit [`LINK_NAME_CAP`] with its terminator.
    pub name: String,
}

/// Error types for record encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Name does not fit the record's name field, terminator included.
    /// Oversized names are rejected, never truncated.
    NameTooLong(String),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NameTooLong(name) => {
                write!(f, "link name {:?} exceeds {} bytes", name, LINK_NAME_CAP - 1)
            }
        }
    }
}

impl core::error::Error for Error {}

/// Encode one link descriptor into its fixed-size record.
///
/// Pure function; transmission is the channel layer's job. The name must be
/// strictly shorter than [`LINK_NAME_CAP`] so the terminator always fits.
pub fn encode(desc: &LinkDesc) -> Result<[u8; RECORD_SIZE], Error> {
    let name = desc.name.as_bytes();
    if name.len() >= LINK_NAME_CAP {
        return Err(Error::NameTooLong(desc.name.clone()));
    }

    let mut record = [0u8; RECORD_SIZE];
    record[..name.len()].copy_from_slice(name);
    // Bytes name.len()..LINK_NAME_CAP stay zero: terminator plus padding.
    record[LINK_NAME_CAP..].copy_from_slice(&desc.link_id.to_ne_bytes());
    Ok(record)
}

/// Decode one record back into a descriptor.
///
/// The inverse of [`encode`]; the kernel side of the protocol does this, the
/// helper only uses it in tests.
pub fn decode(record: &[u8; RECORD_SIZE]) -> LinkDesc {
    let name_field = &record[..LINK_NAME_CAP];
    let len = name_field.iter().position(|&b| b == 0).unwrap_or(LINK_NAME_CAP);
    let mut id = [0u8; 4];
    id.copy_from_slice(&record[LINK_NAME_CAP..]);
    LinkDesc {
        link_id: u32::from_ne_bytes(id),
        name: String::from_utf8_lossy(&name_field[..len]).into_owned(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let desc = LinkDesc { link_id: 0x0102_0304, name: "maps.debug".into() };
        let record = encode(&desc).unwrap();

        assert_eq!(&record[..10], b"maps.debug");
        // Terminator and padding.
        assert!(record[10..LINK_NAME_CAP].iter().all(|&b| b == 0));
        assert_eq!(record[LINK_NAME_CAP..], 0x0102_0304u32.to_ne_bytes());
    }

    #[test]
    fn test_name_capacity_boundary() {
        let fits = LinkDesc { link_id: 1, name: "a".repeat(LINK_NAME_CAP - 1) };
        assert!(encode(&fits).is_ok());

        let too_long = LinkDesc { link_id: 1, name: "a".repeat(LINK_NAME_CAP) };
        assert_eq!(
            encode(&too_long),
            Err(Error::NameTooLong("a".repeat(LINK_NAME_CAP)))
        );
    }

    #[test]
    fn test_round_trip() {
        let desc = LinkDesc { link_id: 7, name: "progs.debug".into() };
        assert_eq!(decode(&encode(&desc).unwrap()), desc);
    }
}
