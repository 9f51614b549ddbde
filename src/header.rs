use scroll::{Pread, LE};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The magic prefix of every WZ archive.
pub const WZ_MAGIC: [u8; 4] = *b"PKG1";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("bad magic {found:02X?}, expected \"PKG1\"")]
    BadMagic { found: [u8; 4] },
    #[error("bad header: body offset {0} out of range")]
    BadHeader(usize),
    #[error("truncated header: {0}")]
    ShortRead(#[from] scroll::Error),
}

/// Fixed prefix of a WZ archive. Constructed once at open, read-only
/// afterwards; every relative offset in the archive is measured from
/// `body_offset`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WzHeader {
    /// size of the body region in bytes
    pub body_size: u64,
    /// absolute offset at which the body begins, at least 16
    pub body_offset: usize,
    pub copyright: String,
}

impl WzHeader {
    /// Byte length of the fixed part: magic + body size + body offset.
    pub const FIXED_SIZE: usize = 16;

    pub fn read_from(buf: &[u8]) -> Result<Self, Error> {
        let found = buf.pread_with::<u32>(0, LE)?.to_le_bytes();
        if found != WZ_MAGIC {
            return Err(Error::BadMagic { found });
        }

        let body_size = buf.pread_with::<u64>(4, LE)?;
        let body_offset = buf.pread_with::<u32>(12, LE)? as usize;

        if body_offset < Self::FIXED_SIZE || body_offset > buf.len() {
            return Err(Error::BadHeader(body_offset));
        }

        // copyright runs from the fixed header to the first non-printable
        // byte, at most up to the body
        let trailer = &buf[Self::FIXED_SIZE..body_offset];
        let end = trailer
            .iter()
            .position(|byte| !(32..=126).contains(byte))
            .unwrap_or(trailer.len());
        let copyright = String::from_utf8_lossy(&trailer[..end]).into_owned();

        Ok(WzHeader {
            body_size,
            body_offset,
            copyright,
        })
    }
}
