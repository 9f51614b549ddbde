use crate::reader::{self, WzCursor};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const ENTRY_TAG_IGNORE: u8 = 0x01;
const ENTRY_TAG_REFERENCE: u8 = 0x02;
const ENTRY_TAG_DIR: u8 = 0x03;
const ENTRY_TAG_FILE: u8 = 0x04;

/// Reference entries point at entries stored elsewhere; a compliant
/// archive never chains them, so anything deeper than this is a cycle.
pub const MAX_REFERENCE_DEPTH: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown directory entry type {tag:#04X} at {offset}")]
    UnknownEntryType { tag: u8, offset: usize },
    #[error("reference entry chain exceeds depth {MAX_REFERENCE_DEPTH} at {0}")]
    ReferenceChainTooDeep(usize),
    #[error("sanity check rejected decoded value {value} at {offset}")]
    DecryptionFailure { value: i64, offset: usize },
    #[error("binary reading error: {0}")]
    Reader(#[from] reader::Error),
}

/// Whether an entry names a subdirectory or an image payload.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WzEntryKind {
    Dir,
    File,
}

/// One directory entry with every encrypted field already decoded.
/// `data_offset` is absolute; recursing into a `Dir` means seeking there
/// and reading another directory.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct WzDirEntry {
    pub kind: WzEntryKind,
    pub name: String,
    pub file_size: i32,
    pub checksum: i32,
    pub data_offset: u32,
}

impl WzDirEntry {
    /// Decode one entry at the cursor. `Ignore` entries yield `None`;
    /// `Reference` entries resolve to the entry stored at the referenced
    /// position, with the cursor restored afterwards.
    pub fn read_from(cursor: &WzCursor, version_hash: u32, depth: usize) -> Result<Option<Self>, Error> {
        let tag_pos = cursor.pos();
        let tag = cursor.read_u8()?;

        match tag {
            ENTRY_TAG_IGNORE => {
                cursor.skip(10);
                Ok(None)
            }
            ENTRY_TAG_REFERENCE => {
                if depth >= MAX_REFERENCE_DEPTH {
                    return Err(Error::ReferenceChainTooDeep(tag_pos));
                }
                let relative = cursor.read_i32()?;
                let target = cursor.body_offset().wrapping_add_signed(relative as isize);

                cursor.at_position(target, |cursor| {
                    Self::read_from(cursor, version_hash, depth + 1)
                })
            }
            ENTRY_TAG_DIR | ENTRY_TAG_FILE => {
                let kind = if tag == ENTRY_TAG_DIR {
                    WzEntryKind::Dir
                } else {
                    WzEntryKind::File
                };

                let name = cursor.read_wz_string_block()?;
                let file_size = cursor.read_wz_int()?;
                let checksum = cursor.read_wz_int()?;
                let data_offset = cursor.read_wz_offset(version_hash)?;

                Ok(Some(WzDirEntry {
                    kind,
                    name,
                    file_size,
                    checksum,
                    data_offset,
                }))
            }
            _ => Err(Error::UnknownEntryType {
                tag,
                offset: tag_pos,
            }),
        }
    }
}

/// An ordered run of directory entries. The walker decodes one level;
/// subdirectory payloads are read by seeking to their `data_offset` and
/// reading again.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WzDirectory {
    pub entries: Vec<WzDirEntry>,
}

impl WzDirectory {
    pub fn read_from(cursor: &WzCursor, version_hash: u32) -> Result<Self, Error> {
        let count_pos = cursor.pos();
        let entry_count = cursor.read_wz_int()?;

        if entry_count < 0 {
            return Err(Error::DecryptionFailure {
                value: entry_count as i64,
                offset: count_pos,
            });
        }

        let mut entries = Vec::with_capacity(entry_count as usize);

        for _ in 0..entry_count {
            let entry_pos = cursor.pos();
            let Some(entry) = WzDirEntry::read_from(cursor, version_hash, 0)? else {
                continue;
            };

            // a data offset past the end of the archive means the hash or
            // the key stream is wrong
            if entry.data_offset as usize >= cursor.len() {
                return Err(Error::DecryptionFailure {
                    value: entry.data_offset as i64,
                    offset: entry_pos,
                });
            }

            entries.push(entry);
        }

        Ok(WzDirectory { entries })
    }
}
