use scroll::{Pread, LE};
use std::cell::Cell;
use std::ops::Range;
use std::sync::{Arc, RwLock};

use crate::header::{self, WzHeader};
use crate::util::crypto_constants::WZ_OFFSET_CONSTANT;
use crate::util::WzKeyStream;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unexpected end of stream at {0}")]
    ShortRead(usize),
    #[error("malformed compressed int at {0}")]
    BadCompressedInt(usize),
    #[error("unknown string indicator {indicator:#04X} at {offset}")]
    BadStringIndicator { indicator: u8, offset: usize },
    #[error("negative string length {length} at {offset}")]
    BadStringLength { length: i32, offset: usize },
}

type Result<T> = std::result::Result<T, Error>;

pub type SharedKeyStream = Arc<RwLock<WzKeyStream>>;

/// Owner of the archive bytes, usually a `memmap2::Mmap`. Reading happens
/// through cursors handed out by [`WzReader::cursor`]; the reader itself
/// only carries the map and the key stream shared by every cursor.
#[derive(Debug)]
pub struct WzReader<T: AsRef<[u8]>> {
    map: T,
    iv: [u8; 4],
    key: SharedKeyStream,
}

impl<T: AsRef<[u8]>> WzReader<T> {
    pub fn new(map: T) -> Self {
        Self {
            map,
            iv: [0; 4],
            key: Arc::new(RwLock::new(WzKeyStream::new([0; 4]))),
        }
    }

    pub fn with_iv(self, iv: [u8; 4]) -> Self {
        Self {
            iv,
            key: Arc::new(RwLock::new(WzKeyStream::new(iv))),
            ..self
        }
    }

    pub fn iv(&self) -> [u8; 4] {
        self.iv
    }
    pub fn buf(&self) -> &[u8] {
        self.map.as_ref()
    }
    pub fn len(&self) -> usize {
        self.map.as_ref().len()
    }
    pub fn is_empty(&self) -> bool {
        self.map.as_ref().is_empty()
    }

    pub fn read_header(&self) -> std::result::Result<WzHeader, header::Error> {
        WzHeader::read_from(self.map.as_ref())
    }

    /// A cursor over the whole map, offset arithmetic anchored at
    /// `body_offset`.
    pub fn cursor(&self, body_offset: usize) -> WzCursor<'_> {
        WzCursor {
            buf: self.map.as_ref(),
            pos: Cell::new(0),
            body_offset,
            key: Arc::clone(&self.key),
        }
    }
}

/// A seekable little-endian view of the archive. The position lives in a
/// `Cell` so decoding can thread one cursor through nested reads without
/// handing out mutable borrows.
#[derive(Debug, Clone)]
pub struct WzCursor<'a> {
    buf: &'a [u8],
    pos: Cell<usize>,
    body_offset: usize,
    key: SharedKeyStream,
}

impl<'a> WzCursor<'a> {
    pub fn pos(&self) -> usize {
        self.pos.get()
    }
    pub fn len(&self) -> usize {
        self.buf.len()
    }
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
    pub fn body_offset(&self) -> usize {
        self.body_offset
    }
    pub fn available(&self) -> usize {
        self.buf.len().saturating_sub(self.pos.get())
    }

    pub fn seek(&self, pos: usize) {
        self.pos.set(pos);
    }
    pub fn skip(&self, len: usize) {
        self.pos.set(self.pos.get() + len);
    }

    /// Run `f` with the cursor moved to `pos`, restoring the previous
    /// position on every exit path.
    pub fn at_position<R>(&self, pos: usize, f: impl FnOnce(&Self) -> R) -> R {
        let saved = self.pos.get();
        self.pos.set(pos);
        let result = f(self);
        self.pos.set(saved);
        result
    }

    #[inline]
    pub fn read_u8(&self) -> Result<u8> {
        let pos = self.pos.get();
        let value = self
            .buf
            .pread_with::<u8>(pos, LE)
            .map_err(|_| Error::ShortRead(pos))?;
        self.pos.set(pos + 1);
        Ok(value)
    }
    #[inline]
    pub fn read_u16(&self) -> Result<u16> {
        let pos = self.pos.get();
        let value = self
            .buf
            .pread_with::<u16>(pos, LE)
            .map_err(|_| Error::ShortRead(pos))?;
        self.pos.set(pos + 2);
        Ok(value)
    }
    #[inline]
    pub fn read_u32(&self) -> Result<u32> {
        let pos = self.pos.get();
        let value = self
            .buf
            .pread_with::<u32>(pos, LE)
            .map_err(|_| Error::ShortRead(pos))?;
        self.pos.set(pos + 4);
        Ok(value)
    }
    #[inline]
    pub fn read_u64(&self) -> Result<u64> {
        let pos = self.pos.get();
        let value = self
            .buf
            .pread_with::<u64>(pos, LE)
            .map_err(|_| Error::ShortRead(pos))?;
        self.pos.set(pos + 8);
        Ok(value)
    }
    #[inline]
    pub fn read_i8(&self) -> Result<i8> {
        let pos = self.pos.get();
        let value = self
            .buf
            .pread_with::<i8>(pos, LE)
            .map_err(|_| Error::ShortRead(pos))?;
        self.pos.set(pos + 1);
        Ok(value)
    }
    #[inline]
    pub fn read_i32(&self) -> Result<i32> {
        let pos = self.pos.get();
        let value = self
            .buf
            .pread_with::<i32>(pos, LE)
            .map_err(|_| Error::ShortRead(pos))?;
        self.pos.set(pos + 4);
        Ok(value)
    }
    #[inline]
    pub fn read_i64(&self) -> Result<i64> {
        let pos = self.pos.get();
        let value = self
            .buf
            .pread_with::<i64>(pos, LE)
            .map_err(|_| Error::ShortRead(pos))?;
        self.pos.set(pos + 8);
        Ok(value)
    }

    /// WZ compressed int32: one i8, or an i8 of -128 followed by a full
    /// little-endian i32.
    pub fn read_wz_int(&self) -> Result<i32> {
        let start = self.pos.get();
        let small = self.read_i8()?;

        if small == i8::MIN {
            return self.read_i32().map_err(|_| Error::BadCompressedInt(start));
        }

        Ok(small as i32)
    }

    /// The 64-bit widening of the compressed int, used by long property
    /// values.
    pub fn read_wz_long(&self) -> Result<i64> {
        let start = self.pos.get();
        let small = self.read_i8()?;

        if small == i8::MIN {
            return self.read_i64().map_err(|_| Error::BadCompressedInt(start));
        }

        Ok(small as i64)
    }

    /// An encrypted string: an i8 length indicator classifying the payload
    /// as empty, UTF-16LE (positive) or ASCII (negative), with 127 / -128
    /// escaping to a 4-byte length.
    pub fn read_wz_string(&self) -> Result<String> {
        let indicator = self.read_i8()?;

        match indicator {
            0 => Ok(String::new()),
            1..=126 => self.read_unicode_chars(indicator as usize),
            127 => {
                let len = self.read_string_len()?;
                self.read_unicode_chars(len)
            }
            -127..=-1 => self.read_ascii_chars(-(indicator as i32) as usize),
            -128 => {
                let len = self.read_string_len()?;
                self.read_ascii_chars(len)
            }
        }
    }

    /// A string stored inline (0x00 / 0x73) or at an absolute offset
    /// elsewhere in the archive (0x01 / 0x1B).
    pub fn read_wz_string_block(&self) -> Result<String> {
        let indicator_pos = self.pos.get();
        let indicator = self.read_u8()?;

        match indicator {
            0x00 | 0x73 => self.read_wz_string(),
            0x01 | 0x1B => {
                let offset = self.read_i32()?;
                self.at_position(offset as usize, |cursor| cursor.read_wz_string())
            }
            _ => Err(Error::BadStringIndicator {
                indicator,
                offset: indicator_pos,
            }),
        }
    }

    /// An encrypted 4-byte offset; the decryption mixes the position the
    /// value was read from, so grab it before consuming the bytes.
    pub fn read_wz_offset(&self, version_hash: u32) -> Result<u32> {
        let pos = self.pos.get() as u32;
        let encrypted = self.read_u32()?;

        Ok(decrypt_offset(
            pos,
            self.body_offset as u32,
            version_hash,
            encrypted,
        ))
    }

    fn read_string_len(&self) -> Result<usize> {
        let pos = self.pos.get();
        let len = self.read_i32()?;
        if len < 0 {
            return Err(Error::BadStringLength {
                length: len,
                offset: pos,
            });
        }
        Ok(len as usize)
    }

    fn read_ascii_chars(&self, len: usize) -> Result<String> {
        let mut data = self.decrypt_range(self.pos.get()..self.pos.get() + len)?;
        self.skip(len);

        data.iter_mut().enumerate().for_each(|(i, byte)| {
            *byte ^= (i as u8).wrapping_add(0xAA);
        });

        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    fn read_unicode_chars(&self, len: usize) -> Result<String> {
        let data = self.decrypt_range(self.pos.get()..self.pos.get() + len * 2)?;
        self.skip(len * 2);

        let units: Vec<u16> = data
            .chunks_exact(2)
            .enumerate()
            .map(|(i, chunk)| {
                u16::from_le_bytes([chunk[0], chunk[1]]) ^ (i as u16).wrapping_add(0xAAAA)
            })
            .collect();

        Ok(String::from_utf16_lossy(&units))
    }

    /// Copy `range` out of the buffer with the key stream applied. The
    /// rolling string mask is the caller's business.
    fn decrypt_range(&self, range: Range<usize>) -> Result<Vec<u8>> {
        if range.end > self.buf.len() {
            return Err(Error::ShortRead(range.start));
        }

        let len = range.len();
        let mut data = self.buf[range].to_vec();

        let needs_expand = !self.key.read().unwrap().is_ready(len);
        if needs_expand {
            self.key.write().unwrap().expand_to(len);
        }
        self.key.read().unwrap().decrypt_slice(&mut data);

        Ok(data)
    }
}

/// Decrypt a 4-byte offset value read at `pos`. All arithmetic is
/// wrapping u32, matching the client.
pub fn decrypt_offset(pos: u32, body_offset: u32, version_hash: u32, encrypted: u32) -> u32 {
    let mut offset = pos.wrapping_sub(body_offset) ^ 0xFFFF_FFFF;
    offset = offset.wrapping_mul(version_hash);
    offset = offset.wrapping_sub(WZ_OFFSET_CONSTANT);
    offset = offset.rotate_left(offset & 0x1F);
    offset ^= encrypted;
    offset.wrapping_add(body_offset.wrapping_mul(2))
}

/// Inverse of [`decrypt_offset`]: the 4-byte value to store at `pos` so
/// it decrypts to the absolute offset `target`.
pub fn encrypt_offset(pos: u32, body_offset: u32, version_hash: u32, target: u32) -> u32 {
    let mut offset = pos.wrapping_sub(body_offset) ^ 0xFFFF_FFFF;
    offset = offset.wrapping_mul(version_hash);
    offset = offset.wrapping_sub(WZ_OFFSET_CONSTANT);
    offset = offset.rotate_left(offset & 0x1F);
    offset ^ target.wrapping_sub(body_offset.wrapping_mul(2))
}

/// Payload classification of a WZ string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WzStringKind {
    Empty,
    Ascii,
    Unicode,
}

/// Encode `text` as a WZ string, length indicator included. This is the
/// write-side mirror of [`WzCursor::read_wz_string`], mainly useful for
/// building fixtures.
pub fn encrypt_wz_string(key: &mut WzKeyStream, text: &str, kind: WzStringKind) -> Vec<u8> {
    match kind {
        WzStringKind::Empty => vec![0],
        WzStringKind::Ascii => {
            let bytes = text.as_bytes();
            let mut out = Vec::with_capacity(bytes.len() + 5);

            if bytes.len() <= 127 {
                out.push((-(bytes.len() as i32)) as i8 as u8);
            } else {
                out.push(i8::MIN as u8);
                out.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
            }

            key.expand_to(bytes.len());
            for (i, byte) in bytes.iter().enumerate() {
                out.push(byte ^ (i as u8).wrapping_add(0xAA) ^ key.byte_at(i));
            }
            out
        }
        WzStringKind::Unicode => {
            let units: Vec<u16> = text.encode_utf16().collect();
            let mut out = Vec::with_capacity(units.len() * 2 + 5);

            if units.len() <= 126 {
                out.push(units.len() as u8);
            } else {
                out.push(127);
                out.extend_from_slice(&(units.len() as i32).to_le_bytes());
            }

            key.expand_to(units.len() * 2);
            for (i, unit) in units.iter().enumerate() {
                let key_word =
                    u16::from_le_bytes([key.byte_at(i * 2), key.byte_at(i * 2 + 1)]);
                let encrypted = *unit ^ (i as u16).wrapping_add(0xAAAA) ^ key_word;
                out.extend_from_slice(&encrypted.to_le_bytes());
            }
            out
        }
    }
}
