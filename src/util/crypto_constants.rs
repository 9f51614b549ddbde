/// Constant used in WZ offset decryption.
pub const WZ_OFFSET_CONSTANT: u32 = 0x581C_3F6D;

/// The 128-byte user key shipped with the MapleStory client. Only every
/// 16th byte carries information, see [`trimmed_user_key`].
pub const WZ_USER_KEY: [u8; 128] = [
    0x13, 0x00, 0x00, 0x00, 0x52, 0x00, 0x00, 0x00, 0x2A, 0x00, 0x00, 0x00, 0x5B, 0x00, 0x00, 0x00,
    0x08, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x60, 0x00, 0x00, 0x00,
    0x06, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x43, 0x00, 0x00, 0x00, 0x0F, 0x00, 0x00, 0x00,
    0xB4, 0x00, 0x00, 0x00, 0x4B, 0x00, 0x00, 0x00, 0x35, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00,
    0x1B, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x00, 0x5F, 0x00, 0x00, 0x00, 0x09, 0x00, 0x00, 0x00,
    0x0F, 0x00, 0x00, 0x00, 0x50, 0x00, 0x00, 0x00, 0x0C, 0x00, 0x00, 0x00, 0x1B, 0x00, 0x00, 0x00,
    0x33, 0x00, 0x00, 0x00, 0x55, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x09, 0x00, 0x00, 0x00,
    0x52, 0x00, 0x00, 0x00, 0xDE, 0x00, 0x00, 0x00, 0xC7, 0x00, 0x00, 0x00, 0x1E, 0x00, 0x00, 0x00,
];

pub const WZ_GMS_IV: [u8; 4] = [0x4D, 0x23, 0xC7, 0x2B];
pub const WZ_KMS_IV: [u8; 4] = [0xB9, 0x7D, 0x63, 0xE9];
pub const WZ_SEA_IV: [u8; 4] = [0x2E, 0x23, 0x12, 0x61];
pub const WZ_TMS_IV: [u8; 4] = [0x2E, 0x12, 0x61, 0x9A];
/// BMS and classic clients ship a zero IV, which degenerates the key
/// stream to all zeroes.
pub const WZ_CLASSIC_IV: [u8; 4] = [0; 4];

/// Fold the 128-byte user key down to the 32-byte AES-256 key: bytes at
/// positions 0, 16, .., 112 land at positions 0, 4, .., 28, the rest
/// stays zero.
pub fn trimmed_user_key(user_key: &[u8; 128]) -> [u8; 32] {
    let mut aes_key = [0u8; 32];
    for i in (0..128).step_by(16) {
        aes_key[i / 4] = user_key[i];
    }
    aes_key
}

#[derive(Debug, thiserror::Error)]
#[error("unknown game region: {0}")]
pub struct UnknownRegion(pub String);

/// Game region of a WZ archive, selects the IV seeding the key stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WzRegion {
    Gms,
    Kms,
    Sea,
    Tms,
    Classic,
}

impl WzRegion {
    pub fn iv(self) -> [u8; 4] {
        match self {
            WzRegion::Gms => WZ_GMS_IV,
            WzRegion::Kms => WZ_KMS_IV,
            WzRegion::Sea => WZ_SEA_IV,
            WzRegion::Tms => WZ_TMS_IV,
            WzRegion::Classic => WZ_CLASSIC_IV,
        }
    }
    pub fn as_str(self) -> &'static str {
        match self {
            WzRegion::Gms => "gms",
            WzRegion::Kms => "kms",
            WzRegion::Sea => "sea",
            WzRegion::Tms => "tms",
            WzRegion::Classic => "classic",
        }
    }
}

impl std::str::FromStr for WzRegion {
    type Err = UnknownRegion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gms" => Ok(WzRegion::Gms),
            "kms" => Ok(WzRegion::Kms),
            "sea" => Ok(WzRegion::Sea),
            "tms" => Ok(WzRegion::Tms),
            "classic" | "bms" => Ok(WzRegion::Classic),
            _ => Err(UnknownRegion(s.to_string())),
        }
    }
}

impl std::fmt::Display for WzRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
