/// Hash of a decimal patch version string, seeds offset decryption.
pub fn version_hash(version: &str) -> u32 {
    version.chars().fold(0u32, |hash, ch| {
        hash.wrapping_mul(32).wrapping_add(ch as u32).wrapping_add(1)
    })
}

/// The obfuscated form an old-dialect archive stores in its 2-byte
/// version header: complement of the XOR of the hash bytes.
pub fn obfuscate_version_hash(hash: u32) -> u16 {
    let [b0, b1, b2, b3] = hash.to_le_bytes();
    u16::from(!(b0 ^ b1 ^ b2 ^ b3))
}

/// Whether a decrypted string looks like a real WZ entry name. Used to
/// validate brute-force candidates: a wrong key stream turns names into
/// byte soup that fails the character class.
pub fn is_valid_wz_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 100 {
        return false;
    }

    let mut has_letter = false;
    for ch in name.chars() {
        match ch {
            'A'..='Z' | 'a'..='z' => has_letter = true,
            '0'..='9' | '_' | '.' | '-' => {}
            _ => return false,
        }
    }

    has_letter
}

/// Archives without a version header come from 64-bit clients, which only
/// ever shipped encryption versions 770-779.
const NO_HEADER_RANGES: &[(i32, i32)] = &[(770, 779)];
/// Old-dialect patch version ranges, ordered by likelihood.
const HEADER_RANGES: &[(i32, i32)] = &[(200, 300), (100, 199), (80, 99), (1, 79)];

/// Iterator over brute-force candidate versions for a format dialect.
#[derive(Debug)]
pub struct VersionCandidates {
    ranges: &'static [(i32, i32)],
    current: Option<i32>,
}

impl VersionCandidates {
    pub fn new(has_version_header: bool) -> Self {
        Self {
            ranges: if has_version_header {
                HEADER_RANGES
            } else {
                NO_HEADER_RANGES
            },
            current: None,
        }
    }
}

impl Iterator for VersionCandidates {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        loop {
            let (start, end) = *self.ranges.first()?;
            let next = match self.current {
                None => start,
                Some(version) if version < end => version + 1,
                Some(_) => {
                    self.ranges = &self.ranges[1..];
                    self.current = None;
                    continue;
                }
            };
            self.current = Some(next);
            return Some(next);
        }
    }
}
