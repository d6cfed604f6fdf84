//! Paul Hsieh's SuperFastHash, used to derive export/mount uuids from paths.
//!
//! Ported bit-for-bit from the original `exports.c`'s use of `SuperFastHash`
//! so that uuid values stay stable for on-disk/rmtab compatibility.

/// 128-bit identifier. Not a real UUID: the low 4 bytes carry a 32-bit hash,
/// the rest are zero, matching the original's "hash, zero-extend" scheme.
pub type Uuid = [u8; 16];

/// The hash value reserved as a collision marker: directories whose hash
/// happens to equal this are rejected for uuid-indexed lookup (but remain
/// reachable by name).
pub const COLLISION_MARKER: u32 = 1;

#[inline]
fn get16(data: &[u8], i: usize) -> u16 {
    u16::from_le_bytes([data[i], data[i + 1]])
}

/// SuperFastHash over an arbitrary byte slice.
pub fn super_fast_hash(data: &[u8]) -> u32 {
    let len = data.len();
    if len == 0 {
        return 0;
    }

    let mut hash: u32 = len as u32;
    let rem = len & 3;
    let mut blocks = len >> 2;
    let mut i = 0usize;

    while blocks > 0 {
        hash = hash.wrapping_add(get16(data, i) as u32);
        let tmp = ((get16(data, i + 2) as u32) << 11) ^ hash;
        hash = (hash.wrapping_shl(16)) ^ tmp;
        i += 4;
        hash = hash.wrapping_add(hash >> 11);
        blocks -= 1;
    }

    match rem {
        3 => {
            hash = hash.wrapping_add(get16(data, i) as u32);
            hash ^= hash.wrapping_shl(16);
            hash ^= (data[i + 2] as u32) << 18;
            hash = hash.wrapping_add(hash >> 11);
        }
        2 => {
            hash = hash.wrapping_add(get16(data, i) as u32);
            hash ^= hash.wrapping_shl(11);
            hash = hash.wrapping_add(hash >> 17);
        }
        1 => {
            hash = hash.wrapping_add(data[i] as u32);
            hash ^= hash.wrapping_shl(10);
            hash = hash.wrapping_add(hash >> 1);
        }
        _ => {}
    }

    hash ^= hash.wrapping_shl(3);
    hash = hash.wrapping_add(hash >> 5);
    hash ^= hash.wrapping_shl(4);
    hash = hash.wrapping_add(hash >> 17);
    hash ^= hash.wrapping_shl(25);
    hash = hash.wrapping_add(hash >> 6);

    hash
}

/// Hashes a directory path the way `exports.c`'s `_exp_file_insert` does:
/// leading `/` characters stripped, hash zero-extended into a 16-byte uuid.
pub fn path_uuid(path: &str) -> Uuid {
    let stripped = path.trim_start_matches('/');
    let h = super_fast_hash(stripped.as_bytes());
    let mut uuid = [0u8; 16];
    uuid[12..16].copy_from_slice(&h.to_be_bytes());
    uuid
}

/// True if `uuid` is the reserved collision marker.
pub fn is_collision_marker(uuid: &Uuid) -> bool {
    let mut marker = [0u8; 16];
    marker[12..16].copy_from_slice(&COLLISION_MARKER.to_be_bytes());
    *uuid == marker
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_hashes_to_zero() {
        assert_eq!(super_fast_hash(b""), 0);
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(super_fast_hash(b"vol0"), super_fast_hash(b"vol0"));
    }

    #[test]
    fn different_paths_usually_hash_differently() {
        assert_ne!(super_fast_hash(b"vol0"), super_fast_hash(b"vol1"));
    }

    #[test]
    fn path_uuid_strips_leading_slashes() {
        assert_eq!(path_uuid("/vol0"), path_uuid("vol0"));
        assert_eq!(path_uuid("///vol0"), path_uuid("vol0"));
    }

    #[test]
    fn collision_marker_round_trips() {
        let mut marker = [0u8; 16];
        marker[12..16].copy_from_slice(&1u32.to_be_bytes());
        assert!(is_collision_marker(&marker));
        assert!(!is_collision_marker(&path_uuid("vol0")));
    }
}
