//! Random identifier generation for jobs.

use rand::RngCore;

/// A 32-character lowercase hex id from 16 random bytes.
///
/// Collision probability is negligible at the volumes a single deployment
/// sees; ids are unique per store insert regardless.
pub fn new_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_32_hex_chars() {
        let id = new_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn consecutive_ids_differ() {
        assert_ne!(new_id(), new_id());
    }
}
