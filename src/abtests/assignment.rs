use sha2::{Digest, Sha256};

use super::config::{AbTest, Variant};

/// Bucket index in `0..variant_count` for a contact.
///
/// Uses the first eight bytes of SHA-256 over `"<test_id>:<contact_id>"`,
/// so a contact always sees the same variant of a given test.
pub fn bucket(test_id: &str, contact_id: &str, variant_count: usize) -> usize {
    if variant_count == 0 {
        return 0;
    }
    let digest = Sha256::digest(format!("{test_id}:{contact_id}").as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % variant_count as u64) as usize
}

/// Variant a contact is shown. A promoted test always serves its winner.
pub fn assign_variant<'a>(test: &'a AbTest, contact_id: &str) -> Option<&'a Variant> {
    if let Some(ref winner) = test.winner {
        return test.variant(winner);
    }
    test.variants
        .get(bucket(&test.id, contact_id, test.variants.len()))
}
