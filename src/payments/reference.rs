use uuid::Uuid;

/// Gateway limit on `reference_marchand`
pub const MAX_REFERENCE_LEN: usize = 13;

const PREFIX: &str = "BP";
const RANDOM_LEN: usize = MAX_REFERENCE_LEN - PREFIX.len();
const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// New merchant reference: `BP` followed by 11 base-36 characters taken from a
/// v4 UUID (about 56 bits of randomness). The store's unique index is the
/// final arbiter.
pub fn generate_merchant_reference() -> String {
    let mut value = Uuid::new_v4().as_u128();
    let mut reference = String::with_capacity(MAX_REFERENCE_LEN);
    reference.push_str(PREFIX);

    for _ in 0..RANDOM_LEN {
        reference.push(ALPHABET[(value % 36) as usize] as char);
        value /= 36;
    }

    reference
}

/// Shape accepted on inbound callbacks and status lookups
pub fn is_valid_reference(reference: &str) -> bool {
    !reference.is_empty()
        && reference.len() <= MAX_REFERENCE_LEN
        && reference.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_reference_shape() {
        let reference = generate_merchant_reference();
        assert_eq!(reference.len(), MAX_REFERENCE_LEN);
        assert!(reference.starts_with("BP"));
        assert!(is_valid_reference(&reference));
    }

    #[test]
    fn ten_thousand_references_are_unique() {
        let references: HashSet<String> =
            (0..10_000).map(|_| generate_merchant_reference()).collect();
        assert_eq!(references.len(), 10_000);
    }

    #[test]
    fn reference_validation() {
        assert!(is_valid_reference("BP12345"));
        assert!(!is_valid_reference(""));
        assert!(!is_valid_reference("BP12345678901234"));
        assert!(!is_valid_reference("BP 1"));
    }
}
