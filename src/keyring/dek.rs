//! DEK (data-encryption-key) material generation.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

/// Byte length of generated DEK material (128 bits).
pub const DEK_LEN: usize = 16;

/// Generate fresh DEK material: [`DEK_LEN`] bytes from the OS CSPRNG,
/// base64-encoded so it can travel as text through the key-management
/// service and into a session variable.
///
/// The returned buffer is zeroized on drop; callers should hand it to the
/// key-management service for encryption and let it go out of scope.
pub fn generate_dek() -> Zeroizing<String> {
    let mut bytes = Zeroizing::new([0u8; DEK_LEN]);
    OsRng.fill_bytes(&mut *bytes);
    Zeroizing::new(STANDARD.encode(&*bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_dek_len_bytes() {
        let dek = generate_dek();
        let decoded = STANDARD.decode(dek.as_bytes()).unwrap();
        assert_eq!(decoded.len(), DEK_LEN);
    }

    #[test]
    fn consecutive_deks_differ() {
        // Collision probability over 128 random bits is negligible.
        let a = generate_dek();
        let b = generate_dek();
        assert_ne!(*a, *b);
    }

    #[test]
    fn dek_is_printable_text() {
        let dek = generate_dek();
        assert!(dek.chars().all(|c| c.is_ascii_graphic()));
    }
}
