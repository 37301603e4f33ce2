//! RC4 stream cipher, used by the V2 crypt filter and R2-R4 key schedules
//! (specification §4.4). Grounded on `connorskees-pdf`'s encryption module,
//! which reaches for the same `rc4` crate.

use rc4::{KeyInit, Rc4, StreamCipher};

pub fn decrypt(key: &[u8], data: &[u8]) -> Vec<u8> {
    // PDF keys vary from 5 to 16 bytes depending on /Length; `new_from_slice`
    // accepts any key size the `rc4` crate supports rather than requiring a
    // fixed `GenericArray` width.
    let mut cipher = Rc4::new_from_slice(key).expect("PDF RC4 keys are within the supported range");
    let mut out = data.to_vec();
    cipher.apply_keystream(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// RC4 is an involution for a fixed key/position: encrypting is the
    /// same operation as decrypting.
    #[test]
    fn decrypt_is_its_own_inverse() {
        let key = b"a pdf file key..";
        let plaintext = b"BT /F1 12 Tf 0 0 Td (Secret) Tj ET".to_vec();
        let ciphertext = decrypt(key, &plaintext);
        assert_ne!(ciphertext, plaintext);
        let round_tripped = decrypt(key, &ciphertext);
        assert_eq!(round_tripped, plaintext);
    }

    #[test]
    fn known_test_vector() {
        // RC4 test vector from RFC 6229 (key "Key", plaintext "Plaintext").
        let key = b"Key";
        let plaintext = b"Plaintext";
        let expected = [0xBBu8, 0xF3, 0x16, 0xE8, 0xD9, 0x40, 0xAF, 0x0A, 0xD3];
        assert_eq!(decrypt(key, plaintext), expected);
    }
}
