//! AES-CBC decryption for the AESV2 (128-bit) and AESV3 (256-bit) crypt
//! filters (specification §4.4). The first 16 bytes of the ciphertext are
//! the IV, as both filters specify. Grounded on `connorskees-pdf`'s
//! encryption module, which drives the same `aes`/`cbc` pairing.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};

use crate::error::{Error, Result};

pub fn decrypt_cbc(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 16 {
        return Err(Error::InvalidPadding);
    }
    let (iv, ciphertext) = data.split_at(16);
    let mut buf = ciphertext.to_vec();

    let plain_len = match key.len() {
        16 => {
            type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
            let cipher = Aes128CbcDec::new_from_slices(key, iv).map_err(|_| Error::InvalidPadding)?;
            cipher
                .decrypt_padded_mut::<Pkcs7>(&mut buf)
                .map_err(|_| Error::InvalidPadding)?
                .len()
        }
        32 => {
            type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
            let cipher = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| Error::InvalidPadding)?;
            cipher
                .decrypt_padded_mut::<Pkcs7>(&mut buf)
                .map_err(|_| Error::InvalidPadding)?
                .len()
        }
        other => return Err(Error::EncryptionUnsupported { v: other as u8, r: 0 }),
    };
    buf.truncate(plain_len);
    Ok(buf)
}

/// AES-256-ECB, no padding: used only to decrypt the 16-byte `/Perms`
/// entry (ISO 32000-2 §7.6.4.3.4) — a single block, so there is no
/// chaining to get right.
pub fn decrypt_ecb_no_padding(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    use aes::cipher::{BlockDecrypt, KeyInit};
    if data.len() != 16 {
        return Err(Error::InvalidPadding);
    }
    let cipher = aes::Aes256::new_from_slice(key).map_err(|_| Error::InvalidPadding)?;
    let mut block = aes::cipher::generic_array::GenericArray::clone_from_slice(data);
    cipher.decrypt_block(&mut block);
    Ok(block.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockEncryptMut;

    /// Scenario 5: 64 KiB of random-ish bytes round-trip through
    /// AES-256-CBC/PKCS7 with an IV prepended, exactly as `decrypt_cbc`
    /// expects to receive them from a `/AESV3` crypt filter.
    #[test]
    fn aes_256_cbc_round_trips_64kb() {
        let key = [0x5au8; 32];
        let iv = [0x11u8; 16];
        let mut plaintext = Vec::with_capacity(65536);
        let mut state: u32 = 0x2545F491;
        for _ in 0..65536 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            plaintext.push((state & 0xff) as u8);
        }

        type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
        let encryptor = Aes256CbcEnc::new_from_slices(&key, &iv).unwrap();
        let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(&plaintext);

        let mut framed = iv.to_vec();
        framed.extend_from_slice(&ciphertext);
        let decrypted = decrypt_cbc(&key, &framed).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn aes_128_cbc_round_trips() {
        let key = [0x7bu8; 16];
        let iv = [0x22u8; 16];
        let plaintext = b"a sixty-three byte message, not a multiple of the block size!".to_vec();

        type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
        let encryptor = Aes128CbcEnc::new_from_slices(&key, &iv).unwrap();
        let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(&plaintext);

        let mut framed = iv.to_vec();
        framed.extend_from_slice(&ciphertext);
        let decrypted = decrypt_cbc(&key, &framed).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn decrypt_cbc_rejects_data_shorter_than_one_iv() {
        let err = decrypt_cbc(&[0u8; 16], &[0u8; 8]).unwrap_err();
        assert!(matches!(err, Error::InvalidPadding));
    }
}
