//! Hash primitives used by the standard security handler (specification
//! §4.4): MD5 for R2-R4 key derivation, SHA-256/384/512 plus the R6
//! "hardened hash" (ISO 32000-2 Algorithm 2.B) for R5/R6.

use md5::{Digest as Md5Digest, Md5};
use sha2::{Digest, Sha256, Sha384, Sha512};

pub fn md5(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// ISO 32000-2 Algorithm 2.B: repeatedly AES-128-CBC-encrypt
/// `password + extra` under a rolling key/IV derived from the running hash,
/// switching between SHA-256/384/512 based on the remainder of the sum of
/// the first 16 bytes of each round's ciphertext, until round 64 is
/// reached and the last byte of the last round's output is small enough.
pub fn harden_hash(password: &[u8], salt: &[u8], extra: &[u8]) -> Vec<u8> {
    let mut k = sha256(&concat3(password, salt, extra));
    let mut round = 0u32;
    loop {
        let mut k1 = Vec::with_capacity((password.len() + k.len() + extra.len()) * 64);
        for _ in 0..64 {
            k1.extend_from_slice(password);
            k1.extend_from_slice(&k);
            k1.extend_from_slice(extra);
        }

        let key = &k[0..16];
        let iv = &k[16..32];
        let e = aes_cbc_encrypt_no_padding(key, iv, &k1);

        let sum: u32 = e[0..16].iter().map(|&b| b as u32).sum();
        k = match sum % 3 {
            0 => sha256(&e),
            1 => sha384(&e),
            _ => sha512(&e),
        };

        round += 1;
        if round >= 64 && *e.last().unwrap_or(&0) as u32 <= round - 32 {
            break;
        }
    }
    k.truncate(32);
    k
}

fn sha384(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha384::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

fn sha512(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha512::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

fn concat3(a: &[u8], b: &[u8], c: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(a.len() + b.len() + c.len());
    out.extend_from_slice(a);
    out.extend_from_slice(b);
    out.extend_from_slice(c);
    out
}

fn aes_cbc_encrypt_no_padding(key: &[u8], iv: &[u8], data: &[u8]) -> Vec<u8> {
    use aes::cipher::{BlockEncryptMut, KeyIvInit};
    type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
    let mut cipher = Aes128CbcEnc::new_from_slices(key, iv).expect("fixed 16-byte key and IV");
    // Algorithm 2.B's input is always a multiple of the AES block size
    // (64 repetitions of a fixed-length block), so no padding is needed.
    let mut buf = data.to_vec();
    let blocks = buf.len() / 16;
    cipher
        .encrypt_padded_mut::<cipher::block_padding::NoPadding>(&mut buf, blocks * 16)
        .expect("input length is a multiple of the block size")
        .to_vec()
}
