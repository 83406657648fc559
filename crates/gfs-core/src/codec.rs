//! C2 — block codec: encrypt (optional) -> base64 -> fingerprint, and its inverse.
//!
//! Design note (carried from the source system, see spec §9): AES-256 is
//! used in ECB mode with zero-byte trailing padding. This is weaker than a
//! mode with authenticated encryption or a random IV, but existing stored
//! data depends on it bit-for-bit. A new deployment should add a mode tag
//! per block and prefer CBC-with-random-IV or GCM; this codec intentionally
//! does not "upgrade" silently.

use aes::Aes256;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ecb::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit};

use crate::error::{Error, Result};
use crate::fingerprint::fingerprint_bytes;

type EcbEnc = ecb::Encryptor<Aes256>;
type EcbDec = ecb::Decryptor<Aes256>;

const AES_BLOCK: usize = 16;
const KEY_LEN: usize = 32;

/// The encoded form of one plaintext block, ready to go over the wire or
/// onto disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlock {
    /// Base64 text of the (optionally encrypted) block bytes.
    pub wire_form: String,
    /// Hex SHA-1 of `wire_form`; the on-disk name and network key.
    pub unique_id: String,
    /// Zero bytes appended before encryption, in `[0, 15]`.
    pub pad_char_count: u8,
    /// Length of the plaintext block before padding/encryption.
    pub origin_block_size: usize,
}

/// Encrypt (if requested), base64-encode, and fingerprint one plaintext block.
pub fn encode_block(plaintext: &[u8], encrypt: bool, key: Option<&[u8]>) -> Result<EncodedBlock> {
    let origin_block_size = plaintext.len();

    let (payload, pad_char_count) = if encrypt {
        let key = key.ok_or(Error::BadKey(0))?;
        if key.len() != KEY_LEN {
            return Err(Error::BadKey(key.len()));
        }
        let pad = (AES_BLOCK - (plaintext.len() % AES_BLOCK)) % AES_BLOCK;
        let mut padded = plaintext.to_vec();
        padded.resize(plaintext.len() + pad, 0u8);

        let mut out = padded.clone();
        let mut enc = EcbEnc::new(key.into());
        for chunk in out.chunks_mut(AES_BLOCK) {
            let block = chunk.into();
            enc.encrypt_block_mut(block);
        }
        (out, pad as u8)
    } else {
        (plaintext.to_vec(), 0u8)
    };

    let wire_form = BASE64.encode(&payload);
    let unique_id = fingerprint_bytes(wire_form.as_bytes());

    Ok(EncodedBlock { wire_form, unique_id, pad_char_count, origin_block_size })
}

/// Invert [`encode_block`]: base64-decode, decrypt if requested, strip
/// padding, and (on the final block of a file) truncate to the recorded
/// plaintext size.
pub fn decode_block(
    wire_form: &str,
    encrypt: bool,
    key: Option<&[u8]>,
    pad_char_count: u8,
    truncate_to: Option<usize>,
) -> Result<Vec<u8>> {
    let mut bytes = BASE64
        .decode(wire_form)
        .map_err(|e| Error::DecodeError(format!("base64: {e}")))?;

    if encrypt {
        let key = key.ok_or(Error::BadKey(0))?;
        if key.len() != KEY_LEN {
            return Err(Error::BadKey(key.len()));
        }
        if bytes.len() % AES_BLOCK != 0 {
            return Err(Error::DecodeError(format!(
                "ciphertext length {} is not a multiple of {AES_BLOCK}",
                bytes.len()
            )));
        }
        let mut dec = EcbDec::new(key.into());
        for chunk in bytes.chunks_mut(AES_BLOCK) {
            let block = chunk.into();
            dec.decrypt_block_mut(block);
        }
        let pad = pad_char_count as usize;
        if pad > bytes.len() {
            return Err(Error::DecodeError("pad_char_count exceeds decoded length".into()));
        }
        bytes.truncate(bytes.len() - pad);
    }

    if let Some(limit) = truncate_to {
        if bytes.len() > limit {
            bytes.truncate(limit);
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_scenario_unencrypted() {
        let enc = encode_block(b"Hello", false, None).unwrap();
        assert_eq!(enc.wire_form, "SGVsbG8=");
        assert_eq!(enc.pad_char_count, 0);
        assert_eq!(enc.unique_id, fingerprint_bytes(b"SGVsbG8="));
        assert_eq!(enc.unique_id.len(), 40);
    }

    #[test]
    fn s4_scenario_encrypted_padding() {
        let key = [0u8; 32];
        let plaintext = vec![0x41u8; 17];
        let enc = encode_block(&plaintext, true, Some(&key)).unwrap();
        assert_eq!(enc.pad_char_count, 15);
        let decoded = decode_block(&enc.wire_form, true, Some(&key), enc.pad_char_count, Some(17))
            .unwrap();
        assert_eq!(decoded.len(), 17);
        assert_eq!(decoded, plaintext);
    }

    #[test]
    fn aligned_block_no_padding() {
        let key = [1u8; 32];
        let plaintext = vec![0x10u8; 32];
        let enc = encode_block(&plaintext, true, Some(&key)).unwrap();
        assert_eq!(enc.pad_char_count, 0);
        let decoded =
            decode_block(&enc.wire_form, true, Some(&key), enc.pad_char_count, None).unwrap();
        assert_eq!(decoded, plaintext);
    }

    #[test]
    fn bad_key_length_rejected() {
        let err = encode_block(b"x", true, Some(&[0u8; 10])).unwrap_err();
        assert!(matches!(err, Error::BadKey(10)));
    }

    #[test]
    fn round_trip_unencrypted_multi_block() {
        let data = vec![0xAAu8; 7_232];
        let enc = encode_block(&data, false, None).unwrap();
        let dec = decode_block(&enc.wire_form, false, None, 0, None).unwrap();
        assert_eq!(dec, data);
    }

    proptest::proptest! {
        #[test]
        fn prop_round_trip_encrypted(len in 0usize..5000, key in proptest::array::uniform32(proptest::num::u8::ANY)) {
            let data = vec![0x5Au8; len];
            let enc = encode_block(&data, true, Some(&key)).unwrap();
            let dec = decode_block(&enc.wire_form, true, Some(&key), enc.pad_char_count, Some(len)).unwrap();
            proptest::prop_assert_eq!(dec, data);
        }

        #[test]
        fn prop_deterministic_addressing(len in 0usize..2000) {
            let data = vec![0x11u8; len];
            let a = encode_block(&data, false, None).unwrap();
            let b = encode_block(&data, false, None).unwrap();
            proptest::prop_assert_eq!(a.unique_id, b.unique_id);
        }
    }
}
