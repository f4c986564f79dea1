//! The byte-stream layer underneath datafiles.
//!
//! A datafile on disk is a 4-byte pack magic followed by a payload. The
//! magic says whether the payload is zlib-compressed as a whole and is
//! itself masked with a value derived from the password. The payload is
//! XOR-masked with the password bytes. Inside the payload, object bodies
//! live in length-delimited chunks that may be compressed individually.
//!
//! The password masking is the legacy Allegro scheme, kept so archives stay
//! readable. It is not encryption.

use deku::{DekuRead, DekuWrite};
use miniz_oxide::deflate::compress_to_vec_zlib;
use miniz_oxide::inflate::decompress_to_vec_zlib_with_limit;

use crate::error::Error;

pub mod reader;
pub mod writer;

/// Pack magic for a payload stored as-is.
pub const NOPACK_MAGIC: u32 = 0x736C682E;
/// Pack magic for a payload compressed as a whole.
pub const PACK_MAGIC: u32 = 0x736C6821;

const COMPRESSION_LEVEL: u8 = 6;

/// Upper bound on how far deflate can expand its input.
const MAX_INFLATE_RATIO: usize = 1032;

/// Precedes every chunk. A negative `data_size` marks a compressed chunk
/// whose inflated length is `-data_size`.
#[derive(DekuRead, DekuWrite, Debug, Clone, PartialEq, Eq)]
#[deku(endian = "big")]
pub struct ChunkHeader {
    pub disk_size: u32,
    pub data_size: i32,
}

impl ChunkHeader {
    pub const SIZE: usize = 8;

    pub fn is_compressed(&self) -> bool {
        self.data_size < 0
    }

    pub fn inflated_size(&self) -> usize {
        self.data_size.unsigned_abs() as usize
    }
}

/// One object property as stored in front of the object it belongs to.
#[derive(DekuRead, DekuWrite, Debug, Clone, PartialEq, Eq)]
#[deku(magic = b"prop", endian = "big")]
pub struct PropertyRecord {
    pub tag: u32,
    pub length: u32,
    #[deku(count = "length")]
    pub value: Vec<u8>,
}

impl PropertyRecord {
    pub fn new(tag: u32, value: &[u8]) -> Self {
        PropertyRecord {
            tag,
            length: value.len() as u32,
            value: value.to_vec(),
        }
    }
}

/// Folds the password into the 32-bit mask applied to the pack magic. An
/// empty password leaves the magic unchanged.
pub fn encrypt_id(id: u32, password: &[u8]) -> u32 {
    if password.is_empty() {
        return id;
    }

    let mut mask = 0u32;
    for (i, &c) in password.iter().enumerate() {
        mask ^= (c as u32) << ((i & 3) * 8);
    }

    let mut pos = 0;
    for i in 0..4 {
        mask ^= (password[pos] as u32) << (24 - i * 8);
        pos = (pos + 1) % password.len();
    }

    id ^ mask ^ 42
}

/// XORs `data` with the password repeated end to end. Applying it twice
/// restores the input.
pub fn mask(data: &mut [u8], password: &[u8]) {
    if password.is_empty() {
        return;
    }
    for (byte, key) in data.iter_mut().zip(password.iter().cycle()) {
        *byte ^= key;
    }
}

pub fn compress(data: &[u8]) -> Vec<u8> {
    compress_to_vec_zlib(data, COMPRESSION_LEVEL)
}

pub fn decompress(data: &[u8], expected: usize) -> Result<Vec<u8>, Error> {
    // Inflation stops one byte past the size the header promised.
    let limit = expected.saturating_add(1);
    let out = decompress_to_vec_zlib_with_limit(data, limit).map_err(Error::ZlibError)?;
    if out.len() != expected {
        return Err(Error::SizeMismatch {
            expected,
            actual: out.len(),
        });
    }
    Ok(out)
}

/// Wraps a payload into the on-disk file image.
pub fn seal(payload: &[u8], packed: bool, password: &[u8]) -> Vec<u8> {
    let magic = if packed { PACK_MAGIC } else { NOPACK_MAGIC };
    let mut body = if packed {
        compress(payload)
    } else {
        payload.to_vec()
    };
    mask(&mut body, password);

    let mut out = Vec::with_capacity(body.len() + 4);
    out.extend_from_slice(&encrypt_id(magic, password).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

/// Recovers the payload from a file image. A wrong password shows up as a
/// bad magic number.
pub fn unseal(image: &[u8], password: &[u8]) -> Result<Vec<u8>, Error> {
    if image.len() < 4 {
        return Err(Error::Truncated {
            needed: 4,
            available: image.len(),
        });
    }
    let raw = u32::from_be_bytes([image[0], image[1], image[2], image[3]]);
    let magic = encrypt_id(raw, password);

    let mut body = image[4..].to_vec();
    mask(&mut body, password);

    match magic {
        NOPACK_MAGIC => Ok(body),
        PACK_MAGIC => {
            let limit = body.len().saturating_mul(MAX_INFLATE_RATIO);
            decompress_to_vec_zlib_with_limit(&body, limit).map_err(Error::ZlibError)
        }
        other => Err(Error::BadMagic(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_id_is_an_involution() {
        let id = encrypt_id(PACK_MAGIC, b"secret");
        assert_ne!(id, PACK_MAGIC);
        assert_eq!(encrypt_id(id, b"secret"), PACK_MAGIC);
        assert_eq!(encrypt_id(PACK_MAGIC, b""), PACK_MAGIC);
    }

    #[test]
    fn test_mask_cycles_password() {
        let mut data = vec![0u8; 5];
        mask(&mut data, b"ab");
        assert_eq!(data, b"ababa");
        mask(&mut data, b"ab");
        assert_eq!(data, vec![0u8; 5]);
    }

    #[test]
    fn test_seal_unseal() {
        let payload = b"ALL.some payload some payload some payload".to_vec();
        for packed in [false, true] {
            for password in [&b""[..], &b"hunter2"[..]] {
                let image = seal(&payload, packed, password);
                assert_eq!(unseal(&image, password).unwrap(), payload);
            }
        }
    }

    #[test]
    fn test_wrong_password_is_bad_magic() {
        let image = seal(b"ALL.", false, b"right");
        assert!(matches!(unseal(&image, b"wrong"), Err(Error::BadMagic(_))));
        assert!(matches!(unseal(&image, b""), Err(Error::BadMagic(_))));
    }

    #[test]
    fn test_decompress_stops_at_expected_size() {
        let packed = compress(&[7u8; 4096]);
        assert!(matches!(decompress(&packed, 16), Err(Error::ZlibError(_))));
        assert!(matches!(
            decompress(&packed, 8192),
            Err(Error::SizeMismatch { expected: 8192, actual: 4096 })
        ));
        assert_eq!(decompress(&packed, 4096).unwrap().len(), 4096);
    }

    #[test]
    fn test_plain_image_layout() {
        let image = seal(b"ALL.", false, b"");
        assert_eq!(&image[..4], b"slh.");
        assert_eq!(&image[4..], b"ALL.");
    }
}
