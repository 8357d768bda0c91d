//! Bitcoin's double-SHA256 ("sha256d") hash and message checksum.
//!
//! Block hashes, transaction hashes, and P2P message checksums are all
//! computed by hashing the input with SHA256 twice in a row.

use std::io;

use sha2::{Digest, Sha256};

/// A streaming double-SHA256 hasher.
///
/// Bytes written to this type are fed into an inner SHA256 hasher; calling
/// [`finish`](Writer::finish) hashes the first digest a second time and
/// returns the 32-byte result.
pub struct Writer(Sha256);

impl Default for Writer {
    fn default() -> Self {
        Writer(Sha256::new())
    }
}

impl Writer {
    /// Consume the writer, returning the double-SHA256 digest of all bytes written.
    pub fn finish(self) -> [u8; 32] {
        let first_digest = self.0.finalize();
        let second_digest = Sha256::digest(&first_digest[..]);
        let mut result = [0u8; 32];
        result.copy_from_slice(&second_digest[..]);
        result
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Compute the double-SHA256 digest of `data` in one shot.
pub fn hash(data: &[u8]) -> [u8; 32] {
    let mut writer = Writer::default();
    io::Write::write_all(&mut writer, data).expect("writing to a Writer is infallible");
    writer.finish()
}

/// The first four bytes of a double-SHA256 digest, used as a message checksum
/// in the P2P wire header.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Checksum(pub [u8; 4]);

impl std::fmt::Debug for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("sha256d::Checksum")
            .field(&hex::encode(self.0))
            .finish()
    }
}

impl<'a> From<&'a [u8]> for Checksum {
    fn from(bytes: &'a [u8]) -> Self {
        let digest = hash(bytes);
        let mut checksum = [0u8; 4];
        checksum.copy_from_slice(&digest[0..4]);
        Checksum(checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_differs_from_single_sha256() {
        let digest = hash(b"extractor");
        assert_eq!(digest, hash(b"extractor"));

        let single: [u8; 32] = Sha256::digest(b"extractor").into();
        assert_ne!(digest, single);
    }

    #[test]
    fn checksum_is_first_four_bytes_of_hash() {
        let data = b"hello extractor";
        let digest = hash(data);
        let checksum = Checksum::from(&data[..]);
        assert_eq!(checksum.0, digest[0..4]);
    }
}
