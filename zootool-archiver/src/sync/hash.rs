use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const BUF_SIZE: usize = 64 * 1024;

/// MD5 of the complete file content, as lowercase hex.
///
/// The digest doubles as the file's identity for dedup and relinking, so it
/// must stay stable across releases.
pub fn fingerprint_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut context = md5::Context::new();
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        context.consume(&buf[..read]);
    }
    Ok(format!("{:x}", context.compute()))
}

#[allow(dead_code)]
pub fn fingerprint_bytes(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn matches_reference_digest() {
        assert_eq!(fingerprint_bytes(b"hello"), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(fingerprint_bytes(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn file_digest_matches_byte_digest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        std::fs::write(&path, b"some image bytes").unwrap();

        assert_eq!(
            fingerprint_file(&path).unwrap(),
            fingerprint_bytes(b"some image bytes")
        );
    }
}
