/// Content hashing for cached project files and stored session documents.
use sha2::{Digest as _, Sha256};

use crate::types::ContentHash;

/// Hash a file's full text. The cache recomputes this on every write, so a
/// stored `ProjectFile` always satisfies `content_hash == hash_content(content)`.
pub fn hash_content(content: &str) -> ContentHash {
    let digest = Sha256::digest(content.as_bytes());
    return ContentHash(format!("{digest:x}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_lowercase_hex_sha256() {
        let h = hash_content("export default App;\n");
        assert_eq!(h.0.len(), 64);
        assert!(h.0.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
