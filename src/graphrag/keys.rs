//! Deterministic cache keys.
//!
//! Every corpus-level key is rooted in content: the summaries hash covers the
//! sorted summary texts and the query hash covers the summaries hash plus the
//! query text.

use std::path::Path;

use sha2::{Digest, Sha256};

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Identity key of a document's content.
pub fn content_hash(content: &str) -> String {
    sha256_hex(content.as_bytes())
}

/// Display/reference id: `<file name>_<first 8 hex chars of content hash>`.
pub fn document_id(file_path: &str, content: &str) -> String {
    let name = Path::new(file_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_path.to_string());
    format!("{}_{}", name, &content_hash(content)[..8])
}

/// Order-independent hash over all summary texts of a corpus snapshot.
pub fn summaries_hash<S: AsRef<str>>(summaries: &[S]) -> String {
    let mut sorted: Vec<&str> = summaries.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    for summary in sorted {
        // Length prefix keeps ["ab", "c"] and ["a", "bc"] apart.
        hasher.update((summary.len() as u64).to_le_bytes());
        hasher.update(summary.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Key of the final answer for one query against one corpus snapshot.
pub fn query_hash(summaries_hash: &str, query: &str) -> String {
    sha256_hex(format!("{}:{}", summaries_hash, query).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic() {
        assert_eq!(content_hash("hello"), content_hash("hello"));
        assert_ne!(content_hash("hello"), content_hash("hello "));
        assert_eq!(content_hash("").len(), 64);
    }

    #[test]
    fn document_id_uses_file_name_and_hash_prefix() {
        let id = document_id("/data/docs/report.txt", "body");
        let hash = content_hash("body");
        assert_eq!(id, format!("report.txt_{}", &hash[..8]));
    }

    #[test]
    fn same_content_at_different_paths_shares_hash() {
        let a = document_id("a/x.txt", "same");
        let b = document_id("b/y.txt", "same");
        assert_ne!(a, b);
        assert_eq!(a[a.len() - 8..], b[b.len() - 8..]);
    }

    #[test]
    fn summaries_hash_is_order_independent() {
        let forward = vec!["alpha", "beta", "gamma", "beta"];
        let shuffled = vec!["beta", "gamma", "beta", "alpha"];
        assert_eq!(summaries_hash(&forward), summaries_hash(&shuffled));
    }

    #[test]
    fn summaries_hash_distinguishes_multisets() {
        assert_ne!(summaries_hash(&["a", "a"]), summaries_hash(&["a"]));
        assert_ne!(summaries_hash(&["ab", "c"]), summaries_hash(&["a", "bc"]));
    }

    #[test]
    fn query_hash_depends_on_both_inputs() {
        let h = summaries_hash(&["s"]);
        assert_eq!(query_hash(&h, "q"), query_hash(&h, "q"));
        assert_ne!(query_hash(&h, "q"), query_hash(&h, "q2"));
        assert_ne!(query_hash(&h, "q"), query_hash(&summaries_hash(&["t"]), "q"));
    }
}
