//! Token counting backed by a process-wide tiktoken instance

use std::sync::OnceLock;

use tiktoken_rs::{CoreBPE, cl100k_base};

/// Opaque `text -> token count` capability used by the request budgeter.
///
/// The budgeter only ever needs the count, never the token ids, so tests can
/// substitute a deterministic fake.
pub trait CountTokens: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

static BPE: OnceLock<CoreBPE> = OnceLock::new();

/// Shared cl100k tokenizer, constructed once on first use.
///
/// Construction is expensive; `OnceLock` makes concurrent first callers
/// agree on a single instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct SharedTokenizer;

impl SharedTokenizer {
    fn bpe() -> &'static CoreBPE {
        // The vocabulary is embedded in the binary; failing to load it is
        // unrecoverable.
        BPE.get_or_init(|| cl100k_base().expect("failed to load embedded cl100k vocabulary"))
    }
}

impl CountTokens for SharedTokenizer {
    fn count(&self, text: &str) -> usize {
        Self::bpe().encode_ordinary(text).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_is_zero_tokens() {
        assert_eq!(SharedTokenizer.count(""), 0);
    }

    #[test]
    fn test_count_is_positive_for_text() {
        let count = SharedTokenizer.count("The quick brown fox jumps over the lazy dog.");
        assert!(count > 0);
        assert!(count <= 45);
    }

    #[test]
    fn test_count_is_deterministic() {
        let a = SharedTokenizer.count("hello world");
        let b = SharedTokenizer.count("hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn test_concurrent_first_access_initializes_once() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| SharedTokenizer::bpe() as *const CoreBPE as usize))
            .collect();

        let addresses: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(addresses.windows(2).all(|w| w[0] == w[1]));
    }
}
