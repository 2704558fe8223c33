//! Scoring file content into a weight (estimated token count)

/// Turns raw file content into a weight.
pub trait Weigher: Send + Sync {
    fn weigh(&self, content: &[u8]) -> u64;
}

impl<F> Weigher for F
where
    F: Fn(&[u8]) -> u64 + Send + Sync,
{
    fn weigh(&self, content: &[u8]) -> u64 {
        self(content)
    }
}

/// Approximate BPE-style token count.
///
/// Alphanumeric runs cost one token per four characters (rounded up), every
/// other visible character costs one token, whitespace is free.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenEstimator;

impl Weigher for TokenEstimator {
    fn weigh(&self, content: &[u8]) -> u64 {
        let text = String::from_utf8_lossy(content);
        let mut tokens = 0u64;
        let mut run = 0u64;
        for ch in text.chars() {
            if ch.is_alphanumeric() || ch == '_' {
                run += 1;
                continue;
            }
            tokens += run.div_ceil(4);
            run = 0;
            if !ch.is_whitespace() {
                tokens += 1;
            }
        }
        tokens + run.div_ceil(4)
    }
}
