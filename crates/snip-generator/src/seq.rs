use crate::Generator;
use snip_core::{ShortCode, KEY_LENGTH};
use std::sync::atomic::{AtomicU64, Ordering};

/// Deterministic generator: a fixed prefix followed by a zero-padded counter.
///
/// The counter is padded so codes are [`KEY_LENGTH`] characters wide, the
/// width of the database column. A counter that outgrows the padding yields
/// longer codes rather than wrapping.
#[derive(Debug)]
pub struct SeqGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SeqGenerator {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::starting_at(prefix, 0)
    }

    /// Resumes a sequence, e.g. after reopening a store that already holds
    /// the codes below `first`.
    pub fn starting_at(prefix: impl Into<String>, first: u64) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(first),
        }
    }

    fn width(&self) -> usize {
        KEY_LENGTH.saturating_sub(self.prefix.len())
    }
}

impl Generator for SeqGenerator {
    fn generate(&self) -> ShortCode {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        ShortCode::new(format!("{}{:0width$}", self.prefix, n, width = self.width()))
    }
}
