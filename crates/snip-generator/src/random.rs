use crate::Generator;
use rand::distributions::Alphanumeric;
use rand::Rng;
use snip_core::{ShortCode, KEY_LENGTH};

/// Random code generator over `[a-zA-Z0-9]`.
///
/// Uses the thread-local CSPRNG, so 8-character codes give a 62^8 keyspace.
#[derive(Debug, Clone)]
pub struct RandomGenerator {
    length: usize,
}

impl RandomGenerator {
    pub fn new() -> Self {
        Self::with_length(KEY_LENGTH)
    }

    pub fn with_length(length: usize) -> Self {
        Self { length }
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for RandomGenerator {
    fn generate(&self) -> ShortCode {
        let code: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect();
        ShortCode::new(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn default_length_matches_schema() {
        let code = RandomGenerator::new().generate();
        assert_eq!(code.as_str().len(), KEY_LENGTH);
    }

    #[test]
    fn uses_alphanumeric_charset() {
        let generator = RandomGenerator::with_length(64);
        for _ in 0..32 {
            let code = generator.generate();
            assert!(code.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn codes_do_not_repeat_in_practice() {
        let generator = RandomGenerator::new();
        let codes: HashSet<_> = (0..1000).map(|_| generator.generate()).collect();
        assert_eq!(codes.len(), 1000);
    }
}
