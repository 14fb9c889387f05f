pub mod random;
pub mod seq;

pub use random::RandomGenerator;
pub use seq::SeqGenerator;

use snip_core::ShortCode;

/// Trait for generating short codes.
///
/// Implementations are pure generators that don't interact with storage.
/// Storage does not check the output for collisions beyond rejecting a code
/// that is already taken, so generators should have a large keyspace.
pub trait Generator: Send + Sync + 'static {
    fn generate(&self) -> ShortCode;
}
