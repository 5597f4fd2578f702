pub mod two_factor;

pub use two_factor::{InMemoryTwoFactorStore, TwoFactorStore};
