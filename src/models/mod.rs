pub mod two_factor;

pub use two_factor::{RECOVERY_CODE_LEN, StoredTwoFactor, TwoFactorRecord};
