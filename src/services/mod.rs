pub mod email;
pub mod gate;
pub mod notifier;
pub mod recovery;
pub mod totp;
pub mod upgrade;

pub use email::{LogMailer, Mailer};
pub use gate::{EnableChange, ExpiryNotice, TwoFactorService, VerifyOutcome};
pub use notifier::{Notifier, TracingNotifier};
pub use recovery::RecoveryCodeService;
pub use totp::TotpService;
pub use upgrade::UpgradeService;
