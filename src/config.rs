use secrecy::SecretBox;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    // 2FA (TOTP) 設定
    /// AES-256暗号化キー（Base64エンコード、32バイト）
    pub encryption_key: SecretBox<String>,

    // リカバリーコード設定
    /// プール枯渇後の再生成までの猶予期間（秒）
    #[serde(default = "default_recovery_grace_secs")]
    pub recovery_grace_secs: i64,
}

const DEFAULT_RECOVERY_GRACE_SECS: i64 = 86_400;

fn default_recovery_grace_secs() -> i64 {
    DEFAULT_RECOVERY_GRACE_SECS
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}
