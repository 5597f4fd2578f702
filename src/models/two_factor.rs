use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// リカバリーコードの固定長（10バイトの16進表現）
///
/// 6桁のTOTPコードとリカバリーコードは長さで判別するため、
/// この値は生成側・判別側で必ず一致させること。
pub const RECOVERY_CODE_LEN: usize = 20;

/// ユーザーごとの二要素認証レコード（メモリ上の表現）
///
/// シークレットはBase32文字列のまま保持する。
/// 永続化時は [`StoredTwoFactor`] へ変換し、シークレットを暗号化する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoFactorRecord {
    pub user_id: Uuid,
    /// 有効化確認が完了した場合のみ true
    pub twofa_enabled: bool,
    /// 有効化された時刻（UNIX秒）。未有効化なら 0
    pub enabled_at: i64,
    /// 有効期限（日数）。0 は無期限
    pub expire_days: u32,
    /// Base32エンコードされた共有シークレット（16文字）
    pub secret: String,
    /// 未使用のリカバリーコード（生成順）
    pub recovery_codes: Vec<String>,
    /// リカバリープールを最後に(再)生成した時刻。0 は未生成
    pub last_recovery_time: i64,
}

impl TwoFactorRecord {
    /// 有効化待ち（pending）状態のレコードを作成
    ///
    /// # Note
    /// 作成時は twofa_enabled = false。
    /// 有効化フローでの検証成功後に enabled へ遷移する。
    pub fn pending(user_id: Uuid, secret: String) -> Self {
        Self {
            user_id,
            twofa_enabled: false,
            enabled_at: 0,
            expire_days: 0,
            secret,
            recovery_codes: Vec::new(),
            last_recovery_time: 0,
        }
    }
}

/// 永続化境界を越えるレコード表現
///
/// # Security
/// シークレットは AES-256-GCM で暗号化された状態でのみ保存する。
/// 平文シークレットはストアに渡さない。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTwoFactor {
    pub user_id: Uuid,
    pub twofa_enabled: bool,
    pub enabled_at: i64,
    pub expire_days: u32,
    /// nonce (12バイト) + 暗号文
    pub secret_encrypted: Vec<u8>,
    pub recovery_codes: Vec<String>,
    pub last_recovery_time: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_record_is_not_protecting_login() {
        let record = TwoFactorRecord::pending(Uuid::new_v4(), "ABCDEFGHIJKLMNOP".to_string());
        assert!(!record.twofa_enabled);
        assert_eq!(record.enabled_at, 0);
        assert!(record.recovery_codes.is_empty());
        assert_eq!(record.last_recovery_time, 0);
    }

    #[test]
    fn test_stored_record_serde_roundtrip() {
        let stored = StoredTwoFactor {
            user_id: Uuid::new_v4(),
            twofa_enabled: true,
            enabled_at: 1_700_000_000,
            expire_days: 30,
            secret_encrypted: vec![1, 2, 3],
            recovery_codes: vec!["a".repeat(RECOVERY_CODE_LEN)],
            last_recovery_time: 1_700_000_000,
        };

        let json = serde_json::to_string(&stored).unwrap();
        let parsed: StoredTwoFactor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.user_id, stored.user_id);
        assert_eq!(parsed.secret_encrypted, stored.secret_encrypted);
        assert_eq!(parsed.recovery_codes, stored.recovery_codes);
    }
}
