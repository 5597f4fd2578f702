use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::TwoFactorRecord;
use crate::repositories::TwoFactorStore;
use crate::services::totp::TotpService;

/// 旧スキーマのプラグインデータ（動的レコードのJSON表現）
///
/// 旧ホストのKey/Valueストアに入っていた形をそのまま受ける。
/// 数値フラグ・省略可能フィールドはここで吸収し、
/// 型付きレコードへは一度だけ変換する。
#[derive(Debug, Deserialize)]
struct LegacyTwoFactorData {
    #[serde(rename = "userId")]
    user_id: i64,
    #[serde(rename = "twofaEnabled", default)]
    twofa_enabled: u8,
    #[serde(default)]
    date: Option<i64>,
    #[serde(rename = "expireDays", default)]
    expire_days: Option<u32>,
    #[serde(rename = "IV", default)]
    iv: Option<String>,
    #[serde(rename = "recoveryCodes", default)]
    recovery_codes: Vec<String>,
    #[serde(rename = "lastRecoveryTime", default)]
    last_recovery_time: i64,
}

/// 旧スキーマからの一括移行サービス
///
/// ロード時に一度だけ実行する想定。項目単位の失敗は
/// ログに残してスキップし、移行できた件数を返す。
pub struct UpgradeService<S> {
    store: S,
    totp: TotpService,
}

impl<S: TwoFactorStore> UpgradeService<S> {
    pub fn new(store: S, totp: TotpService) -> Self {
        Self { store, totp }
    }

    /// 旧プラグインデータのJSON配列を型付きレコードへ移行する
    ///
    /// # Arguments
    /// * `blob` - 旧ストアから取り出したJSON文字列
    /// * `resolve_user` - 旧ユーザーID（整数）から現行IDへの解決関数
    pub async fn upgrade_legacy_blob(
        &self,
        blob: &str,
        resolve_user: impl Fn(i64) -> Option<Uuid>,
    ) -> Result<usize, AppError> {
        let items: Vec<LegacyTwoFactorData> = serde_json::from_str(blob).map_err(|e| {
            tracing::error!(error = ?e, "旧プラグインデータのパースエラー");
            AppError::Format("invalid legacy plugin data".to_string())
        })?;

        let mut migrated = 0;

        for item in items {
            let Some(user_id) = resolve_user(item.user_id) else {
                tracing::warn!(legacy_user_id = item.user_id, "ユーザーID解決不可・スキップ");
                continue;
            };

            let Some(secret) = item.iv.filter(|iv| !iv.is_empty()) else {
                tracing::warn!(legacy_user_id = item.user_id, "シークレット欠落・スキップ");
                continue;
            };

            let record = TwoFactorRecord {
                user_id,
                twofa_enabled: item.twofa_enabled != 0,
                enabled_at: item.date.unwrap_or(0),
                expire_days: item.expire_days.unwrap_or(0),
                secret,
                recovery_codes: item.recovery_codes,
                last_recovery_time: item.last_recovery_time,
            };

            if let Err(e) = self.save(record).await {
                // 項目単位の失敗は全体を止めない
                tracing::error!(legacy_user_id = item.user_id, error = %e, "レコード移行失敗");
                continue;
            }

            migrated += 1;
        }

        tracing::info!(migrated, "旧スキーマからの移行完了");
        Ok(migrated)
    }

    async fn save(&self, record: TwoFactorRecord) -> Result<(), AppError> {
        let secret_encrypted = self.totp.encrypt_secret(&record.secret)?;

        self.store
            .save(
                record.user_id,
                crate::models::StoredTwoFactor {
                    user_id: record.user_id,
                    twofa_enabled: record.twofa_enabled,
                    enabled_at: record.enabled_at,
                    expire_days: record.expire_days,
                    secret_encrypted,
                    recovery_codes: record.recovery_codes,
                    last_recovery_time: record.last_recovery_time,
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use base64::{Engine as _, engine::general_purpose::STANDARD};

    use super::*;
    use crate::repositories::InMemoryTwoFactorStore;

    fn make_service() -> (
        UpgradeService<Arc<InMemoryTwoFactorStore>>,
        Arc<InMemoryTwoFactorStore>,
        TotpService,
    ) {
        let store = Arc::new(InMemoryTwoFactorStore::new());
        let totp = TotpService::new(&STANDARD.encode([3u8; 32])).unwrap();
        (UpgradeService::new(store.clone(), totp.clone()), store, totp)
    }

    #[tokio::test]
    async fn test_upgrade_legacy_blob() {
        let (service, store, totp) = make_service();

        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mapping: HashMap<i64, Uuid> = [(3, alice), (7, bob)].into_iter().collect();

        let blob = r#"[
            {
                "userId": 3,
                "twofaEnabled": 1,
                "date": 1548972691,
                "expireDays": 90,
                "IV": "GEZDGNBVGY3TQOJQ",
                "recoveryCodes": ["aabbccddeeff00112233"],
                "lastRecoveryTime": 1548972700
            },
            {
                "userId": 7,
                "twofaEnabled": 0,
                "IV": "MFRGGZDFMZTWQ2LK"
            }
        ]"#;

        let migrated = service
            .upgrade_legacy_blob(blob, |id| mapping.get(&id).copied())
            .await
            .unwrap();

        assert_eq!(migrated, 2);

        let stored = store.load(alice).await.unwrap().unwrap();
        assert!(stored.twofa_enabled);
        assert_eq!(stored.enabled_at, 1_548_972_691);
        assert_eq!(stored.expire_days, 90);
        assert_eq!(stored.recovery_codes, vec!["aabbccddeeff00112233"]);
        assert_eq!(stored.last_recovery_time, 1_548_972_700);
        // シークレットは暗号化されて保存される
        assert_eq!(
            totp.decrypt_secret(&stored.secret_encrypted).unwrap(),
            "GEZDGNBVGY3TQOJQ"
        );

        let stored = store.load(bob).await.unwrap().unwrap();
        assert!(!stored.twofa_enabled);
        assert_eq!(stored.enabled_at, 0);
    }

    #[tokio::test]
    async fn test_upgrade_skips_unresolvable_users() {
        let (service, _, _) = make_service();

        let blob = r#"[{"userId": 99, "twofaEnabled": 1, "IV": "GEZDGNBVGY3TQOJQ"}]"#;

        let migrated = service.upgrade_legacy_blob(blob, |_| None).await.unwrap();
        assert_eq!(migrated, 0);
    }

    #[tokio::test]
    async fn test_upgrade_skips_items_without_secret() {
        let (service, _, _) = make_service();
        let user = Uuid::new_v4();

        let blob = r#"[{"userId": 1, "twofaEnabled": 1}]"#;

        let migrated = service
            .upgrade_legacy_blob(blob, |_| Some(user))
            .await
            .unwrap();
        assert_eq!(migrated, 0);
    }

    #[tokio::test]
    async fn test_upgrade_rejects_malformed_blob() {
        let (service, _, _) = make_service();

        let result = service.upgrade_legacy_blob("not json", |_| None).await;
        assert!(matches!(result, Err(AppError::Format(_))));
    }
}
