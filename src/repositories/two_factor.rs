use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::StoredTwoFactor;

/// 2FAレコードの永続化コントラクト
///
/// ホストアプリケーション側のストレージ（DB・KVSなど）が実装する。
/// 同一ユーザーへの同時書き込みは last-writer-wins とし、
/// 厳密な read-modify-write 原子性が必要な場合は実装側で担保する。
pub trait TwoFactorStore: Send + Sync {
    /// ユーザーIDでレコードを検索
    fn load(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Option<StoredTwoFactor>, AppError>> + Send;

    /// レコードを保存（存在すれば上書き）
    fn save(
        &self,
        user_id: Uuid,
        record: StoredTwoFactor,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// レコードを削除
    ///
    /// # Note
    /// 2FA無効化はフラグ更新ではなくレコード削除として扱う
    fn delete(&self, user_id: Uuid) -> impl Future<Output = Result<(), AppError>> + Send;
}

impl<T: TwoFactorStore> TwoFactorStore for std::sync::Arc<T> {
    async fn load(&self, user_id: Uuid) -> Result<Option<StoredTwoFactor>, AppError> {
        (**self).load(user_id).await
    }

    async fn save(&self, user_id: Uuid, record: StoredTwoFactor) -> Result<(), AppError> {
        (**self).save(user_id, record).await
    }

    async fn delete(&self, user_id: Uuid) -> Result<(), AppError> {
        (**self).delete(user_id).await
    }
}

/// インメモリ実装（テスト・組み込み用）
#[derive(Debug, Default)]
pub struct InMemoryTwoFactorStore {
    records: RwLock<HashMap<Uuid, StoredTwoFactor>>,
}

impl InMemoryTwoFactorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TwoFactorStore for InMemoryTwoFactorStore {
    async fn load(&self, user_id: Uuid) -> Result<Option<StoredTwoFactor>, AppError> {
        Ok(self.records.read().await.get(&user_id).cloned())
    }

    async fn save(&self, user_id: Uuid, record: StoredTwoFactor) -> Result<(), AppError> {
        self.records.write().await.insert(user_id, record);
        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<(), AppError> {
        self.records.write().await.remove(&user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(user_id: Uuid) -> StoredTwoFactor {
        StoredTwoFactor {
            user_id,
            twofa_enabled: false,
            enabled_at: 0,
            expire_days: 0,
            secret_encrypted: vec![0u8; 32],
            recovery_codes: Vec::new(),
            last_recovery_time: 0,
        }
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let store = InMemoryTwoFactorStore::new();
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = InMemoryTwoFactorStore::new();
        let user_id = Uuid::new_v4();

        store.save(user_id, sample_record(user_id)).await.unwrap();

        let loaded = store.load(user_id).await.unwrap().unwrap();
        assert_eq!(loaded.user_id, user_id);
    }

    #[tokio::test]
    async fn test_save_overwrites_last_writer_wins() {
        let store = InMemoryTwoFactorStore::new();
        let user_id = Uuid::new_v4();

        store.save(user_id, sample_record(user_id)).await.unwrap();

        let mut updated = sample_record(user_id);
        updated.twofa_enabled = true;
        store.save(user_id, updated).await.unwrap();

        let loaded = store.load(user_id).await.unwrap().unwrap();
        assert!(loaded.twofa_enabled);
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let store = InMemoryTwoFactorStore::new();
        let user_id = Uuid::new_v4();

        store.save(user_id, sample_record(user_id)).await.unwrap();
        store.delete(user_id).await.unwrap();

        assert!(store.load(user_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let store = InMemoryTwoFactorStore::new();
        assert!(store.delete(Uuid::new_v4()).await.is_ok());
    }
}
