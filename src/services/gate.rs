use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::{RECOVERY_CODE_LEN, StoredTwoFactor, TwoFactorRecord};
use crate::repositories::TwoFactorStore;
use crate::services::email::Mailer;
use crate::services::notifier::{Notifier, events};
use crate::services::recovery::RecoveryCodeService;
use crate::services::totp::TotpService;

/// 有効期限の事前警告ウィンドウ（5日）
const EXPIRY_WARNING_SECS: i64 = 432_000;

/// 1回の検証リクエストの結果
///
/// セッションの two-factor-pass / auth-completed フラグは
/// ホスト側がこの値を見て設定する。本サービスが
/// セッション状態を直接変更することはない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Accepted,
    Rejected,
}

/// 有効化状態の遷移結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableChange {
    /// pending/disabled → enabled へ遷移した
    Enabled,
    /// レコードを削除した（無効化はフラグ更新ではなく削除）
    Disabled,
    /// 要求された状態が現在の状態と同じ（変更なし）
    Unchanged,
}

/// ログイン画面表示時の有効期限通知
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryNotice {
    /// 警告ウィンドウ内（まもなく失効）
    ExpiresSoon { days_left: i64 },
    /// 既に失効済み。再設定が必要
    Expired,
}

/// 二要素認証ゲート
///
/// 検証リクエスト1回分のオーケストレーションを行う:
/// リカバリーコード → TOTP の順で照合し、成功時のみ状態を永続化する。
/// コラボレーター（ストア・通知・メール・時刻）はすべて
/// コンストラクタで注入する。
pub struct TwoFactorService<S, N, M, C> {
    store: S,
    notifier: N,
    mailer: M,
    clock: C,
    totp: TotpService,
    recovery_grace_secs: i64,
}

impl<S, N, M, C> TwoFactorService<S, N, M, C>
where
    S: TwoFactorStore,
    N: Notifier,
    M: Mailer,
    C: Clock,
{
    /// 新しい TwoFactorService を作成
    pub fn new(
        store: S,
        notifier: N,
        mailer: M,
        clock: C,
        totp: TotpService,
        recovery_grace_secs: i64,
    ) -> Self {
        Self {
            store,
            notifier,
            mailer,
            clock,
            totp,
            recovery_grace_secs,
        }
    }

    /// 設定画面表示時のレコード準備（遅延生成）
    ///
    /// - レコードなし: 新規シークレットで pending レコードを作成
    /// - 未有効化: シークレットを再発行（有効化確認まで何度でも更新可）
    /// - 有効化済み: 既存レコードをそのまま返す
    pub async fn provision(&self, user_id: Uuid) -> Result<TwoFactorRecord, AppError> {
        match self.load_record(user_id).await? {
            Some(record) if record.twofa_enabled => Ok(record),
            Some(mut record) => {
                record.secret = TotpService::generate_secret();
                self.save_record(&record).await?;

                tracing::debug!(user_id = %user_id, "pendingレコードのシークレットを再発行");
                Ok(record)
            }
            None => {
                let record = TwoFactorRecord::pending(user_id, TotpService::generate_secret());
                self.save_record(&record).await?;

                tracing::info!(user_id = %user_id, "2FAレコードを新規作成（pending）");
                Ok(record)
            }
        }
    }

    /// 認証コードを検証する（ログインゲート）
    ///
    /// 候補コードは長さで分類する: リカバリーコード長なら先に
    /// プールを照合し、消費できなければTOTPへフォールバックする。
    ///
    /// # Security
    /// レコード不存在・TOTP不一致・リカバリーコード不一致は
    /// すべて同じ `Rejected` に集約する（§オラクル攻撃対策）。
    /// 失敗時は外部のレート制限向けに CHECK_FAILED を通知する。
    pub async fn check_code(
        &self,
        user_id: Uuid,
        candidate: &str,
    ) -> Result<VerifyOutcome, AppError> {
        let now = self.clock.now();

        let Some(mut record) = self.load_record(user_id).await? else {
            tracing::warn!(user_id = %user_id, "2FAレコードなしの検証リクエスト");
            return Ok(self.reject(user_id));
        };

        // リカバリーコード長のみプールを照合する
        if candidate.len() == RECOVERY_CODE_LEN
            && RecoveryCodeService::consume(&mut record, candidate, now)
        {
            // 消費を永続化できない場合は成功として報告しない
            self.save_record(&record).await?;

            self.notifier.emit(
                events::RECOVERY_CODE_USED,
                &[("user_id", user_id.to_string())],
            );
            tracing::info!(user_id = %user_id, "リカバリーコードによる認証成功");

            return Ok(VerifyOutcome::Accepted);
        }

        match TotpService::verify(&record.secret, candidate, now) {
            Ok(true) => {
                tracing::info!(user_id = %user_id, "TOTPコードによる認証成功");
                Ok(VerifyOutcome::Accepted)
            }
            Ok(false) => Ok(self.reject(user_id)),
            Err(AppError::Format(e)) => {
                // シークレット破損はログに残し、ユーザーへは一般的な失敗として返す
                tracing::error!(user_id = %user_id, error = %e, "シークレットの形式不正");
                Ok(self.reject(user_id))
            }
            Err(e) => Err(e),
        }
    }

    /// 2FA設定の保存（有効化・無効化）
    ///
    /// 同一リクエスト内で検証→遷移を行う。検証失敗時は
    /// `InvalidCode` を返し、状態は一切変更しない。
    ///
    /// - pending → enabled: enabled_at を現在時刻に設定し、
    ///   リカバリープールを新規生成する
    /// - enabled → disabled: レコードを完全に削除する
    /// - 状態が同じ場合は何もしない
    pub async fn save_preferences(
        &self,
        user_id: Uuid,
        candidate: &str,
        want_enabled: bool,
        expire_days: u32,
    ) -> Result<EnableChange, AppError> {
        if self.check_code(user_id, candidate).await? == VerifyOutcome::Rejected {
            return Err(AppError::InvalidCode);
        }

        // 検証でリカバリーコードが消費された可能性があるため再読込する
        let mut record = self.load_record(user_id).await?.ok_or(AppError::NotFound)?;

        match (record.twofa_enabled, want_enabled) {
            (false, true) => {
                let now = self.clock.now();

                record.twofa_enabled = true;
                record.enabled_at = now;
                record.expire_days = expire_days;
                record.recovery_codes = RecoveryCodeService::generate_codes();
                record.last_recovery_time = now;

                self.save_record(&record).await?;

                self.notifier
                    .emit(events::TWOFA_ENABLED, &[("user_id", user_id.to_string())]);
                tracing::info!(user_id = %user_id, expire_days, "2FA有効化完了");

                Ok(EnableChange::Enabled)
            }
            (true, false) => {
                self.store.delete(user_id).await?;

                self.notifier
                    .emit(events::TWOFA_DISABLED, &[("user_id", user_id.to_string())]);
                tracing::info!(user_id = %user_id, "2FA無効化完了（レコード削除）");

                Ok(EnableChange::Disabled)
            }
            _ => Ok(EnableChange::Unchanged),
        }
    }

    /// リカバリーコードを1件取り出してメール送信する
    ///
    /// 取り出したコードは送信前に永続化する（同じコードが
    /// 二度配布されることを防ぐ）。プール枯渇時は猶予期間に
    /// 応じて `RecoveryExhausted` を返す。
    pub async fn send_recovery_email(
        &self,
        user_id: Uuid,
        recipient: &str,
    ) -> Result<(), AppError> {
        let now = self.clock.now();

        let mut record = self.load_record(user_id).await?.ok_or(AppError::NotFound)?;

        let code = RecoveryCodeService::pick_code(&mut record, now, self.recovery_grace_secs)?;

        // 配布前に永続化（pop-and-persist）
        self.save_record(&record).await?;

        let body_lines = vec![
            "2FAのリカバリーコードが要求されました。".to_string(),
            String::new(),
            format!("リカバリーコードは: {code}"),
        ];

        self.mailer
            .send("2FAコードのリカバリー", recipient, &body_lines)
            .await
            .map_err(|e| {
                tracing::error!(user_id = %user_id, error = %e, "リカバリーメール送信失敗");
                e
            })?;

        self.notifier.emit(
            events::RECOVERY_EMAIL_SENT,
            &[("user_id", user_id.to_string())],
        );
        tracing::info!(user_id = %user_id, "リカバリーメール送信完了");

        Ok(())
    }

    /// 残っているリカバリーコードの一覧を返す
    pub async fn show_recovery_codes(&self, user_id: Uuid) -> Result<Vec<String>, AppError> {
        let record = self.load_record(user_id).await?.ok_or(AppError::NotFound)?;

        if record.recovery_codes.is_empty() {
            return Err(AppError::RecoveryExhausted);
        }

        self.notifier.emit(
            events::RECOVERY_CODES_VIEWED,
            &[("user_id", user_id.to_string())],
        );

        Ok(record.recovery_codes)
    }

    /// 有効期限チェック（読み取り専用・ログイン画面表示時に呼ぶ）
    ///
    /// expire_days == 0 はチェック自体を無効化する。
    /// 失効判定を警告判定より先に行う。
    pub fn check_expiry(&self, record: &TwoFactorRecord) -> Option<ExpiryNotice> {
        if record.expire_days == 0 {
            return None;
        }

        let now = self.clock.now();
        let expire_time = record.enabled_at + i64::from(record.expire_days) * 86_400;
        let remaining = expire_time - now;

        if now > expire_time {
            Some(ExpiryNotice::Expired)
        } else if remaining <= EXPIRY_WARNING_SECS {
            Some(ExpiryNotice::ExpiresSoon {
                days_left: remaining / 86_400,
            })
        } else {
            None
        }
    }

    /// 検証失敗の共通処理
    fn reject(&self, user_id: Uuid) -> VerifyOutcome {
        self.notifier
            .emit(events::CHECK_FAILED, &[("user_id", user_id.to_string())]);

        VerifyOutcome::Rejected
    }

    /// ストアからレコードを読み出し、シークレットを復号する
    async fn load_record(&self, user_id: Uuid) -> Result<Option<TwoFactorRecord>, AppError> {
        let Some(stored) = self.store.load(user_id).await? else {
            return Ok(None);
        };

        let secret = self.totp.decrypt_secret(&stored.secret_encrypted)?;

        Ok(Some(TwoFactorRecord {
            user_id: stored.user_id,
            twofa_enabled: stored.twofa_enabled,
            enabled_at: stored.enabled_at,
            expire_days: stored.expire_days,
            secret,
            recovery_codes: stored.recovery_codes,
            last_recovery_time: stored.last_recovery_time,
        }))
    }

    /// シークレットを暗号化してストアへ保存する
    async fn save_record(&self, record: &TwoFactorRecord) -> Result<(), AppError> {
        let secret_encrypted = self.totp.encrypt_secret(&record.secret)?;

        self.store
            .save(
                record.user_id,
                StoredTwoFactor {
                    user_id: record.user_id,
                    twofa_enabled: record.twofa_enabled,
                    enabled_at: record.enabled_at,
                    expire_days: record.expire_days,
                    secret_encrypted,
                    recovery_codes: record.recovery_codes.clone(),
                    last_recovery_time: record.last_recovery_time,
                },
            )
            .await
    }
}
