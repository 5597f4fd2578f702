/// 監査イベントの通知先
///
/// fire-and-forget 契約: 実装は呼び出し元をブロックせず、
/// 失敗しても呼び出し元へ伝播させないこと。
pub trait Notifier: Send + Sync {
    /// イベントタグと詳細を通知する
    fn emit(&self, event: &str, detail: &[(&str, String)]);
}

impl<T: Notifier + ?Sized> Notifier for std::sync::Arc<T> {
    fn emit(&self, event: &str, detail: &[(&str, String)]) {
        (**self).emit(event, detail)
    }
}

/// イベントタグ定義
pub mod events {
    /// リカバリーコード使用
    pub const RECOVERY_CODE_USED: &str = "twofactor.recovery.used";
    /// リカバリーコード一覧の表示
    pub const RECOVERY_CODES_VIEWED: &str = "twofactor.recovery.viewed";
    /// リカバリーコードのメール送信
    pub const RECOVERY_EMAIL_SENT: &str = "twofactor.recovery.email_sent";
    /// 2FA有効化
    pub const TWOFA_ENABLED: &str = "twofactor.enabled";
    /// 2FA無効化
    pub const TWOFA_DISABLED: &str = "twofactor.disabled";
    /// 検証失敗（外部のレート制限・ロックアウトへの通知用）
    pub const CHECK_FAILED: &str = "twofactor.check.failed";
}

/// tracing へ流すだけの実装
///
/// ホスト側にイベントバスがない環境向けのデフォルト。
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn emit(&self, event: &str, detail: &[(&str, String)]) {
        tracing::info!(event = %event, detail = ?detail, "監査イベント");
    }
}
