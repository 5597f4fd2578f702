use crate::error::AppError;

/// メール送信コントラクト
///
/// 実体の送信（SMTP等）はホストアプリケーション側が実装する。
/// 送信失敗は `AppError::Mail` として返すこと。
pub trait Mailer: Send + Sync {
    /// メールを送信する
    fn send(
        &self,
        subject: &str,
        to: &str,
        body_lines: &[String],
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

impl<T: Mailer> Mailer for std::sync::Arc<T> {
    async fn send(
        &self,
        subject: &str,
        to: &str,
        body_lines: &[String],
    ) -> Result<(), AppError> {
        (**self).send(subject, to, body_lines).await
    }
}

/// メール送信スタブ（開発環境: ログ出力のみ）
///
/// # Security
/// リカバリーコードを含む本文はログに出力しない
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    async fn send(
        &self,
        subject: &str,
        to: &str,
        body_lines: &[String],
    ) -> Result<(), AppError> {
        // 開発モード: メール送信せずログ出力のみ
        tracing::info!(
            to = %to,
            subject = %subject,
            lines = body_lines.len(),
            "メール送信（開発モード）"
        );

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_mailer_never_fails() {
        let mailer = LogMailer;
        let result = mailer
            .send("件名", "user@example.com", &["本文".to_string()])
            .await;
        assert!(result.is_ok());
    }
}
