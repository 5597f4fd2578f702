#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// シークレットやコードの形式が不正（データ破損・プログラムバグ起因）
    #[error("フォーマットエラー: {0}")]
    Format(String),

    /// 認証コードが一致しない（TOTP・リカバリーコード共通）
    #[error("認証コードが無効です")]
    InvalidCode,

    /// リカバリーコードが枯渇し、猶予期間も経過していない
    #[error("現在利用可能なリカバリーコードはありません")]
    RecoveryExhausted,

    /// 2FAレコードが見つからない
    #[error("2FAレコードが見つかりません")]
    NotFound,

    /// 永続化レイヤーのエラー
    #[error("ストレージエラー: {0}")]
    Storage(String),

    /// メール送信エラー
    #[error("メール送信エラー: {0}")]
    Mail(String),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// エンドユーザーへ返すメッセージ
    ///
    /// # Security
    /// - TOTP不一致・リカバリーコード不一致・レコード不存在は
    ///   すべて同一メッセージに集約する（オラクル攻撃対策）
    /// - 内部エラーの詳細はログのみに残し、レスポンスには出さない
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidCode | Self::NotFound => "コードが正しくありません",
            Self::RecoveryExhausted => "現在利用可能なリカバリーコードはありません",
            Self::Mail(_) => "メールの送信に失敗しました",
            Self::Format(_) | Self::Storage(_) | Self::Internal(_) => {
                "内部エラーが発生しました"
            }
        }
    }
}
