//! otpgate - パスワードマネージャー向け二要素認証エンジン
//!
//! TOTPコード検証と使い捨てリカバリーコードのライフサイクルを提供する
//! ライブラリ。HTTP層・セッション管理・レート制限はホスト側の責務で、
//! 本クレートはコンストラクタ注入されたコラボレーター
//! （ストア・通知・メール・時刻）のみに依存する。

pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod repositories;
pub mod services;
