use data_encoding::HEXLOWER;
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::models::{RECOVERY_CODE_LEN, TwoFactorRecord};

/// 1プールあたりのリカバリーコード数
const CODE_COUNT: usize = 10;
/// 1コードあたりの乱数バイト数（16進で20文字になる）
const CODE_BYTES: usize = 10;

/// 使い捨てリカバリーコードのライフサイクル管理
///
/// プールは生成順を保持し、消費は1件ずつ削除する。
/// 枯渇後の再生成は猶予期間で抑制する（攻撃者による
/// 再生成の強制を防ぐ）。
pub struct RecoveryCodeService;

impl RecoveryCodeService {
    /// 新しいリカバリーコードプールを生成
    ///
    /// 10バイトの乱数を16進エンコードした20文字のコードを10件。
    /// 生成したプールは既存プールを完全に置き換える前提。
    pub fn generate_codes() -> Vec<String> {
        (0..CODE_COUNT)
            .map(|_| {
                let mut bytes = [0u8; CODE_BYTES];
                rand::thread_rng().fill_bytes(&mut bytes);
                HEXLOWER.encode(&bytes)
            })
            .collect()
    }

    /// リカバリーコードを消費する
    ///
    /// 完全一致（大文字小文字区別）したエントリを1件だけ削除し、
    /// 残りの順序は保持する。一致しなければプールは変更しない。
    ///
    /// # Note
    /// 消費済みコードの再利用は、エントリ削除により構造的に不可能。
    pub fn consume(record: &mut TwoFactorRecord, candidate: &str, now: i64) -> bool {
        if candidate.len() != RECOVERY_CODE_LEN {
            return false;
        }

        // 比較は全件に対して定数時間で行う
        let mut found: Option<usize> = None;
        for (i, code) in record.recovery_codes.iter().enumerate() {
            if bool::from(code.as_bytes().ct_eq(candidate.as_bytes())) {
                found = Some(i);
            }
        }

        match found {
            Some(index) => {
                record.recovery_codes.remove(index);
                record.last_recovery_time = now;
                true
            }
            None => false,
        }
    }

    /// 配布用のリカバリーコードを1件取り出す
    ///
    /// 取り出したコードはプールから除去する（pop方式）。呼び出し側は
    /// コードを配布する前にレコードを永続化すること。これにより
    /// 同じコードが二度配布されることはない。
    ///
    /// プールが空の場合、未生成（`last_recovery_time == 0`）または
    /// 猶予期間経過後に限り新しいプールを生成する。それ以外は
    /// `RecoveryExhausted` を返す。
    pub fn pick_code(
        record: &mut TwoFactorRecord,
        now: i64,
        grace_secs: i64,
    ) -> Result<String, AppError> {
        if let Some(code) = record.recovery_codes.pop() {
            record.last_recovery_time = now;
            return Ok(code);
        }

        if record.last_recovery_time == 0 || now - record.last_recovery_time >= grace_secs {
            tracing::info!(user_id = %record.user_id, "リカバリーコードプールを再生成");

            record.recovery_codes = Self::generate_codes();
            let code = record
                .recovery_codes
                .pop()
                .ok_or_else(|| AppError::Internal(anyhow::anyhow!("empty generated pool")))?;
            record.last_recovery_time = now;

            return Ok(code);
        }

        tracing::warn!(
            user_id = %record.user_id,
            last_recovery_time = record.last_recovery_time,
            "リカバリーコード枯渇・猶予期間内のため再生成を拒否"
        );

        Err(AppError::RecoveryExhausted)
    }
}
