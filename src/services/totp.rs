use aes_gcm::{
    Aes256Gcm, KeyInit, Nonce,
    aead::{Aead, OsRng},
};
use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use subtle::ConstantTimeEq;

use crate::error::AppError;

/// TOTPのタイムステップ幅（秒）
const TIME_STEP_SECS: i64 = 30;
/// 生成するコードの桁数
const CODE_DIGITS: usize = 6;
/// 許容するタイムステップのずれ（前後各Nステップ）
const SKEW_STEPS: u64 = 1;
/// 共有シークレットのBase32文字数
const SECRET_LEN: usize = 16;

/// TOTP (Time-based One-Time Password) サービス
///
/// # Security
/// - シークレットはAES-256-GCMで暗号化して保存する
/// - シークレット平文・認証コードはログに出力しない
/// - コード比較は定数時間で行う（タイミング攻撃対策）
#[derive(Clone)]
pub struct TotpService {
    encryption_key: [u8; 32],
}

impl TotpService {
    /// 新しい TotpService を作成
    ///
    /// # Arguments
    /// * `encryption_key_base64` - Base64エンコードされた32バイトの暗号化キー
    pub fn new(encryption_key_base64: &str) -> Result<Self, AppError> {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        let key_bytes = STANDARD.decode(encryption_key_base64).map_err(|e| {
            tracing::error!(error = ?e, "暗号化キーのBase64デコードエラー");
            AppError::Internal(anyhow::anyhow!("invalid encryption key format"))
        })?;

        if key_bytes.len() != 32 {
            tracing::error!(
                expected = 32,
                actual = key_bytes.len(),
                "暗号化キーの長さが不正"
            );
            return Err(AppError::Internal(anyhow::anyhow!(
                "encryption key must be 32 bytes"
            )));
        }

        let mut encryption_key = [0u8; 32];
        encryption_key.copy_from_slice(&key_bytes);

        Ok(Self { encryption_key })
    }

    /// 共有シークレットを生成し、Base32でエンコードして16文字に切り詰める
    ///
    /// # Note
    /// 「32バイト生成 → Base32エンコード → 先頭16文字」の手順は
    /// 相互運用のため変更しないこと。16文字を直接生成するのとは
    /// 等価ではない。
    pub fn generate_secret() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);

        let mut encoded = BASE32_NOPAD.encode(&bytes);
        encoded.truncate(SECRET_LEN);
        encoded
    }

    /// Base32シークレットを鍵バイト列へデコード
    pub fn decode_secret(secret: &str) -> Result<Vec<u8>, AppError> {
        if secret.is_empty() {
            return Err(AppError::Format("シークレットが未設定".to_string()));
        }

        BASE32_NOPAD.decode(secret.as_bytes()).map_err(|e| {
            tracing::error!(error = ?e, "シークレットのBase32デコードエラー");
            AppError::Format("invalid base32 secret".to_string())
        })
    }

    /// UNIX秒からタイムステップカウンターを計算
    pub fn timestep(now: i64) -> u64 {
        (now.max(0) / TIME_STEP_SECS) as u64
    }

    /// 指定カウンターの6桁コードを計算
    ///
    /// HMAC-SHA1 + dynamic truncation (RFC 4226 / RFC 6238)
    pub fn compute_code(secret_bytes: &[u8], counter: u64) -> String {
        let mut mac = <Hmac<Sha1> as Mac>::new_from_slice(secret_bytes)
            .expect("HMAC accepts keys of any length");
        mac.update(&counter.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        // dynamic truncation: 末尾4bitをオフセットとして31bit整数を取り出す
        let offset = (digest[digest.len() - 1] & 0x0f) as usize;
        let binary = u32::from_be_bytes([
            digest[offset] & 0x7f,
            digest[offset + 1],
            digest[offset + 2],
            digest[offset + 3],
        ]);

        let code = binary % 10_u32.pow(CODE_DIGITS as u32);
        format!("{code:06}")
    }

    /// TOTPコードを検証
    ///
    /// 現在のタイムステップに加え、前後1ステップを許容する（時計ずれ対策）。
    ///
    /// # Note
    /// コードの形式不正（桁数違い・数字以外）は不一致として扱い、
    /// エラーにはしない。シークレットの形式不正は `Format` エラー。
    pub fn verify(secret: &str, code: &str, now: i64) -> Result<bool, AppError> {
        // 入力検証: コードは6桁の数字のみ
        if code.len() != CODE_DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
            return Ok(false);
        }

        let secret_bytes = Self::decode_secret(secret)?;
        let current = Self::timestep(now);

        let mut matched = false;

        for counter in current.saturating_sub(SKEW_STEPS)..=current.saturating_add(SKEW_STEPS) {
            let expected = Self::compute_code(&secret_bytes, counter);
            // 全候補を比較してから判定する（比較回数を一定に保つ）
            matched |= bool::from(expected.as_bytes().ct_eq(code.as_bytes()));
        }

        Ok(matched)
    }

    /// シークレットをAES-256-GCMで暗号化
    ///
    /// # Returns
    /// 96ビットnonce (12バイト) + 暗号文
    pub fn encrypt_secret(&self, secret: &str) -> Result<Vec<u8>, AppError> {
        let cipher = Aes256Gcm::new_from_slice(&self.encryption_key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            AppError::Internal(anyhow::anyhow!("cipher initialization error"))
        })?;

        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher.encrypt(nonce, secret.as_bytes()).map_err(|e| {
            tracing::error!(error = ?e, "シークレット暗号化エラー");
            AppError::Internal(anyhow::anyhow!("encryption error"))
        })?;

        let mut result = Vec::with_capacity(12 + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    /// 暗号化されたシークレットを復号
    pub fn decrypt_secret(&self, encrypted: &[u8]) -> Result<String, AppError> {
        if encrypted.len() < 12 {
            tracing::error!(len = encrypted.len(), "暗号化データが短すぎる");
            return Err(AppError::Internal(anyhow::anyhow!(
                "encrypted data too short"
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.encryption_key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            AppError::Internal(anyhow::anyhow!("cipher initialization error"))
        })?;

        let (nonce_bytes, ciphertext) = encrypted.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher.decrypt(nonce, ciphertext).map_err(|e| {
            tracing::error!(error = ?e, "シークレット復号エラー");
            AppError::Internal(anyhow::anyhow!("decryption error"))
        })?;

        String::from_utf8(plaintext).map_err(|e| {
            tracing::error!(error = ?e, "復号データのUTF-8変換エラー");
            AppError::Internal(anyhow::anyhow!("invalid utf8 after decryption"))
        })
    }
}
