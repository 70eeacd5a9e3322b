use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// API key 前缀，便于在日志与列表页中识别本平台签发的密钥
pub const API_KEY_PREFIX: &str = "sbz_";

/// 可展示前缀长度（`sbz_` + 8 个 key 字符），列表页与索引查找共用
const DISPLAY_PREFIX_LEN: usize = 12;

fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| anyhow::anyhow!("System RNG failed"))?;
    Ok(buf)
}

/// 生成一个 32 字节的加密安全随机 token（base64）
pub fn generate_token() -> String {
    // SystemRandom 只在 RNG 不可用的系统上失败；此处无法继续，直接 panic
    let bytes = random_bytes::<32>().expect("system RNG unavailable");
    general_purpose::STANDARD.encode(bytes)
}

/// 生成一个带 `sbz_` 前缀的 API key（明文仅在创建时返回一次）
pub fn generate_api_key() -> String {
    let bytes = random_bytes::<32>().expect("system RNG unavailable");
    format!(
        "{API_KEY_PREFIX}{}",
        general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    )
}

/// 取 API key 的可展示前缀
pub fn api_key_prefix(key: &str) -> String {
    key.chars().take(DISPLAY_PREFIX_LEN).collect()
}

/// 使用 bcrypt 对 token 进行哈希
pub fn hash_token(token: &str) -> Result<String> {
    Ok(bcrypt::hash(token, bcrypt::DEFAULT_COST)?)
}

/// 验证 token 是否匹配哈希值
pub fn verify_token(token: &str, hash: &str) -> Result<bool> {
    Ok(bcrypt::verify(token, hash)?)
}

/// 常量时间字符串比较（签名校验用，避免时序侧信道）
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && ring::constant_time::verify_slices_are_equal(a.as_bytes(), b.as_bytes()).is_ok()
}

/// 机密加密器。webhook secret、API key 副本等在落库前经 AES-256-GCM
/// 加密；密钥保存在数据目录的 `secret.key` 文件中。
pub struct SecretEncryptor {
    key_bytes: Vec<u8>,
}

impl SecretEncryptor {
    const KEY_FILE: &'static str = "secret.key";
    const KEY_LEN: usize = 32;

    /// 从 `data_dir/secret.key` 加载；文件不存在时生成并写入（Unix 下 0600）。
    pub fn load_or_create(data_dir: &Path) -> Result<Self> {
        let key_path = data_dir.join(Self::KEY_FILE);
        let key_bytes = if key_path.exists() {
            std::fs::read(&key_path)?
        } else {
            let key = random_bytes::<32>()?.to_vec();
            std::fs::write(&key_path, &key)?;
            #[cfg(unix)]
            std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))?;
            tracing::info!(path = %key_path.display(), "Generated new secret encryption key");
            key
        };

        anyhow::ensure!(
            key_bytes.len() == Self::KEY_LEN,
            "secret key file must hold {} bytes, found {}",
            Self::KEY_LEN,
            key_bytes.len()
        );
        Ok(Self { key_bytes })
    }

    fn key(&self) -> Result<LessSafeKey> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.key_bytes)
            .map_err(|_| anyhow::anyhow!("Invalid encryption key"))?;
        Ok(LessSafeKey::new(unbound))
    }

    /// 加密明文，返回 base64(nonce || ciphertext || tag)
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce_bytes = random_bytes::<NONCE_LEN>()?;
        let mut sealed = plaintext.as_bytes().to_vec();
        self.key()?
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut sealed,
            )
            .map_err(|_| anyhow::anyhow!("Encryption failed"))?;

        let mut framed = Vec::with_capacity(NONCE_LEN + sealed.len());
        framed.extend_from_slice(&nonce_bytes);
        framed.extend_from_slice(&sealed);
        Ok(general_purpose::STANDARD.encode(framed))
    }

    /// 解密 [`encrypt`](Self::encrypt) 的输出
    pub fn decrypt(&self, encrypted: &str) -> Result<String> {
        let framed = general_purpose::STANDARD.decode(encrypted)?;
        anyhow::ensure!(
            framed.len() >= NONCE_LEN + aead::AES_256_GCM.tag_len(),
            "encrypted payload too short"
        );

        let (nonce_bytes, ciphertext) = framed.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| anyhow::anyhow!("Invalid nonce"))?;
        let mut buf = ciphertext.to_vec();
        let plaintext = self
            .key()?
            .open_in_place(nonce, Aad::empty(), &mut buf)
            .map_err(|_| anyhow::anyhow!("Decryption failed"))?;
        Ok(String::from_utf8(plaintext.to_vec())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn tokens_are_random_and_long() {
        assert_ne!(generate_token(), generate_token());
        assert!(generate_token().len() > 40);
    }

    #[test]
    fn api_keys_carry_prefix() {
        let key = generate_api_key();
        assert!(key.starts_with(API_KEY_PREFIX));
        assert_eq!(api_key_prefix(&key).len(), 12);
    }

    #[test]
    fn bcrypt_round_trip() {
        let token = generate_token();
        let hash = hash_token(&token).unwrap();
        assert!(verify_token(&token, &hash).unwrap());
        assert!(!verify_token("wrong", &hash).unwrap());
    }

    #[test]
    fn constant_time_eq_compares_exactly() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }

    #[test]
    fn encrypt_then_decrypt_returns_plaintext() {
        let dir = TempDir::new().unwrap();
        let enc = SecretEncryptor::load_or_create(dir.path()).unwrap();
        let secret = generate_token();
        let sealed = enc.encrypt(&secret).unwrap();
        assert_ne!(sealed, secret);
        assert_eq!(enc.decrypt(&sealed).unwrap(), secret);
    }

    #[test]
    fn key_file_is_reused_across_loads() {
        let dir = TempDir::new().unwrap();
        let sealed = SecretEncryptor::load_or_create(dir.path())
            .unwrap()
            .encrypt("whsec-test-123")
            .unwrap();
        let reloaded = SecretEncryptor::load_or_create(dir.path()).unwrap();
        assert_eq!(reloaded.decrypt(&sealed).unwrap(), "whsec-test-123");
    }

    #[test]
    fn decrypting_with_another_key_fails() {
        let dir1 = TempDir::new().unwrap();
        let dir2 = TempDir::new().unwrap();
        let sealed = SecretEncryptor::load_or_create(dir1.path())
            .unwrap()
            .encrypt("whsec-secret")
            .unwrap();
        assert!(SecretEncryptor::load_or_create(dir2.path())
            .unwrap()
            .decrypt(&sealed)
            .is_err());
    }
}
