use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use sha2::{Digest, Sha256};

use crate::core::{ShardingError, Value};
use super::algorithm::Props;

/// Value transformer for encrypted columns.
pub trait Encryptor: Send + Sync + Debug {
    fn encrypt(&self, plain: &Value) -> Result<Value, ShardingError>;

    fn decrypt(&self, cipher: &Value) -> Result<Value, ShardingError>;

    fn type_name(&self) -> &'static str;
}

const NONCE_LEN: usize = 12;

/// AES-256-GCM with a nonce derived from the key and the plaintext.
///
/// Equal plaintexts produce equal ciphertexts, which keeps `=` and `IN` predicates usable
/// against the cipher column. Output is hex of `nonce || ciphertext || tag`.
pub struct AesEncryptor {
    key: [u8; 32],
    cipher: Aes256Gcm,
}

impl Debug for AesEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesEncryptor").field("key", &"[REDACTED]").finish()
    }
}

impl AesEncryptor {
    pub fn new(passphrase: &str) -> Result<Self, ShardingError> {
        if passphrase.is_empty() {
            return Err(ShardingError::Config("aes-key-value must not be empty".to_string()));
        }
        let key: [u8; 32] = Sha256::digest(passphrase.as_bytes()).into();
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| ShardingError::Config(format!("Invalid AES key: {e}")))?;
        Ok(Self { key, cipher })
    }

    pub fn from_props(props: &Props) -> Result<Self, ShardingError> {
        let passphrase = props
            .get("aes-key-value")
            .ok_or_else(|| ShardingError::Config("Missing algorithm property 'aes-key-value'".to_string()))?;
        Self::new(passphrase)
    }

    fn nonce_for(&self, plaintext: &[u8]) -> [u8; NONCE_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(self.key);
        hasher.update(plaintext);
        let digest = hasher.finalize();
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&digest[..NONCE_LEN]);
        nonce
    }
}

impl Encryptor for AesEncryptor {
    fn encrypt(&self, plain: &Value) -> Result<Value, ShardingError> {
        if plain.is_null() {
            return Ok(Value::Null);
        }
        let plaintext = plain.to_string();
        let nonce = self.nonce_for(plaintext.as_bytes());
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| ShardingError::Encrypt(format!("AES encryption failed: {e}")))?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(Value::Text(hex::encode(out)))
    }

    fn decrypt(&self, cipher: &Value) -> Result<Value, ShardingError> {
        let text = match cipher {
            Value::Null => return Ok(Value::Null),
            Value::Text(s) => s,
            other => return Err(ShardingError::Encrypt(format!("Cipher value must be text, got {other}"))),
        };
        let bytes = hex::decode(text).map_err(|e| ShardingError::Encrypt(format!("Cipher is not hex: {e}")))?;
        if bytes.len() <= NONCE_LEN {
            return Err(ShardingError::Encrypt("Cipher value too short".to_string()));
        }
        let (nonce, body) = bytes.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|e| ShardingError::Encrypt(format!("AES decryption failed: {e}")))?;
        String::from_utf8(plain)
            .map(Value::Text)
            .map_err(|e| ShardingError::Encrypt(format!("Decrypted value is not UTF-8: {e}")))
    }

    fn type_name(&self) -> &'static str {
        "AES"
    }
}

/// One-way hex SHA-256 digest, meant for assisted query columns.
#[derive(Debug)]
pub struct Sha256Encryptor;

impl Encryptor for Sha256Encryptor {
    fn encrypt(&self, plain: &Value) -> Result<Value, ShardingError> {
        if plain.is_null() {
            return Ok(Value::Null);
        }
        Ok(Value::Text(hex::encode(Sha256::digest(plain.to_string().as_bytes()))))
    }

    fn decrypt(&self, cipher: &Value) -> Result<Value, ShardingError> {
        Ok(cipher.clone())
    }

    fn type_name(&self) -> &'static str {
        "SHA256"
    }
}

/// Physical layout of one encrypted logical column.
#[derive(Debug, Clone)]
pub struct EncryptColumn {
    pub logic_column: String,
    pub cipher_column: String,
    pub plain_column: Option<String>,
    pub assisted_query_column: Option<String>,
    pub encryptor: Arc<dyn Encryptor>,
    pub assisted_query_encryptor: Option<Arc<dyn Encryptor>>,
}

impl EncryptColumn {
    /// Column and encryptor used to evaluate equality predicates.
    #[must_use]
    pub fn query_column(&self) -> (&str, &dyn Encryptor) {
        match (&self.assisted_query_column, &self.assisted_query_encryptor) {
            (Some(column), Some(encryptor)) => (column, encryptor.as_ref()),
            _ => (&self.cipher_column, self.encryptor.as_ref()),
        }
    }

    /// Physical columns an assignment to this column writes, in order
    /// cipher, assisted query, plain.
    #[must_use]
    pub fn physical_columns(&self) -> Vec<&str> {
        let mut columns = vec![self.cipher_column.as_str()];
        if self.assisted_query_column.is_some() && self.assisted_query_encryptor.is_some() {
            columns.extend(self.assisted_query_column.as_deref());
        }
        columns.extend(self.plain_column.as_deref());
        columns
    }

    /// Values matching `physical_columns` for one plaintext.
    pub fn physical_values(&self, plain: &Value) -> Result<Vec<Value>, ShardingError> {
        let mut values = vec![self.encryptor.encrypt(plain)?];
        if let (Some(_), Some(encryptor)) = (&self.assisted_query_column, &self.assisted_query_encryptor) {
            values.push(encryptor.encrypt(plain)?);
        }
        if self.plain_column.is_some() {
            values.push(plain.clone());
        }
        Ok(values)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EncryptTable {
    columns: HashMap<String, EncryptColumn>,
}

impl EncryptTable {
    pub fn add_column(&mut self, column: EncryptColumn) {
        self.columns.insert(column.logic_column.to_lowercase(), column);
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&EncryptColumn> {
        self.columns.get(&name.to_lowercase())
    }
}

/// Encrypted columns per logical table.
#[derive(Debug, Clone, Default)]
pub struct EncryptRule {
    tables: HashMap<String, EncryptTable>,
}

impl EncryptRule {
    pub fn add_table(&mut self, table: &str, rule: EncryptTable) {
        self.tables.insert(table.to_lowercase(), rule);
    }

    #[must_use]
    pub fn find_column(&self, table: &str, column: &str) -> Option<&EncryptColumn> {
        self.tables.get(&table.to_lowercase()).and_then(|t| t.column(column))
    }

    #[must_use]
    pub fn contains_table(&self, table: &str) -> bool {
        self.tables.contains_key(&table.to_lowercase())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aes_is_deterministic_and_reversible() {
        let encryptor = AesEncryptor::new("123456abc").unwrap();
        let plain = Value::Text("13800000000".to_string());
        let first = encryptor.encrypt(&plain).unwrap();
        let second = encryptor.encrypt(&plain).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, plain);
        assert_eq!(encryptor.decrypt(&first).unwrap(), plain);
        assert_eq!(encryptor.encrypt(&Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_aes_rejects_tampered_cipher() {
        let encryptor = AesEncryptor::new("key").unwrap();
        let Value::Text(cipher) = encryptor.encrypt(&Value::Integer(5)).unwrap() else { panic!("text cipher") };
        let mut tampered = cipher.into_bytes();
        let last = tampered.len() - 1;
        tampered[last] = if tampered[last] == b'0' { b'1' } else { b'0' };
        let tampered = Value::Text(String::from_utf8(tampered).unwrap());
        assert!(matches!(encryptor.decrypt(&tampered), Err(ShardingError::Encrypt(_))));
    }

    #[test]
    fn test_physical_layout() {
        let column = EncryptColumn {
            logic_column: "phone".to_string(),
            cipher_column: "phone_cipher".to_string(),
            plain_column: Some("phone_plain".to_string()),
            assisted_query_column: Some("phone_assisted".to_string()),
            encryptor: Arc::new(AesEncryptor::new("k").unwrap()),
            assisted_query_encryptor: Some(Arc::new(Sha256Encryptor)),
        };
        assert_eq!(column.physical_columns(), vec!["phone_cipher", "phone_assisted", "phone_plain"]);
        let values = column.physical_values(&Value::Text("1".to_string())).unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[2], Value::Text("1".to_string()));
        assert_eq!(column.query_column().0, "phone_assisted");
    }
}
