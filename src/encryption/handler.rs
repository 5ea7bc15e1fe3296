//! Encryption handler: password authentication and per-object decryption.

use super::algorithms;
use super::{Algorithm, EncryptDict, Permissions};
use crate::error::{Error, Result};
use crate::object::Object;

/// Authenticated encryption state for one document load.
///
/// Constructed from the `/Encrypt` dictionary and the trailer's `ID[0]`;
/// `authenticate` must succeed before `decrypt_stream`/`decrypt_string` can
/// be called (both return `Error::AuthFailed` otherwise).
#[derive(Debug, Clone)]
pub struct EncryptionHandler {
    dict: EncryptDict,
    file_key: Option<Vec<u8>>,
    id0: Vec<u8>,
    algorithm: Algorithm,
}

impl EncryptionHandler {
    /// Build a handler from the resolved `/Encrypt` object and `ID[0]`.
    pub fn new(encrypt_obj: &Object, id0: Vec<u8>) -> Result<Self> {
        let dict = EncryptDict::from_object(encrypt_obj)?;
        let algorithm = dict.algorithm()?;

        log::info!(
            "encrypted document: V={} R={} algorithm={:?}",
            dict.version,
            dict.revision,
            algorithm
        );

        Ok(Self { dict, file_key: None, id0, algorithm })
    }

    /// Try `password` as both the user and owner password (Algorithm 4/5, then 7).
    /// On success the file encryption key is derived and cached; subsequent
    /// `decrypt_*` calls use it. Matches an empty password against a document
    /// with no user password set, the common case for "owner-protected, everyone
    /// can read" PDFs.
    pub fn authenticate(&mut self, password: &[u8]) -> Result<bool> {
        if let Some(key) = algorithms::authenticate_user_password(
            password,
            &self.dict.user_password,
            &self.dict.owner_password,
            self.dict.permissions,
            &self.id0,
            self.dict.revision,
            self.dict.key_length_bytes(),
            self.dict.encrypt_metadata,
        ) {
            self.file_key = Some(key);
            log::info!("authenticated as user");
            return Ok(true);
        }

        if let Some(key) = algorithms::authenticate_owner_password(
            password,
            &self.dict.owner_password,
            &self.dict.user_password,
            self.dict.permissions,
            &self.id0,
            self.dict.revision,
            self.dict.key_length_bytes(),
            self.dict.encrypt_metadata,
        ) {
            self.file_key = Some(key);
            log::info!("authenticated as owner");
            return Ok(true);
        }

        log::warn!("password authentication failed");
        Ok(false)
    }

    /// Whether `authenticate` has succeeded.
    pub fn is_authenticated(&self) -> bool {
        self.file_key.is_some()
    }

    /// The document's access permissions (`/P`), regardless of which password authenticated.
    pub fn permissions(&self) -> Permissions {
        Permissions::from_bits(self.dict.permissions)
    }

    /// Whether stream payloads are encrypted at all (false under a V=4 `Identity` `StmF`).
    pub fn streams_encrypted(&self) -> bool {
        self.dict.streams_encrypted()
    }

    /// Whether string values are encrypted at all (false under a V=4 `Identity` `StrF`).
    pub fn strings_encrypted(&self) -> bool {
        self.dict.strings_encrypted()
    }

    /// Decrypt a stream payload for object `(obj_num, gen)`.
    pub fn decrypt_stream(&self, data: &[u8], obj_num: u32, gen: u16) -> Result<Vec<u8>> {
        if !self.streams_encrypted() {
            return Ok(data.to_vec());
        }
        let use_aes = matches!(self.algorithm, Algorithm::Aes128) || self.dict.stream_uses_aes();
        self.decrypt(data, obj_num, gen, use_aes)
    }

    /// Decrypt a string value for object `(obj_num, gen)`.
    pub fn decrypt_string(&self, data: &[u8], obj_num: u32, gen: u16) -> Result<Vec<u8>> {
        if !self.strings_encrypted() {
            return Ok(data.to_vec());
        }
        let use_aes = matches!(self.algorithm, Algorithm::Aes128) || self.dict.string_uses_aes();
        self.decrypt(data, obj_num, gen, use_aes)
    }

    fn decrypt(&self, data: &[u8], obj_num: u32, gen: u16, use_aes: bool) -> Result<Vec<u8>> {
        let file_key = self.file_key.as_ref().ok_or(Error::AuthFailed)?;
        let obj_key = per_object_key(file_key, obj_num, gen, use_aes);

        if use_aes {
            if data.len() < 16 {
                return Err(Error::Decode("AES-encrypted payload shorter than IV".to_string()));
            }
            let (iv, ciphertext) = data.split_at(16);
            super::aes::aes128_decrypt(&obj_key[..16], iv, ciphertext)
                .map_err(|e| Error::Decode(format!("AES decryption failed: {}", e)))
        } else {
            Ok(super::rc4::rc4_crypt(&obj_key, data))
        }
    }
}

/// Derive the per-object key: `MD5(file_key || LE24(obj_num) || LE16(gen) || salt)`,
/// truncated to `min(file_key.len() + 5, 16)` bytes. `salt` is `sAlT` for AES, empty for RC4.
fn per_object_key(file_key: &[u8], obj_num: u32, gen: u16, use_aes: bool) -> Vec<u8> {
    use md5::{Digest, Md5};

    let mut hasher = Md5::new();
    hasher.update(file_key);
    hasher.update(&obj_num.to_le_bytes()[..3]);
    hasher.update(gen.to_le_bytes());
    if use_aes {
        hasher.update(b"sAlT");
    }
    let hash = hasher.finalize();

    let key_len = (file_key.len() + 5).min(16);
    hash[..key_len].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Dict;

    fn rc4_handler() -> EncryptionHandler {
        let mut dict = Dict::new();
        dict.insert("Filter", Object::Name("Standard".to_string()));
        dict.insert("V", Object::Integer(2));
        dict.insert("R", Object::Integer(3));
        dict.insert("O", Object::StringLiteral(vec![0u8; 32]));
        dict.insert("U", Object::StringLiteral(vec![0u8; 32]));
        dict.insert("P", Object::Integer(-4));
        let mut handler = EncryptionHandler::new(&Object::Dict(dict), b"fileid".to_vec()).unwrap();
        handler.file_key = Some(vec![0x01, 0x23, 0x45, 0x67, 0x89]);
        handler
    }

    #[test]
    fn test_per_object_key_length_rc4() {
        let key = per_object_key(&[0x01, 0x23, 0x45, 0x67, 0x89], 1, 0, false);
        assert_eq!(key.len(), 10); // (5 + 5).min(16)
    }

    #[test]
    fn test_per_object_key_length_aes_caps_at_16() {
        let key = per_object_key(&[0x01; 16], 1, 0, true);
        assert_eq!(key.len(), 16); // (16 + 5).min(16)
    }

    #[test]
    fn test_per_object_key_varies_with_object_number() {
        let key = [0x01, 0x23, 0x45, 0x67, 0x89];
        let a = per_object_key(&key, 1, 0, false);
        let b = per_object_key(&key, 2, 0, false);
        assert_ne!(a, b);
    }

    #[test]
    fn test_decrypt_without_auth_fails() {
        let mut dict = Dict::new();
        dict.insert("Filter", Object::Name("Standard".to_string()));
        dict.insert("V", Object::Integer(2));
        dict.insert("R", Object::Integer(3));
        dict.insert("O", Object::StringLiteral(vec![0u8; 32]));
        dict.insert("U", Object::StringLiteral(vec![0u8; 32]));
        dict.insert("P", Object::Integer(-4));
        let handler = EncryptionHandler::new(&Object::Dict(dict), b"fileid".to_vec()).unwrap();
        assert!(!handler.is_authenticated());
        assert!(handler.decrypt_stream(b"data", 1, 0).is_err());
    }

    #[test]
    fn test_rc4_decrypt_roundtrip_via_handler() {
        let handler = rc4_handler();
        let obj_key = per_object_key(handler.file_key.as_ref().unwrap(), 3, 0, false);
        let ciphertext = super::super::rc4::rc4_crypt(&obj_key, b"hello world");
        let decrypted = handler.decrypt_stream(&ciphertext, 3, 0).unwrap();
        assert_eq!(decrypted, b"hello world");
    }
}
