//! Standard Security Handler.
//!
//! Implements the PDF-native password encryption scheme: RC4 (40/128-bit) and
//! AES-128-CBC, versions 1/2/4, revisions 2/3/4. AES-256 (V=5, R=5/6) and the
//! public-key security handler are out of scope — see `DESIGN.md`.
//!
//! PDF Spec: ISO 32000-1:2008, Section 7.6.

use crate::error::{Error, Result};
use crate::object::{Dict, Object};

mod aes;
mod algorithms;
mod handler;
mod rc4;

pub use handler::EncryptionHandler;

/// Cipher used to encrypt strings/streams, after resolving `V`, `R`, and (for
/// `V=4`) the crypt-filter dictionary's `CFM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// RC4, 40-bit key (V=1, R=2).
    Rc4_40,
    /// RC4, key length from `/Length` (V=2, R=3, or a `V2` crypt filter).
    Rc4_128,
    /// AES-128-CBC (V=4, R=4, `AESV2` crypt filter).
    Aes128,
}

impl Algorithm {
    /// Key length in bytes implied by this algorithm alone (before `/Length` overrides it).
    pub fn key_length(&self) -> usize {
        match self {
            Algorithm::Rc4_40 => 5,
            Algorithm::Rc4_128 => 16,
            Algorithm::Aes128 => 16,
        }
    }

    /// Whether this algorithm is AES (affects per-object key salting and IV handling).
    pub fn is_aes(&self) -> bool {
        matches!(self, Algorithm::Aes128)
    }
}

/// A single entry of the `/CF` crypt-filter dictionary (V=4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CryptFilterMethod {
    /// `/CFM /V2` — RC4.
    V2,
    /// `/CFM /AESV2` — AES-128-CBC.
    AesV2,
    /// `/CFM /Identity` or the `Identity` filter name itself — no encryption.
    Identity,
}

impl CryptFilterMethod {
    fn is_aes(self) -> bool {
        matches!(self, CryptFilterMethod::AesV2)
    }
}

/// Parsed `/Encrypt` dictionary.
#[derive(Debug, Clone)]
pub struct EncryptDict {
    /// `/Filter`, expected to be `Standard`.
    pub filter: String,
    /// `/V`: 1, 2, or 4.
    pub version: u32,
    /// `/R`: 2, 3, or 4.
    pub revision: u32,
    /// `/Length` in bits, if present.
    pub length: Option<u32>,
    /// `/O`: 32-byte owner password hash.
    pub owner_password: Vec<u8>,
    /// `/U`: 32-byte user password hash.
    pub user_password: Vec<u8>,
    /// `/P`: permission bits.
    pub permissions: i32,
    /// `/EncryptMetadata`, default true.
    pub encrypt_metadata: bool,
    /// `/StmF` crypt filter name (V=4 only).
    stream_filter: Option<String>,
    /// `/StrF` crypt filter name (V=4 only).
    string_filter: Option<String>,
    /// `/EFF` crypt filter name (V=4 only, for embedded files).
    embedded_filter: Option<String>,
    /// `/CF` crypt filter dictionary, name -> CFM (V=4 only).
    crypt_filters: Vec<(String, CryptFilterMethod)>,
}

impl EncryptDict {
    /// Parse from the `/Encrypt` object resolved out of the trailer.
    pub fn from_object(obj: &Object) -> Result<Self> {
        let dict = obj
            .as_dict()
            .ok_or_else(|| Error::Corrupt("Encrypt entry is not a dictionary".to_string()))?;

        let filter = dict
            .find("Filter")
            .and_then(Object::as_name)
            .ok_or_else(|| Error::Corrupt("Encrypt dictionary missing /Filter".to_string()))?
            .to_string();

        let version = dict
            .find("V")
            .and_then(Object::as_integer)
            .ok_or_else(|| Error::Corrupt("Encrypt dictionary missing /V".to_string()))? as u32;

        let revision = dict
            .find("R")
            .and_then(Object::as_integer)
            .ok_or_else(|| Error::Corrupt("Encrypt dictionary missing /R".to_string()))? as u32;

        let owner_password = dict
            .find("O")
            .and_then(Object::as_string_bytes)
            .ok_or_else(|| Error::Corrupt("Encrypt dictionary missing /O".to_string()))?
            .to_vec();

        let user_password = dict
            .find("U")
            .and_then(Object::as_string_bytes)
            .ok_or_else(|| Error::Corrupt("Encrypt dictionary missing /U".to_string()))?
            .to_vec();

        let permissions = dict
            .find("P")
            .and_then(Object::as_integer)
            .ok_or_else(|| Error::Corrupt("Encrypt dictionary missing /P".to_string()))?
            as i32;

        let length = dict.find("Length").and_then(Object::as_integer).map(|i| i as u32);

        let encrypt_metadata =
            dict.find("EncryptMetadata").and_then(Object::as_bool).unwrap_or(true);

        let stream_filter = dict.find("StmF").and_then(Object::as_name).map(str::to_string);
        let string_filter = dict.find("StrF").and_then(Object::as_name).map(str::to_string);
        let embedded_filter = dict.find("EFF").and_then(Object::as_name).map(str::to_string);

        let crypt_filters = dict
            .find("CF")
            .and_then(Object::as_dict)
            .map(parse_crypt_filters)
            .unwrap_or_default();

        Ok(EncryptDict {
            filter,
            version,
            revision,
            length,
            owner_password,
            user_password,
            permissions,
            encrypt_metadata,
            stream_filter,
            string_filter,
            embedded_filter,
            crypt_filters,
        })
    }

    /// Resolve the top-level algorithm from `V`/`R` (used for V=1/2; V=4 additionally
    /// consults the crypt-filter dictionary per category, see `stream_algorithm`/
    /// `string_algorithm`).
    pub fn algorithm(&self) -> Result<Algorithm> {
        match (self.version, self.revision) {
            (1, 2) => Ok(Algorithm::Rc4_40),
            (2, 3) => Ok(Algorithm::Rc4_128),
            (4, 4) => Ok(Algorithm::Aes128),
            _ => Err(Error::UnsupportedEncryption(format!(
                "V={} R={} (supported: V=1/R=2, V=2/R=3, V=4/R=4)",
                self.version, self.revision
            ))),
        }
    }

    /// Effective key length in bytes (`/Length` overrides the algorithm default).
    pub fn key_length_bytes(&self) -> usize {
        match self.length {
            Some(bits) => (bits / 8) as usize,
            None => match self.version {
                1 => 5,
                _ => 16,
            },
        }
    }

    /// Whether streams are encrypted with AES (V=4 only; V=1/2 are always RC4).
    ///
    /// §9's open question: `StmF`/`StrF`/`EFF` are each independently checked for
    /// presence and for `!= "Identity"` — none gates another's lookup in `/CF`.
    pub(crate) fn stream_uses_aes(&self) -> bool {
        self.version == 4 && self.crypt_filter_method(self.stream_filter.as_deref()).is_aes()
    }

    pub(crate) fn string_uses_aes(&self) -> bool {
        self.version == 4 && self.crypt_filter_method(self.string_filter.as_deref()).is_aes()
    }

    /// Whether this crypt-filter name (or its absence) means "don't encrypt".
    fn is_identity(method: CryptFilterMethod) -> bool {
        matches!(method, CryptFilterMethod::Identity)
    }

    fn crypt_filter_method(&self, name: Option<&str>) -> CryptFilterMethod {
        match name {
            None | Some("Identity") => CryptFilterMethod::Identity,
            Some(name) => self
                .crypt_filters
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, m)| *m)
                .unwrap_or(CryptFilterMethod::Identity),
        }
    }

    /// Whether streams should be encrypted at all (false only under `Identity`, V=4).
    pub fn streams_encrypted(&self) -> bool {
        self.version != 4 || !Self::is_identity(self.crypt_filter_method(self.stream_filter.as_deref()))
    }

    /// Whether strings should be encrypted at all (false only under `Identity`, V=4).
    pub fn strings_encrypted(&self) -> bool {
        self.version != 4 || !Self::is_identity(self.crypt_filter_method(self.string_filter.as_deref()))
    }
}

fn parse_crypt_filters(cf: &Dict) -> Vec<(String, CryptFilterMethod)> {
    cf.iter()
        .map(|(name, value)| {
            let method = value
                .as_dict()
                .and_then(|d| d.find("CFM"))
                .and_then(Object::as_name)
                .map(|cfm| match cfm {
                    "V2" => CryptFilterMethod::V2,
                    "AESV2" => CryptFilterMethod::AesV2,
                    _ => CryptFilterMethod::Identity,
                })
                .unwrap_or(CryptFilterMethod::Identity);
            (name.clone(), method)
        })
        .collect()
}

/// User access permissions (`/P` field).
///
/// PDF Spec: Table 22 - User access permissions.
#[derive(Debug, Clone, Copy)]
pub struct Permissions {
    bits: i32,
}

impl Permissions {
    /// Wrap a raw `/P` value.
    pub fn from_bits(bits: i32) -> Self {
        Self { bits }
    }

    /// Printing allowed.
    pub fn can_print(&self) -> bool {
        (self.bits & (1 << 2)) != 0
    }

    /// Modifying the document allowed.
    pub fn can_modify(&self) -> bool {
        (self.bits & (1 << 3)) != 0
    }

    /// Copying text/graphics allowed.
    pub fn can_copy(&self) -> bool {
        (self.bits & (1 << 4)) != 0
    }

    /// Adding/modifying annotations allowed.
    pub fn can_annotate(&self) -> bool {
        (self.bits & (1 << 5)) != 0
    }

    /// Filling form fields allowed (R>=3).
    pub fn can_fill_forms(&self) -> bool {
        (self.bits & (1 << 8)) != 0
    }

    /// Content extraction for accessibility allowed (R>=3).
    pub fn can_extract_accessibility(&self) -> bool {
        (self.bits & (1 << 9)) != 0
    }

    /// Assembling the document allowed (R>=3).
    pub fn can_assemble(&self) -> bool {
        (self.bits & (1 << 10)) != 0
    }

    /// High-quality printing allowed (R>=3).
    pub fn can_print_high_quality(&self) -> bool {
        (self.bits & (1 << 11)) != 0
    }
}

/// Generate a weak, non-cryptographic file ID from a load timestamp and file size.
///
/// §9 Non-goals: file IDs intentionally use a weak digest rather than a
/// cryptographically secure random source — they exist to distinguish file
/// revisions, not to resist adversarial prediction.
pub fn generate_file_id(unix_timestamp_nanos: u128, file_size: u64) -> Vec<u8> {
    use md5::{Digest, Md5};

    let mut hasher = Md5::new();
    hasher.update(unix_timestamp_nanos.to_le_bytes());
    hasher.update(file_size.to_le_bytes());
    hasher.finalize().to_vec()
}
