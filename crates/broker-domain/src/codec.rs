// codec.rs
//
// Codec simétrico autenticado para los facets sensibles de la instancia.
// Formato del blob: version(1) || key_id(4) || nonce(12) || ciphertext+tag.
// La cabecera (version + key_id) se liga como datos asociados del AEAD.
use crate::errors::CodecError;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::Aes256Gcm;
use sha2::{Digest, Sha256};

/// Variable de entorno con la clave AES-256 (exactamente 32 bytes).
pub const CODEC_KEY_ENV: &str = "CRYPTO_AES256_KEY";

const FORMAT_VERSION: u8 = 1;
const KEY_ID_LEN: usize = 4;
const HEADER_LEN: usize = 1 + KEY_ID_LEN;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Contrato del codec: cifrado/descifrado de payloads opacos.
///
/// `decrypt` nunca devuelve datos parciales: cualquier blob truncado,
/// alterado o cifrado con otra clave produce `CodecError::Integrity`.
pub trait Codec: Send + Sync {
  fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError>;
  fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// Implementación AES-256-GCM con nonce aleatorio por mensaje.
pub struct Aes256GcmCodec {
  cipher: Aes256Gcm,
  key_id: [u8; KEY_ID_LEN],
}

impl Aes256GcmCodec {
  pub const KEY_LEN: usize = 32;

  pub fn new(key: &[u8]) -> Result<Self, CodecError> {
    if key.len() != Self::KEY_LEN {
      return Err(CodecError::InvalidKey(format!("se esperaban {} bytes, se recibieron {}", Self::KEY_LEN, key.len())));
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| CodecError::InvalidKey(e.to_string()))?;
    let digest = Sha256::digest(key);
    let mut key_id = [0u8; KEY_ID_LEN];
    key_id.copy_from_slice(&digest[..KEY_ID_LEN]);
    Ok(Self { cipher, key_id })
  }

  fn header(&self) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0] = FORMAT_VERSION;
    header[1..].copy_from_slice(&self.key_id);
    header
  }
}

impl std::fmt::Debug for Aes256GcmCodec {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    // nunca imprimir material de clave
    f.debug_struct("Aes256GcmCodec").field("key_id", &self.key_id).finish()
  }
}

impl Codec for Aes256GcmCodec {
  fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
    let header = self.header();
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let sealed = self.cipher
                     .encrypt(&nonce, Payload { msg: plaintext, aad: &header })
                     .map_err(|e| CodecError::Cipher(e.to_string()))?;
    let mut out = Vec::with_capacity(HEADER_LEN + NONCE_LEN + sealed.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&sealed);
    Ok(out)
  }

  fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CodecError> {
    if ciphertext.len() < HEADER_LEN + NONCE_LEN + TAG_LEN {
      return Err(CodecError::Integrity(format!("blob truncado ({} bytes)", ciphertext.len())));
    }
    let (header, rest) = ciphertext.split_at(HEADER_LEN);
    if header[0] != FORMAT_VERSION {
      return Err(CodecError::Integrity(format!("versión de formato desconocida: {}", header[0])));
    }
    if header[1..] != self.key_id {
      return Err(CodecError::Integrity("blob cifrado con otra clave".into()));
    }
    let (nonce, sealed) = rest.split_at(NONCE_LEN);
    self.cipher
        .decrypt(GenericArray::from_slice(nonce), Payload { msg: sealed, aad: header })
        .map_err(|_| CodecError::Integrity("autenticación fallida".into()))
  }
}

/// Construye el codec a partir de `CRYPTO_AES256_KEY` (lee `.env` si
/// existe).
pub fn codec_from_env() -> Result<Aes256GcmCodec, CodecError> {
  dotenvy::dotenv().ok();
  let key = std::env::var(CODEC_KEY_ENV).map_err(|_| CodecError::InvalidKey(format!("{} no definida", CODEC_KEY_ENV)))?;
  Aes256GcmCodec::new(key.as_bytes())
}
