//! Payload encryption.
//!
//! The ciphertext is opaque to this crate; only the design-tool plugin that
//! later reads the marker decrypts it. The default [`AesGcmCipher`] derives
//! an AES-256 key from the one-time secret with SHA-256 and emits
//! `base64(nonce || ciphertext)`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Length of the one-time secret.
pub const SECRET_LEN: usize = 32;

const NONCE_SIZE: usize = 12;
const SECRET_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Symmetric cipher keyed by a per-delivery secret.
pub trait Cipher: Send + Sync {
	fn encrypt(&self, plaintext: &[u8], secret: &str) -> Result<String>;

	fn decrypt(&self, ciphertext: &str, secret: &str) -> Result<Vec<u8>>;
}

/// AES-256-GCM with a SHA-256 derived key.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmCipher;

impl AesGcmCipher {
	fn cipher(secret: &str) -> Result<Aes256Gcm> {
		let key = Sha256::digest(secret.as_bytes());
		Aes256Gcm::new_from_slice(&key).map_err(|err| Error::Encryption(err.to_string()))
	}
}

impl Cipher for AesGcmCipher {
	fn encrypt(&self, plaintext: &[u8], secret: &str) -> Result<String> {
		let cipher = Self::cipher(secret)?;

		let mut nonce_bytes = [0u8; NONCE_SIZE];
		rand::rng().fill_bytes(&mut nonce_bytes);
		let ciphertext = cipher
			.encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
			.map_err(|err| Error::Encryption(err.to_string()))?;

		let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
		sealed.extend_from_slice(&nonce_bytes);
		sealed.extend_from_slice(&ciphertext);
		Ok(STANDARD.encode(sealed))
	}

	fn decrypt(&self, ciphertext: &str, secret: &str) -> Result<Vec<u8>> {
		let sealed = STANDARD.decode(ciphertext).map_err(|err| Error::Encryption(format!("invalid ciphertext encoding: {err}")))?;
		if sealed.len() < NONCE_SIZE {
			return Err(Error::Encryption("ciphertext shorter than nonce".into()));
		}
		let (nonce, body) = sealed.split_at(NONCE_SIZE);
		Self::cipher(secret)?
			.decrypt(Nonce::from_slice(nonce), body)
			.map_err(|err| Error::Encryption(err.to_string()))
	}
}

/// Generates a fresh url-safe secret of [`SECRET_LEN`] characters.
pub fn generate_secret() -> String {
	let mut rng = rand::rng();
	(0..SECRET_LEN)
		.map(|_| SECRET_ALPHABET[rng.random_range(0..SECRET_ALPHABET.len())] as char)
		.collect()
}
