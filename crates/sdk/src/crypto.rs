//! Hashing, random challenges, secp256k1 signatures and session ciphers

use std::fmt;

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, Iv, KeyIvInit, block_padding::Pkcs7};
use k256::{
    EncodedPoint, PublicKey, SecretKey,
    ecdsa::{
        Signature, SigningKey, VerifyingKey,
        signature::{Signer, Verifier},
    },
};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Error, Result};

type Encryptor = cbc::Encryptor<aes::Aes256>;
type Decryptor = cbc::Decryptor<aes::Aes256>;

/// PBKDF2 rounds applied to the access code when deriving a session key
const PROTOCOL_KEY_ROUNDS: u32 = 50;

/// SHA-256 digest
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Random bytes for challenges and salts
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

/// Verify an ECDSA secp256k1 signature over `message`
///
/// The message is hashed with SHA-256 before verification. The signature is
/// accepted in the 64 byte `r || s` form or DER.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool> {
    let key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| Error::CryptoUtilsError(format!("invalid public key: {e}")))?;
    let signature = Signature::from_slice(signature)
        .or_else(|_| Signature::from_der(signature))
        .map_err(|e| Error::CryptoUtilsError(format!("invalid signature: {e}")))?;
    Ok(key.verify(message, &signature).is_ok())
}

/// secp256k1 key pair
#[derive(Clone, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
pub struct KeyPair {
    #[zeroize(skip)]
    public_key: Vec<u8>,
    private_key: Vec<u8>,
}

impl KeyPair {
    /// Fresh random key pair
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand_v8::thread_rng());
        Self::from_signing_key(&signing_key)
    }

    /// Key pair from a raw private key
    pub fn from_private_key(private_key: &[u8]) -> Result<Self> {
        let signing_key = SigningKey::from_slice(private_key)
            .map_err(|e| Error::CryptoUtilsError(format!("invalid private key: {e}")))?;
        Ok(Self::from_signing_key(&signing_key))
    }

    fn from_signing_key(signing_key: &SigningKey) -> Self {
        let point: EncodedPoint = signing_key.verifying_key().to_encoded_point(false);
        Self {
            public_key: point.as_bytes().to_vec(),
            private_key: signing_key.to_bytes().to_vec(),
        }
    }

    /// Uncompressed public key
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub(crate) fn private_key_bytes(&self) -> &[u8] {
        &self.private_key
    }

    /// Sign `message` (hashed with SHA-256), returning `r || s`
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signing_key = SigningKey::from_slice(&self.private_key)
            .map_err(|e| Error::CryptoUtilsError(format!("invalid private key: {e}")))?;
        let signature: Signature = signing_key.sign(message);
        Ok(signature.to_bytes().to_vec())
    }
}

/// ISO 14443-A frame checksum, low byte first
pub fn crc16(data: &[u8]) -> [u8; 2] {
    let mut crc: u16 = 0x6363;
    for &byte in data {
        let mut b = byte ^ (crc & 0xFF) as u8;
        b ^= b << 4;
        let b = u16::from(b);
        crc = (crc >> 8) ^ (b << 8) ^ (b << 3) ^ (b >> 4);
    }
    crc.to_le_bytes()
}

/// x coordinate of the secp256k1 point shared by `private_key` and `public_key`
pub fn ecdh(private_key: &[u8], public_key: &[u8]) -> Result<[u8; 32]> {
    let private = SecretKey::from_slice(private_key)
        .map_err(|e| Error::CryptoUtilsError(format!("invalid private key: {e}")))?;
    let public = PublicKey::from_sec1_bytes(public_key)
        .map_err(|e| Error::CryptoUtilsError(format!("invalid public key: {e}")))?;
    let shared = k256::ecdh::diffie_hellman(private.to_nonzero_scalar(), public.as_affine());
    let mut secret = [0u8; 32];
    secret.copy_from_slice(shared.raw_secret_bytes());
    Ok(secret)
}

/// AES-256 key of an encrypted session
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; 32]);

impl SessionKey {
    /// Derive the key from the handshake secret
    ///
    /// The access code digest is stretched with PBKDF2-HMAC-SHA256 salted by
    /// the card uid, and the result is hashed together with `secret`.
    pub fn derive(secret: &[u8], access_code_hash: &[u8], uid: &[u8]) -> Self {
        let mut protocol_key = [0u8; 32];
        pbkdf2_hmac::<Sha256>(access_code_hash, uid, PROTOCOL_KEY_ROUNDS, &mut protocol_key);
        let key = Sha256::new()
            .chain_update(secret)
            .chain_update(protocol_key)
            .finalize()
            .into();
        protocol_key.zeroize();
        Self(key)
    }

    /// AES-256-CBC with PKCS#7 padding and a zero IV
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let len = data.len();
        let mut buffer = data.to_vec();
        buffer.resize(len + 16 - len % 16, 0);
        let encrypted = Encryptor::new((&self.0).into(), &Iv::<Encryptor>::default())
            .encrypt_padded_mut::<Pkcs7>(&mut buffer, len)
            .map_err(|e| Error::CryptoUtilsError(format!("encryption failed: {e}")))?;
        Ok(encrypted.to_vec())
    }

    /// Inverse of [`encrypt`](Self::encrypt)
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut buffer = data.to_vec();
        let decrypted = Decryptor::new((&self.0).into(), &Iv::<Decryptor>::default())
            .decrypt_padded_mut::<Pkcs7>(&mut buffer)
            .map_err(|e| Error::CryptoUtilsError(format!("decryption failed: {e}")))?;
        Ok(decrypted.to_vec())
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(&self.public_key))
            .finish_non_exhaustive()
    }
}
