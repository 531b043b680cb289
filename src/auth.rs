//! Wallet authentication
//!
//! Nonce-challenge login: the server issues a one-time random nonce, the
//! wallet signs a deterministic message embedding it (EIP-191 personal
//! sign), and a successful verification mints a stateless HMAC-signed
//! session token. Nothing about a session is stored server-side; the token
//! signature plus expiry is the whole credential.

use crate::{
    config::GameRules,
    errors::{CoreError, CoreResult},
    store::KvStore,
};
use hmac::{Hmac, Mac};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sha3::{Digest, Keccak256};
use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::info;

type HmacSha256 = Hmac<Sha256>;

/// `0x` + 40 hex chars.
pub fn is_valid_wallet(wallet: &str) -> bool {
    wallet.len() == 42
        && wallet.starts_with("0x")
        && wallet[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

/// Challenge returned by nonce issuance.
#[derive(Debug, Clone, Serialize)]
pub struct NonceGrant {
    pub nonce: String,
    pub message: String,
}

/// Minted bearer credential.
#[derive(Debug, Clone, Serialize)]
pub struct SessionGrant {
    pub token: String,
    pub wallet: String,
    pub expires_at: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenPayload {
    wallet: String,
    iat: u64,
    exp: u64,
}

/// Nonce issuance, signature verification and session-token minting.
pub struct Authenticator {
    store: Arc<KvStore>,
    rules: GameRules,
    secret: Vec<u8>,
}

impl Authenticator {
    pub fn new(store: Arc<KvStore>, rules: GameRules, secret: Vec<u8>) -> Self {
        Self {
            store,
            rules,
            secret,
        }
    }

    /// Issue a fresh 256-bit nonce for `wallet`, overwriting any prior one.
    pub fn issue_nonce(&self, wallet: &str) -> CoreResult<NonceGrant> {
        let wallet = normalize_wallet(wallet)?;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let nonce = hex::encode(bytes);

        self.store.set_string(
            &nonce_key(&wallet),
            &nonce,
            Some(self.rules.nonce_ttl()),
        );
        Ok(NonceGrant {
            message: sign_message(&nonce),
            nonce,
        })
    }

    /// Atomic read-then-delete; a nonce can be consumed exactly once.
    pub fn consume_nonce(&self, wallet: &str) -> CoreResult<String> {
        let wallet = normalize_wallet(wallet)?;
        self.store
            .take_string(&nonce_key(&wallet))
            .ok_or_else(|| CoreError::NotFound("nonce expired or missing".to_string()))
    }

    /// Exchange a signature over the challenge message for a session token.
    pub fn login(&self, wallet: &str, signature: &str) -> CoreResult<SessionGrant> {
        let wallet = normalize_wallet(wallet)?;
        let nonce = self.consume_nonce(&wallet)?;
        let message = sign_message(&nonce);

        let recovered = recover_signer(&message, signature)?;
        if recovered != wallet {
            return Err(CoreError::Unauthenticated(
                "signature does not match wallet".to_string(),
            ));
        }

        info!(wallet = %wallet, "wallet login verified");
        self.mint_token_at(&wallet, unix_now())
    }

    fn mint_token_at(&self, wallet: &str, now: u64) -> CoreResult<SessionGrant> {
        let payload = TokenPayload {
            wallet: wallet.to_string(),
            iat: now,
            exp: now + self.rules.session_ttl_secs,
        };
        let encoded = hex::encode(serde_json::to_vec(&payload)?);
        let mac = self.mac_hex(encoded.as_bytes())?;
        Ok(SessionGrant {
            token: format!("{}.{}", encoded, mac),
            wallet: wallet.to_string(),
            expires_at: payload.exp,
        })
    }

    /// Verify signature (constant-time) and expiry; returns the wallet.
    pub fn verify(&self, token: &str) -> CoreResult<String> {
        self.verify_at(token, unix_now())
    }

    fn verify_at(&self, token: &str, now: u64) -> CoreResult<String> {
        let unauthenticated =
            || CoreError::Unauthenticated("invalid or expired session token".to_string());

        let (encoded, mac_hex) = token.split_once('.').ok_or_else(unauthenticated)?;
        let mac_bytes = hex::decode(mac_hex).map_err(|_| unauthenticated())?;

        let mut mac = self.mac()?;
        mac.update(encoded.as_bytes());
        // verify_slice rejects wrong-length tags and compares in constant time
        mac.verify_slice(&mac_bytes).map_err(|_| unauthenticated())?;

        let payload_bytes = hex::decode(encoded).map_err(|_| unauthenticated())?;
        let payload: TokenPayload =
            serde_json::from_slice(&payload_bytes).map_err(|_| unauthenticated())?;

        if payload.exp <= now || payload.wallet.is_empty() {
            return Err(unauthenticated());
        }
        Ok(payload.wallet.to_lowercase())
    }

    /// `verify` plus a case-insensitive match against the wallet a request
    /// body claims to act for. Blocks cross-wallet impersonation.
    pub fn verify_for_wallet(&self, token: &str, claimed_wallet: &str) -> CoreResult<String> {
        let wallet = self.verify(token)?;
        if wallet != claimed_wallet.to_lowercase() {
            return Err(CoreError::Unauthenticated(
                "token wallet does not match request wallet".to_string(),
            ));
        }
        Ok(wallet)
    }

    fn mac(&self) -> CoreResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| CoreError::Internal(format!("hmac init failed: {}", e)))
    }

    fn mac_hex(&self, data: &[u8]) -> CoreResult<String> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    #[cfg(test)]
    pub(crate) fn mint_for_tests(&self, wallet: &str, now: u64) -> SessionGrant {
        self.mint_token_at(wallet, now).unwrap()
    }
}

fn nonce_key(wallet: &str) -> String {
    format!("nonce:{}", wallet)
}

fn normalize_wallet(wallet: &str) -> CoreResult<String> {
    if !is_valid_wallet(wallet) {
        return Err(CoreError::validation("invalid wallet address"));
    }
    Ok(wallet.to_lowercase())
}

/// The exact text a wallet signs. Deterministic so the server can rebuild
/// it from the stored nonce during login.
pub fn sign_message(nonce: &str) -> String {
    format!(
        "Sign this message to login to The Scratch Game.\n\nNonce: {}\n\nThis does not cost any gas.",
        nonce
    )
}

/// EIP-191 personal-sign digest: keccak256("\x19Ethereum Signed Message:\n"
/// + len + message).
fn personal_sign_digest(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()));
    hasher.update(message.as_bytes());
    hasher.finalize().into()
}

/// Recover the lowercased signer address from a 65-byte r‖s‖v signature.
fn recover_signer(message: &str, signature: &str) -> CoreResult<String> {
    let invalid = || CoreError::Unauthenticated("invalid signature".to_string());

    let raw = hex::decode(signature.trim_start_matches("0x")).map_err(|_| invalid())?;
    if raw.len() != 65 {
        return Err(invalid());
    }

    let mut sig = Signature::from_slice(&raw[..64]).map_err(|_| invalid())?;
    let mut v = raw[64];
    if v >= 27 {
        v -= 27;
    }
    // Canonicalize high-s signatures; the recovery parity flips with s.
    if let Some(normalized) = sig.normalize_s() {
        sig = normalized;
        v ^= 1;
    }
    let recovery_id = RecoveryId::try_from(v).map_err(|_| invalid())?;

    let digest = personal_sign_digest(message);
    let key = VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id)
        .map_err(|_| invalid())?;
    Ok(address_of(&key))
}

/// Ethereum address of a public key: last 20 bytes of keccak256(pubkey).
fn address_of(key: &VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    let mut hasher = Keccak256::new();
    hasher.update(&point.as_bytes()[1..]);
    let hash = hasher.finalize();
    format!("0x{}", hex::encode(&hash[12..]))
}

/// Equality for presented credentials without data-dependent timing: both
/// sides are run through a fixed-key MAC and the tags are compared with the
/// MAC's own constant-time verifier.
pub fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    let mac_of = |bytes: &[u8]| -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(b"credential-compare").ok()?;
        mac.update(bytes);
        Some(mac)
    };
    match (mac_of(left), mac_of(right)) {
        (Some(l), Some(r)) => {
            let tag = l.finalize().into_bytes();
            r.verify_slice(&tag).is_ok()
        }
        _ => false,
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
