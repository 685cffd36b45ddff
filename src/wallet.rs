use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use rand::RngCore;
use sha3::{Digest, Keccak256};

use crate::error::AppError;

pub const LOGIN_MESSAGE_PREFIX: &str = "Login nonce: ";

const NONCE_HEX_LEN: usize = 24;

pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_HEX_LEN / 2];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn normalize_address(raw: &str) -> Option<String> {
    let address = raw.trim().to_lowercase();
    let digits = address.strip_prefix("0x")?;
    if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(address)
}

pub fn login_message(nonce: &str) -> String {
    format!("{LOGIN_MESSAGE_PREFIX}{nonce}")
}

pub fn eip191_digest(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n");
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message.as_bytes());
    hasher.finalize().into()
}

pub fn recover_address(message: &str, signature: &str) -> Result<String, AppError> {
    let raw = hex::decode(signature.trim().trim_start_matches("0x"))
        .map_err(|_| AppError::Validation("Invalid signature format".into()))?;
    if raw.len() != 65 {
        return Err(AppError::Validation("Invalid signature format".into()));
    }

    // v is 27/28 in the wire encoding ethers produces, 0/1 from raw signers
    let v = match raw[64] {
        v @ 0..=1 => v,
        v @ 27..=28 => v - 27,
        _ => return Err(AppError::Validation("Invalid signature format".into())),
    };
    let recovery_id = RecoveryId::try_from(v)
        .map_err(|_| AppError::Validation("Invalid signature format".into()))?;
    let signature = Signature::from_slice(&raw[..64])
        .map_err(|_| AppError::Validation("Invalid signature format".into()))?;

    let key = VerifyingKey::recover_from_prehash(&eip191_digest(message), &signature, recovery_id)
        .map_err(|_| AppError::SignatureMismatch)?;

    Ok(address_from_key(&key))
}

pub fn address_from_key(key: &VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::SigningKey;
    use rand::rngs::OsRng;

    use super::*;

    fn sign(key: &SigningKey, message: &str) -> String {
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(&eip191_digest(message))
            .unwrap();
        let mut raw = signature.to_bytes().to_vec();
        raw.push(recovery_id.to_byte() + 27);
        format!("0x{}", hex::encode(raw))
    }

    #[test]
    fn nonce_is_lowercase_hex() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), NONCE_HEX_LEN);
        assert!(nonce.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(nonce, nonce.to_lowercase());
        assert_ne!(nonce, generate_nonce());
    }

    #[test]
    fn normalize_address_lowercases_and_trims() {
        let normalized =
            normalize_address("  0xAbCdEf0123456789aBcDeF0123456789AbCdEf01 ").unwrap();
        assert_eq!(normalized, "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn normalize_address_rejects_malformed() {
        assert!(normalize_address("").is_none());
        assert!(normalize_address("abcdef0123456789abcdef0123456789abcdef01").is_none());
        assert!(normalize_address("0xabcdef").is_none());
        assert!(normalize_address("0xabcdef0123456789abcdef0123456789abcdef0100").is_none());
        assert!(normalize_address("0xzzcdef0123456789abcdef0123456789abcdef01").is_none());
    }

    #[test]
    fn recover_matches_signing_key() {
        let key = SigningKey::random(&mut OsRng);
        let expected = address_from_key(key.verifying_key());
        let message = login_message("f3a1c2d4e5f60718293a4b5c");
        let signature = sign(&key, &message);
        assert_eq!(recover_address(&message, &signature).unwrap(), expected);
    }

    #[test]
    fn recover_accepts_raw_recovery_byte() {
        let key = SigningKey::random(&mut OsRng);
        let expected = address_from_key(key.verifying_key());
        let message = login_message("f3a1c2d4e5f60718293a4b5c");

        let (signature, recovery_id) = key
            .sign_prehash_recoverable(&eip191_digest(&message))
            .unwrap();
        let mut raw = signature.to_bytes().to_vec();
        raw.push(recovery_id.to_byte());
        let encoded = hex::encode(raw);

        assert_eq!(recover_address(&message, &encoded).unwrap(), expected);
    }

    #[test]
    fn recover_on_tampered_message_yields_other_address() {
        let key = SigningKey::random(&mut OsRng);
        let expected = address_from_key(key.verifying_key());
        let signature = sign(&key, &login_message("f3a1c2d4e5f60718293a4b5c"));
        let recovered = recover_address(&login_message("000000000000000000000000"), &signature);
        match recovered {
            Ok(address) => assert_ne!(address, expected),
            Err(AppError::SignatureMismatch) => {}
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    #[test]
    fn recover_rejects_malformed_signatures() {
        let message = login_message("f3a1c2d4e5f60718293a4b5c");
        assert!(matches!(
            recover_address(&message, "not hex"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            recover_address(&message, &format!("0x{}", "ab".repeat(64))),
            Err(AppError::Validation(_))
        ));
        let mut bad_v = "ab".repeat(64);
        bad_v.push_str("1d");
        assert!(matches!(
            recover_address(&message, &bad_v),
            Err(AppError::Validation(_))
        ));
    }
}
