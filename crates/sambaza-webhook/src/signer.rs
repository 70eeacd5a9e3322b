use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "X-Sambaza-Signature";

/// Header carrying the event type.
pub const EVENT_HEADER: &str = "X-Sambaza-Event";

/// Sign a payload with the endpoint secret: base64(HMAC-SHA256(secret, body)).
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Verify a signature the way a receiver would.
pub fn verify(secret: &str, body: &[u8], signature: &str) -> bool {
    sambaza_storage::auth::constant_time_eq(&sign(secret, body), signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_is_deterministic_per_secret() {
        let body = br#"{"event":"test.ping"}"#;
        let sig = sign("whsec_1", body);
        assert_eq!(sig, sign("whsec_1", body));
        assert_ne!(sig, sign("whsec_2", body));
    }

    #[test]
    fn verify_round_trip() {
        let body = br#"{"event":"campaign.completed"}"#;
        let sig = sign("whsec_1", body);
        assert!(verify("whsec_1", body, &sig));
        assert!(!verify("whsec_1", b"tampered", &sig));
        assert!(!verify("whsec_other", body, &sig));
    }
}
