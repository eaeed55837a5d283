//! Challenge-response authentication.

use hex::ToHex;
use sha2::{Digest, Sha256};

use crate::{ApiKey, BUCKET_ID_LENGTH};

/// Returns the response for a challenge-response authentication mechanism (CRAM)
/// code provided by a Databento service: the hex-encoded SHA-256 digest of the
/// challenge concatenated with the key, suffixed with the key's bucket ID.
pub(crate) fn challenge_response(challenge: &str, key: &ApiKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{challenge}|{}", key.as_str()).as_bytes());
    let digest: String = hasher.finalize().encode_hex();
    format!("{digest}-{}", key.bucket_id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_response_literal() {
        let key = ApiKey::new("db-unittestapikey1234567890FFFFF".to_owned()).unwrap();
        let response = challenge_response("abcd1234", &key);
        assert_eq!(
            response,
            "be87ce3d564b64481d4ad1902e2b41b26e3eef62b9de37d87eb4a1d4a5199b6f-FFFFF"
        );
    }

    #[test]
    fn suffix_is_bucket_id() {
        let key = ApiKey::new("db-testtesttesttesttesttestABCDE".to_owned()).unwrap();
        let response = challenge_response("challenge", &key);
        assert!(response.ends_with("-ABCDE"));
        let (digest, bucket) = response.rsplit_once('-').unwrap();
        assert_eq!(bucket.len(), BUCKET_ID_LENGTH);
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
