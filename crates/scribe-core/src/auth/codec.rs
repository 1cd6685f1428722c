//! JWT encoding and decoding
//!
//! Stateless: the codec checks signature, issuer, expiry and token type. The
//! revocation check lives in [`super::service::TokenService`].

use super::claims::{unix_now, TokenClaims, TokenType};
use crate::config::{ConfigError, JwtConfig};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

/// Token construction errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Unsupported signing algorithm: {0:?}")]
    UnsupportedAlgorithm(Algorithm),

    #[error("Failed to encode JWT: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
}

/// Why a token failed to decode
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Invalid token format or signature")]
    Malformed,

    #[error("Token has expired")]
    Expired,

    #[error("Expected {expected} token, got {found}")]
    WrongType {
        expected: TokenType,
        found: TokenType,
    },
}

impl DecodeError {
    /// Short label for logs
    pub fn reason(&self) -> &'static str {
        match self {
            DecodeError::Malformed => "invalid",
            DecodeError::Expired => "expired",
            DecodeError::WrongType { .. } => "wrong_type",
        }
    }
}

/// Signs and verifies tokens with a shared HMAC secret
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    issuer: String,
    validation: Validation,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8], algorithm: Algorithm, issuer: &str) -> Result<Self, CodecError> {
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(CodecError::UnsupportedAlgorithm(algorithm));
        }

        let mut validation = Validation::new(algorithm);
        validation.leeway = 0;
        // Expiry is compared against our own clock in `decode_at`
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);
        validation.set_issuer(&[issuer]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm,
            issuer: issuer.to_string(),
            validation,
        })
    }

    pub fn from_config(config: &JwtConfig) -> Result<Self, ConfigError> {
        let algorithm = config.signing_algorithm()?;
        Self::new(config.secret_key.as_bytes(), algorithm, &config.issuer).map_err(|e| {
            ConfigError::Invalid {
                key: "JWT_ALGORITHM".to_string(),
                reason: e.to_string(),
            }
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Serialize and sign claims as a compact JWS
    pub fn encode(&self, claims: &TokenClaims) -> Result<String, CodecError> {
        Ok(encode(
            &Header::new(self.algorithm),
            claims,
            &self.encoding_key,
        )?)
    }

    /// Decode a token, optionally requiring a token type
    pub fn decode(
        &self,
        token: &str,
        expected: Option<TokenType>,
    ) -> Result<TokenClaims, DecodeError> {
        self.decode_at(token, expected, unix_now())
    }

    /// Decode against an explicit clock
    ///
    /// Checks run in order: signature and structure, expiry, then type.
    pub fn decode_at(
        &self,
        token: &str,
        expected: Option<TokenType>,
        now: i64,
    ) -> Result<TokenClaims, DecodeError> {
        let claims = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => DecodeError::Expired,
                _ => DecodeError::Malformed,
            })?;

        if claims.is_expired(now) {
            return Err(DecodeError::Expired);
        }

        match expected {
            Some(expected) if claims.token_type != expected => Err(DecodeError::WrongType {
                expected,
                found: claims.token_type,
            }),
            _ => Ok(claims),
        }
    }

    /// Collapsed form of [`decode`](Self::decode)
    pub fn check(&self, token: &str, expected: Option<TokenType>) -> Option<TokenClaims> {
        self.decode(token, expected).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::{Identity, Role};

    const SECRET: &[u8] = b"codec-test-secret-with-enough-bytes!!";

    fn codec() -> TokenCodec {
        TokenCodec::new(SECRET, Algorithm::HS256, "scribe").unwrap()
    }

    fn claims(token_type: TokenType, now: i64, ttl: u64) -> TokenClaims {
        TokenClaims::new(
            &Identity::new(7_i64, "bob", Role::Admin),
            token_type,
            "scribe",
            ttl,
            now,
        )
    }

    #[test]
    fn test_round_trip() {
        let codec = codec();
        let original = claims(TokenType::Access, unix_now(), 60);
        let token = codec.encode(&original).unwrap();

        assert_eq!(token.split('.').count(), 3);
        let decoded = codec.decode(&token, Some(TokenType::Access)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_expiry_boundary() {
        let codec = codec();
        let now = 1_700_000_000;

        let past = TokenClaims {
            expires_at: now - 1,
            ..claims(TokenType::Access, now - 60, 60)
        };
        let token = codec.encode(&past).unwrap();
        assert_eq!(
            codec.decode_at(&token, None, now),
            Err(DecodeError::Expired)
        );

        let future = TokenClaims {
            expires_at: now + 1,
            ..claims(TokenType::Access, now - 60, 60)
        };
        let token = codec.encode(&future).unwrap();
        assert!(codec.decode_at(&token, None, now).is_ok());

        // exp == now is already dead
        assert_eq!(
            codec.decode_at(&token, None, now + 1),
            Err(DecodeError::Expired)
        );
    }

    #[test]
    fn test_wrong_type() {
        let codec = codec();
        let token = codec
            .encode(&claims(TokenType::Refresh, unix_now(), 60))
            .unwrap();

        let err = codec.decode(&token, Some(TokenType::Access)).unwrap_err();
        assert_eq!(
            err,
            DecodeError::WrongType {
                expected: TokenType::Access,
                found: TokenType::Refresh
            }
        );
        assert_eq!(err.reason(), "wrong_type");
        assert!(codec.decode(&token, None).is_ok());
        assert!(codec.check(&token, Some(TokenType::Refresh)).is_some());
    }

    #[test]
    fn test_wrong_secret_and_issuer() {
        let token = codec()
            .encode(&claims(TokenType::Access, unix_now(), 60))
            .unwrap();

        let other = TokenCodec::new(b"another-secret-another-secret-xx", Algorithm::HS256, "scribe")
            .unwrap();
        assert_eq!(other.decode(&token, None), Err(DecodeError::Malformed));

        let other = TokenCodec::new(SECRET, Algorithm::HS256, "elsewhere").unwrap();
        assert_eq!(other.decode(&token, None), Err(DecodeError::Malformed));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let codec = codec();
        for token in ["", "invalid.token.here", "a.b", "not a token at all"] {
            let err = codec.decode(token, None).unwrap_err();
            assert_eq!(err, DecodeError::Malformed);
            assert_eq!(err.reason(), "invalid");
        }
    }

    #[test]
    fn test_missing_or_non_integer_exp_is_malformed() {
        let codec = codec();
        let header = Header::new(Algorithm::HS256);
        let key = EncodingKey::from_secret(SECRET);

        let no_exp = serde_json::json!({
            "user_id": 1, "username": "x", "role": "user", "type": "access",
            "jti": "abc", "iat": 0, "iss": "scribe"
        });
        let token = encode(&header, &no_exp, &key).unwrap();
        assert_eq!(codec.decode(&token, None), Err(DecodeError::Malformed));

        let text_exp = serde_json::json!({
            "user_id": 1, "username": "x", "role": "user", "type": "access",
            "jti": "abc", "iat": 0, "exp": "never", "iss": "scribe"
        });
        let token = encode(&header, &text_exp, &key).unwrap();
        assert_eq!(codec.decode(&token, None), Err(DecodeError::Malformed));
    }

    #[test]
    fn test_rejects_asymmetric_algorithm() {
        assert!(matches!(
            TokenCodec::new(SECRET, Algorithm::RS256, "scribe"),
            Err(CodecError::UnsupportedAlgorithm(Algorithm::RS256))
        ));
    }

    #[test]
    fn test_algorithm_pinned() {
        let token = TokenCodec::new(SECRET, Algorithm::HS512, "scribe")
            .unwrap()
            .encode(&claims(TokenType::Access, unix_now(), 60))
            .unwrap();
        assert_eq!(codec().decode(&token, None), Err(DecodeError::Malformed));
    }
}
