//! Token lifecycle and credential verification
//!
//! Tokens move through `issued -> valid -> {expired | revoked}`. The
//! [`TokenCodec`] is stateless and only knows about signatures, expiry and
//! token types; the [`TokenService`] adds the revocation check and is the
//! single gate every protected request goes through.

pub mod claims;
pub mod codec;
pub mod password;
pub mod revocation;
pub mod service;

pub use claims::{Identity, Role, SubjectId, TokenClaims, TokenType};
pub use codec::{CodecError, DecodeError, TokenCodec};
pub use password::{PasswordConfig, PasswordError, PasswordHasher};
pub use revocation::{
    spawn_compaction, MemoryRevocationStore, RedisRevocationStore, RevocationError,
    RevocationStore,
};
pub use service::{TokenPair, TokenService, ValidationError};
