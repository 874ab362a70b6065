// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

/// Alias for a `Result` with the error type [`Error`].
pub type Result<T> = ::core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error, strum::IntoStaticStr)]
#[non_exhaustive]
pub enum Error {
  #[error("malformed SD-JWT: {0}")]
  InvalidInput(String),

  #[error("invalid disclosure: {0}")]
  InvalidDisclosure(String),

  #[error("claim name `{0}` is reserved")]
  ReservedClaimName(String),

  #[error("algorithm `{0}` is not allowed")]
  UnsupportedAlgorithm(String),

  #[error("JWS signature verification failed: {0}")]
  SignatureInvalid(String),

  #[error("token expired at {0}")]
  Expired(i64),

  #[error("token not valid before {0}")]
  NotYetValid(i64),

  #[error("digest {0} appears multiple times")]
  DuplicateDigest(String),

  #[error("claim {0} of disclosure already exists")]
  ClaimCollision(String),

  #[error("{0} presented disclosures were not referenced by any digest")]
  UnusedDisclosures(usize),

  #[error("a key binding JWT is required but was not provided")]
  MissingKeyBindingJwt,

  #[error("`sd_hash` does not match the presented disclosures")]
  KeyBindingMismatch,

  #[error("key binding JWT signature verification failed: {0}")]
  KeyBindingSignatureInvalid(String),

  #[error("key binding JWT has audience `{found}`, expected `{expected}`")]
  KeyBindingBadAudience { expected: String, found: String },

  #[error("key binding JWT has an unexpected nonce")]
  KeyBindingBadNonce,

  #[error("credential status could not be determined: {0}")]
  StatusUnknown(String),

  #[error("status list was modified concurrently, current etag is `{current_etag}`")]
  ConcurrencyConflict { current_etag: String },

  #[error("no hasher can be specified for the hashing algorithm {0}")]
  MissingHasher(String),

  #[error("`_sd_alg` must be present at the top level of the payload")]
  MissingSdAlg,

  #[error("no key material could be resolved for issuer `{0}`")]
  UnknownIssuer(String),

  #[error("missing required claim `{0}`")]
  MissingClaim(&'static str),

  #[error("claim `{name}` has an invalid value, expected {expected}")]
  InvalidClaimValue {
    name: &'static str,
    expected: &'static str,
    found: serde_json::Value,
  },

  #[error("unexpected `typ` header value `{0}`")]
  InvalidTyp(String),

  #[error("claim `{0}` must not be selectively disclosed")]
  DisclosedClaim(&'static str),

  #[error("invalid status list: {0}")]
  InvalidStatusList(String),

  #[error("data type is not expected: {0}")]
  DataTypeMismatch(String),

  #[error("invalid input")]
  DeserializationError(String),

  #[error("invalid path: {0}")]
  InvalidPath(String),

  #[error("index {0} is out of bounds")]
  IndexOutOfBounds(usize),

  #[error("salt size must be greater or equal 16")]
  InvalidSaltSize,

  #[error("at most {0} decoys may be added per call")]
  TooManyDecoys(usize),

  #[error("array disclosure object contains keys other than `...`")]
  InvalidArrayDisclosureObject,

  #[error("jws signer failure: {0}")]
  JwsSignerFailure(String),
}
