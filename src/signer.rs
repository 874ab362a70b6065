// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;

use async_trait::async_trait;
use serde_json::Map;
use serde_json::Value;

pub type JsonObject = Map<String, Value>;

/// JWS algorithms this crate will sign with or accept.
///
/// `HS*` (shared-secret) and `none` are rejected unconditionally.
pub const ALLOWED_SIGNING_ALGORITHMS: &[&str] = &[
  "ES256", "ES384", "ES512", "EdDSA", "PS256", "PS384", "PS512", "RS256",
];

/// Returns an error if `alg` is not in [`ALLOWED_SIGNING_ALGORITHMS`].
pub fn check_signing_alg(alg: &str) -> crate::Result<()> {
  if ALLOWED_SIGNING_ALGORITHMS.contains(&alg) {
    Ok(())
  } else {
    Err(crate::Error::UnsupportedAlgorithm(alg.to_string()))
  }
}

/// JSON Web Signature (JWS) Signer.
#[async_trait]
pub trait JwsSigner {
  type Error: Error;
  /// Creates a JWS in compact serialization. The algorithm used for signing must
  /// be read from `header.alg` property.
  async fn sign(&self, header: &JsonObject, payload: &JsonObject) -> Result<Vec<u8>, Self::Error>;
}

/// JSON Web Signature (JWS) verification capability.
///
/// `public_key` is the JWK of the expected signer. Implementations must reject
/// a signature that does not verify under exactly that key and algorithm.
pub trait JwsVerifier {
  type Error: Error;
  fn verify(
    &self,
    alg: &str,
    public_key: &JsonObject,
    signing_input: &[u8],
    signature: &[u8],
  ) -> Result<(), Self::Error>;
}
