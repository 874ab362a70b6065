// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde_json::Value;

use crate::check_hash_alg;
use crate::check_signing_alg;
use crate::ct_eq_str;
use crate::Error;
use crate::JsonObject;
use crate::JwsVerifier;
use crate::Result;
use crate::SdJwt;
use crate::SdJwtClaims;
use crate::SdObjectDecoder;
use crate::SHA_ALG_NAME;

/// Caller-supplied time source, in seconds since the Unix epoch.
pub trait Clock: Sync + Send {
  fn now(&self) -> i64;
}

/// A [`Clock`] backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> i64 {
    std::time::SystemTime::now()
      .duration_since(std::time::UNIX_EPOCH)
      .map(|duration| duration.as_secs() as i64)
      .unwrap_or_default()
  }
}

/// Resolves the public key material of an issuer, e.g. from cached metadata or
/// a network lookup. May suspend; the core never fetches on its own.
#[async_trait]
pub trait IssuerKeyResolver: Sync + Send {
  type Error: std::error::Error;

  /// Returns the JWK the issuer `issuer` signs with, narrowed by `kid` when given.
  async fn resolve(&self, issuer: &str, kid: Option<&str>) -> std::result::Result<JsonObject, Self::Error>;
}

/// Checks a verifier applies to a presented SD-JWT beyond its cryptographic
/// validity.
#[derive(Debug, Clone)]
pub struct VerificationPolicy {
  allowed_algs: Vec<String>,
  clock_skew: i64,
  require_key_binding: bool,
  expected_aud: Option<String>,
  expected_nonce: Option<String>,
  allow_default_sd_alg: bool,
}

impl Default for VerificationPolicy {
  fn default() -> Self {
    Self {
      allowed_algs: crate::ALLOWED_SIGNING_ALGORITHMS.iter().map(ToString::to_string).collect(),
      clock_skew: 60,
      require_key_binding: false,
      expected_aud: None,
      expected_nonce: None,
      allow_default_sd_alg: false,
    }
  }
}

impl VerificationPolicy {
  pub fn new() -> Self {
    Self::default()
  }

  /// Narrows the accepted JWS algorithms. Shared-secret algorithms and `none`
  /// stay rejected even if listed here.
  pub fn allowed_algs<I: IntoIterator<Item = impl Into<String>>>(mut self, algs: I) -> Self {
    self.allowed_algs = algs.into_iter().map(Into::into).collect();
    self
  }

  /// Accepted deviation for time-based claims, in seconds.
  pub fn clock_skew(mut self, seconds: i64) -> Self {
    self.clock_skew = seconds;
    self
  }

  /// Requires a valid KB-JWT even when the credential carries no `cnf` claim.
  pub fn require_key_binding(mut self, required: bool) -> Self {
    self.require_key_binding = required;
    self
  }

  /// The audience the KB-JWT must name.
  pub fn expected_aud(mut self, aud: impl Into<String>) -> Self {
    self.expected_aud = Some(aud.into());
    self
  }

  /// The nonce the KB-JWT must carry.
  pub fn expected_nonce(mut self, nonce: impl Into<String>) -> Self {
    self.expected_nonce = Some(nonce.into());
    self
  }

  /// Tolerates a missing `_sd_alg` claim, falling back to sha-256.
  /// Disabled by default; stricter profiles require explicit presence.
  pub fn allow_default_sd_alg(mut self, allowed: bool) -> Self {
    self.allow_default_sd_alg = allowed;
    self
  }
}

/// Outcome of a successful verification.
#[derive(Debug, Clone)]
pub struct VerifiedSdJwt {
  sd_jwt: SdJwt,
  disclosed_object: JsonObject,
  key_binding_verified: bool,
}

impl VerifiedSdJwt {
  pub fn sd_jwt(&self) -> &SdJwt {
    &self.sd_jwt
  }

  /// The reconstructed claims: all presented disclosures substituted, all
  /// concealed digests dropped, `_sd`/`_sd_alg` removed.
  pub fn disclosed_object(&self) -> &JsonObject {
    &self.disclosed_object
  }

  pub fn key_binding_verified(&self) -> bool {
    self.key_binding_verified
  }

  pub fn into_parts(self) -> (SdJwt, JsonObject) {
    (self.sd_jwt, self.disclosed_object)
  }
}

/// Verifies SD-JWT presentations: signature, time window, disclosure
/// reconstruction and key binding.
pub struct SdJwtVerifier<V: JwsVerifier> {
  jws_verifier: V,
  decoder: SdObjectDecoder,
}

impl<V: JwsVerifier> SdJwtVerifier<V> {
  /// Creates a new [`SdJwtVerifier`] with all approved `sha` hashers registered.
  #[cfg(feature = "sha")]
  pub fn new(jws_verifier: V) -> Self {
    Self {
      jws_verifier,
      decoder: SdObjectDecoder::new_with_sha(),
    }
  }

  /// Creates a new [`SdJwtVerifier`] with a custom decoder, e.g. one with
  /// externally provided hashers.
  pub fn new_with_decoder(jws_verifier: V, decoder: SdObjectDecoder) -> Self {
    Self { jws_verifier, decoder }
  }

  /// Verifies a presented SD-JWT end to end.
  ///
  /// Checks run in a fixed order, each with its own error: string shape,
  /// signing algorithm against `policy`, `_sd_alg`, issuer key resolution,
  /// JWS signature over the retained signing input, time window, disclosure
  /// digestion and payload reconstruction, and key binding whenever the
  /// credential carries `cnf` or the policy demands it.
  pub async fn verify<R: IssuerKeyResolver>(
    &self,
    presentation: &str,
    resolver: &R,
    policy: &VerificationPolicy,
    clock: &dyn Clock,
  ) -> Result<VerifiedSdJwt> {
    let sd_jwt = SdJwt::parse(presentation)?;

    // Signing algorithm policy. `none` and `HS*` can never pass.
    let alg = sd_jwt
      .jwt()
      .alg()
      .ok_or_else(|| Error::DeserializationError("JWT header has no `alg`".to_string()))?
      .to_string();
    check_signing_alg(&alg)?;
    if !policy.allowed_algs.iter().any(|allowed| allowed == &alg) {
      return Err(Error::UnsupportedAlgorithm(alg));
    }

    // `_sd_alg` policy.
    match sd_jwt.sd_alg() {
      Some(sd_alg) => check_hash_alg(sd_alg)?,
      None if policy.allow_default_sd_alg => {}
      None => return Err(Error::MissingSdAlg),
    }

    // Resolve the issuer key and verify the JWS over the exact received bytes.
    let iss = sd_jwt
      .claims()
      .get("iss")
      .and_then(Value::as_str)
      .ok_or(Error::MissingClaim("iss"))?
      .to_string();
    let public_key = resolver
      .resolve(&iss, sd_jwt.jwt().kid())
      .await
      .map_err(|e| Error::UnknownIssuer(format!("{iss}: {e}")))?;
    let signature = sd_jwt.jwt().signature()?;
    self
      .jws_verifier
      .verify(&alg, &public_key, sd_jwt.jwt().signing_input(), &signature)
      .map_err(|e| Error::SignatureInvalid(e.to_string()))?;

    let now = clock.now();
    check_time_window(sd_jwt.claims(), now, policy.clock_skew)?;

    // Reconstruct the disclosed view; rejects duplicate digests, claim
    // collisions and unused disclosures.
    let object = serde_json::to_value(sd_jwt.claims()).map_err(|e| Error::DeserializationError(e.to_string()))?;
    let Value::Object(object) = object else {
      unreachable!();
    };
    let disclosed_object = self.decoder.decode(&object, sd_jwt.disclosures())?;

    let key_binding_verified =
      if sd_jwt.required_key_bind().is_some() || policy.require_key_binding || sd_jwt.key_binding_jwt().is_some() {
        self.verify_key_binding(&sd_jwt, policy, now)?;
        true
      } else {
        false
      };

    Ok(VerifiedSdJwt {
      sd_jwt,
      disclosed_object,
      key_binding_verified,
    })
  }

  fn verify_key_binding(&self, sd_jwt: &SdJwt, policy: &VerificationPolicy, now: i64) -> Result<()> {
    let kb_jwt = sd_jwt.key_binding_jwt().ok_or(Error::MissingKeyBindingJwt)?;
    // `typ` was enforced at parse time; the algorithm must also satisfy the
    // verifier's policy.
    let alg = kb_jwt
      .jwt()
      .alg()
      .ok_or_else(|| Error::DeserializationError("KB-JWT header has no `alg`".to_string()))?;
    check_signing_alg(alg)?;
    if !policy.allowed_algs.iter().any(|allowed| allowed == alg) {
      return Err(Error::UnsupportedAlgorithm(alg.to_string()));
    }

    // `sd_hash` must commit to the exact presentation prefix under `_sd_alg`.
    let hasher = self.decoder.hasher_for(sd_jwt.sd_alg().unwrap_or(SHA_ALG_NAME))?;
    let expected_sd_hash = hasher.encoded_digest(&sd_jwt.presentation_prefix());
    if !ct_eq_str(&expected_sd_hash, &kb_jwt.claims().sd_hash) {
      return Err(Error::KeyBindingMismatch);
    }

    if let Some(expected) = policy.expected_aud.as_deref() {
      if kb_jwt.claims().aud != expected {
        return Err(Error::KeyBindingBadAudience {
          expected: expected.to_string(),
          found: kb_jwt.claims().aud.clone(),
        });
      }
    }
    if let Some(expected) = policy.expected_nonce.as_deref() {
      if kb_jwt.claims().nonce != expected {
        return Err(Error::KeyBindingBadNonce);
      }
    }

    let iat = kb_jwt.claims().iat;
    if now + policy.clock_skew < iat {
      return Err(Error::NotYetValid(iat));
    }

    let jwk = sd_jwt
      .required_key_bind()
      .and_then(|cnf| cnf.jwk())
      .ok_or_else(|| {
        Error::KeyBindingSignatureInvalid("the credential does not embed a holder JWK in `cnf`".to_string())
      })?;
    let signature = kb_jwt.jwt().signature()?;
    self
      .jws_verifier
      .verify(alg, jwk, kb_jwt.jwt().signing_input(), &signature)
      .map_err(|e| Error::KeyBindingSignatureInvalid(e.to_string()))?;

    Ok(())
  }
}

fn check_time_window(claims: &SdJwtClaims, now: i64, skew: i64) -> Result<()> {
  if let Some(exp) = claims.get("exp").and_then(Value::as_i64) {
    if now - skew >= exp {
      return Err(Error::Expired(exp));
    }
  }
  if let Some(nbf) = claims.get("nbf").and_then(Value::as_i64) {
    if now + skew < nbf {
      return Err(Error::NotYetValid(nbf));
    }
  }
  if let Some(iat) = claims.get("iat").and_then(Value::as_i64) {
    if now + skew < iat {
      return Err(Error::NotYetValid(iat));
    }
  }
  Ok(())
}
