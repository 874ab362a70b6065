// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use itertools::Itertools;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;

use crate::check_signing_alg;
use crate::jwt::Jwt;
use crate::Disclosure;
use crate::Error;
use crate::Hasher;
use crate::JsonObject;
use crate::JwsSigner;
use crate::Result;
use crate::SHA_ALG_NAME;

pub const KB_JWT_HEADER_TYP: &str = "kb+jwt";

/// A JWT confirmation (`cnf`) claim as specified in
/// [RFC7800](https://www.rfc-editor.org/rfc/rfc7800.html#section-3).
///
/// Exactly one of an embedded JWK, a JWK Set URL plus key id, or a bare key id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequiredKeyBinding {
  /// Holder public key embedded as a JWK.
  Jwk { jwk: JsonObject },
  /// Reference into a JWK Set.
  Jku { jku: String, kid: String },
  /// Key id of a key known through other means.
  Kid { kid: String },
}

impl RequiredKeyBinding {
  /// Returns the embedded JWK, if this confirmation carries one.
  pub fn jwk(&self) -> Option<&JsonObject> {
    match self {
      Self::Jwk { jwk } => Some(jwk),
      _ => None,
    }
  }
}

/// Claims set for key binding JWT.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeyBindingJwtClaims {
  pub iat: i64,
  pub aud: String,
  pub nonce: String,
  pub sd_hash: String,
  #[serde(flatten)]
  pub properties: BTreeMap<String, Value>,
}

impl KeyBindingJwtClaims {
  /// Creates a new [`KeyBindingJwtClaims`] binding `jwt` and `disclosures`.
  ///
  /// The `sd_hash` is taken over the presentation prefix
  /// `<jwt>~<disclosure 1>~...~<disclosure n>~` exactly as serialized.
  pub fn new(hasher: &dyn Hasher, jwt: &str, disclosures: &[Disclosure], nonce: String, aud: String, iat: i64) -> Self {
    let sd_hash = hasher.encoded_digest(&presentation_prefix(jwt, disclosures));
    Self {
      iat,
      aud,
      nonce,
      sd_hash,
      properties: BTreeMap::new(),
    }
  }
}

/// The presentation bytes a KB-JWT commits to: everything up to and including
/// the `~` that precedes the KB-JWT.
pub(crate) fn presentation_prefix(jwt: &str, disclosures: &[Disclosure]) -> String {
  let disclosures = disclosures.iter().map(ToString::to_string).join("~");
  if disclosures.is_empty() {
    format!("{jwt}~")
  } else {
    format!("{jwt}~{disclosures}~")
  }
}

/// A signed Key Binding JWT with header `typ` of `kb+jwt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindingJwt(Jwt<KeyBindingJwtClaims>);

impl KeyBindingJwt {
  /// Returns a [`KeyBindingJwtBuilder`].
  pub fn builder() -> KeyBindingJwtBuilder {
    KeyBindingJwtBuilder::default()
  }

  pub fn header(&self) -> &JsonObject {
    &self.0.header
  }

  pub fn claims(&self) -> &KeyBindingJwtClaims {
    &self.0.claims
  }

  pub(crate) fn jwt(&self) -> &Jwt<KeyBindingJwtClaims> {
    &self.0
  }

  /// Parses a compact JWS into a [`KeyBindingJwt`].
  ///
  /// ## Error
  /// * [`Error::InvalidTyp`] when the header `typ` is not `kb+jwt`.
  /// * [`Error::UnsupportedAlgorithm`] for `none` or shared-secret algorithms.
  pub fn parse(kb_jwt: &str) -> Result<Self> {
    let jwt: Jwt<KeyBindingJwtClaims> = kb_jwt.parse()?;
    let typ = jwt.typ().unwrap_or_default();
    if typ != KB_JWT_HEADER_TYP {
      return Err(Error::InvalidTyp(typ.to_string()));
    }
    let alg = jwt
      .alg()
      .ok_or_else(|| Error::DeserializationError("KB-JWT header has no `alg`".to_string()))?;
    check_signing_alg(alg)?;
    Ok(Self(jwt))
  }
}

impl Display for KeyBindingJwt {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.0.as_str())
  }
}

impl FromStr for KeyBindingJwt {
  type Err = Error;
  fn from_str(s: &str) -> Result<Self> {
    Self::parse(s)
  }
}

/// Builder structure to create a [`KeyBindingJwt`] for a given SD-JWT presentation.
#[derive(Debug, Default, Clone)]
pub struct KeyBindingJwtBuilder {
  iat: Option<i64>,
  aud: Option<String>,
  nonce: Option<String>,
  properties: BTreeMap<String, Value>,
}

impl KeyBindingJwtBuilder {
  /// Sets the `iat` claim, in seconds since the epoch.
  pub fn iat(mut self, iat: i64) -> Self {
    self.iat = Some(iat);
    self
  }

  /// Sets the `aud` claim to the verifier-chosen audience.
  pub fn aud(mut self, aud: impl Into<String>) -> Self {
    self.aud = Some(aud.into());
    self
  }

  /// Sets the `nonce` claim to the verifier-chosen nonce.
  pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
    self.nonce = Some(nonce.into());
    self
  }

  /// Adds an additional claim to the KB-JWT payload.
  pub fn insert_property(mut self, name: impl Into<String>, value: Value) -> Self {
    self.properties.insert(name.into(), value);
    self
  }

  /// Computes `sd_hash` over the presentation being built and signs the
  /// KB-JWT through `signer` with the holder key.
  ///
  /// `hasher` must implement the hash algorithm named by the SD-JWT's `_sd_alg`.
  pub async fn finish<S: JwsSigner>(
    self,
    presentation: &crate::SdJwtPresentationBuilder,
    hasher: &dyn Hasher,
    alg: &str,
    signer: &S,
  ) -> Result<KeyBindingJwt> {
    let jwt = presentation.jwt_compact();
    let disclosures = presentation.selected_disclosures();
    self.finish_raw(jwt, &disclosures, presentation.sd_alg(), hasher, alg, signer).await
  }

  /// [`KeyBindingJwtBuilder::finish`] over explicit presentation parts.
  pub async fn finish_raw<S: JwsSigner>(
    self,
    jwt: &str,
    disclosures: &[Disclosure],
    sd_alg: Option<&str>,
    hasher: &dyn Hasher,
    alg: &str,
    signer: &S,
  ) -> Result<KeyBindingJwt> {
    check_signing_alg(alg)?;
    let required_alg = sd_alg.unwrap_or(SHA_ALG_NAME);
    if required_alg != hasher.alg_name() {
      return Err(Error::MissingHasher(format!(
        "the provided hasher uses algorithm \"{}\", but algorithm \"{required_alg}\" is required",
        hasher.alg_name()
      )));
    }

    let iat = self.iat.ok_or(Error::MissingClaim("iat"))?;
    let aud = self.aud.ok_or(Error::MissingClaim("aud"))?;
    let nonce = self.nonce.ok_or(Error::MissingClaim("nonce"))?;

    let mut claims = KeyBindingJwtClaims::new(hasher, jwt, disclosures, nonce, aud, iat);
    claims.properties = self.properties;

    let Value::Object(header) = json!({
      "typ": KB_JWT_HEADER_TYP,
      "alg": alg,
    }) else {
      unreachable!();
    };
    let Value::Object(payload) = serde_json::to_value(&claims).map_err(|e| Error::DeserializationError(e.to_string()))?
    else {
      unreachable!();
    };

    let jws = signer
      .sign(&header, &payload)
      .await
      .map_err(|e| Error::JwsSignerFailure(e.to_string()))
      .and_then(|jws_bytes| {
        String::from_utf8(jws_bytes).map_err(|_| Error::JwsSignerFailure("signer returned invalid UTF-8".to_string()))
      })?;

    KeyBindingJwt::parse(&jws)
  }
}

#[cfg(test)]
mod test {
  use serde_json::json;

  use super::presentation_prefix;
  use super::KeyBindingJwtClaims;
  use super::RequiredKeyBinding;
  use crate::Disclosure;
  use crate::Hasher;
  use crate::Sha256Hasher;

  #[test]
  fn cnf_serialization_shapes() {
    let jwk: RequiredKeyBinding = serde_json::from_value(json!({"jwk": {"kty": "EC", "crv": "P-256"}})).unwrap();
    assert!(matches!(jwk, RequiredKeyBinding::Jwk { .. }));
    let jku: RequiredKeyBinding =
      serde_json::from_value(json!({"jku": "https://example.com/keys", "kid": "key-1"})).unwrap();
    assert!(matches!(jku, RequiredKeyBinding::Jku { .. }));
    let kid: RequiredKeyBinding = serde_json::from_value(json!({"kid": "key-1"})).unwrap();
    assert!(matches!(kid, RequiredKeyBinding::Kid { .. }));
  }

  #[test]
  fn sd_hash_covers_exact_prefix() {
    let disclosure = Disclosure::new("lklxF5jMYlGTPUovMNIvCA".to_owned(), None, "US".to_owned().into()).unwrap();
    let prefix = presentation_prefix("a.b.c", std::slice::from_ref(&disclosure));
    assert_eq!(prefix, format!("a.b.c~{}~", disclosure.as_str()));

    let hasher = Sha256Hasher::new();
    let claims = KeyBindingJwtClaims::new(
      &hasher,
      "a.b.c",
      std::slice::from_ref(&disclosure),
      "nonce-1".to_string(),
      "https://verifier.example.com".to_string(),
      1683000000,
    );
    assert_eq!(claims.sd_hash, hasher.encoded_digest(&prefix));
  }

  #[test]
  fn prefix_without_disclosures() {
    assert_eq!(presentation_prefix("a.b.c", &[]), "a.b.c~");
  }
}
