// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Display;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;

use super::StatusBits;
use super::StatusList;
use super::StatusType;
use crate::check_signing_alg;
use crate::jwt::Jwt;
use crate::Clock;
use crate::Error;
use crate::IssuerKeyResolver;
use crate::JsonObject;
use crate::JwsSigner;
use crate::JwsVerifier;
use crate::Result;
use crate::Status;

pub const STATUS_LIST_TYP: &str = "statuslist+jwt";

/// The `status_list` claim of a status list token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusListClaim {
  pub bits: StatusBits,
  /// base64url of the DEFLATE-compressed packed status bytes.
  pub lst: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub aggregation_uri: Option<String>,
}

/// JOSE payload claims of a status list token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusListTokenClaims {
  pub iss: String,
  /// The URI this status list is published at.
  pub sub: String,
  pub iat: i64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub exp: Option<i64>,
  pub status_list: StatusListClaim,
}

/// A signed JWT with header `typ` of `statuslist+jwt`, publishing one
/// generation of a status list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusListToken(Jwt<StatusListTokenClaims>);

impl StatusListToken {
  /// Compresses `list` and signs a status list token through `signer`.
  ///
  /// `sub` must be the URI the token will be published at.
  pub async fn sign<S: JwsSigner>(
    list: &StatusList,
    iss: &str,
    sub: &str,
    iat: i64,
    exp: Option<i64>,
    signer: &S,
    alg: &str,
  ) -> Result<Self> {
    check_signing_alg(alg)?;
    let claims = StatusListTokenClaims {
      iss: iss.to_string(),
      sub: sub.to_string(),
      iat,
      exp,
      status_list: StatusListClaim {
        bits: list.bits(),
        lst: list.to_compressed_b64()?,
        aggregation_uri: list.aggregation_uri().map(ToOwned::to_owned),
      },
    };

    let Value::Object(header) = json!({
      "typ": STATUS_LIST_TYP,
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
    Self::parse(&jws)
  }

  /// Parses a compact JWT into a [`StatusListToken`] without verifying its
  /// signature.
  ///
  /// ## Error
  /// [`Error::InvalidTyp`] when the header `typ` is not `statuslist+jwt`.
  pub fn parse(token: &str) -> Result<Self> {
    let jwt: Jwt<StatusListTokenClaims> = token.parse()?;
    let typ = jwt.typ().unwrap_or_default();
    if typ != STATUS_LIST_TYP {
      return Err(Error::InvalidTyp(typ.to_string()));
    }
    Ok(Self(jwt))
  }

  /// Verifies the token's signature against `public_key` and its expiry
  /// against `clock`.
  pub fn verify<V: JwsVerifier>(
    &self,
    jws_verifier: &V,
    public_key: &JsonObject,
    clock: &dyn Clock,
    clock_skew: i64,
  ) -> Result<()> {
    let alg = self
      .0
      .alg()
      .ok_or_else(|| Error::DeserializationError("status list token header has no `alg`".to_string()))?;
    check_signing_alg(alg)?;
    let signature = self.0.signature()?;
    jws_verifier
      .verify(alg, public_key, self.0.signing_input(), &signature)
      .map_err(|e| Error::SignatureInvalid(e.to_string()))?;

    if let Some(exp) = self.0.claims.exp {
      if clock.now() - clock_skew >= exp {
        return Err(Error::Expired(exp));
      }
    }
    Ok(())
  }

  pub fn header(&self) -> &JsonObject {
    &self.0.header
  }

  pub fn claims(&self) -> &StatusListTokenClaims {
    &self.0.claims
  }

  pub fn as_str(&self) -> &str {
    self.0.as_str()
  }

  pub(crate) fn kid(&self) -> Option<&str> {
    self.0.kid()
  }

  /// Decompresses the embedded status list.
  pub fn status_list(&self) -> Result<StatusList> {
    let claim = &self.0.claims.status_list;
    let mut list = StatusList::from_compressed_b64(claim.bits, &claim.lst)?;
    if let Some(uri) = claim.aggregation_uri.clone() {
      list = list.with_aggregation_uri(uri);
    }
    Ok(list)
  }

  /// The status value stored at `index`.
  pub fn status(&self, index: usize) -> Result<StatusType> {
    self.status_list()?.get(index).map(StatusType::from)
  }
}

impl Display for StatusListToken {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.0.as_str())
  }
}

impl FromStr for StatusListToken {
  type Err = Error;
  fn from_str(s: &str) -> Result<Self> {
    Self::parse(s)
  }
}

/// Fetches the status list token published at a URI, e.g. over HTTP.
/// May suspend; the core never fetches on its own.
#[async_trait]
pub trait StatusTokenResolver: Sync + Send {
  type Error: std::error::Error;

  async fn fetch(&self, uri: &str) -> std::result::Result<String, Self::Error>;
}

/// Resolves a credential's `status` claim to a [`StatusType`].
///
/// The token is fetched through `resolver`, its signing key looked up through
/// `key_resolver` by the token's own `iss`, and its signature and expiry
/// verified before the entry is read.
///
/// Fetch and decode failures surface as [`Error::StatusUnknown`] so callers
/// can decide between fail-open and fail-closed; signature and expiry
/// failures keep their own variants.
pub async fn check_status<R, K, V>(
  status: &Status,
  resolver: &R,
  key_resolver: &K,
  jws_verifier: &V,
  clock: &dyn Clock,
  clock_skew: i64,
) -> Result<StatusType>
where
  R: StatusTokenResolver,
  K: IssuerKeyResolver,
  V: JwsVerifier,
{
  let uri = &status.status_list.uri;
  let raw_token = resolver
    .fetch(uri)
    .await
    .map_err(|e| Error::StatusUnknown(format!("fetching `{uri}` failed: {e}")))?;
  let token = StatusListToken::parse(&raw_token).map_err(|e| Error::StatusUnknown(e.to_string()))?;

  if token.claims().sub != *uri {
    return Err(Error::StatusUnknown(format!(
      "status list token subject `{}` does not match `{uri}`",
      token.claims().sub
    )));
  }

  let public_key = key_resolver
    .resolve(&token.claims().iss, token.kid())
    .await
    .map_err(|e| Error::StatusUnknown(format!("no key for status list issuer: {e}")))?;
  token.verify(jws_verifier, &public_key, clock, clock_skew)?;

  let list = token
    .status_list()
    .map_err(|e| Error::StatusUnknown(e.to_string()))?;
  list.get(status.status_list.idx).map(StatusType::from)
}
