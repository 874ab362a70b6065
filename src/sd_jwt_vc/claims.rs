// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::ops::Deref;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use super::Status;
use crate::Disclosure;
use crate::Error;
use crate::Result;
use crate::SdJwtClaims;

/// JOSE payload claims for SD-JWT VC.
///
/// The registered claims are plain payload properties; none of them may be
/// selectively disclosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct SdJwtVcClaims {
  /// Issuer of the verifiable credential.
  pub iss: String,
  /// Not before.
  /// See [RFC7519 section 4.1.5](https://www.rfc-editor.org/rfc/rfc7519.html#section-4.1.5) for more information.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub nbf: Option<i64>,
  /// Expiration.
  /// See [RFC7519 section 4.1.4](https://www.rfc-editor.org/rfc/rfc7519.html#section-4.1.4) for more information.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub exp: Option<i64>,
  /// Verifiable credential type.
  /// See [SD-JWT VC specification](https://www.ietf.org/archive/id/draft-ietf-oauth-sd-jwt-vc-13.html#name-verifiable-credential-type-)
  /// for more information.
  pub vct: String,
  /// Token's status.
  /// See [OAuth status list specification](https://datatracker.ietf.org/doc/html/draft-ietf-oauth-status-list-02)
  /// for more information.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<Status>,
  /// Issued at.
  /// See [RFC7519 section 4.1.6](https://www.rfc-editor.org/rfc/rfc7519.html#section-4.1.6) for more information.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub iat: Option<i64>,
  /// Subject.
  /// See [RFC7519 section 4.1.2](https://www.rfc-editor.org/rfc/rfc7519.html#section-4.1.2) for more information.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sub: Option<String>,
  #[serde(flatten)]
  pub(crate) sd_jwt_claims: SdJwtClaims,
}

impl Deref for SdJwtVcClaims {
  type Target = SdJwtClaims;
  fn deref(&self) -> &Self::Target {
    &self.sd_jwt_claims
  }
}

impl SdJwtVcClaims {
  pub(crate) fn try_from_sd_jwt_claims(mut claims: SdJwtClaims, disclosures: &[Disclosure]) -> Result<Self> {
    let check_disclosed = |claim_name: &'static str| {
      disclosures
        .iter()
        .any(|disclosure| disclosure.claim_name.as_deref() == Some(claim_name))
        .then_some(Error::DisclosedClaim(claim_name))
    };
    let iss = claims
      .remove("iss")
      .ok_or(Error::MissingClaim("iss"))
      .map_err(|e| check_disclosed("iss").unwrap_or(e))
      .and_then(|value| {
        value
          .as_str()
          .map(ToOwned::to_owned)
          .ok_or_else(|| Error::InvalidClaimValue {
            name: "iss",
            expected: "String",
            found: value,
          })
      })?;
    let nbf = {
      if let Some(value) = claims.remove("nbf") {
        value
          .as_i64()
          .ok_or_else(|| Error::InvalidClaimValue {
            name: "nbf",
            expected: "unix timestamp",
            found: value,
          })
          .map(Some)?
      } else {
        if let Some(err) = check_disclosed("nbf") {
          return Err(err);
        }
        None
      }
    };
    let exp = {
      if let Some(value) = claims.remove("exp") {
        value
          .as_i64()
          .ok_or_else(|| Error::InvalidClaimValue {
            name: "exp",
            expected: "unix timestamp",
            found: value,
          })
          .map(Some)?
      } else {
        if let Some(err) = check_disclosed("exp") {
          return Err(err);
        }
        None
      }
    };
    let vct = claims
      .remove("vct")
      .ok_or(Error::MissingClaim("vct"))
      .map_err(|e| check_disclosed("vct").unwrap_or(e))
      .and_then(|value| {
        value
          .as_str()
          .map(ToOwned::to_owned)
          .ok_or_else(|| Error::InvalidClaimValue {
            name: "vct",
            expected: "String",
            found: value,
          })
      })?;
    let status = {
      if let Some(value) = claims.remove("status") {
        serde_json::from_value::<Status>(value.clone())
          .map_err(|_| Error::InvalidClaimValue {
            name: "status",
            expected: "credential's status object",
            found: value,
          })
          .map(Some)?
      } else {
        if let Some(err) = check_disclosed("status") {
          return Err(err);
        }
        None
      }
    };
    let sub = claims
      .remove("sub")
      .map(|value| {
        value
          .as_str()
          .map(ToOwned::to_owned)
          .ok_or_else(|| Error::InvalidClaimValue {
            name: "sub",
            expected: "String",
            found: value,
          })
      })
      .transpose()?;
    let iat = claims
      .remove("iat")
      .map(|value| {
        value.as_i64().ok_or_else(|| Error::InvalidClaimValue {
          name: "iat",
          expected: "unix timestamp",
          found: value,
        })
      })
      .transpose()?;

    Ok(Self {
      iss,
      nbf,
      exp,
      vct,
      status,
      iat,
      sub,
      sd_jwt_claims: claims,
    })
  }
}

impl From<SdJwtVcClaims> for SdJwtClaims {
  fn from(claims: SdJwtVcClaims) -> Self {
    let SdJwtVcClaims {
      iss,
      nbf,
      exp,
      vct,
      status,
      iat,
      sub,
      mut sd_jwt_claims,
    } = claims;

    sd_jwt_claims.insert("iss".to_string(), Value::String(iss));
    nbf.and_then(|t| sd_jwt_claims.insert("nbf".to_string(), Value::Number(t.into())));
    exp.and_then(|t| sd_jwt_claims.insert("exp".to_string(), Value::Number(t.into())));
    sd_jwt_claims.insert("vct".to_string(), Value::String(vct));
    status.and_then(|status| {
      serde_json::to_value(status)
        .ok()
        .and_then(|status| sd_jwt_claims.insert("status".to_string(), status))
    });
    iat.and_then(|t| sd_jwt_claims.insert("iat".to_string(), Value::Number(t.into())));
    sub.and_then(|sub| sd_jwt_claims.insert("sub".to_string(), Value::String(sub)));

    sd_jwt_claims
  }
}
