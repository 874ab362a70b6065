// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! SD-JWT VC: a thin profile over the SD-JWT core that pins the header `typ`,
//! requires `iss` and `vct`, and wires the credential to a status list entry
//! via the `status` claim.
//!
//! Status checking is compositional: [`VerifiedSdJwtVc::status`] exposes the
//! claim, and [`crate::check_status`] resolves and evaluates it.

mod builder;
mod claims;
mod status;

use std::fmt::Display;
use std::ops::Deref;
use std::str::FromStr;

pub use builder::SdJwtVcBuilder;
pub use claims::SdJwtVcClaims;
use serde_json::json;
pub use status::Status;
pub use status::StatusListRef;

use crate::Clock;
use crate::Error;
use crate::IssuerKeyResolver;
use crate::JsonObject;
use crate::JwsVerifier;
use crate::Result;
use crate::SdJwt;
use crate::SdJwtVerifier;
use crate::VerificationPolicy;

/// Header `typ` of an SD-JWT VC.
pub const SD_JWT_VC_TYP: &str = "dc+sd-jwt";
/// Legacy header `typ`, still accepted unless the policy is strict.
pub const SD_JWT_VC_LEGACY_TYP: &str = "vc+sd-jwt";

/// An SD-JWT carrying a verifiable credential.
///
/// Wraps [`SdJwt`] with a typed view of the registered credential claims. It
/// does not introduce a separate wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdJwtVc {
  sd_jwt: SdJwt,
  parsed_claims: SdJwtVcClaims,
}

impl Deref for SdJwtVc {
  type Target = SdJwt;
  fn deref(&self) -> &Self::Target {
    &self.sd_jwt
  }
}

impl SdJwtVc {
  /// Parses a string into an [`SdJwtVc`].
  pub fn parse(s: &str) -> Result<Self> {
    SdJwt::parse(s).and_then(Self::try_from_sd_jwt)
  }

  /// Interprets an [`SdJwt`] as a verifiable credential.
  ///
  /// ## Error
  /// * [`Error::InvalidTyp`] when the header `typ` is neither `dc+sd-jwt` nor
  ///   `vc+sd-jwt`.
  /// * [`Error::MissingClaim`] when `iss` or `vct` are absent.
  pub fn try_from_sd_jwt(sd_jwt: SdJwt) -> Result<Self> {
    let typ = sd_jwt
      .header()
      .get("typ")
      .and_then(|value| value.as_str())
      .unwrap_or_default();
    if typ != SD_JWT_VC_TYP && typ != SD_JWT_VC_LEGACY_TYP {
      return Err(Error::InvalidTyp(typ.to_string()));
    }

    let parsed_claims = SdJwtVcClaims::try_from_sd_jwt_claims(sd_jwt.claims().clone(), sd_jwt.disclosures())?;
    Ok(Self { sd_jwt, parsed_claims })
  }

  /// The typed view of the registered credential claims.
  pub fn claims(&self) -> &SdJwtVcClaims {
    &self.parsed_claims
  }

  /// This credential's status list reference, if any.
  pub fn status(&self) -> Option<&Status> {
    self.parsed_claims.status.as_ref()
  }

  pub fn into_sd_jwt(self) -> SdJwt {
    self.sd_jwt
  }
}

impl Display for SdJwtVc {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.sd_jwt.presentation())
  }
}

impl FromStr for SdJwtVc {
  type Err = Error;
  fn from_str(s: &str) -> Result<Self> {
    Self::parse(s)
  }
}

/// Profile checks applied on top of [`VerificationPolicy`] when verifying an
/// SD-JWT VC.
#[derive(Debug, Clone, Default)]
pub struct VcPolicy {
  expected_vct: Option<String>,
  trusted_issuers: Option<Vec<String>>,
  strict_typ: bool,
}

impl VcPolicy {
  pub fn new() -> Self {
    Self::default()
  }

  /// The credential type the verifier expects.
  pub fn expected_vct(mut self, vct: impl Into<String>) -> Self {
    self.expected_vct = Some(vct.into());
    self
  }

  /// Restricts accepted issuers. `None` trusts any issuer the resolver knows.
  pub fn trusted_issuers<I: IntoIterator<Item = impl Into<String>>>(mut self, issuers: I) -> Self {
    self.trusted_issuers = Some(issuers.into_iter().map(Into::into).collect());
    self
  }

  /// Accepts only `dc+sd-jwt`, rejecting the legacy `vc+sd-jwt`.
  pub fn strict_typ(mut self, strict: bool) -> Self {
    self.strict_typ = strict;
    self
  }
}

/// Outcome of a successful SD-JWT VC verification.
#[derive(Debug, Clone)]
pub struct VerifiedSdJwtVc {
  vc: SdJwtVc,
  disclosed_object: JsonObject,
  key_binding_verified: bool,
}

impl VerifiedSdJwtVc {
  pub fn vc(&self) -> &SdJwtVc {
    &self.vc
  }

  /// The reconstructed claims, registered claims included.
  pub fn disclosed_object(&self) -> &JsonObject {
    &self.disclosed_object
  }

  pub fn key_binding_verified(&self) -> bool {
    self.key_binding_verified
  }

  /// This credential's status list reference, if any.
  pub fn status(&self) -> Option<&Status> {
    self.vc.status()
  }
}

impl<V: JwsVerifier> SdJwtVerifier<V> {
  /// Verifies a presented SD-JWT VC: the full SD-JWT pipeline plus the
  /// profile's `typ`, `vct` and issuer-trust checks.
  pub async fn verify_vc<R: IssuerKeyResolver>(
    &self,
    presentation: &str,
    resolver: &R,
    policy: &VerificationPolicy,
    vc_policy: &VcPolicy,
    clock: &dyn Clock,
  ) -> Result<VerifiedSdJwtVc> {
    let verified = self.verify(presentation, resolver, policy, clock).await?;
    let key_binding_verified = verified.key_binding_verified();
    let (sd_jwt, disclosed_object) = verified.into_parts();

    if vc_policy.strict_typ {
      let typ = sd_jwt
        .header()
        .get("typ")
        .and_then(|value| value.as_str())
        .unwrap_or_default();
      if typ != SD_JWT_VC_TYP {
        return Err(Error::InvalidTyp(typ.to_string()));
      }
    }

    let vc = SdJwtVc::try_from_sd_jwt(sd_jwt)?;

    if let Some(expected) = vc_policy.expected_vct.as_deref() {
      if vc.claims().vct != expected {
        return Err(Error::InvalidClaimValue {
          name: "vct",
          expected: "the verifier's expected credential type",
          found: json!(vc.claims().vct),
        });
      }
    }
    if let Some(trusted) = vc_policy.trusted_issuers.as_deref() {
      if !trusted.iter().any(|issuer| issuer == &vc.claims().iss) {
        return Err(Error::UnknownIssuer(vc.claims().iss.clone()));
      }
    }

    Ok(VerifiedSdJwtVc {
      vc,
      disclosed_object,
      key_binding_verified,
    })
  }
}

#[cfg(test)]
mod test {
  use serde_json::json;

  use super::SdJwtVc;
  use crate::Error;

  // An unsigned SD-JWT VC shell, enough for `typ`/claims parsing.
  fn vc_string(typ: &str) -> String {
    let header = multibase::Base::Base64Url.encode(
      serde_json::to_vec(&json!({"alg": "ES256", "typ": typ})).unwrap(),
    );
    let claims = multibase::Base::Base64Url.encode(
      serde_json::to_vec(&json!({
        "iss": "https://issuer.example.com",
        "vct": "https://credentials.example.com/identity_credential",
        "iat": 1683000000,
      }))
      .unwrap(),
    );
    format!("{header}.{claims}.c2lnbmF0dXJl~")
  }

  #[test]
  fn accepts_both_typ_values() {
    for typ in ["dc+sd-jwt", "vc+sd-jwt"] {
      let vc = SdJwtVc::parse(&vc_string(typ)).unwrap();
      assert_eq!(vc.claims().vct, "https://credentials.example.com/identity_credential");
    }
  }

  #[test]
  fn rejects_other_typ_values() {
    assert!(matches!(
      SdJwtVc::parse(&vc_string("sd-jwt")).unwrap_err(),
      Error::InvalidTyp(_)
    ));
  }

  #[test]
  fn round_trip() {
    let s = vc_string("dc+sd-jwt");
    let vc = SdJwtVc::parse(&s).unwrap();
    assert_eq!(vc.to_string(), s);
  }
}
