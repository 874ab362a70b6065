// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use serde_json::Value;

use super::SdJwtVc;
use super::Status;
use super::SD_JWT_VC_TYP;
use crate::Error;
use crate::Hasher;
use crate::JsonObject;
use crate::JwsSigner;
use crate::RequiredKeyBinding;
use crate::Result;
use crate::SdJwtBuilder;
#[cfg(feature = "sha")]
use crate::Sha256Hasher;
use crate::DEFAULT_SALT_SIZE;

/// Registered SD-JWT VC claims; never selectively disclosable.
const REGISTERED_CLAIMS: &[&str] = &["iss", "vct", "sub", "iat", "exp", "nbf", "status", "cnf"];

/// Builder structure to create an issuable SD-JWT VC.
///
/// Wraps [`SdJwtBuilder`] and supplies the registered credential claims and
/// the `dc+sd-jwt` header typ.
#[cfg(not(feature = "sha"))]
#[derive(Debug)]
pub struct SdJwtVcBuilder<H: Hasher> {
  object: JsonObject,
  hasher: H,
  salt_size: usize,
  concealed: Vec<String>,
  decoys: Vec<(String, usize)>,
  key_bind: Option<RequiredKeyBinding>,
  header_typ: Option<String>,
  iss: Option<String>,
  vct: Option<String>,
  sub: Option<String>,
  iat: Option<i64>,
  exp: Option<i64>,
  nbf: Option<i64>,
  status: Option<Status>,
}

/// Builder structure to create an issuable SD-JWT VC.
///
/// Wraps [`SdJwtBuilder`] and supplies the registered credential claims and
/// the `dc+sd-jwt` header typ.
#[cfg(feature = "sha")]
#[derive(Debug)]
pub struct SdJwtVcBuilder<H: Hasher = Sha256Hasher> {
  object: JsonObject,
  hasher: H,
  salt_size: usize,
  concealed: Vec<String>,
  decoys: Vec<(String, usize)>,
  key_bind: Option<RequiredKeyBinding>,
  header_typ: Option<String>,
  iss: Option<String>,
  vct: Option<String>,
  sub: Option<String>,
  iat: Option<i64>,
  exp: Option<i64>,
  nbf: Option<i64>,
  status: Option<Status>,
}

#[cfg(feature = "sha")]
impl SdJwtVcBuilder {
  /// Creates a new [`SdJwtVcBuilder`] with `sha-256` hash function, from the
  /// credential's subject claims.
  pub fn new<T: serde::Serialize>(object: T) -> Result<Self> {
    Self::new_with_hasher(object, Sha256Hasher::new())
  }
}

impl<H: Hasher> SdJwtVcBuilder<H> {
  /// Creates a new [`SdJwtVcBuilder`] with custom hash function to create digests.
  pub fn new_with_hasher<T: serde::Serialize>(object: T, hasher: H) -> Result<Self> {
    crate::check_hash_alg(hasher.alg_name())?;
    let object = serde_json::to_value(object).map_err(|e| Error::DeserializationError(e.to_string()))?;
    let Value::Object(object) = object else {
      return Err(Error::DataTypeMismatch("expected object".to_string()));
    };
    Ok(Self {
      object,
      hasher,
      salt_size: DEFAULT_SALT_SIZE,
      concealed: vec![],
      decoys: vec![],
      key_bind: None,
      header_typ: None,
      iss: None,
      vct: None,
      sub: None,
      iat: None,
      exp: None,
      nbf: None,
      status: None,
    })
  }

  /// Sets the issuer identifier. Required.
  pub fn iss(mut self, iss: impl Into<String>) -> Self {
    self.iss = Some(iss.into());
    self
  }

  /// Sets the verifiable credential type. Required.
  pub fn vct(mut self, vct: impl Into<String>) -> Self {
    self.vct = Some(vct.into());
    self
  }

  /// Sets the subject identifier.
  pub fn sub(mut self, sub: impl Into<String>) -> Self {
    self.sub = Some(sub.into());
    self
  }

  /// Sets the issuance time, in seconds since the epoch.
  pub fn iat(mut self, iat: i64) -> Self {
    self.iat = Some(iat);
    self
  }

  /// Sets the expiration time, in seconds since the epoch.
  pub fn exp(mut self, exp: i64) -> Self {
    self.exp = Some(exp);
    self
  }

  /// Sets the not-before time, in seconds since the epoch.
  pub fn nbf(mut self, nbf: i64) -> Self {
    self.nbf = Some(nbf);
    self
  }

  /// References this credential's entry in a status list.
  pub fn status(mut self, status: Status) -> Self {
    self.status = Some(status);
    self
  }

  /// Marks the claim at `path` as selectively disclosable.
  ///
  /// ## Error
  /// [`Error::DisclosedClaim`] when `path` targets a registered claim.
  pub fn make_concealable(mut self, path: &str) -> Result<Self> {
    let first_segment = path.trim_start_matches('/').split('/').next().unwrap_or_default();
    if let Some(registered) = REGISTERED_CLAIMS.iter().copied().find(|claim| *claim == first_segment) {
      return Err(Error::DisclosedClaim(registered));
    }
    self.concealed.push(path.to_string());
    Ok(self)
  }

  /// Adds decoy digests at `path`; `""` targets the top level.
  pub fn add_decoys(mut self, path: &str, number_of_decoys: usize) -> Self {
    self.decoys.push((path.to_string(), number_of_decoys));
    self
  }

  /// Binds the credential to the holder key carried in `key_bind`.
  pub fn require_key_binding(mut self, key_bind: RequiredKeyBinding) -> Self {
    self.key_bind = Some(key_bind);
    self
  }

  /// Overrides the header `typ`, e.g. for the legacy `vc+sd-jwt`.
  pub fn header_typ(mut self, typ: impl Into<String>) -> Self {
    self.header_typ = Some(typ.into());
    self
  }

  /// Creates an SD-JWT VC with the provided data.
  pub async fn finish<S>(self, signer: &S, alg: &str) -> Result<SdJwtVc>
  where
    S: JwsSigner,
  {
    let SdJwtVcBuilder {
      mut object,
      hasher,
      salt_size,
      concealed,
      decoys,
      key_bind,
      header_typ,
      iss,
      vct,
      sub,
      iat,
      exp,
      nbf,
      status,
    } = self;

    let iss = iss.ok_or(Error::MissingClaim("iss"))?;
    let vct = vct.ok_or(Error::MissingClaim("vct"))?;
    object.insert("iss".to_string(), Value::String(iss));
    object.insert("vct".to_string(), Value::String(vct));
    if let Some(sub) = sub {
      object.insert("sub".to_string(), Value::String(sub));
    }
    if let Some(iat) = iat {
      object.insert("iat".to_string(), Value::Number(iat.into()));
    }
    if let Some(exp) = exp {
      object.insert("exp".to_string(), Value::Number(exp.into()));
    }
    if let Some(nbf) = nbf {
      object.insert("nbf".to_string(), Value::Number(nbf.into()));
    }
    if let Some(status) = status {
      let status = serde_json::to_value(status).map_err(|e| Error::DeserializationError(e.to_string()))?;
      object.insert("status".to_string(), status);
    }

    let mut builder = SdJwtBuilder::new_with_hasher_and_salt_size(Value::Object(object), hasher, salt_size)?
      .header_typ(header_typ.unwrap_or_else(|| SD_JWT_VC_TYP.to_string()));
    for path in &concealed {
      builder = builder.make_concealable(path)?;
    }
    for (path, number_of_decoys) in &decoys {
      builder = builder.add_decoys(path, *number_of_decoys)?;
    }
    if let Some(key_bind) = key_bind {
      builder = builder.require_key_binding(key_bind);
    }

    let sd_jwt = builder.finish(signer, alg).await?;
    SdJwtVc::try_from_sd_jwt(sd_jwt)
  }
}
