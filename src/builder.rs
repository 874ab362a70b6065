use serde::Serialize;
use serde_json::json;
use serde_json::Value;

use crate::check_signing_alg;
use crate::jwt::Jwt;
use crate::Disclosure;
use crate::Error;
use crate::Hasher;
use crate::JwsSigner;
use crate::RequiredKeyBinding;
use crate::Result;
use crate::SdJwt;
use crate::SdJwtClaims;
use crate::SdObjectEncoder;
#[cfg(feature = "sha")]
use crate::Sha256Hasher;
use crate::DEFAULT_SALT_SIZE;

pub(crate) const HEADER_TYP: &str = "sd-jwt";

/// Builder structure to create an issuable SD-JWT.
#[derive(Debug)]
pub struct SdJwtBuilder<H: Hasher> {
  encoder: SdObjectEncoder<H>,
  disclosures: Vec<Disclosure>,
  key_bind: Option<RequiredKeyBinding>,
  header_typ: Option<String>,
}

#[cfg(feature = "sha")]
impl SdJwtBuilder<Sha256Hasher> {
  /// Creates a new [`SdJwtBuilder`] with `sha-256` hash function.
  ///
  /// ## Error
  /// Returns [`Error::DataTypeMismatch`] if `object` is not a valid JSON object.
  pub fn new<T: Serialize>(object: T) -> Result<Self> {
    Self::new_with_hasher(object, Sha256Hasher::new())
  }
}

impl<H: Hasher> SdJwtBuilder<H> {
  /// Creates a new [`SdJwtBuilder`] with custom hash function to create digests.
  pub fn new_with_hasher<T: Serialize>(object: T, hasher: H) -> Result<Self> {
    Self::new_with_hasher_and_salt_size(object, hasher, DEFAULT_SALT_SIZE)
  }

  /// Creates a new [`SdJwtBuilder`] with custom hash function to create digests, and custom salt size.
  pub fn new_with_hasher_and_salt_size<T: Serialize>(object: T, hasher: H, salt_size: usize) -> Result<Self> {
    crate::check_hash_alg(hasher.alg_name())?;
    let object = serde_json::to_value(object).map_err(|e| Error::DeserializationError(e.to_string()))?;
    let encoder = SdObjectEncoder::with_custom_hasher_and_salt_size(object, hasher, salt_size)?;
    Ok(Self {
      encoder,
      disclosures: vec![],
      key_bind: None,
      header_typ: None,
    })
  }

  /// Substitutes a value with the digest of its disclosure.
  ///
  /// ## Notes
  /// - `path` is a `/`-separated pointer to the value that will be concealed,
  ///   e.g. `/claim1/abc` or `/claim2/0` for the first element of an array.
  ///
  /// ## Example
  ///  ```rust
  ///  use sd_jwt_vc::SdJwtBuilder;
  ///  use serde_json::json;
  ///
  ///  let obj = json!({
  ///   "id": "did:value",
  ///   "claim1": {
  ///      "abc": true
  ///   },
  ///   "claim2": ["val_1", "val_2"]
  /// });
  /// let builder = SdJwtBuilder::new(obj)
  ///   .unwrap()
  ///   .make_concealable("/id").unwrap() //conceals "id": "did:value"
  ///   .make_concealable("/claim1/abc").unwrap() //"abc": true
  ///   .make_concealable("/claim2/0").unwrap(); //conceals "val_1"
  /// ```
  ///
  /// ## Error
  /// * [`Error::InvalidPath`] if the path is invalid.
  /// * [`Error::ReservedClaimName`] for `_sd`, `_sd_alg` or `...`.
  pub fn make_concealable(mut self, path: &str) -> Result<Self> {
    let disclosure = self.encoder.conceal(path, None)?;
    self.disclosures.push(disclosure);

    Ok(self)
  }

  /// Adds decoy digests to the specified path.
  ///
  /// Use `path` = "" to add decoys to the top level.
  pub fn add_decoys(mut self, path: &str, number_of_decoys: usize) -> Result<Self> {
    self.encoder.add_decoys(path, number_of_decoys)?;

    Ok(self)
  }

  /// Require a proof of possession of a given key from the holder.
  ///
  /// This operation adds a JWT confirmation (`cnf`) claim as specified in
  /// [RFC7800](https://www.rfc-editor.org/rfc/rfc7800.html#section-3).
  /// The confirmation is embedded verbatim; it is never derived from the
  /// issuer's signing key.
  pub fn require_key_binding(mut self, key_bind: RequiredKeyBinding) -> Self {
    self.key_bind = Some(key_bind);
    self
  }

  /// Overrides the `typ` header of the issued JWT. Defaults to `sd-jwt`.
  pub fn header_typ(mut self, typ: impl Into<String>) -> Self {
    self.header_typ = Some(typ.into());
    self
  }

  /// Creates an SD-JWT with the provided data.
  ///
  /// ## Error
  /// * [`Error::UnsupportedAlgorithm`] if `alg` is `none`, a shared-secret
  ///   algorithm, or otherwise outside the allowed set.
  /// * [`Error::JwsSignerFailure`] if the signer fails or returns an invalid JWS.
  pub async fn finish<S>(self, signer: &S, alg: &str) -> Result<SdJwt>
  where
    S: JwsSigner,
  {
    check_signing_alg(alg)?;
    let SdJwtBuilder {
      mut encoder,
      disclosures,
      key_bind,
      header_typ,
    } = self;
    // Randomize digest order right before signing so positions leak nothing.
    encoder.shuffle_sd_digests();
    encoder.add_sd_alg_property();
    let mut object = encoder.into_object();

    // Add key binding requirement as `cnf`.
    if let Some(key_bind) = key_bind {
      let key_bind = serde_json::to_value(key_bind).map_err(|e| Error::DeserializationError(e.to_string()))?;
      object.insert("cnf".to_string(), key_bind);
    }

    let typ = header_typ.as_deref().unwrap_or(HEADER_TYP);
    let Value::Object(header) = json!({
      "typ": typ,
      "alg": alg,
    }) else {
      unreachable!();
    };

    let jws = signer
      .sign(&header, &object)
      .await
      .map_err(|e| Error::JwsSignerFailure(e.to_string()))
      .and_then(|jws_bytes| {
        String::from_utf8(jws_bytes).map_err(|_| Error::JwsSignerFailure("signer returned invalid UTF-8".to_string()))
      })?;

    let jwt: Jwt<SdJwtClaims> = jws
      .parse()
      .map_err(|_: Error| Error::JwsSignerFailure("signer returned an invalid compact JWS".to_string()))?;

    Ok(SdJwt::new(jwt, disclosures, None))
  }
}

#[cfg(test)]
mod test {
  use serde_json::json;

  use super::SdJwtBuilder;
  use crate::Error;

  struct NoopSigner;

  #[async_trait::async_trait]
  impl crate::JwsSigner for NoopSigner {
    type Error = std::convert::Infallible;
    async fn sign(&self, _header: &crate::JsonObject, _payload: &crate::JsonObject) -> Result<Vec<u8>, Self::Error> {
      unreachable!("the algorithm check rejects before signing");
    }
  }

  #[tokio::test]
  async fn issuing_with_forbidden_algorithms_fails() {
    for alg in ["HS256", "none", "HS512"] {
      let builder = SdJwtBuilder::new(json!({"iss": "https://issuer.example.com"})).unwrap();
      let result = builder.finish(&NoopSigner, alg).await;
      assert!(matches!(result.unwrap_err(), Error::UnsupportedAlgorithm(_)));
    }
  }

  #[derive(Debug)]
  struct Md5Hasher;

  impl crate::Hasher for Md5Hasher {
    fn digest(&self, _input: &[u8]) -> Vec<u8> {
      vec![0; 16]
    }

    fn alg_name(&self) -> &'static str {
      "md5"
    }
  }

  #[test]
  fn weak_hash_algorithms_fail_at_issuance() {
    let result = SdJwtBuilder::new_with_hasher(json!({"iss": "https://issuer.example.com"}), Md5Hasher);
    assert!(matches!(result.unwrap_err(), Error::UnsupportedAlgorithm(_)));
  }

  #[tokio::test]
  async fn reserved_names_fail_at_issuance() {
    let builder = SdJwtBuilder::new(json!({"_sd_alg": "sha-256", "claim": 1})).unwrap();
    assert!(matches!(
      builder.make_concealable("/_sd_alg").unwrap_err(),
      Error::ReservedClaimName(_)
    ));
  }
}
