// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Display;

use serde_json::json;
use serde_json::Value;

use crate::check_hash_alg;
use crate::Error;
use crate::Hasher;
use crate::Result;

/// A disclosable value.
/// Both object properties and array elements disclosures are supported.
///
/// See: https://www.ietf.org/archive/id/draft-ietf-oauth-selective-disclosure-jwt-07.html#name-disclosures
#[derive(Debug, Clone)]
pub struct Disclosure {
  /// The salt value.
  pub salt: String,
  /// The claim name, optional for array elements.
  pub claim_name: Option<String>,
  /// The claim Value which can be of any type.
  pub claim_value: Value,
  /// Base64Url-encoded disclosure as emitted at creation or parse time.
  /// Digests are always computed over these exact bytes; the disclosure is
  /// never re-serialized.
  unparsed: String,
}

impl Disclosure {
  /// Creates a new instance of [`Disclosure`] and fixes its encoded form.
  ///
  /// ## Error
  ///
  /// Returns an [`Error::ReservedClaimName`] if `claim_name` is one of
  /// `_sd`, `_sd_alg` or `...`.
  pub fn new(salt: String, claim_name: Option<String>, claim_value: Value) -> Result<Self> {
    if let Some(name) = claim_name.as_deref() {
      if matches!(name, crate::DIGESTS_KEY | crate::SD_ALG | crate::ARRAY_DIGEST_KEY) {
        return Err(Error::ReservedClaimName(name.to_string()));
      }
    }

    let array = if let Some(name) = claim_name.as_deref() {
      json!([salt, name, claim_value])
    } else {
      json!([salt, claim_value])
    };
    // Infallible: `array` contains no non-string keys.
    let json_bytes = serde_json::to_vec(&array).map_err(|e| Error::DeserializationError(e.to_string()))?;
    let unparsed = multibase::Base::Base64Url.encode(json_bytes);

    Ok(Self {
      salt,
      claim_name,
      claim_value,
      unparsed,
    })
  }

  /// Parses a Base64Url-encoded disclosure into a [`Disclosure`], retaining
  /// the input string as the canonical encoding.
  ///
  /// ## Error
  ///
  /// Returns an [`Error::InvalidDisclosure`] if input is not a valid disclosure.
  pub fn parse(disclosure: &str) -> Result<Self> {
    let decoded: Vec<Value> = multibase::Base::Base64Url
      .decode(disclosure)
      .map_err(|_e| {
        Error::InvalidDisclosure(format!(
          "Base64 decoding of the disclosure was not possible {}",
          disclosure
        ))
      })
      .and_then(|data| {
        serde_json::from_slice(&data).map_err(|_e| {
          Error::InvalidDisclosure(format!(
            "decoded disclosure could not be serialized as an array {}",
            disclosure
          ))
        })
      })?;

    let (salt, claim_name, claim_value) = match decoded.len() {
      2 => {
        let mut values = decoded.into_iter();
        let salt = values
          .next()
          .and_then(|value| value.as_str().map(ToOwned::to_owned))
          .ok_or(Error::InvalidDisclosure("salt could not be parsed as a string".to_string()))?;
        if salt.is_empty() {
          return Err(Error::InvalidDisclosure("empty salt".to_string()));
        }
        let claim_value = values
          .next()
          .ok_or(Error::InvalidDisclosure("invalid claim value".to_string()))?;
        (salt, None, claim_value)
      }
      3 => {
        let mut values = decoded.into_iter();
        let salt = values
          .next()
          .and_then(|value| value.as_str().map(ToOwned::to_owned))
          .ok_or(Error::InvalidDisclosure("salt could not be parsed as a string".to_string()))?;
        if salt.is_empty() {
          return Err(Error::InvalidDisclosure("empty salt".to_string()));
        }
        let claim_name = values
          .next()
          .and_then(|value| value.as_str().map(ToOwned::to_owned))
          .ok_or(Error::InvalidDisclosure(
            "claim name could not be parsed as a string".to_string(),
          ))?;
        let claim_value = values
          .next()
          .ok_or(Error::InvalidDisclosure("invalid claim value".to_string()))?;
        (salt, Some(claim_name), claim_value)
      }
      len => {
        return Err(Error::InvalidDisclosure(format!(
          "deserialized array has an invalid length of {}",
          len
        )))
      }
    };

    Ok(Self {
      salt,
      claim_name,
      claim_value,
      unparsed: disclosure.to_string(),
    })
  }

  /// Returns the base64url-encoded disclosure, byte-identical to the form it
  /// had when created or parsed.
  pub fn as_str(&self) -> &str {
    &self.unparsed
  }

  /// Returns the base64url-encoded digest of this disclosure under `hasher`.
  ///
  /// ## Error
  ///
  /// Returns an [`Error::UnsupportedAlgorithm`] if the hasher's algorithm is
  /// not an approved disclosure hash.
  pub fn digest(&self, hasher: &dyn Hasher) -> Result<String> {
    check_hash_alg(hasher.alg_name())?;
    Ok(hasher.encoded_digest(self.as_str()))
  }
}

/// Semantic equality: two disclosures are equal when salt, claim name and
/// claim value match, regardless of their encoded whitespace.
impl PartialEq for Disclosure {
  fn eq(&self, other: &Self) -> bool {
    self.salt == other.salt && self.claim_name == other.claim_name && self.claim_value == other.claim_value
  }
}

impl Eq for Disclosure {}

impl Display for Disclosure {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.unparsed)
  }
}

#[cfg(test)]
mod test {
  use serde_json::json;

  use super::Disclosure;
  use crate::Error;

  // Test values from:
  // https://www.ietf.org/archive/id/draft-ietf-oauth-selective-disclosure-jwt-07.html#appendix-A.2-7
  #[test]
  fn parsing() {
    let disclosure = Disclosure::new(
      "2GLC42sKQveCfGfryNRN9w".to_string(),
      Some("time".to_owned()),
      "2012-04-23T18:25Z".to_owned().into(),
    )
    .unwrap();

    let parsed =
      Disclosure::parse("WyIyR0xDNDJzS1F2ZUNmR2ZyeU5STjl3IiwgInRpbWUiLCAiMjAxMi0wNC0yM1QxODoyNVoiXQ").unwrap();
    assert_eq!(parsed, disclosure);
  }

  #[test]
  fn parse_retains_exact_encoding() {
    let encoded = "WyIyR0xDNDJzS1F2ZUNmR2ZyeU5STjl3IiwgInRpbWUiLCAiMjAxMi0wNC0yM1QxODoyNVoiXQ";
    let parsed = Disclosure::parse(encoded).unwrap();
    // The IETF test vector contains whitespace that naive re-serialization
    // would drop.
    assert_eq!(parsed.as_str(), encoded);
    assert_eq!(parsed.to_string(), encoded);
  }

  #[test]
  fn round_trip() {
    let disclosure = Disclosure::new("lklxF5jMYlGTPUovMNIvCA".to_owned(), None, "US".to_owned().into()).unwrap();
    let parsed = Disclosure::parse(disclosure.as_str()).unwrap();
    assert_eq!(parsed, disclosure);
    assert_eq!(parsed.as_str(), disclosure.as_str());
  }

  #[test]
  fn invalid_shapes() {
    // One element only.
    let encoded = multibase::Base::Base64Url.encode(serde_json::to_vec(&json!(["salt-only"])).unwrap());
    assert!(matches!(
      Disclosure::parse(&encoded).unwrap_err(),
      Error::InvalidDisclosure(_)
    ));

    // Four elements.
    let encoded = multibase::Base::Base64Url.encode(serde_json::to_vec(&json!(["s", "n", "v", "x"])).unwrap());
    assert!(matches!(
      Disclosure::parse(&encoded).unwrap_err(),
      Error::InvalidDisclosure(_)
    ));

    // Not an array.
    let encoded = multibase::Base::Base64Url.encode(serde_json::to_vec(&json!({"salt": "s"})).unwrap());
    assert!(matches!(
      Disclosure::parse(&encoded).unwrap_err(),
      Error::InvalidDisclosure(_)
    ));

    // Empty salt.
    let encoded = multibase::Base::Base64Url.encode(serde_json::to_vec(&json!(["", "name", "value"])).unwrap());
    assert!(matches!(
      Disclosure::parse(&encoded).unwrap_err(),
      Error::InvalidDisclosure(_)
    ));
  }

  #[test]
  fn reserved_claim_names() {
    for reserved in ["_sd", "_sd_alg", "..."] {
      let result = Disclosure::new("lklxF5jMYlGTPUovMNIvCA".to_owned(), Some(reserved.to_owned()), json!(42));
      assert!(matches!(result.unwrap_err(), Error::ReservedClaimName(_)));
    }
  }
}
