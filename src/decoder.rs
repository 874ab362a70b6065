// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use serde_json::Map;
use serde_json::Value;

use crate::check_hash_alg;
use crate::ct_eq_str;
use crate::Disclosure;
use crate::Error;
use crate::Hasher;
use crate::Result;
#[cfg(feature = "sha")]
use crate::Sha256Hasher;
#[cfg(feature = "sha")]
use crate::Sha384Hasher;
#[cfg(feature = "sha")]
use crate::Sha512Hasher;
use crate::ARRAY_DIGEST_KEY;
use crate::DIGESTS_KEY;
use crate::SD_ALG;
use crate::SHA_ALG_NAME;

/// Substitutes digests in an SD-JWT object by their corresponding plaintext values
/// provided by disclosures.
pub struct SdObjectDecoder {
  hashers: BTreeMap<String, Box<dyn Hasher>>,
}

impl SdObjectDecoder {
  /// Creates a new [`SdObjectDecoder`] with all approved `sha` hashers registered.
  #[cfg(feature = "sha")]
  pub fn new_with_sha() -> Self {
    let mut decoder = Self::new();
    decoder.add_hasher(Box::new(Sha256Hasher::new()));
    decoder.add_hasher(Box::new(Sha384Hasher::new()));
    decoder.add_hasher(Box::new(Sha512Hasher::new()));
    decoder
  }

  /// Creates a new [`SdObjectDecoder`] without any hashers.
  pub fn new() -> Self {
    Self {
      hashers: BTreeMap::new(),
    }
  }

  /// Adds a hasher.
  ///
  /// If a hasher for the same algorithm [`Hasher::alg_name`] already exists, it will
  /// be replaced and the existing hasher will be returned, otherwise `None`.
  pub fn add_hasher(&mut self, hasher: Box<dyn Hasher>) -> Option<Box<dyn Hasher>> {
    let alg_name = hasher.as_ref().alg_name().to_string();
    self.hashers.insert(alg_name, hasher)
  }

  /// Removes a hasher.
  ///
  /// If the hasher for that algorithm exists, it will be removed and returned, otherwise `None`.
  pub fn remove_hasher(&mut self, hash_alg: String) -> Option<Box<dyn Hasher>> {
    self.hashers.remove(&hash_alg)
  }

  /// Decodes an SD-JWT `object` by substituting the digests with their corresponding
  /// plaintext values provided by `disclosures`.
  ///
  /// ## Notes
  /// * The hasher is determined by the `_sd_alg` property. If none is set, the
  ///   sha-256 hasher will be used, if present.
  /// * Claims like `exp` or `iat` are not validated in the process of decoding.
  /// * `_sd_alg` property will be removed if present.
  pub fn decode(&self, object: &Map<String, Value>, disclosures: &[Disclosure]) -> Result<Map<String, Value>> {
    let hasher = self.determine_hasher(object)?;

    // Pair every disclosure with its digest; two disclosures hashing to the
    // same digest render the SD-JWT invalid.
    let mut disclosures_by_digest: Vec<(String, &Disclosure)> = Vec::with_capacity(disclosures.len());
    for disclosure in disclosures {
      let digest = hasher.encoded_digest(disclosure.as_str());
      if disclosures_by_digest.iter().any(|(existing, _)| ct_eq_str(existing, &digest)) {
        return Err(Error::DuplicateDigest(digest));
      }
      disclosures_by_digest.push((digest, disclosure));
    }

    // `processed_digests` are kept track of in case one digest appears more than
    // once which renders the SD-JWT invalid.
    let mut processed_digests: Vec<String> = vec![];

    let mut decoded = self.decode_object(object, &disclosures_by_digest, &mut processed_digests)?;

    if processed_digests.len() != disclosures.len() {
      return Err(Error::UnusedDisclosures(
        disclosures.len().saturating_sub(processed_digests.len()),
      ));
    }

    decoded.remove(SD_ALG);
    Ok(decoded)
  }

  /// Returns the registered hasher for `alg_name`, if the algorithm is approved.
  pub fn hasher_for(&self, alg_name: &str) -> Result<&dyn Hasher> {
    check_hash_alg(alg_name)?;
    self
      .hashers
      .get(alg_name)
      .map(AsRef::as_ref)
      .ok_or(Error::MissingHasher(alg_name.to_string()))
  }

  pub fn determine_hasher(&self, object: &Map<String, Value>) -> Result<&dyn Hasher> {
    // If the `_sd_alg` claim is not present at the top level, sha-256 is assumed.
    // Callers that require explicit presence check before decoding.
    let alg: &str = if let Some(alg) = object.get(SD_ALG) {
      alg
        .as_str()
        .ok_or(Error::DataTypeMismatch("the value of `_sd_alg` is not a string".to_string()))?
    } else {
      SHA_ALG_NAME
    };
    check_hash_alg(alg)?;
    self
      .hashers
      .get(alg)
      .map(AsRef::as_ref)
      .ok_or(Error::MissingHasher(alg.to_string()))
  }

  fn decode_object(
    &self,
    object: &Map<String, Value>,
    disclosures: &[(String, &Disclosure)],
    processed_digests: &mut Vec<String>,
  ) -> Result<Map<String, Value>> {
    let mut output: Map<String, Value> = object.clone();
    for (key, value) in object.iter() {
      if key == DIGESTS_KEY {
        let sd_array: &Vec<Value> = value
          .as_array()
          .ok_or(Error::DataTypeMismatch(format!("{} is not an array", DIGESTS_KEY)))?;
        for digest in sd_array {
          let digest_str = digest
            .as_str()
            .ok_or(Error::DataTypeMismatch(format!("{} is not a string", digest)))?
            .to_string();

          // Reject if any digests were found more than once.
          if processed_digests.iter().any(|processed| ct_eq_str(processed, &digest_str)) {
            return Err(Error::DuplicateDigest(digest_str));
          }

          // Check if a disclosure of this digest is available
          // and insert its claim name and value in the object.
          if let Some(disclosure) = find_disclosure(disclosures, &digest_str) {
            let claim_name = disclosure
              .claim_name
              .clone()
              .ok_or(Error::InvalidDisclosure(format!(
                "array element disclosure {} referenced from `_sd`",
                disclosure
              )))?;

            if output.contains_key(&claim_name) {
              return Err(Error::ClaimCollision(claim_name));
            }
            processed_digests.push(digest_str.clone());

            let recursively_decoded = match disclosure.claim_value {
              Value::Array(ref sub_arr) => Value::Array(self.decode_array(sub_arr, disclosures, processed_digests)?),
              Value::Object(ref sub_obj) => {
                Value::Object(self.decode_object(sub_obj, disclosures, processed_digests)?)
              }
              _ => disclosure.claim_value.clone(),
            };

            output.insert(claim_name, recursively_decoded);
          }
        }
        output.remove(DIGESTS_KEY);
        continue;
      }

      match value {
        Value::Object(object) => {
          let decoded_object = self.decode_object(object, disclosures, processed_digests)?;
          output.insert(key.to_string(), Value::Object(decoded_object));
        }
        Value::Array(array) => {
          let decoded_array = self.decode_array(array, disclosures, processed_digests)?;
          output.insert(key.to_string(), Value::Array(decoded_array));
        }
        // Only objects and arrays require decoding.
        _ => {}
      }
    }
    Ok(output)
  }

  fn decode_array(
    &self,
    array: &[Value],
    disclosures: &[(String, &Disclosure)],
    processed_digests: &mut Vec<String>,
  ) -> Result<Vec<Value>> {
    let mut output: Vec<Value> = vec![];
    for value in array.iter() {
      if let Some(object) = value.as_object() {
        if let Some(digest_value) = object.get(ARRAY_DIGEST_KEY) {
          if object.keys().len() != 1 {
            return Err(Error::InvalidArrayDisclosureObject);
          }

          let digest_in_array = digest_value
            .as_str()
            .ok_or(Error::DataTypeMismatch(format!("{} is not a string", ARRAY_DIGEST_KEY)))?
            .to_string();

          // Reject if any digests were found more than once.
          if processed_digests.iter().any(|processed| ct_eq_str(processed, &digest_in_array)) {
            return Err(Error::DuplicateDigest(digest_in_array));
          }
          if let Some(disclosure) = find_disclosure(disclosures, &digest_in_array) {
            if disclosure.claim_name.is_some() {
              return Err(Error::InvalidDisclosure(
                "array element disclosure must have exactly 2 elements".to_string(),
              ));
            }
            processed_digests.push(digest_in_array.clone());
            let recursively_decoded = match disclosure.claim_value {
              Value::Array(ref sub_arr) => Value::Array(self.decode_array(sub_arr, disclosures, processed_digests)?),
              Value::Object(ref sub_obj) => {
                Value::Object(self.decode_object(sub_obj, disclosures, processed_digests)?)
              }
              _ => disclosure.claim_value.clone(),
            };

            output.push(recursively_decoded);
          }
          // Digests without a matching disclosure stay concealed and are dropped.
        } else {
          let decoded_object = self.decode_object(object, disclosures, processed_digests)?;
          output.push(Value::Object(decoded_object));
        }
      } else if let Some(arr) = value.as_array() {
        // Nested arrays need to be decoded too.
        let decoded = self.decode_array(arr, disclosures, processed_digests)?;
        output.push(Value::Array(decoded));
      } else {
        // Append the rest of the values.
        output.push(value.clone());
      }
    }

    Ok(output)
  }
}

fn find_disclosure<'a>(disclosures: &'a [(String, &'a Disclosure)], digest: &str) -> Option<&'a Disclosure> {
  // Linear scan with a constant-time comparison per candidate.
  disclosures
    .iter()
    .find(|(candidate, _)| ct_eq_str(candidate, digest))
    .map(|(_, disclosure)| *disclosure)
}

#[cfg(feature = "sha")]
impl Default for SdObjectDecoder {
  fn default() -> Self {
    Self::new_with_sha()
  }
}

#[cfg(test)]
mod test {
  use serde_json::json;
  use serde_json::Value;

  use crate::Disclosure;
  use crate::Error;
  use crate::SdObjectDecoder;
  use crate::SdObjectEncoder;

  #[test]
  fn simple_roundtrip() {
    let object = json!({
      "id": "did:value",
      "claim1": {
        "abc": true
      },
      "claim2": ["arr-value1", "arr-value2"]
    });
    let mut encoder = SdObjectEncoder::try_from(object.clone()).unwrap();
    let dis_1 = encoder.conceal("/claim1/abc", None).unwrap();
    let dis_2 = encoder.conceal("/claim2/0", None).unwrap();
    let dis_3 = encoder.conceal("/id", None).unwrap();
    encoder.add_decoys("", 5).unwrap();
    let decoder = SdObjectDecoder::new_with_sha();
    let decoded = decoder.decode(encoder.object(), &[dis_1, dis_2, dis_3]).unwrap();
    assert_eq!(Value::Object(decoded), object);
  }

  #[test]
  fn dropped_disclosure_conceals_exactly_its_claim() {
    let object = json!({
      "id": "did:value",
      "claim1": "claim1-value",
    });
    let mut encoder = SdObjectEncoder::try_from(object).unwrap();
    let _dis_1 = encoder.conceal("/id", None).unwrap();
    let dis_2 = encoder.conceal("/claim1", None).unwrap();
    let decoder = SdObjectDecoder::new_with_sha();
    let decoded = decoder.decode(encoder.object(), &[dis_2]).unwrap();
    assert_eq!(Value::Object(decoded), json!({"claim1": "claim1-value"}));
  }

  #[test]
  fn collision() {
    let object = json!({
      "id": "did:value",
    });
    let mut encoder = SdObjectEncoder::try_from(object).unwrap();
    let dis = encoder.conceal("/id", None).unwrap();
    let mut modified = encoder.object().clone();
    modified.insert("id".to_string(), Value::String("id-value".to_string()));
    let decoder = SdObjectDecoder::new_with_sha();
    let decoded = decoder.decode(&modified, &[dis]).unwrap_err();
    assert!(matches!(decoded, Error::ClaimCollision(_)));
  }

  #[test]
  fn sd_alg() {
    let object = json!({
      "id": "did:value",
      "claim1": [
        "abc"
      ],
    });
    let mut encoder = SdObjectEncoder::try_from(object).unwrap();
    encoder.add_sd_alg_property();
    assert_eq!(encoder.object().get("_sd_alg").unwrap(), "sha-256");
    let decoder = SdObjectDecoder::new_with_sha();
    let decoded = decoder.decode(encoder.object(), &[]).unwrap();
    assert!(decoded.get("_sd_alg").is_none());
  }

  #[test]
  fn unsupported_sd_alg() {
    let object = json!({
      "id": "did:value",
      "_sd_alg": "sha-1",
    });
    let decoder = SdObjectDecoder::new_with_sha();
    let result = decoder.decode(object.as_object().unwrap(), &[]);
    assert!(matches!(result.unwrap_err(), Error::UnsupportedAlgorithm(_)));
  }

  #[test]
  fn duplicate_digest() {
    let object = json!({
      "id": "did:value",
    });
    let mut encoder = SdObjectEncoder::try_from(object).unwrap();
    let disclosure: Disclosure = encoder.conceal("/id", Some("test".to_string())).unwrap();
    let digest = disclosure.digest(&crate::Sha256Hasher::new()).unwrap();
    // `obj` contains the digest of `id` twice.
    let obj = json!({
      "_sd": [digest, digest]
    });
    let decoder = SdObjectDecoder::new_with_sha();
    let result = decoder.decode(obj.as_object().unwrap(), &[disclosure]);
    assert!(matches!(result.unwrap_err(), Error::DuplicateDigest(_)));
  }

  #[test]
  fn unused_disclosure() {
    let object = json!({
      "id": "did:value",
      "tst": "tst-value"
    });
    let mut encoder = SdObjectEncoder::try_from(object).unwrap();
    let disclosure_1: Disclosure = encoder.conceal("/id", None).unwrap();
    let disclosure_2: Disclosure = encoder.conceal("/tst", None).unwrap();
    let digest_1 = disclosure_1.digest(&crate::Sha256Hasher::new()).unwrap();
    // `obj` contains only the digest of `id`.
    let obj = json!({
      "_sd": [digest_1]
    });
    let decoder = SdObjectDecoder::new_with_sha();
    let result = decoder.decode(obj.as_object().unwrap(), &[disclosure_1, disclosure_2]);
    assert!(matches!(result.unwrap_err(), Error::UnusedDisclosures(1)));
  }
}
