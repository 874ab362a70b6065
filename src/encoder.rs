// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;

use crate::gen_rand;
use crate::Disclosure;
use crate::Error;
use crate::Hasher;
use crate::Result;
#[cfg(feature = "sha")]
use crate::Sha256Hasher;

pub(crate) const DIGESTS_KEY: &str = "_sd";
pub(crate) const ARRAY_DIGEST_KEY: &str = "...";
pub(crate) const DEFAULT_SALT_SIZE: usize = 30;
pub(crate) const SD_ALG: &str = "_sd_alg";
/// Upper bound on decoys per `add_decoys` call, to bound payload growth.
pub(crate) const MAX_DECOYS: usize = 64;

/// Transforms a JSON object into an SD-JWT object by substituting selected values
/// with their corresponding disclosure digests.
#[cfg(not(feature = "sha"))]
#[derive(Debug, Clone)]
pub struct SdObjectEncoder<H: Hasher> {
  /// The object in JSON format.
  object: Map<String, Value>,
  /// Size of random data used to generate the salts for disclosures in bytes.
  /// Constant length for readability considerations.
  salt_size: usize,
  /// The hash function used to create digests.
  hasher: H,
}

/// Transforms a JSON object into an SD-JWT object by substituting selected values
/// with their corresponding disclosure digests.
#[cfg(feature = "sha")]
#[derive(Debug, Clone)]
pub struct SdObjectEncoder<H: Hasher = Sha256Hasher> {
  /// The object in JSON format.
  object: Map<String, Value>,
  /// Size of random data used to generate the salts for disclosures in bytes.
  /// Constant length for readability considerations.
  salt_size: usize,
  /// The hash function used to create digests.
  hasher: H,
}

#[cfg(feature = "sha")]
impl SdObjectEncoder {
  /// Creates a new [`SdObjectEncoder`] with `sha-256` hash function from a serializable object.
  ///
  /// ## Error
  /// Returns [`Error::DeserializationError`] if `object` can not be serialized into a valid JSON object.
  pub fn try_from_serializable<T: serde::Serialize>(object: T) -> Result<Self> {
    let value = serde_json::to_value(&object).map_err(|e| Error::DeserializationError(e.to_string()))?;
    Self::try_from(value)
  }
}

#[cfg(feature = "sha")]
impl TryFrom<Value> for SdObjectEncoder {
  type Error = crate::Error;

  fn try_from(value: Value) -> Result<Self> {
    match value {
      Value::Object(object) => Ok(SdObjectEncoder {
        object,
        salt_size: DEFAULT_SALT_SIZE,
        hasher: Sha256Hasher::new(),
      }),
      _ => Err(Error::DataTypeMismatch("expected object".to_owned())),
    }
  }
}

impl<H: Hasher> SdObjectEncoder<H> {
  /// Creates a new [`SdObjectEncoder`] with custom hash function to create digests.
  pub fn with_custom_hasher(object: Value, hasher: H) -> Result<Self> {
    Self::with_custom_hasher_and_salt_size(object, hasher, DEFAULT_SALT_SIZE)
  }

  /// Creates a new [`SdObjectEncoder`] with custom hash function to create digests,
  /// and a custom salt size.
  ///
  /// ## Error
  /// Returns [`Error::InvalidSaltSize`] if `salt_size` is below 16 bytes.
  pub fn with_custom_hasher_and_salt_size(object: Value, hasher: H, salt_size: usize) -> Result<Self> {
    if salt_size < 16 {
      return Err(Error::InvalidSaltSize);
    }
    match object {
      Value::Object(object) => Ok(Self {
        object,
        salt_size,
        hasher,
      }),
      _ => Err(Error::DataTypeMismatch("expected object".to_owned())),
    }
  }

  /// Substitutes a value with the digest of its disclosure.
  /// If no salt is provided, the disclosure will be created with a random salt value.
  ///
  /// `path` is a `/`-separated pointer to the value to conceal, e.g.
  /// `/claim/subclaim` conceals `claim.subclaim` and `/claim2/0` conceals the
  /// first element of the array `claim2`.
  ///
  /// ## Error
  /// * [`Error::InvalidPath`] if the path does not exist or the path is empty.
  /// * [`Error::ReservedClaimName`] if the concealed key is `_sd`, `_sd_alg` or `...`.
  /// * [`Error::DataTypeMismatch`] if existing SD format is invalid.
  pub fn conceal(&mut self, path: &str, salt: Option<String>) -> Result<Disclosure> {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
      return Err(Error::InvalidPath("the provided path is empty".to_string()));
    }

    let salt = salt.unwrap_or_else(|| gen_rand(self.salt_size));
    let (target, parent_path) = segments.split_last().ok_or_else(|| {
      // Unreachable: `segments` always holds at least one element.
      Error::InvalidPath("the provided path is empty".to_string())
    })?;

    let hasher = &self.hasher;
    if parent_path.is_empty() {
      return Self::conceal_property(&mut self.object, target, salt, hasher);
    }

    let start = self
      .object
      .get_mut(parent_path[0])
      .ok_or_else(|| Error::InvalidPath(format!("{} does not exist", parent_path[0])))?;
    match Self::traverse(start, &parent_path[1..])? {
      Value::Object(parent) => Self::conceal_property(parent, target, salt, hasher),
      Value::Array(parent) => {
        let index = target
          .parse::<usize>()
          .map_err(|_| Error::InvalidPath(format!("{} is not an array index", target)))?;
        Self::conceal_array_entry(parent, index, salt, hasher)
      }
      _ => Err(Error::InvalidPath(format!("{} is neither an object nor an array", target))),
    }
  }

  fn traverse<'a>(start: &'a mut Value, path: &[&str]) -> Result<&'a mut Value> {
    let mut current = start;
    for segment in path {
      current = match current {
        Value::Object(object) => object
          .get_mut(*segment)
          .ok_or_else(|| Error::InvalidPath(format!("{} does not exist", segment)))?,
        Value::Array(array) => {
          let index = segment
            .parse::<usize>()
            .map_err(|_| Error::InvalidPath(format!("{} is not an array index", segment)))?;
          array.get_mut(index).ok_or(Error::IndexOutOfBounds(index))?
        }
        _ => return Err(Error::InvalidPath(format!("{} cannot be traversed", segment))),
      };
    }
    Ok(current)
  }

  fn conceal_property(object: &mut Map<String, Value>, key: &str, salt: String, hasher: &H) -> Result<Disclosure> {
    let value = object
      .remove(key)
      .ok_or_else(|| Error::InvalidPath(format!("{} does not exist", key)))?;
    let disclosure = Disclosure::new(salt, Some(key.to_owned()), value)?;
    let digest = hasher.encoded_digest(disclosure.as_str());
    Self::add_digest_to_object(object, digest)?;
    Ok(disclosure)
  }

  fn conceal_array_entry(array: &mut Vec<Value>, index: usize, salt: String, hasher: &H) -> Result<Disclosure> {
    let element = array.get_mut(index).ok_or(Error::IndexOutOfBounds(index))?;
    let disclosure = Disclosure::new(salt, None, element.clone())?;
    let digest = hasher.encoded_digest(disclosure.as_str());
    *element = json!({ ARRAY_DIGEST_KEY: digest });
    Ok(disclosure)
  }

  /// Adds the `_sd_alg` property to the top level of the object.
  /// The value is taken from the [`crate::Hasher::alg_name`] implementation.
  pub fn add_sd_alg_property(&mut self) -> Option<Value> {
    self
      .object
      .insert(SD_ALG.to_string(), Value::String(self.hasher.alg_name().to_string()))
  }

  /// Adds decoy digests to the specified path.
  /// If path is an empty string, decoys will be added to the top level.
  ///
  /// ## Error
  /// Returns [`Error::TooManyDecoys`] for more than 64 decoys per call.
  pub fn add_decoys(&mut self, path: &str, number_of_decoys: usize) -> Result<()> {
    if number_of_decoys > MAX_DECOYS {
      return Err(Error::TooManyDecoys(MAX_DECOYS));
    }
    for _ in 0..number_of_decoys {
      self.add_decoy(path)?;
    }
    Ok(())
  }

  fn add_decoy(&mut self, path: &str) -> Result<()> {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
      let digest = Self::random_digest(&self.hasher, self.salt_size, false)?;
      return Self::add_digest_to_object(&mut self.object, digest);
    }

    let start = self
      .object
      .get_mut(segments[0])
      .ok_or_else(|| Error::InvalidPath(format!("{} does not exist", segments[0])))?;
    let value = Self::traverse(start, &segments[1..])?;
    match value {
      Value::Object(object) => {
        let digest = Self::random_digest(&self.hasher, self.salt_size, false)?;
        Self::add_digest_to_object(object, digest)
      }
      Value::Array(array) => {
        let digest = Self::random_digest(&self.hasher, self.salt_size, true)?;
        array.push(json!({ ARRAY_DIGEST_KEY: digest }));
        Ok(())
      }
      _ => Err(Error::InvalidPath(format!(
        "{} is neither an object nor an array",
        path
      ))),
    }
  }

  /// Add the digest to the `_sd` array if exists; otherwise, create the array and insert the digest.
  fn add_digest_to_object(object: &mut Map<String, Value>, digest: String) -> Result<()> {
    if let Some(sd_value) = object.get_mut(DIGESTS_KEY) {
      if let Value::Array(value) = sd_value {
        value.push(Value::String(digest))
      } else {
        return Err(Error::DataTypeMismatch(
          "invalid object: existing `_sd` type is not an array".to_string(),
        ));
      }
    } else {
      object.insert(DIGESTS_KEY.to_owned(), Value::Array(vec![Value::String(digest)]));
    }
    Ok(())
  }

  /// Digest of a throwaway random disclosure, indistinguishable from a real
  /// digest under any hash length.
  fn random_digest(hasher: &H, salt_len: usize, array_entry: bool) -> Result<String> {
    let mut rng = rand::thread_rng();
    let salt = gen_rand(salt_len);
    let decoy_value_length = rng.gen_range(20..=100);
    let decoy_claim_name = if array_entry {
      None
    } else {
      let decoy_claim_name_length = rng.gen_range(4..=10);
      Some(gen_rand(decoy_claim_name_length))
    };
    let decoy_value = gen_rand(decoy_value_length);
    let disclosure = Disclosure::new(salt, decoy_claim_name, Value::String(decoy_value))?;
    Ok(hasher.encoded_digest(disclosure.as_str()))
  }

  /// Shuffles every `_sd` array in the object with a uniform permutation,
  /// so digest order carries no information about claim positions.
  pub(crate) fn shuffle_sd_digests(&mut self) {
    let mut rng = rand::thread_rng();
    Self::shuffle_object(&mut self.object, &mut rng);
  }

  fn shuffle_object(object: &mut Map<String, Value>, rng: &mut impl Rng) {
    for (key, value) in object.iter_mut() {
      if key == DIGESTS_KEY {
        if let Value::Array(digests) = value {
          digests.shuffle(rng);
        }
        continue;
      }
      Self::shuffle_value(value, rng);
    }
  }

  fn shuffle_value(value: &mut Value, rng: &mut impl Rng) {
    match value {
      Value::Object(object) => Self::shuffle_object(object, rng),
      Value::Array(array) => array.iter_mut().for_each(|element| Self::shuffle_value(element, rng)),
      _ => {}
    }
  }

  /// Returns a reference to the internal object.
  pub fn object(&self) -> &Map<String, Value> {
    &self.object
  }

  pub(crate) fn into_object(self) -> Map<String, Value> {
    self.object
  }

  /// Returns the used salt length.
  pub fn salt_size(&self) -> usize {
    self.salt_size
  }

  /// Sets size of random data used to generate the salts for disclosures in bytes.
  ///
  /// ## Warning
  /// Salt size must be >= 16.
  pub fn set_salt_size(&mut self, salt_size: usize) -> Result<()> {
    if salt_size < 16 {
      Err(Error::InvalidSaltSize)
    } else {
      self.salt_size = salt_size;
      Ok(())
    }
  }
}
