// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

#[cfg(feature = "sha")]
use crypto::hashes::sha::SHA256;
#[cfg(feature = "sha")]
use crypto::hashes::sha::SHA256_LEN;
#[cfg(feature = "sha")]
use crypto::hashes::sha::SHA384;
#[cfg(feature = "sha")]
use crypto::hashes::sha::SHA384_LEN;
#[cfg(feature = "sha")]
use crypto::hashes::sha::SHA512;
#[cfg(feature = "sha")]
use crypto::hashes::sha::SHA512_LEN;

use crate::Error;
use crate::Result;

pub const SHA_ALG_NAME: &str = "sha-256";

/// Hash algorithms approved for disclosure digests and `sd_hash`.
///
/// `md5` and `sha-1` are rejected along with everything else outside this set.
pub const APPROVED_HASH_ALGORITHMS: &[&str] = &["sha-256", "sha-384", "sha-512"];

/// Returns an error if `alg_name` is not an approved disclosure hash algorithm.
pub fn check_hash_alg(alg_name: &str) -> Result<()> {
  if APPROVED_HASH_ALGORITHMS.contains(&alg_name) {
    Ok(())
  } else {
    Err(Error::UnsupportedAlgorithm(alg_name.to_string()))
  }
}

/// Used to implement hash functions to be used for encoding/decoding.
///
/// ## Note
///
/// Implementations of this trait are expected only for algorithms listed in
/// the IANA "Named Information Hash Algorithm" registry.
/// See [Hash Function Claim](https://www.ietf.org/archive/id/draft-ietf-oauth-selective-disclosure-jwt-06.html#name-hash-function-claim)
pub trait Hasher: Sync + Send {
  /// Digests input to produce unique fixed-size hash value in bytes.
  fn digest(&self, input: &[u8]) -> Vec<u8>;

  /// Returns the name of hash function used.
  ///
  /// ## Note
  ///
  /// The hash algorithm identifier MUST be a hash algorithm value from the
  /// "Hash Name String" column in the IANA "Named Information Hash Algorithm"
  fn alg_name(&self) -> &'static str;

  /// Returns the base64url-encoded digest of a `disclosure`.
  fn encoded_digest(&self, disclosure: &str) -> String {
    let hash = self.digest(disclosure.as_bytes());
    multibase::Base::Base64Url.encode(hash)
  }
}

impl Hasher for Box<dyn Hasher> {
  fn digest(&self, input: &[u8]) -> Vec<u8> {
    self.as_ref().digest(input)
  }

  fn alg_name(&self) -> &'static str {
    self.as_ref().alg_name()
  }
}

/// An implementation of [`Hasher`] that uses the `sha-256` hash function.
#[cfg(feature = "sha")]
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher;

#[cfg(feature = "sha")]
impl Sha256Hasher {
  pub const ALG_NAME: &'static str = "sha-256";

  /// Creates a new [`Sha256Hasher`].
  pub fn new() -> Self {
    Sha256Hasher {}
  }
}

#[cfg(feature = "sha")]
impl Hasher for Sha256Hasher {
  fn digest(&self, input: &[u8]) -> Vec<u8> {
    let mut digest: [u8; SHA256_LEN] = Default::default();
    SHA256(input, &mut digest);
    digest.to_vec()
  }

  fn alg_name(&self) -> &'static str {
    Sha256Hasher::ALG_NAME
  }
}

/// An implementation of [`Hasher`] that uses the `sha-384` hash function.
#[cfg(feature = "sha")]
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha384Hasher;

#[cfg(feature = "sha")]
impl Sha384Hasher {
  pub const ALG_NAME: &'static str = "sha-384";

  pub fn new() -> Self {
    Sha384Hasher {}
  }
}

#[cfg(feature = "sha")]
impl Hasher for Sha384Hasher {
  fn digest(&self, input: &[u8]) -> Vec<u8> {
    let mut digest: [u8; SHA384_LEN] = [0u8; SHA384_LEN];
    SHA384(input, &mut digest);
    digest.to_vec()
  }

  fn alg_name(&self) -> &'static str {
    Sha384Hasher::ALG_NAME
  }
}

/// An implementation of [`Hasher`] that uses the `sha-512` hash function.
#[cfg(feature = "sha")]
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha512Hasher;

#[cfg(feature = "sha")]
impl Sha512Hasher {
  pub const ALG_NAME: &'static str = "sha-512";

  pub fn new() -> Self {
    Sha512Hasher {}
  }
}

#[cfg(feature = "sha")]
impl Hasher for Sha512Hasher {
  fn digest(&self, input: &[u8]) -> Vec<u8> {
    let mut digest: [u8; SHA512_LEN] = [0u8; SHA512_LEN];
    SHA512(input, &mut digest);
    digest.to_vec()
  }

  fn alg_name(&self) -> &'static str {
    Sha512Hasher::ALG_NAME
  }
}

// Some test values taken from https://www.ietf.org/archive/id/draft-ietf-oauth-selective-disclosure-jwt-05.html#name-hashing-disclosures
#[cfg(test)]
mod test {
  use crate::check_hash_alg;
  use crate::Error;
  use crate::Hasher;
  use crate::Sha256Hasher;

  #[test]
  fn test1() {
    let disclosure = "WyI2cU1RdlJMNWhhaiIsICJmYW1pbHlfbmFtZSIsICJNw7ZiaXVzIl0";
    let hasher = Sha256Hasher::new();
    let hash = hasher.encoded_digest(disclosure);
    assert_eq!("uutlBuYeMDyjLLTpf6Jxi7yNkEF35jdyWMn9U7b_RYY", hash);
  }

  #[test]
  fn test2() {
    let disclosure =
      "WyJlSThaV205UW5LUHBOUGVOZW5IZGhRIiwgImVtYWlsIiwgIlwidW51c3VhbCBlbWFpbCBhZGRyZXNzXCJAZXhhbXBsZS5qcCJd";
    let hasher = Sha256Hasher::new();
    let hash = hasher.encoded_digest(disclosure);
    assert_eq!("Kuet1yAa0HIQvYnOVd59hcViO9Ug6J2kSfqYRBeowvE", hash);
  }

  #[test]
  fn test3() {
    let disclosure = "WyJsa2x4RjVqTVlsR1RQVW92TU5JdkNBIiwgIkZSIl0";
    let hasher = Sha256Hasher::new();
    let hash = hasher.encoded_digest(disclosure);
    assert_eq!("w0I8EKcdCtUPkGCNUrfwVp2xEgNjtoIDlOxc9-PlOhs", hash);
  }

  #[test]
  fn weak_algorithms_are_rejected() {
    for alg in ["md5", "sha-1", "crc32"] {
      assert!(matches!(check_hash_alg(alg).unwrap_err(), Error::UnsupportedAlgorithm(_)));
    }
    check_hash_alg("sha-256").unwrap();
    check_hash_alg("sha-384").unwrap();
    check_hash_alg("sha-512").unwrap();
  }
}
