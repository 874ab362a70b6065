// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use rand::Rng;
use subtle::ConstantTimeEq;

/// Compares two byte strings in constant time with respect to their contents.
///
/// Inputs of different lengths compare unequal; the length itself is not secret.
pub(crate) fn ct_eq(a: &[u8], b: &[u8]) -> bool {
  a.len() == b.len() && bool::from(a.ct_eq(b))
}

pub(crate) fn ct_eq_str(a: &str, b: &str) -> bool {
  ct_eq(a.as_bytes(), b.as_bytes())
}

/// Returns `len` bytes from the thread-local CSPRNG, base64url-encoded.
pub(crate) fn gen_rand(len: usize) -> String {
  let mut rng = rand::thread_rng();
  let random_bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
  multibase::Base::Base64Url.encode(random_bytes)
}
