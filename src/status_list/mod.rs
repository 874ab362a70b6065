// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Compressed bitstring status lists published as signed tokens, following
//! the [OAuth status list](https://datatracker.ietf.org/doc/html/draft-ietf-oauth-status-list-02)
//! mechanism.

mod storage;
mod token;

use std::io::Read;
use std::io::Write;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::Deserialize;
use serde::Serialize;

pub use storage::apply_status_update;
pub use storage::MemoryStatusListStore;
pub use storage::SaveOutcome;
pub use storage::StatusListStorage;
pub use token::check_status;
pub use token::StatusListClaim;
pub use token::StatusListToken;
pub use token::StatusListTokenClaims;
pub use token::StatusTokenResolver;
pub use token::STATUS_LIST_TYP;

use crate::Error;
use crate::Result;

/// Width of a single status entry, in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StatusBits {
  One = 1,
  Two = 2,
  Four = 4,
  Eight = 8,
}

impl StatusBits {
  /// The number of bits per entry.
  pub fn bits(self) -> usize {
    self as usize
  }

  /// The largest storable status value.
  pub fn max_value(self) -> u8 {
    match self {
      Self::Eight => u8::MAX,
      _ => (1u8 << self.bits()) - 1,
    }
  }
}

impl TryFrom<u8> for StatusBits {
  type Error = Error;
  fn try_from(value: u8) -> Result<Self> {
    match value {
      1 => Ok(Self::One),
      2 => Ok(Self::Two),
      4 => Ok(Self::Four),
      8 => Ok(Self::Eight),
      other => Err(Error::InvalidStatusList(format!(
        "bits must be 1, 2, 4 or 8, found {other}"
      ))),
    }
  }
}

impl From<StatusBits> for u8 {
  fn from(bits: StatusBits) -> Self {
    bits as u8
  }
}

/// Interpretation of a status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusType {
  /// The credential is valid.
  Valid,
  /// The credential is revoked.
  Invalid,
  /// The credential is temporarily suspended.
  Suspended,
  /// A status with application-specific semantics (3 and above).
  ApplicationSpecific(u8),
}

impl From<u8> for StatusType {
  fn from(value: u8) -> Self {
    match value {
      0 => Self::Valid,
      1 => Self::Invalid,
      2 => Self::Suspended,
      other => Self::ApplicationSpecific(other),
    }
  }
}

impl From<StatusType> for u8 {
  fn from(status: StatusType) -> Self {
    match status {
      StatusType::Valid => 0,
      StatusType::Invalid => 1,
      StatusType::Suspended => 2,
      StatusType::ApplicationSpecific(other) => other,
    }
  }
}

/// A packed list of status values.
///
/// Entry `i` occupies bits `[i*bits, (i+1)*bits)` of `data`, starting at the
/// least significant bit of each byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusList {
  bits: StatusBits,
  data: Vec<u8>,
  aggregation_uri: Option<String>,
}

impl StatusList {
  /// Creates a list of `num_entries` entries, all `0` (valid).
  pub fn new(bits: StatusBits, num_entries: usize) -> Self {
    let data = vec![0u8; (num_entries * bits.bits() + 7) / 8];
    Self {
      bits,
      data,
      aggregation_uri: None,
    }
  }

  /// Packs `values` into a new list.
  ///
  /// ## Error
  /// [`Error::InvalidStatusList`] if any value needs more than `bits` bits.
  pub fn from_values(bits: StatusBits, values: &[u8]) -> Result<Self> {
    let mut list = Self::new(bits, values.len());
    for (index, value) in values.iter().enumerate() {
      list.set(index, *value)?;
    }
    Ok(list)
  }

  /// Reinterprets raw packed bytes as a status list.
  pub fn from_bytes(bits: StatusBits, data: Vec<u8>) -> Self {
    Self {
      bits,
      data,
      aggregation_uri: None,
    }
  }

  /// Sets the URI where related status lists can be discovered.
  pub fn with_aggregation_uri(mut self, uri: impl Into<String>) -> Self {
    self.aggregation_uri = Some(uri.into());
    self
  }

  pub fn aggregation_uri(&self) -> Option<&str> {
    self.aggregation_uri.as_deref()
  }

  pub fn bits(&self) -> StatusBits {
    self.bits
  }

  /// The raw packed bytes.
  pub fn data(&self) -> &[u8] {
    &self.data
  }

  /// The number of entries.
  pub fn len(&self) -> usize {
    self.data.len() * 8 / self.bits.bits()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// Returns the status value at `index`.
  pub fn get(&self, index: usize) -> Result<u8> {
    let (byte, shift) = self.locate(index)?;
    Ok((self.data[byte] >> shift) & self.bits.max_value())
  }

  /// Stores `value` at `index`.
  ///
  /// ## Error
  /// * [`Error::IndexOutOfBounds`] if `index >= len`.
  /// * [`Error::InvalidStatusList`] if `value` needs more than `bits` bits.
  pub fn set(&mut self, index: usize, value: u8) -> Result<()> {
    if value > self.bits.max_value() {
      return Err(Error::InvalidStatusList(format!(
        "value {value} does not fit in {} bits",
        self.bits.bits()
      )));
    }
    let (byte, shift) = self.locate(index)?;
    self.data[byte] &= !(self.bits.max_value() << shift);
    self.data[byte] |= value << shift;
    Ok(())
  }

  /// Unpacks every entry.
  pub fn values(&self) -> Vec<u8> {
    (0..self.len())
      .map(|index| {
        let bit_index = index * self.bits.bits();
        (self.data[bit_index / 8] >> (bit_index % 8)) & self.bits.max_value()
      })
      .collect()
  }

  fn locate(&self, index: usize) -> Result<(usize, usize)> {
    if index >= self.len() {
      return Err(Error::IndexOutOfBounds(index));
    }
    let bit_index = index * self.bits.bits();
    Ok((bit_index / 8, bit_index % 8))
  }

  /// DEFLATE-compresses the packed bytes and encodes them as base64url, the
  /// `lst` representation of a status list token.
  pub fn to_compressed_b64(&self) -> Result<String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder
      .write_all(&self.data)
      .and_then(|()| encoder.finish())
      .map(|compressed| multibase::Base::Base64Url.encode(compressed))
      .map_err(|e| Error::InvalidStatusList(format!("compression failed: {e}")))
  }

  /// Inverse of [`StatusList::to_compressed_b64`].
  pub fn from_compressed_b64(bits: StatusBits, lst: &str) -> Result<Self> {
    let compressed = multibase::Base::Base64Url
      .decode(lst)
      .map_err(|_| Error::InvalidStatusList("`lst` is not Base64Url-encoded".to_string()))?;
    let mut data = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
      .read_to_end(&mut data)
      .map_err(|e| Error::InvalidStatusList(format!("decompression failed: {e}")))?;
    Ok(Self {
      bits,
      data,
      aggregation_uri: None,
    })
  }
}

#[cfg(test)]
mod test {
  use super::StatusBits;
  use super::StatusList;
  use super::StatusType;
  use crate::Error;

  #[test]
  fn pack_unpack_round_trip() {
    for bits in [StatusBits::One, StatusBits::Two, StatusBits::Four, StatusBits::Eight] {
      let modulo = bits.max_value() as u16 + 1;
      let values: Vec<u8> = (0..64u16).map(|i| (i % modulo) as u8).collect();
      let list = StatusList::from_values(bits, &values).unwrap();
      assert_eq!(list.values(), values);
    }
  }

  #[test]
  fn set_get_is_a_no_op() {
    let mut list = StatusList::from_values(StatusBits::Two, &[0, 1, 2, 3, 1, 0]).unwrap();
    let before = list.clone();
    for index in 0..list.len() {
      let value = list.get(index).unwrap();
      list.set(index, value).unwrap();
    }
    assert_eq!(list, before);
  }

  #[test]
  fn lsb_first_packing() {
    // Example from the status list draft: bits=1, values 1,0,0,1,1,1,0,1
    // pack into the byte 0b10111001.
    let list = StatusList::from_values(StatusBits::One, &[1, 0, 0, 1, 1, 1, 0, 1]).unwrap();
    assert_eq!(list.data(), &[0b1011_1001]);
  }

  #[test]
  fn neighbours_are_untouched() {
    let mut list = StatusList::new(StatusBits::Two, 1024);
    list.set(500, 1).unwrap();
    assert_eq!(list.get(500).unwrap(), 1);
    assert_eq!(list.get(499).unwrap(), 0);
    assert_eq!(list.get(501).unwrap(), 0);
  }

  #[test]
  fn value_out_of_range() {
    let mut list = StatusList::new(StatusBits::Two, 8);
    assert!(matches!(list.set(0, 4).unwrap_err(), Error::InvalidStatusList(_)));
  }

  #[test]
  fn index_out_of_bounds() {
    let mut list = StatusList::new(StatusBits::One, 8);
    assert!(matches!(list.get(8).unwrap_err(), Error::IndexOutOfBounds(8)));
    assert!(matches!(list.set(8, 1).unwrap_err(), Error::IndexOutOfBounds(8)));
  }

  #[test]
  fn compression_round_trip() {
    let mut list = StatusList::new(StatusBits::Two, 1024);
    list.set(500, 1).unwrap();
    list.set(7, 3).unwrap();
    let lst = list.to_compressed_b64().unwrap();
    let decoded = StatusList::from_compressed_b64(StatusBits::Two, &lst).unwrap();
    assert_eq!(decoded.data(), list.data());
    assert_eq!(decoded.get(500).unwrap(), 1);
  }

  #[test]
  fn large_list_round_trips() {
    // 2^20 one-byte entries.
    let mut list = StatusList::new(StatusBits::Eight, 1 << 20);
    list.set((1 << 20) - 1, 255).unwrap();
    list.set(123_456, 42).unwrap();
    let lst = list.to_compressed_b64().unwrap();
    let decoded = StatusList::from_compressed_b64(StatusBits::Eight, &lst).unwrap();
    assert_eq!(decoded.len(), 1 << 20);
    assert_eq!(decoded.get(123_456).unwrap(), 42);
    assert_eq!(decoded.get((1 << 20) - 1).unwrap(), 255);
  }

  #[test]
  fn status_type_mapping() {
    assert_eq!(StatusType::from(0), StatusType::Valid);
    assert_eq!(StatusType::from(1), StatusType::Invalid);
    assert_eq!(StatusType::from(2), StatusType::Suspended);
    assert_eq!(StatusType::from(7), StatusType::ApplicationSpecific(7));
    assert_eq!(u8::from(StatusType::Suspended), 2);
  }

  #[test]
  fn invalid_bits() {
    assert!(matches!(StatusBits::try_from(3).unwrap_err(), Error::InvalidStatusList(_)));
  }
}
