// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;
use serde::Serialize;

/// The `status` claim of an SD-JWT VC: a reference into a published status
/// list. Placed at the top level of the credential and not selectively
/// disclosable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
  pub status_list: StatusListRef,
}

impl Status {
  /// Creates a new status claim referencing entry `idx` of the status list
  /// published at `uri`.
  pub fn new(uri: impl Into<String>, idx: usize) -> Self {
    Self {
      status_list: StatusListRef { uri: uri.into(), idx },
    }
  }
}

/// Reference to a single entry of a status list token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusListRef {
  /// URI the status list token is published at.
  pub uri: String,
  /// Index of this credential's entry.
  pub idx: usize,
}
