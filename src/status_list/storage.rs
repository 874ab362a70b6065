// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Mutex;

use async_trait::async_trait;

use super::StatusListToken;
use crate::Error;
use crate::JwsSigner;
use crate::Result;

/// Result of a conditional save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
  /// The token was stored; `etag` identifies the new generation.
  Saved { etag: String },
  /// Another writer got there first; re-read at `current_etag` and retry.
  Conflict { current_etag: String },
}

/// Storage for published status list tokens, versioned by opaque ETags.
///
/// `get_with_etag`/`try_save` implement optimistic concurrency: a save only
/// succeeds when the expected ETag still identifies the stored generation.
/// The unconditional `get`/`save` pair exists for backward compatibility;
/// new write paths should use the conditional one.
#[async_trait]
pub trait StatusListStorage: Sync + Send {
  type Error: std::error::Error;

  /// Returns the stored token (if any) and the ETag of the current generation.
  async fn get_with_etag(&self, list_id: &str) -> std::result::Result<(Option<String>, String), Self::Error>;

  /// Stores `token` only if `expected_etag` still identifies the current
  /// generation. Atomic: concurrent callers observe either the old or the new
  /// generation, never a mix.
  async fn try_save(
    &self,
    list_id: &str,
    token: &str,
    expected_etag: &str,
  ) -> std::result::Result<SaveOutcome, Self::Error>;

  /// Unconditional read.
  async fn get(&self, list_id: &str) -> std::result::Result<Option<String>, Self::Error> {
    self.get_with_etag(list_id).await.map(|(token, _)| token)
  }

  /// Unconditional write, overwriting any concurrent update.
  async fn save(&self, list_id: &str, token: &str) -> std::result::Result<(), Self::Error>;
}

/// In-memory [`StatusListStorage`], suitable for tests and single-process
/// issuers.
#[derive(Debug, Default)]
pub struct MemoryStatusListStore {
  lists: Mutex<HashMap<String, (u64, String)>>,
}

impl MemoryStatusListStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn with_lists<T>(&self, f: impl FnOnce(&mut HashMap<String, (u64, String)>) -> T) -> T {
    let mut guard = self.lists.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut guard)
  }
}

#[async_trait]
impl StatusListStorage for MemoryStatusListStore {
  type Error = Infallible;

  async fn get_with_etag(&self, list_id: &str) -> std::result::Result<(Option<String>, String), Self::Error> {
    Ok(self.with_lists(|lists| match lists.get(list_id) {
      Some((version, token)) => (Some(token.clone()), version.to_string()),
      None => (None, 0.to_string()),
    }))
  }

  async fn try_save(
    &self,
    list_id: &str,
    token: &str,
    expected_etag: &str,
  ) -> std::result::Result<SaveOutcome, Self::Error> {
    Ok(self.with_lists(|lists| {
      let current_version = lists.get(list_id).map(|(version, _)| *version).unwrap_or_default();
      if current_version.to_string() != expected_etag {
        return SaveOutcome::Conflict {
          current_etag: current_version.to_string(),
        };
      }
      let next = current_version + 1;
      lists.insert(list_id.to_string(), (next, token.to_string()));
      SaveOutcome::Saved { etag: next.to_string() }
    }))
  }

  async fn save(&self, list_id: &str, token: &str) -> std::result::Result<(), Self::Error> {
    self.with_lists(|lists| {
      let next = lists.get(list_id).map(|(version, _)| *version).unwrap_or_default() + 1;
      lists.insert(list_id.to_string(), (next, token.to_string()));
    });
    Ok(())
  }
}

/// One pass of the read→modify→sign→compare-and-set loop: sets entry `index`
/// of the stored list to `value` and publishes a re-signed token with `iat`.
///
/// No lock is held while signing; a concurrent writer surfaces as
/// [`Error::ConcurrencyConflict`] and the caller retries the whole pass.
///
/// Returns the ETag of the new generation.
pub async fn apply_status_update<St, S>(
  storage: &St,
  list_id: &str,
  index: usize,
  value: u8,
  iat: i64,
  signer: &S,
  alg: &str,
) -> Result<String>
where
  St: StatusListStorage,
  S: JwsSigner,
{
  let (token, etag) = storage
    .get_with_etag(list_id)
    .await
    .map_err(|e| Error::StatusUnknown(e.to_string()))?;
  let token = token.ok_or_else(|| Error::StatusUnknown(format!("no status list stored under `{list_id}`")))?;

  let parsed = StatusListToken::parse(&token)?;
  let mut list = parsed.status_list()?;
  list.set(index, value)?;

  let claims = parsed.claims();
  let new_token = StatusListToken::sign(&list, &claims.iss, &claims.sub, iat, claims.exp, signer, alg).await?;

  match storage
    .try_save(list_id, new_token.as_str(), &etag)
    .await
    .map_err(|e| Error::StatusUnknown(e.to_string()))?
  {
    SaveOutcome::Saved { etag } => Ok(etag),
    SaveOutcome::Conflict { current_etag } => Err(Error::ConcurrencyConflict { current_etag }),
  }
}
