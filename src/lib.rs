// Copyright 2020-2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

mod builder;
mod decoder;
mod disclosure;
mod encoder;
mod error;
mod hasher;
mod jwt;
mod key_binding;
mod sd_jwt;
mod sd_jwt_vc;
mod signer;
mod status_list;
mod utils;
mod verifier;

pub use builder::*;
pub use decoder::*;
pub use disclosure::*;
pub use encoder::*;
pub use error::*;
pub use hasher::*;
pub use jwt::Jwt;
pub use key_binding::*;
pub use sd_jwt::*;
pub use sd_jwt_vc::*;
pub use signer::*;
pub use status_list::*;
pub use verifier::*;
pub(crate) use utils::*;
