// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

#![deny(
    warnings,
    clippy::all,
    clippy::cargo,
    clippy::nursery,
    clippy::pedantic
)]
#![allow(clippy::multiple_crate_versions)]

pub mod auth;
pub mod commands;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod log;
pub mod server;
pub mod session;
pub mod stream;
pub mod types;

pub use error::Error;
