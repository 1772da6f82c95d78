// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (authentication, App Check, security, etc.).

pub mod app_check;
pub mod auth;
pub mod client_ip;
pub mod security;

pub use app_check::enforce_app_check;
pub use auth::{optional_auth, require_auth, AuthUser, MaybeAuthUser};
pub use client_ip::{attach_client_ip, ClientIp};
