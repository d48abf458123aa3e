// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Storefront Auth Server - opaque bearer tokens with per-token abilities
//!
//! This crate provides the authentication core of an admin/storefront
//! backend: login, registration, token refresh and logout, plus the Axum
//! middleware that validates bearer tokens and enforces abilities per route.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Token codec, authenticator, middleware and extractor
//! - `storage` - Credential/role/token stores (redb and in-memory)
//! - `token_pruner` - Background removal of expired tokens

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod state;
pub mod storage;
pub mod token_pruner;
