// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Opaque bearer tokens with per-token abilities.
//!
//! ## Auth Flow
//!
//! 1. Client logs in with e-mail and password
//! 2. Server issues two tokens, each returned once as `"<id>|<secret>"`:
//!    - access token with ability `access-api` (60 minutes)
//!    - refresh token with ability `refresh-token` (7 days)
//! 3. Client sends `Authorization: Bearer <id>|<secret>`
//! 4. Server:
//!    - Splits the bearer and hashes the secret with SHA-256
//!    - Looks the row up by id AND digest, then checks expiry
//!    - Attaches the owning user to the request
//!    - Checks the route's required abilities against the token's set
//!
//! ## Security
//!
//! - Only SHA-256 digests of secrets are stored
//! - Passwords are bcrypt hashed (cost 12 by default)
//! - Unknown e-mail and wrong password are indistinguishable
//! - Malformed, unknown and expired tokens share one 401 response

pub mod abilities;
pub mod authenticator;
pub mod codec;
pub mod error;
pub mod extractor;
pub mod identity;
pub mod middleware;
pub mod password;
pub mod roles;

pub use abilities::{Abilities, TokenKind};
pub use authenticator::{Authenticator, Registration, TokenPolicy};
pub use error::AuthError;
pub use extractor::Auth;
pub use identity::{AuthenticatedUser, VerifiedBearer};
pub use roles::RoleName;
