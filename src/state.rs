// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::Authenticator;
use crate::storage::InMemoryStore;

#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<Authenticator>,
}

impl AppState {
    pub fn new(authenticator: Authenticator) -> Self {
        Self {
            authenticator: Arc::new(authenticator),
        }
    }

    /// State over one shared in-memory store. Roles are not seeded.
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::new(Authenticator::new(store.clone(), store.clone(), store))
    }

    /// In-memory state with seeded roles and the cheapest accepted bcrypt cost.
    #[cfg(test)]
    pub(crate) async fn for_tests() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let authenticator = Authenticator::new(store.clone(), store.clone(), store)
            .with_password_cost(crate::auth::password::MIN_COST);
        authenticator.seed_roles().await.unwrap();
        Self::new(authenticator)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::in_memory()
    }
}
