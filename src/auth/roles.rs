// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles.
//!
//! Roles are seeded rows looked up by name. They decide nothing about
//! token abilities; authorization on routes is driven by abilities alone.

use serde::{Deserialize, Serialize};

/// Well-known role names seeded at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleName {
    /// Storefront customer (assigned at registration)
    Customer,
    /// Back-office administrator
    Admin,
}

impl RoleName {
    /// Every role that must exist for the service to operate.
    pub const ALL: [RoleName; 2] = [RoleName::Customer, RoleName::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleName::Customer => "customer",
            RoleName::Admin => "admin",
        }
    }
}

impl Default for RoleName {
    /// Self-registered users are customers.
    fn default() -> Self {
        RoleName::Customer
    }
}

impl std::fmt::Display for RoleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_lowercase() {
        let names: Vec<_> = RoleName::ALL.iter().map(RoleName::as_str).collect();
        assert_eq!(names, ["customer", "admin"]);
        assert_eq!(serde_json::to_string(&RoleName::Admin).unwrap(), "\"admin\"");
    }

    #[test]
    fn default_role_is_customer() {
        assert_eq!(RoleName::default(), RoleName::Customer);
        assert_eq!(RoleName::default().to_string(), "customer");
    }
}
