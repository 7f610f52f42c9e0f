//! Role-claim normalization and the authenticated principal.
//!
//! Tokens in circulation carry roles in several shapes: a single `role`
//! string, a `roles` array, or an `authorities` array (whose entries may
//! be bare strings or `{"authority": "..."}` objects). [`normalize_roles`]
//! is the only place that knows about those shapes.

use std::collections::BTreeSet;

use sclms_core::models::account::{Account, Role};
use serde::Serialize;
use serde_json::{Map, Value};

const ROLE_PREFIX: &str = "ROLE_";
const ROLE_CLAIMS: [&str; 3] = ["role", "roles", "authorities"];

/// De-duplicated, `ROLE_`-prefixed, upper-case role names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Authorities(BTreeSet<String>);

impl Authorities {
    pub fn contains(&self, authority: &str) -> bool {
        self.0.contains(authority)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.0.contains(&canonical(role.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// An account admitted by the authentication gate.
#[derive(Debug, Clone)]
pub struct Principal {
    /// Freshly loaded from the store, not taken from the token.
    pub account: Account,
    pub authorities: Authorities,
}

impl Principal {
    pub fn has_role(&self, role: Role) -> bool {
        self.authorities.has_role(role)
    }
}

fn canonical(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    if upper.starts_with(ROLE_PREFIX) {
        upper
    } else {
        format!("{ROLE_PREFIX}{upper}")
    }
}

fn collect(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(s) => out.push(s.clone()),
                    Value::Object(obj) => {
                        if let Some(Value::String(s)) = obj.get("authority") {
                            out.push(s.clone());
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

/// Merge every role-ish claim into one canonical set.
///
/// When the claims carry no usable role at all, `fallback` (the role
/// stored on the account) is used instead.
pub fn normalize_roles(claims: &Map<String, Value>, fallback: Option<Role>) -> Authorities {
    let mut raw = Vec::new();
    for key in ROLE_CLAIMS {
        if let Some(value) = claims.get(key) {
            collect(value, &mut raw);
        }
    }

    let mut set: BTreeSet<String> = raw
        .iter()
        .map(|r| canonical(r))
        .filter(|r| r != ROLE_PREFIX)
        .collect();

    if set.is_empty() {
        if let Some(role) = fallback {
            set.insert(canonical(role.as_str()));
        }
    }

    Authorities(set)
}
