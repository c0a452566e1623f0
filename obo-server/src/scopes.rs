//! Fixed scope catalog
//!
//! Scopes are plain strings of the form `<resource>:<read|write>`. The catalog
//! is compiled in and validated once at startup; there is no runtime
//! registration path.

use crate::errors::AuthError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Every grantable scope, paired with the description shown on consent screens.
pub const SCOPE_CATALOG: &[(&str, &str)] = &[
    ("timelapse:read", "View timelapses and their render status"),
    ("timelapse:write", "Create, rename and delete timelapses"),
    ("snapshot:read", "View camera snapshots"),
    ("snapshot:write", "Capture and delete camera snapshots"),
    ("comment:read", "Read comments"),
    ("comment:write", "Post and delete comments"),
    ("user:read", "Read your profile information"),
    ("user:write", "Update your profile information"),
    ("global:read", "Read-only access to every resource"),
    ("global:write", "Full access to every resource"),
];

/// A scope identifier with its human-readable description.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScopeDescriptor {
    /// Scope identifier, e.g. "timelapse:read"
    pub scope: String,
    /// Consent screen description
    pub description: String,
}

/// Scopes of a single resource family, for grouped catalog listings.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScopeGroup {
    /// Resource family, e.g. "timelapse"
    pub resource: String,
    /// Scopes belonging to this family, in catalog order
    pub scopes: Vec<ScopeDescriptor>,
}

pub fn is_valid_scope(scope: &str) -> bool {
    SCOPE_CATALOG.iter().any(|(s, _)| *s == scope)
}

/// All catalog scopes in their fixed declaration order.
pub fn all_scopes() -> Vec<String> {
    SCOPE_CATALOG.iter().map(|(s, _)| s.to_string()).collect()
}

pub fn describe(scope: &str) -> Option<&'static str> {
    SCOPE_CATALOG
        .iter()
        .find(|(s, _)| *s == scope)
        .map(|(_, d)| *d)
}

/// Catalog grouped by resource family, preserving declaration order.
pub fn grouped() -> Vec<ScopeGroup> {
    let mut groups: Vec<ScopeGroup> = Vec::new();
    for (scope, description) in SCOPE_CATALOG {
        let resource = scope.split(':').next().unwrap_or(scope);
        let descriptor = ScopeDescriptor {
            scope: scope.to_string(),
            description: description.to_string(),
        };
        match groups.iter_mut().find(|g| g.resource == resource) {
            Some(group) => group.scopes.push(descriptor),
            None => groups.push(ScopeGroup {
                resource: resource.to_string(),
                scopes: vec![descriptor],
            }),
        }
    }
    groups
}

/// Trims entries, drops empties, and dedupes while preserving first-seen order.
pub fn normalize(requested: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(requested.len());
    for scope in requested {
        let scope = scope.trim();
        if scope.is_empty() {
            continue;
        }
        if !normalized.iter().any(|s| s == scope) {
            normalized.push(scope.to_string());
        }
    }
    normalized
}

/// Normalizes the requested list and rejects entries absent from the catalog.
/// The error carries every unknown entry, not just the first.
pub fn validate(requested: &[String]) -> Result<Vec<String>, AuthError> {
    let normalized = normalize(requested);
    let unknown: Vec<String> = normalized
        .iter()
        .filter(|s| !is_valid_scope(s))
        .cloned()
        .collect();
    if unknown.is_empty() {
        Ok(normalized)
    } else {
        Err(AuthError::Scope { scopes: unknown })
    }
}

/// Splits a space-delimited OAuth `scope` parameter into entries.
pub fn parse_scope_param(param: &str) -> Vec<String> {
    param
        .split_whitespace()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
}

/// Joins scopes back into the space-delimited OAuth wire form.
pub fn join_scopes(scopes: &[String]) -> String {
    scopes.join(" ")
}

/// Entries of `requested` that are not present in `allowed`.
pub fn missing_from(requested: &[String], allowed: &[String]) -> Vec<String> {
    requested
        .iter()
        .filter(|s| !allowed.contains(s))
        .cloned()
        .collect()
}

/// Entries of `a` that are also in `b`, preserving the order of `a`.
pub fn intersect(a: &[String], b: &[String]) -> Vec<String> {
    a.iter().filter(|s| b.contains(s)).cloned().collect()
}

/// Startup check on the compiled-in catalog: well-formed identifiers, no
/// duplicates across groups.
pub fn verify_catalog() -> Result<(), String> {
    let mut seen: Vec<&str> = Vec::with_capacity(SCOPE_CATALOG.len());
    for (scope, description) in SCOPE_CATALOG {
        let (resource, access) = scope
            .split_once(':')
            .ok_or_else(|| format!("scope '{}' is not of form <resource>:<access>", scope))?;
        if resource.is_empty() {
            return Err(format!("scope '{}' has an empty resource", scope));
        }
        if access != "read" && access != "write" {
            return Err(format!(
                "scope '{}' has access '{}', expected read or write",
                scope, access
            ));
        }
        if description.is_empty() {
            return Err(format!("scope '{}' has no description", scope));
        }
        if seen.contains(scope) {
            return Err(format!("scope '{}' appears more than once", scope));
        }
        seen.push(scope);
    }
    Ok(())
}
