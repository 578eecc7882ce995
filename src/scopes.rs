// ABOUTME: Static registry mapping tool operations to required gateway and upstream scopes
// ABOUTME: Scope parsing, validation, formatting, and missing-scope computation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

//! Scope model for the resource server.
//!
//! Scopes come from two disjoint namespaces: gateway-level scopes control
//! which operations a client may invoke (`workbooks:read`,
//! `datasources:query`, ...), and upstream-level scopes, prefixed `viz:`,
//! describe what the wrapped platform credential is permitted to do.
//! Authorization for an operation requires the full required set from both
//! namespaces to be a subset of the token's granted scopes.

/// Scopes an operation requires, split by namespace
#[derive(Debug, Clone, Copy)]
pub struct RequiredScopes {
    /// Gateway-level scopes the client must hold
    pub gateway: &'static [&'static str],
    /// Upstream-platform scopes the wrapped credential must hold
    pub upstream: &'static [&'static str],
}

impl RequiredScopes {
    /// All required scopes across both namespaces
    #[must_use]
    pub fn all(&self) -> Vec<&'static str> {
        let mut scopes: Vec<&'static str> = self
            .gateway
            .iter()
            .chain(self.upstream.iter())
            .copied()
            .collect();
        scopes.sort_unstable();
        scopes.dedup();
        scopes
    }
}

/// Operation name → required scopes, for every tool the gateway exposes
const OPERATION_SCOPES: &[(&str, RequiredScopes)] = &[
    (
        "list_datasources",
        RequiredScopes {
            gateway: &["datasources:read"],
            upstream: &["viz:content:read"],
        },
    ),
    (
        "query_datasource",
        RequiredScopes {
            gateway: &["datasources:read", "datasources:query"],
            upstream: &["viz:data:query"],
        },
    ),
    (
        "list_workbooks",
        RequiredScopes {
            gateway: &["workbooks:read"],
            upstream: &["viz:content:read"],
        },
    ),
    (
        "get_workbook",
        RequiredScopes {
            gateway: &["workbooks:read"],
            upstream: &["viz:content:read"],
        },
    ),
    (
        "list_views",
        RequiredScopes {
            gateway: &["views:read"],
            upstream: &["viz:content:read"],
        },
    ),
    (
        "get_view_data",
        RequiredScopes {
            gateway: &["views:read"],
            upstream: &["viz:views:download"],
        },
    ),
    (
        "get_view_image",
        RequiredScopes {
            gateway: &["views:read"],
            upstream: &["viz:views:download"],
        },
    ),
    (
        "read_metadata",
        RequiredScopes {
            gateway: &["metadata:read"],
            upstream: &["viz:content:read"],
        },
    ),
];

/// Static scope registry
pub struct ScopeRegistry;

impl ScopeRegistry {
    /// Look up the scopes required by `operation`
    #[must_use]
    pub fn required_for(operation: &str) -> Option<&'static RequiredScopes> {
        OPERATION_SCOPES
            .iter()
            .find(|(name, _)| *name == operation)
            .map(|(_, scopes)| scopes)
    }

    /// Names of every operation in the catalog
    #[must_use]
    pub fn operations() -> Vec<&'static str> {
        OPERATION_SCOPES.iter().map(|(name, _)| *name).collect()
    }

    /// Every scope this server supports, across both namespaces
    #[must_use]
    pub fn supported_scopes() -> Vec<&'static str> {
        let mut scopes: Vec<&'static str> = OPERATION_SCOPES
            .iter()
            .flat_map(|(_, req)| req.gateway.iter().chain(req.upstream.iter()))
            .copied()
            .collect();
        scopes.sort_unstable();
        scopes.dedup();
        scopes
    }

    /// Parse a space-delimited scope string per RFC 6749 §3.3
    #[must_use]
    pub fn parse(scope: &str) -> Vec<String> {
        scope
            .split(' ')
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Format scopes back to the wire representation
    #[must_use]
    pub fn format(scopes: &[String]) -> String {
        scopes.join(" ")
    }

    /// Validate that every scope names a known permission.
    ///
    /// # Errors
    ///
    /// Returns the list of unrecognized scopes.
    pub fn validate(scopes: &[String]) -> Result<(), Vec<String>> {
        let supported = Self::supported_scopes();
        let unknown: Vec<String> = scopes
            .iter()
            .filter(|s| !supported.contains(&s.as_str()))
            .cloned()
            .collect();

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(unknown)
        }
    }

    /// Scopes required by `operation` that `granted` does not cover.
    ///
    /// An unknown operation requires nothing, so it yields an empty deficit;
    /// the tool dispatcher rejects unknown names separately.
    #[must_use]
    pub fn missing_scopes(granted: &[String], operation: &str) -> Vec<String> {
        Self::required_for(operation).map_or_else(Vec::new, |required| {
            required
                .all()
                .into_iter()
                .filter(|scope| !granted.iter().any(|g| g == scope))
                .map(str::to_owned)
                .collect()
        })
    }

    /// Whether `granted` authorizes `operation` in full
    #[must_use]
    pub fn is_authorized(granted: &[String], operation: &str) -> bool {
        Self::missing_scopes(granted, operation).is_empty()
    }
}
