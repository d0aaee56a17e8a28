//! Fragment identities, requirement sets, descriptors and dependency records.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use super::error::DomainError;

/// Name of a reusable fragment definition.
///
/// Any non-empty string is an identity; store paths encode it into a single
/// segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FragmentId(String);

impl FragmentId {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.is_empty() {
            return Err(DomainError::validation("fragment id must not be empty"));
        }
        Ok(Self(value))
    }

    /// Interpret the output of an evaluated identity expression.
    ///
    /// Blank output means the directive carries no identity and must not be
    /// cached.
    pub fn from_resolved(value: &str) -> Result<Option<Self>, DomainError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        Self::new(trimmed).map(Some)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FragmentId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FragmentId> for String {
    fn from(value: FragmentId) -> Self {
        value.0
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derived cache key (lowercase hex digest).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub(crate) fn from_digest(hex: String) -> Self {
        Self(hex)
    }

    /// Accept a key supplied by an operator, checking it looks like a digest.
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let value = value.trim();
        if value.len() != 64 || !value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(DomainError::validation(format!(
                "cache key `{value}` is not a 64 character lowercase hex digest"
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tenant and branch a store binding is rooted under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantScope {
    tenant: String,
    branch: String,
}

impl TenantScope {
    pub fn new(tenant: impl Into<String>, branch: impl Into<String>) -> Result<Self, DomainError> {
        let tenant = tenant.into();
        let branch = branch.into();
        validate_segment("tenant", &tenant)?;
        validate_segment("branch", &branch)?;
        Ok(Self { tenant, branch })
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Store prefix owned by this tenant/branch.
    pub fn path_prefix(&self) -> String {
        format!("{}/{}", self.tenant, self.branch)
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.branch)
    }
}

/// Page-level metadata handed down by the surrounding page render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDescriptor {
    pub tenant: String,
    pub branch: String,
    pub page_id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl PageDescriptor {
    pub fn new(scope: &TenantScope, page_id: impl Into<String>) -> Self {
        Self {
            tenant: scope.tenant().to_string(),
            branch: scope.branch().to_string(),
            page_id: page_id.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Distinguishes fragment cache entries from full page renditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    Page,
    Fragment,
}

/// Identity of one rendered fragment, created fresh per render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentDescriptor {
    pub fragment_id: FragmentId,
    pub scope: Scope,
    pub cache_key: CacheKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<PageDescriptor>,
}

impl FragmentDescriptor {
    pub fn fragment(
        fragment_id: FragmentId,
        cache_key: CacheKey,
        page: Option<&PageDescriptor>,
    ) -> Self {
        Self {
            fragment_id,
            scope: Scope::Fragment,
            cache_key,
            page: page.cloned(),
        }
    }
}

/// What a render consumed and what it produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentDependencies {
    pub requires: BTreeSet<String>,
    pub produces: BTreeSet<String>,
}

impl FragmentDependencies {
    pub fn is_empty(&self) -> bool {
        self.requires.is_empty() && self.produces.is_empty()
    }

    pub fn extend(&mut self, other: &FragmentDependencies) {
        self.requires.extend(other.requires.iter().cloned());
        self.produces.extend(other.produces.iter().cloned());
    }
}

/// Persisted association between a descriptor and its dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenditionRecord {
    pub descriptor: FragmentDescriptor,
    pub dependencies: FragmentDependencies,
    #[serde(with = "time::serde::rfc3339")]
    pub rendered_at: OffsetDateTime,
}

/// Runtime inputs that select a fragment's output, kept sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequirementSet(BTreeMap<String, Value>);

impl RequirementSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RequirementSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

impl IntoIterator for RequirementSet {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Falsy values are dropped from requirement sets: null, false, zero and "".
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn validate_segment(kind: &'static str, value: &str) -> Result<(), DomainError> {
    if value.is_empty() {
        return Err(DomainError::validation(format!("{kind} must not be empty")));
    }
    if value == "." || value == ".." {
        return Err(DomainError::validation(format!(
            "{kind} `{value}` is not a valid path segment"
        )));
    }
    if value.contains(['/', '\\', '\0']) {
        return Err(DomainError::validation(format!(
            "{kind} `{value}` must not contain path separators"
        )));
    }
    Ok(())
}
