//! Declarative mapping from request paths to the access they require.
//!
//! Patterns are matched segment by segment: literal segments must be equal,
//! `{name}` matches exactly one segment, and a trailing `/**` matches any
//! number of remaining segments (including none). Rules are evaluated in
//! registration order and the first match wins; unmatched paths fall back to
//! the policy default.

use crate::users::repo_types::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    Role(Role),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
    Rest,
}

#[derive(Debug, Clone)]
pub struct AccessRule {
    pattern: String,
    segments: Vec<Segment>,
    access: Access,
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl AccessRule {
    pub fn new(pattern: &str, access: Access) -> Self {
        let segments = split(pattern)
            .map(|s| match s {
                "**" => Segment::Rest,
                s if s.starts_with('{') && s.ends_with('}') => Segment::Param,
                s => Segment::Literal(s.to_string()),
            })
            .collect();
        Self {
            pattern: pattern.to_string(),
            segments,
            access,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = split(path).collect();
        let mut i = 0;
        for seg in &self.segments {
            match seg {
                Segment::Rest => return true,
                Segment::Param => {
                    if i >= parts.len() {
                        return false;
                    }
                }
                Segment::Literal(lit) => {
                    if parts.get(i) != Some(&lit.as_str()) {
                        return false;
                    }
                }
            }
            i += 1;
        }
        i == parts.len()
    }
}

#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    rules: Vec<AccessRule>,
    default: Access,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self::new()
            .permit_all(&["/api/auth/register", "/api/auth/login", "/api/auth/refresh"])
            .permit_all(&["/api/blog/posts", "/api/blog/posts/{id}"])
            .permit_all(&["/api/health"])
            .has_role(&["/api/admin/**"], Role::Admin)
            .has_role(
                &["/api/gym/programs/new", "/api/gym/programs/{id}/edit"],
                Role::Trainer,
            )
            .has_role(
                &["/api/nutrition/plans/new", "/api/nutrition/plans/{id}/edit"],
                Role::Nutritionist,
            )
            .authenticated(&["/api/users/**"])
            .any_request_authenticated()
    }
}

impl SecurityPolicy {
    /// Empty policy; unmatched paths require authentication.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            default: Access::Authenticated,
        }
    }

    fn push(mut self, patterns: &[&str], access: Access) -> Self {
        self.rules
            .extend(patterns.iter().map(|p| AccessRule::new(p, access)));
        self
    }

    pub fn permit_all(self, patterns: &[&str]) -> Self {
        self.push(patterns, Access::Public)
    }

    pub fn has_role(self, patterns: &[&str], role: Role) -> Self {
        self.push(patterns, Access::Role(role))
    }

    pub fn authenticated(self, patterns: &[&str]) -> Self {
        self.push(patterns, Access::Authenticated)
    }

    pub fn any_request_authenticated(mut self) -> Self {
        self.default = Access::Authenticated;
        self
    }

    pub fn rules(&self) -> &[AccessRule] {
        &self.rules
    }

    pub fn resolve(&self, path: &str) -> Access {
        self.rules
            .iter()
            .find(|r| r.matches(path))
            .map(AccessRule::access)
            .unwrap_or(self.default)
    }
}
