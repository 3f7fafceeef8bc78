//! Distinguished names: the hierarchical key space for request routing.
//!
//! A [`Dn`] is a leaf-first sequence of [`Rdn`] components
//! (`ou=people,o=example` has leading RDN `ou=people`). Ancestry is suffix
//! containment over the normalized component sequence, which is the shared
//! contract between the routing topology, the network groups, and the
//! backend registry:
//!
//! - [`Dn::is_ancestor_of`]: ancestor-or-equal; the root DSE (empty DN) is
//!   an ancestor of every DN
//! - [`Dn::parent`]: the DN minus its leading RDN
//! - string round-trip via [`std::str::FromStr`] / [`std::fmt::Display`]

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors from parsing a DN string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DnParseError {
    /// An RDN component has no `=` separating type and value.
    #[error("RDN component has no type/value separator: `{component}`")]
    MissingSeparator { component: String },
    /// The attribute type half of an RDN is empty.
    #[error("empty attribute type in RDN component: `{component}`")]
    EmptyAttributeType { component: String },
    /// The attribute value half of an RDN is empty.
    #[error("empty attribute value in RDN component: `{component}`")]
    EmptyAttributeValue { component: String },
    /// The attribute type contains a character outside `[A-Za-z0-9.-]`.
    #[error("invalid character `{ch}` in attribute type `{attribute_type}`")]
    InvalidAttributeType { attribute_type: String, ch: char },
    /// The input ends in the middle of a `\` escape sequence.
    #[error("dangling escape at end of input")]
    DanglingEscape,
}

// ---------------------------------------------------------------------------
// Rdn
// ---------------------------------------------------------------------------

/// One relative distinguished name component: attribute type + value.
///
/// The type is normalized to lowercase at construction. Values keep their
/// original spelling but compare and hash case-insensitively, matching the
/// directory-string semantics of the key space.
#[derive(Debug, Clone)]
pub struct Rdn {
    attribute_type: String,
    attribute_value: String,
}

impl Rdn {
    /// Builds an RDN from a type and value, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns a [`DnParseError`] if either half is empty after trimming or
    /// the attribute type contains characters outside `[A-Za-z0-9.-]`.
    pub fn new(attribute_type: &str, attribute_value: &str) -> Result<Self, DnParseError> {
        let attr_type = attribute_type.trim();
        let attr_value = attribute_value.trim();
        if attr_type.is_empty() {
            return Err(DnParseError::EmptyAttributeType {
                component: format!("{attribute_type}={attribute_value}"),
            });
        }
        if attr_value.is_empty() {
            return Err(DnParseError::EmptyAttributeValue {
                component: format!("{attribute_type}={attribute_value}"),
            });
        }
        if let Some(ch) = attr_type
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '.'))
        {
            return Err(DnParseError::InvalidAttributeType {
                attribute_type: attr_type.to_string(),
                ch,
            });
        }
        Ok(Self {
            attribute_type: attr_type.to_ascii_lowercase(),
            attribute_value: attr_value.to_string(),
        })
    }

    /// The normalized (lowercase) attribute type.
    #[must_use]
    pub fn attribute_type(&self) -> &str {
        &self.attribute_type
    }

    /// The attribute value as originally written (trimmed).
    #[must_use]
    pub fn attribute_value(&self) -> &str {
        &self.attribute_value
    }

    /// Parses a single `type=value` component with escape handling.
    fn parse_component(component: &str) -> Result<Self, DnParseError> {
        let raw = component.trim();
        let Some(eq) = find_unescaped(raw, '=') else {
            return Err(DnParseError::MissingSeparator {
                component: raw.to_string(),
            });
        };
        let attr_type = &raw[..eq];
        let attr_value = unescape(&raw[eq + 1..])?;
        Self::new(attr_type, &attr_value)
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.attribute_type == other.attribute_type
            && self
                .attribute_value
                .eq_ignore_ascii_case(&other.attribute_value)
    }
}

impl Eq for Rdn {}

impl Hash for Rdn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.attribute_type.hash(state);
        self.attribute_value.to_ascii_lowercase().hash(state);
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute_type, escape(&self.attribute_value))
    }
}

// ---------------------------------------------------------------------------
// Dn
// ---------------------------------------------------------------------------

/// A distinguished name: a leaf-first sequence of RDNs.
///
/// The empty sequence is the root DSE, which is an ancestor of every DN.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    /// The root DSE: the empty DN.
    #[must_use]
    pub fn root_dse() -> Self {
        Self { rdns: Vec::new() }
    }

    /// Builds a DN directly from leaf-first RDN components.
    #[must_use]
    pub fn from_rdns(rdns: Vec<Rdn>) -> Self {
        Self { rdns }
    }

    /// Returns `true` for the empty DN.
    #[must_use]
    pub fn is_root_dse(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Number of RDN components.
    #[must_use]
    pub fn num_components(&self) -> usize {
        self.rdns.len()
    }

    /// The leading (leaf-most) RDN, or `None` for the root DSE.
    #[must_use]
    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    /// All RDN components, leaf-first.
    #[must_use]
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// The DN minus its leading RDN, or `None` for the root DSE.
    #[must_use]
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            None
        } else {
            Some(Self {
                rdns: self.rdns[1..].to_vec(),
            })
        }
    }

    /// Ancestor-or-equal containment: `self`'s RDN sequence is a suffix of
    /// `other`'s. The root DSE is an ancestor of everything, including
    /// itself.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Dn) -> bool {
        self.rdns.len() <= other.rdns.len()
            && other.rdns[other.rdns.len() - self.rdns.len()..] == self.rdns[..]
    }

    /// Descendant-or-equal containment; the inverse of [`Dn::is_ancestor_of`].
    #[must_use]
    pub fn is_descendant_of(&self, other: &Dn) -> bool {
        other.is_ancestor_of(self)
    }
}

impl FromStr for Dn {
    type Err = DnParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Self::root_dse());
        }
        let mut rdns = Vec::new();
        for component in split_unescaped(trimmed, ',')? {
            rdns.push(Rdn::parse_component(&component)?);
        }
        Ok(Self { rdns })
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for rdn in &self.rdns {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{rdn}")?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for Dn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Dn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Escape handling
// ---------------------------------------------------------------------------

/// Splits `input` on every unescaped occurrence of `sep`, keeping escapes
/// intact for the per-component parser.
fn split_unescaped(input: &str, sep: char) -> Result<Vec<String>, DnParseError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let Some(next) = chars.next() else {
                return Err(DnParseError::DanglingEscape);
            };
            current.push('\\');
            current.push(next);
        } else if c == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    Ok(parts)
}

/// Position of the first unescaped occurrence of `target`, if any.
fn find_unescaped(input: &str, target: char) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == target {
            return Some(i);
        }
    }
    None
}

/// Resolves `\X` escape sequences to their literal character.
fn unescape(input: &str) -> Result<String, DnParseError> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let Some(next) = chars.next() else {
                return Err(DnParseError::DanglingEscape);
            };
            out.push(next);
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// Escapes `\`, `,` and `=` in an attribute value for string form.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == ',' || c == '=' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
