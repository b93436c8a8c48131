//! Compact access-transform tokens.
//!
//! A token is an optional visibility keyword followed by an optional
//! finality suffix: `public`, `private-f`, `+f`, `protected+f`. Parsing
//! works from the right: a trailing `f` means the character before it
//! decides between adding (`+`) and removing (`-`) `final`.

use crate::at::errors::AtError;
use std::fmt;
use std::str::FromStr;

/// Requested change to a declaration's visibility keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Visibility {
    #[default]
    None,
    Private,
    Protected,
    Public,
}

impl Visibility {
    /// The Java keyword for this visibility, empty for `None`.
    pub fn keyword(self) -> &'static str {
        match self {
            Visibility::None => "",
            Visibility::Private => "private",
            Visibility::Protected => "protected",
            Visibility::Public => "public",
        }
    }

    /// Parse a Java visibility keyword.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "" => Some(Visibility::None),
            "private" => Some(Visibility::Private),
            "protected" => Some(Visibility::Protected),
            "public" => Some(Visibility::Public),
            _ => None,
        }
    }

    fn merge(self, other: Self) -> Option<Self> {
        match (self, other) {
            (a, b) if a == b => Some(a),
            (Visibility::None, b) => Some(b),
            (a, Visibility::None) => Some(a),
            // narrowing to private never combines with a widening request
            (Visibility::Private, _) | (_, Visibility::Private) => None,
            (a, b) => Some(a.max(b)),
        }
    }
}

/// Requested change to the `final` modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Finality {
    #[default]
    None,
    Add,
    Remove,
}

impl Finality {
    fn suffix(self) -> &'static str {
        match self {
            Finality::None => "",
            Finality::Add => "+f",
            Finality::Remove => "-f",
        }
    }

    fn merge(self, other: Self) -> Option<Self> {
        match (self, other) {
            (a, b) if a == b => Some(a),
            (Finality::None, b) => Some(b),
            (a, Finality::None) => Some(a),
            _ => None,
        }
    }
}

/// A visibility change paired with a finality change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessTransform {
    pub visibility: Visibility,
    pub finality: Finality,
}

impl AccessTransform {
    pub const EMPTY: AccessTransform = AccessTransform {
        visibility: Visibility::None,
        finality: Finality::None,
    };

    pub fn new(visibility: Visibility, finality: Finality) -> Self {
        Self {
            visibility,
            finality,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Combine two transforms targeting the same declaration.
    ///
    /// Returns `None` when the two requests contradict each other.
    pub fn merge(&self, other: &AccessTransform) -> Option<AccessTransform> {
        Some(AccessTransform {
            visibility: self.visibility.merge(other.visibility)?,
            finality: self.finality.merge(other.finality)?,
        })
    }
}

/// Parse a compact token such as `public-f`.
pub fn parse(token: &str) -> Result<AccessTransform, AtError> {
    let malformed = || AtError::MalformedToken {
        token: token.to_string(),
    };

    let (rest, finality) = match token.strip_suffix('f') {
        Some(head) => {
            if let Some(rest) = head.strip_suffix('+') {
                (rest, Finality::Add)
            } else if let Some(rest) = head.strip_suffix('-') {
                (rest, Finality::Remove)
            } else {
                return Err(malformed());
            }
        }
        None => (token, Finality::None),
    };

    let visibility = Visibility::from_keyword(rest).ok_or_else(malformed)?;
    Ok(AccessTransform::new(visibility, finality))
}

/// Format a transform back into its compact token.
pub fn format(at: &AccessTransform) -> String {
    format!("{}{}", at.visibility.keyword(), at.finality.suffix())
}

impl FromStr for AccessTransform {
    type Err = AtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl fmt::Display for AccessTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format(self))
    }
}
