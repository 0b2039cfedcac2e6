//! Validated entry names.

use std::borrow::Borrow;
use std::fmt;

use crate::error::{Error, Result};

/// A validated name for a package, communicator or channel.
///
/// Names must be Unicode identifiers (UAX#31): they start with a letter, or an
/// underscore followed by a letter or digit, and continue with identifier
/// characters. This keeps every name addressable from code on both sides.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Name(String);

impl Name {
    /// Parse and validate a name.
    ///
    /// ```rust
    /// use trellis_core::Name;
    ///
    /// assert!(Name::parse("Coins").is_ok());
    /// assert!(Name::parse("_Private").is_ok());
    /// assert!(Name::parse("9lives").is_err());
    /// assert!(Name::parse("").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        Self::validate(s)?;
        Ok(Name(s.to_string()))
    }

    /// Check a name without allocating.
    pub fn validate(s: &str) -> Result<()> {
        let invalid = |message: String| Error::InvalidName {
            name: s.to_string(),
            message,
        };

        let mut chars = s.chars();
        let Some(first) = chars.next() else {
            return Err(invalid("name is empty".to_string()));
        };

        let valid_start = unicode_ident::is_xid_start(first)
            || (first == '_'
                && chars
                    .clone()
                    .next()
                    .is_some_and(unicode_ident::is_xid_continue));
        if !valid_start {
            return Err(invalid(
                "must start with a letter or underscore followed by letter/digit".to_string(),
            ));
        }

        if let Some(c) = chars.find(|c| !unicode_ident::is_xid_continue(*c)) {
            return Err(invalid(format!("invalid character '{}'", c)));
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Name {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Name::parse(s)
    }
}
