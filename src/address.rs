//! Email address type with optional display name.
//!
//! Addresses are persisted as a single mailbox string (`Name <email>` or just
//! `email`) and parsed back from the same form.

use crate::error::OutboxError;
use email_address::EmailAddress;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An email address with an optional display name.
///
/// # Examples
///
/// ```
/// use outbox::Address;
///
/// // From email string
/// let addr: Address = "user@example.com".into();
/// assert_eq!(addr.email, "user@example.com");
/// assert_eq!(addr.name, None);
///
/// // From a mailbox string
/// let addr: Address = "Alice <alice@example.com>".into();
/// assert_eq!(addr.email, "alice@example.com");
/// assert_eq!(addr.name, Some("Alice".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    /// Optional display name (e.g., "Alice Smith")
    pub name: Option<String>,
    /// Email address (e.g., "alice@example.com")
    pub email: String,
}

impl Address {
    /// Address without a display name. Not validated; records loaded from
    /// a store keep whatever mailbox they were saved with.
    pub fn new(email: impl Into<String>) -> Self {
        let email = email.into();
        if !looks_like_mailbox(&email) {
            tracing::warn!(email = %email, "Address without an @ will fail validation at dispatch");
        }
        Self { name: None, email }
    }

    /// Address with a display name. An empty name is dropped.
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        let name = name.into();
        let mut addr = Self::new(email);
        if !name.is_empty() {
            addr.name = Some(name);
        }
        addr
    }

    /// Parse and validate a mailbox string.
    ///
    /// Accepts `email`, `Name <email>` and `"Quoted Name" <email>`. The email
    /// part is validated per RFC 5321/5322.
    ///
    /// ```
    /// use outbox::Address;
    ///
    /// let addr = Address::parse("Alice <alice@example.com>").unwrap();
    /// assert_eq!(addr.name.as_deref(), Some("Alice"));
    ///
    /// assert!(Address::parse("not-an-email").is_err());
    /// assert!(Address::parse("").is_err());
    /// ```
    pub fn parse(mailbox: &str) -> Result<Self, OutboxError> {
        let (name, email) = split_mailbox(mailbox);
        if !EmailAddress::is_valid(email) {
            return Err(OutboxError::InvalidAddress(format!(
                "'{}' is not a valid email address",
                mailbox
            )));
        }

        Ok(Self {
            name: name.map(str::to_string),
            email: email.to_string(),
        })
    }

    /// The email with its domain in Punycode, as SMTP servers expect it.
    ///
    /// ```
    /// use outbox::Address;
    ///
    /// let addr = Address::new("user@例え.jp");
    /// assert_eq!(addr.to_ascii().unwrap(), "user@xn--r8jz45g.jp");
    /// ```
    pub fn to_ascii(&self) -> Result<String, OutboxError> {
        let (local_part, domain) = self.email.split_once('@').ok_or_else(|| {
            OutboxError::InvalidAddress(format!("'{}' is missing @ symbol", self.email))
        })?;

        let ascii_domain = idna::domain_to_ascii(domain).map_err(|e| {
            OutboxError::InvalidAddress(format!(
                "Failed to convert domain '{}' to ASCII: {:?}",
                domain, e
            ))
        })?;

        Ok(format!("{}@{}", local_part, ascii_domain))
    }

    /// Format as "Name <email>" or just "email" if no name.
    pub fn formatted(&self) -> String {
        match &self.name {
            Some(name) if name.is_empty() => self.email.clone(),
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

fn looks_like_mailbox(email: &str) -> bool {
    email.contains('@')
}

/// Split `Name <email>` into its parts. Plain strings are all email.
fn split_mailbox(mailbox: &str) -> (Option<&str>, &str) {
    let mailbox = mailbox.trim();
    if let (Some(open), true) = (mailbox.rfind('<'), mailbox.ends_with('>')) {
        let email = mailbox[open + 1..mailbox.len() - 1].trim();
        let name = mailbox[..open].trim().trim_matches('"').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        return (name, email);
    }
    (None, mailbox)
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

impl FromStr for Address {
    type Err = OutboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// Lenient: a stored mailbox that fails strict validation is still loaded.
impl From<&str> for Address {
    fn from(mailbox: &str) -> Self {
        match split_mailbox(mailbox) {
            (Some(name), email) => Self::with_name(name, email),
            (None, email) => Self::new(email),
        }
    }
}

impl From<String> for Address {
    fn from(mailbox: String) -> Self {
        Self::from(mailbox.as_str())
    }
}

impl From<(&str, &str)> for Address {
    fn from((name, email): (&str, &str)) -> Self {
        Self::with_name(name, email)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.formatted())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mailbox = String::deserialize(deserializer)?;
        Ok(Self::from(mailbox))
    }
}

/// Anything a record builder accepts as a recipient or sender.
///
/// ```rust
/// use outbox::{Address, ToAddress};
///
/// struct User {
///     name: String,
///     email: String,
/// }
///
/// impl ToAddress for User {
///     fn to_address(&self) -> Address {
///         Address::with_name(&self.name, &self.email)
///     }
/// }
/// ```
pub trait ToAddress {
    fn to_address(&self) -> Address;
}

impl<T: ToAddress + ?Sized> ToAddress for &T {
    fn to_address(&self) -> Address {
        (*self).to_address()
    }
}

impl ToAddress for Address {
    fn to_address(&self) -> Address {
        self.clone()
    }
}

impl ToAddress for str {
    fn to_address(&self) -> Address {
        Address::from(self)
    }
}

impl ToAddress for String {
    fn to_address(&self) -> Address {
        Address::from(self.as_str())
    }
}

impl<N: AsRef<str>, E: AsRef<str>> ToAddress for (N, E) {
    fn to_address(&self) -> Address {
        Address::with_name(self.0.as_ref(), self.1.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        let addr: Address = "test@example.com".into();
        assert_eq!(addr.email, "test@example.com");
        assert_eq!(addr.name, None);
    }

    #[test]
    fn test_from_mailbox_string() {
        let addr: Address = "example.com <system@example.com>".into();
        assert_eq!(addr.email, "system@example.com");
        assert_eq!(addr.name.as_deref(), Some("example.com"));

        let addr: Address = "\"Alice Smith\" <alice@example.com>".into();
        assert_eq!(addr.name.as_deref(), Some("Alice Smith"));
    }

    #[test]
    fn test_formatted() {
        let addr = Address::new("test@example.com");
        assert_eq!(addr.formatted(), "test@example.com");

        let addr = Address::with_name("Alice", "alice@example.com");
        assert_eq!(addr.formatted(), "Alice <alice@example.com>");
    }

    #[test]
    fn test_with_empty_name_has_no_name() {
        let addr = Address::with_name("", "alice@example.com");
        assert_eq!(addr.name, None);
    }

    #[test]
    fn test_serde_as_mailbox_string() {
        let addr = Address::with_name("Bob", "bob@example.com");
        let json = serde_json::to_value(&addr).unwrap();
        assert_eq!(json, serde_json::json!("Bob <bob@example.com>"));

        let back: Address = serde_json::from_value(json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn test_parse_valid() {
        let addr = Address::parse("user+tag@mail.example.com").unwrap();
        assert_eq!(addr.email, "user+tag@mail.example.com");
        assert_eq!(addr.name, None);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Address::parse("userexample.com").is_err());
        assert!(Address::parse("user@").is_err());
        assert!(Address::parse("Alice <not-valid>").is_err());
        assert!(matches!(
            Address::parse(""),
            Err(OutboxError::InvalidAddress(msg)) if msg.contains("not a valid email")
        ));
    }

    #[test]
    fn test_to_ascii() {
        let addr = Address::new("user@müller.de");
        assert_eq!(addr.to_ascii().unwrap(), "user@xn--mller-kva.de");

        let addr = Address::new("no-at-symbol");
        assert!(matches!(
            addr.to_ascii(),
            Err(OutboxError::InvalidAddress(msg)) if msg.contains("missing @")
        ));
    }
}
