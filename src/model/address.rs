//! Email addresses as rendered into `#From`/`#To`/`#CC`/`#BCC` tags.

use mail_parser::{Addr, Address};

/// A sender or recipient.
///
/// # Examples
/// - `"Juan García <juan@ejemplo.com>"` → `display_name = "Juan García"`, `address = "juan@ejemplo.com"`
/// - `"user@example.com"` → `display_name = ""`, `address = "user@example.com"`
#[derive(Debug, Clone, PartialEq)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare email address (`user@domain`, may be empty).
    pub address: String,
}

impl EmailAddress {
    pub fn new(display_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            address: address.into(),
        }
    }

    /// Build from a parsed `mail-parser` address.
    pub fn from_addr(addr: &Addr<'_>) -> Self {
        Self {
            display_name: addr.name.as_deref().map(strip_quotes).unwrap_or_default(),
            address: addr
                .address
                .as_deref()
                .map(|a| a.trim().to_string())
                .unwrap_or_default(),
        }
    }

    /// Flatten an address header (lists and groups) into individual addresses.
    ///
    /// Entries with neither a name nor an address are dropped.
    pub fn list_from(address: &Address<'_>) -> Vec<Self> {
        let addrs: Vec<&Addr<'_>> = match address {
            Address::List(list) => list.iter().collect(),
            Address::Group(groups) => groups.iter().flat_map(|g| g.addresses.iter()).collect(),
        };
        addrs
            .into_iter()
            .map(Self::from_addr)
            .filter(|a| !a.is_empty())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.display_name.is_empty() && self.address.is_empty()
    }

    /// Format as RFC 822: `"Display Name <address>"`, or whichever part exists.
    pub fn display(&self) -> String {
        match (self.display_name.is_empty(), self.address.is_empty()) {
            (true, _) => self.address.clone(),
            (false, true) => self.display_name.clone(),
            (false, false) => format!("{} <{}>", self.display_name, self.address),
        }
    }
}

/// Strip surrounding double-quotes and trim whitespace.
fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}
