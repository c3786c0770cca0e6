use anyhow::{Context, Result};
use std::path::Path;

use crate::models::Contact;

/// Parse a contacts blob: one address per line, or a CSV whose first column is
/// the address. Any line containing `@` is accepted; order is preserved and
/// repeated addresses are kept.
pub fn parse_contacts(text: &str) -> Vec<Contact> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.contains('@'))
        .map(|line| {
            let email = line.split(',').next().unwrap_or(line).trim();
            Contact {
                email: email.to_string(),
            }
        })
        .collect()
}

pub fn read_contacts_file(path: &Path) -> Result<Vec<Contact>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read contacts file: {}", path.display()))?;
    let contacts = parse_contacts(&String::from_utf8_lossy(&bytes));
    tracing::debug!(path = %path.display(), count = contacts.len(), "parsed contacts");
    Ok(contacts)
}

/// Naive recipient identity derived from an address: a capitalized first name
/// taken from the local part, and the domain after the first `@`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub first_name: String,
    pub domain: String,
}

pub fn derive_identity(email: &str) -> Identity {
    let (local, domain) = email.split_once('@').unwrap_or((email, ""));
    let candidate = local.split(['.', '_', '-']).next().unwrap_or(local);

    let mut chars = candidate.chars();
    let first_name = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };

    Identity {
        first_name,
        domain: domain.to_string(),
    }
}
