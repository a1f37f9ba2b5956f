//! Address references in constructor arguments
//!
//! `$Name` and `${Name}` are replaced by the hex address of the confirmed
//! contract or library `Name`. Names follow identifier syntax
//! (`[A-Za-z_][A-Za-z0-9_]*`); a `$` that does not start one is copied through.

use crate::contract::{Bytes, HexFormat};
use crate::error::{DeployError, Result};
use crate::repository::ContractsRepository;

pub struct AddressResolver<'a> {
    repo: &'a ContractsRepository,
    format: HexFormat,
}

impl<'a> AddressResolver<'a> {
    pub fn new(repo: &'a ContractsRepository, format: HexFormat) -> Self {
        AddressResolver { repo, format }
    }

    /// Confirmed address of a contract, falling back to libraries.
    pub fn lookup(&self, name: &str) -> Option<&'a Bytes> {
        self.repo
            .get(name)
            .or_else(|| self.repo.get_lib(name))
            .map(|c| &c.address)
    }

    /// Expand every placeholder in `text`.
    ///
    /// Fails with `UnresolvedReference` on the first name that has no
    /// confirmed deployment; pending records do not count.
    pub fn expand(&self, text: &str) -> Result<String> {
        expand_placeholders(text, |name| {
            self.lookup(name)
                .map(|address| address.to_hex(self.format))
                .ok_or_else(|| DeployError::UnresolvedReference {
                    name: name.to_string(),
                })
        })
    }
}

struct Placeholder<'t> {
    name: &'t str,
    /// Byte offset just past the placeholder.
    end: usize,
}

/// Substitute placeholders using `resolve`.
///
/// The resolved value is emitted as a JSON string. A placeholder that already
/// sits between double quotes (`"$Admin"`) reuses those quotes.
pub fn expand_placeholders<F>(text: &str, mut resolve: F) -> Result<String>
where
    F: FnMut(&str) -> Result<String>,
{
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }

        let Some(placeholder) = placeholder_at(text, i) else {
            i += 1;
            continue;
        };

        out.push_str(&text[copied..i]);

        let value = resolve(placeholder.name)?;
        let quoted = i > 0 && bytes[i - 1] == b'"' && bytes.get(placeholder.end) == Some(&b'"');
        if quoted {
            out.push_str(&value);
        } else {
            out.push('"');
            out.push_str(&value);
            out.push('"');
        }

        i = placeholder.end;
        copied = placeholder.end;
    }

    out.push_str(&text[copied..]);
    Ok(out)
}

fn placeholder_at(text: &str, dollar: usize) -> Option<Placeholder<'_>> {
    let rest = &text[dollar + 1..];

    if let Some(braced) = rest.strip_prefix('{') {
        let len = ident_len(braced);
        if len > 0 && braced.as_bytes().get(len) == Some(&b'}') {
            return Some(Placeholder {
                name: &braced[..len],
                end: dollar + 2 + len + 1,
            });
        }
        return None;
    }

    let len = ident_len(rest);
    (len > 0).then(|| Placeholder {
        name: &rest[..len],
        end: dollar + 1 + len,
    })
}

fn ident_len(s: &str) -> usize {
    let b = s.as_bytes();
    match b.first() {
        Some(c) if c.is_ascii_alphabetic() || *c == b'_' => {}
        _ => return 0,
    }
    b.iter()
        .take_while(|c| c.is_ascii_alphanumeric() || **c == b'_')
        .count()
}
