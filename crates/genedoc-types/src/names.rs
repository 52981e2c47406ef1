//! Name validation for sources, build configs, and collections.
//!
//! Names end up as collection/table names in every backend, so they are kept
//! to a conservative alphabet:
//! - Must be non-empty and at most 120 bytes
//! - Only ASCII letters, digits, `_` and `-`
//! - Must start with a letter or `_`

use crate::error::TypeError;

const MAX_NAME_LEN: usize = 120;

/// Validate a registry or collection name. `kind` is used in the error only.
///
/// ```
/// use genedoc_types::validate_name;
///
/// assert!(validate_name("source", "entrez_gene").is_ok());
/// assert!(validate_name("build", "genedoc_mygene").is_ok());
/// assert!(validate_name("source", "").is_err());
/// assert!(validate_name("source", "9lives").is_err());
/// assert!(validate_name("source", "bad name").is_err());
/// ```
pub fn validate_name(kind: &'static str, name: &str) -> Result<(), TypeError> {
    let invalid = |reason: &str| TypeError::InvalidName {
        kind,
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let first = name.chars().next().ok_or_else(|| invalid("must not be empty"))?;
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("too long"));
    }
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(invalid("must start with a letter or '_'"));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(invalid(&format!("contains forbidden character: {ch:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_names() {
        for name in ["entrez_gene", "ensembl_gene", "genedoc_mygene_allspecies", "_tmp", "go-bp"] {
            assert!(validate_name("source", name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_path_like_names() {
        assert!(validate_name("source", "../etc").is_err());
        assert!(validate_name("source", "a/b").is_err());
        assert!(validate_name("source", "a.b").is_err());
    }

    #[test]
    fn error_names_kind() {
        let err = validate_name("build", "").unwrap_err();
        assert!(err.to_string().contains("build"));
    }

    #[test]
    fn rejects_overlong() {
        let name = "a".repeat(MAX_NAME_LEN + 1);
        assert!(validate_name("source", &name).is_err());
    }
}
