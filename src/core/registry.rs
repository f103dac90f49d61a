//! Resource-type registry: type key → (executor, schema).
//!
//! Populated once through [`RegistryBuilder`]; [`RegistryBuilder::build`]
//! yields an immutable [`Registry`] that any number of runs may share.
//!
//! Ref convention: `<action>_<type>`. The first `_`-separated token is the
//! action; the remaining tokens name the resource type. A registered key
//! matches when the type part equals it or ends with `_<key>`, comparing
//! canonical forms (ASCII lowercase, `-` read as `_`). The longest match wins;
//! equally long distinct matches are ambiguous. `nothing` is reserved as a key.

use super::error::{ActionError, RegistryError};
use super::fields::Fields;
use super::resource::{Resource, ResourceSchema};
use super::types::{TaskRef, NOTHING_ACTION, REF_SEPARATOR};
use std::fmt;
use std::sync::Arc;

/// Performs the actions of one resource type.
pub trait Executor: Send + Sync {
    /// Action names this executor implements (not counting `nothing`).
    fn actions(&self) -> &[&'static str];

    /// Perform `action` against a validated resource, returning the
    /// attributes to merge back.
    fn execute(&self, action: &str, resource: &mut Resource) -> Result<Fields, ActionError>;
}

/// One registered resource type.
#[derive(Clone)]
pub struct RegistryEntry {
    type_key: String,
    canonical: String,
    executor: Arc<dyn Executor>,
    schema: Arc<ResourceSchema>,
}

impl RegistryEntry {
    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    pub fn executor(&self) -> &dyn Executor {
        self.executor.as_ref()
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    /// Whether `action` is dispatchable on this type.
    pub fn supports(&self, action: &str) -> bool {
        action == NOTHING_ACTION || self.executor.actions().contains(&action)
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("type_key", &self.type_key)
            .field("actions", &self.executor.actions())
            .field("schema", &self.schema)
            .finish()
    }
}

/// A resolved dispatch: the action name and the entry that performs it.
#[derive(Debug, Clone)]
pub struct Dispatch<'r> {
    pub action: String,
    pub entry: &'r RegistryEntry,
}

/// Init-time registration surface.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: Vec<RegistryEntry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `type_key` to an executor and schema.
    pub fn register(
        &mut self,
        type_key: &str,
        executor: Arc<dyn Executor>,
        schema: ResourceSchema,
    ) -> Result<&mut Self, RegistryError> {
        check_type_key(type_key)?;
        if self.entries.iter().any(|e| e.type_key == type_key) {
            return Err(RegistryError::DuplicateRegistration(type_key.to_string()));
        }
        tracing::debug!(type_key, "registering resource type");
        self.entries.push(RegistryEntry {
            type_key: type_key.to_string(),
            canonical: canonical(type_key),
            executor,
            schema: Arc::new(schema),
        });
        Ok(self)
    }

    /// Freeze into a read-only registry.
    pub fn build(self) -> Registry {
        Registry {
            entries: self.entries,
        }
    }
}

/// Read-only registry handle.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn get(&self, type_key: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.type_key == type_key)
    }

    /// Split `reference` and find the most specific registered type.
    pub fn lookup(&self, reference: &str) -> Result<Dispatch<'_>, RegistryError> {
        let parsed = TaskRef::parse(reference)
            .ok_or_else(|| RegistryError::MalformedRef(reference.to_string()))?;
        let wanted = canonical(parsed.resource_type);

        let mut best: Vec<&RegistryEntry> = Vec::new();
        for entry in &self.entries {
            if !suffix_matches(&wanted, &entry.canonical) {
                continue;
            }
            let best_len = best.first().map(|e| e.canonical.len());
            match best_len {
                Some(len) if len > entry.canonical.len() => {}
                Some(len) if len == entry.canonical.len() => best.push(entry),
                _ => best = vec![entry],
            }
        }

        match best.as_slice() {
            [] => Err(RegistryError::UnknownResourceType(reference.to_string())),
            [entry] => Ok(Dispatch {
                action: parsed.action.to_string(),
                entry: *entry,
            }),
            many => Err(RegistryError::Ambiguous {
                reference: reference.to_string(),
                candidates: many.iter().map(|e| e.type_key.clone()).collect(),
            }),
        }
    }
}

/// Lowercase, `-` read as the separator.
fn canonical(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c == '-' {
                REF_SEPARATOR
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect()
}

/// `key` equals `wanted` or is a token-aligned suffix of it.
fn suffix_matches(wanted: &str, key: &str) -> bool {
    match wanted.strip_suffix(key) {
        Some("") => true,
        Some(rest) => rest.ends_with(REF_SEPARATOR),
        None => false,
    }
}

fn check_type_key(key: &str) -> Result<(), RegistryError> {
    let invalid = |reason| RegistryError::InvalidTypeKey {
        key: key.to_string(),
        reason,
    };
    if key.is_empty() {
        return Err(invalid("must not be empty"));
    }
    let tokens_ok = key.split(REF_SEPARATOR).all(|t| {
        !t.is_empty() && t.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    if !tokens_ok {
        return Err(invalid(
            "tokens must be non-empty ASCII alphanumerics or '-' joined by '_'",
        ));
    }
    if canonical(key) == NOTHING_ACTION {
        return Err(invalid("'nothing' is reserved"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static [&'static str]);

    impl Executor for Named {
        fn actions(&self) -> &[&'static str] {
            self.0
        }

        fn execute(&self, _action: &str, _resource: &mut Resource) -> Result<Fields, ActionError> {
            Ok(Fields::new())
        }
    }

    fn registry(keys: &[&str]) -> Registry {
        let mut builder = Registry::builder();
        for key in keys {
            builder
                .register(key, Arc::new(Named(&["create"])), ResourceSchema::open())
                .unwrap();
        }
        builder.build()
    }

    #[test]
    fn test_lookup_exact() {
        let reg = registry(&["ssh"]);
        let d = reg.lookup("connect_ssh").unwrap();
        assert_eq!(d.action, "connect");
        assert_eq!(d.entry.type_key(), "ssh");
    }

    #[test]
    fn test_lookup_longest_suffix_wins() {
        let reg = registry(&["instance", "aws_instance"]);
        let d = reg.lookup("create_aws_instance").unwrap();
        assert_eq!(d.action, "create");
        assert_eq!(d.entry.type_key(), "aws_instance");

        let d = reg.lookup("create_gcp_instance").unwrap();
        assert_eq!(d.entry.type_key(), "instance");
    }

    #[test]
    fn test_lookup_suffix_is_token_aligned() {
        let reg = registry(&["key"]);
        assert!(matches!(
            reg.lookup("create_sshkey"),
            Err(RegistryError::UnknownResourceType(_))
        ));
        assert!(reg.lookup("create_ssh_key").is_ok());
    }

    #[test]
    fn test_lookup_unknown() {
        let reg = registry(&["ssh"]);
        assert_eq!(
            reg.lookup("create_bucket").unwrap_err(),
            RegistryError::UnknownResourceType("create_bucket".to_string())
        );
    }

    #[test]
    fn test_lookup_malformed() {
        let reg = registry(&["ssh"]);
        assert!(matches!(
            reg.lookup("ssh"),
            Err(RegistryError::MalformedRef(_))
        ));
    }

    #[test]
    fn test_lookup_canonical_match() {
        let reg = registry(&["ssh-key"]);
        let d = reg.lookup("create_SSH_key").unwrap();
        assert_eq!(d.entry.type_key(), "ssh-key");
    }

    #[test]
    fn test_lookup_ambiguous() {
        let reg = registry(&["ssh-key", "ssh_key", "key"]);
        match reg.lookup("create_ssh_key") {
            Err(RegistryError::Ambiguous { candidates, .. }) => {
                assert_eq!(candidates, vec!["ssh-key", "ssh_key"]);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
        // The shorter key alone is still unambiguous.
        assert_eq!(reg.lookup("create_rsa_key").unwrap().entry.type_key(), "key");
    }

    #[test]
    fn test_register_duplicate() {
        let mut builder = Registry::builder();
        builder
            .register("ssh", Arc::new(Named(&[])), ResourceSchema::open())
            .unwrap();
        let err = builder
            .register("ssh", Arc::new(Named(&[])), ResourceSchema::open())
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateRegistration("ssh".to_string()));
    }

    #[test]
    fn test_register_invalid_keys() {
        let mut builder = Registry::builder();
        for key in ["", "nothing", "a__b", "_a", "has space"] {
            assert!(
                matches!(
                    builder.register(key, Arc::new(Named(&[])), ResourceSchema::open()),
                    Err(RegistryError::InvalidTypeKey { .. })
                ),
                "key {:?} should be rejected",
                key
            );
        }
    }

    #[test]
    fn test_entry_supports_nothing() {
        let reg = registry(&["ssh"]);
        let entry = reg.get("ssh").unwrap();
        assert!(entry.supports("create"));
        assert!(entry.supports(NOTHING_ACTION));
        assert!(!entry.supports("destroy"));
    }

    #[test]
    fn test_registry_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Registry>();
    }
}
