//! User-facing failure messages.
//!
//! Messages are looked up through a [`Translator`]. A lookup that returns
//! its key unchanged means "no translation", and the catalog's default text
//! is used instead.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::ErrorKind;

/// Resolves translation keys.
pub trait Translator: Send + Sync {
    /// Returns the translation of `key`, or `key` itself if there is none.
    fn translate(&self, key: &str) -> String;
}

/// Translator with no translations.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTranslator;

impl Translator for IdentityTranslator {
    fn translate(&self, key: &str) -> String {
        key.to_string()
    }
}

/// Translator backed by a key/value table.
#[derive(Debug, Clone, Default)]
pub struct CatalogTranslator {
    entries: HashMap<String, String>,
}

impl CatalogTranslator {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one translation.
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CatalogTranslator {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Translator for CatalogTranslator {
    fn translate(&self, key: &str) -> String {
        self.entries
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

/// Message source for one [`ErrorKind`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KindMessage {
    /// Translation key.
    pub key: String,
    /// Text used when the key has no translation.
    #[serde(default)]
    pub default: Option<String>,
}

impl KindMessage {
    fn new(key: &str, default: &str) -> Self {
        Self {
            key: key.to_string(),
            default: Some(default.to_string()),
        }
    }
}

fn default_generic() -> String {
    "Something went wrong. Please try again.".to_string()
}

/// Translation keys and fallback texts for failure messages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageCatalog {
    /// Fallback for kinds without a message of their own.
    #[serde(default = "default_generic")]
    pub generic: String,
    /// Network failures.
    #[serde(default)]
    pub network: Option<KindMessage>,
    /// Data failures.
    #[serde(default)]
    pub data: Option<KindMessage>,
    /// Permission failures.
    #[serde(default)]
    pub permission: Option<KindMessage>,
    /// Server failures.
    #[serde(default)]
    pub server: Option<KindMessage>,
    /// Unclassified failures.
    #[serde(default)]
    pub unknown: Option<KindMessage>,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        Self {
            generic: default_generic(),
            network: Some(KindMessage::new(
                "errors.network",
                "Network connection failed. Please check your connection and try again.",
            )),
            data: Some(KindMessage::new(
                "errors.data",
                "The data could not be loaded. Please check your input.",
            )),
            permission: Some(KindMessage::new(
                "errors.permission",
                "You do not have permission to view this data. Please sign in again.",
            )),
            server: Some(KindMessage::new(
                "errors.server",
                "The server is temporarily unavailable. Please try again later.",
            )),
            unknown: Some(KindMessage::new("errors.unknown", "An unexpected error occurred.")),
        }
    }
}

impl MessageCatalog {
    /// A catalog with only the generic message.
    pub fn generic_only(generic: impl Into<String>) -> Self {
        Self {
            generic: generic.into(),
            network: None,
            data: None,
            permission: None,
            server: None,
            unknown: None,
        }
    }

    /// Message source for `kind`, if configured.
    pub fn entry(&self, kind: ErrorKind) -> Option<&KindMessage> {
        match kind {
            ErrorKind::Network => self.network.as_ref(),
            ErrorKind::Data => self.data.as_ref(),
            ErrorKind::Permission => self.permission.as_ref(),
            ErrorKind::Server => self.server.as_ref(),
            ErrorKind::Unknown => self.unknown.as_ref(),
        }
    }

    /// Resolves the user-facing message for `kind`.
    ///
    /// Order: translation of the kind's key, the kind's default text, the
    /// generic message.
    pub fn resolve(&self, kind: ErrorKind, translator: &dyn Translator) -> String {
        let Some(entry) = self.entry(kind) else {
            return self.generic.clone();
        };
        let translated = translator.translate(&entry.key);
        if translated != entry.key {
            return translated;
        }
        entry
            .default
            .clone()
            .unwrap_or_else(|| self.generic.clone())
    }
}

/// A catalog paired with the translator it resolves through.
#[derive(Clone)]
pub struct MessageResolver {
    catalog: MessageCatalog,
    translator: Arc<dyn Translator>,
}

impl std::fmt::Debug for MessageResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageResolver")
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

impl Default for MessageResolver {
    fn default() -> Self {
        Self::new(MessageCatalog::default(), Arc::new(IdentityTranslator))
    }
}

impl MessageResolver {
    /// Pairs `catalog` with `translator`.
    pub fn new(catalog: MessageCatalog, translator: Arc<dyn Translator>) -> Self {
        Self { catalog, translator }
    }

    /// Resolves the message for `kind`.
    pub fn message_for(&self, kind: ErrorKind) -> String {
        self.catalog.resolve(kind, self.translator.as_ref())
    }

    /// The catalog.
    pub fn catalog(&self) -> &MessageCatalog {
        &self.catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untranslated_key_uses_default_text() {
        let catalog = MessageCatalog::default();
        let message = catalog.resolve(ErrorKind::Server, &IdentityTranslator);
        assert_eq!(
            message,
            "The server is temporarily unavailable. Please try again later."
        );
    }

    #[test]
    fn test_translation_wins() {
        let catalog = MessageCatalog::default();
        let translator = CatalogTranslator::new().with_entry("errors.network", "Netzwerkfehler");
        assert_eq!(catalog.resolve(ErrorKind::Network, &translator), "Netzwerkfehler");
        assert_eq!(
            catalog.resolve(ErrorKind::Data, &translator),
            "The data could not be loaded. Please check your input."
        );
    }

    #[test]
    fn test_missing_kind_falls_back_to_generic() {
        let catalog = MessageCatalog::generic_only("Oops");
        for kind in ErrorKind::ALL {
            assert_eq!(catalog.resolve(kind, &IdentityTranslator), "Oops");
        }
    }

    #[test]
    fn test_kind_without_default_text_falls_back_to_generic() {
        let mut catalog = MessageCatalog::generic_only("Oops");
        catalog.server = Some(KindMessage {
            key: "errors.server".to_string(),
            default: None,
        });
        assert_eq!(catalog.resolve(ErrorKind::Server, &IdentityTranslator), "Oops");

        let translator: CatalogTranslator = [("errors.server", "Serverfehler")].into_iter().collect();
        assert_eq!(catalog.resolve(ErrorKind::Server, &translator), "Serverfehler");
    }

    #[test]
    fn test_resolver() {
        let resolver = MessageResolver::new(
            MessageCatalog::default(),
            Arc::new(CatalogTranslator::new().with_entry("errors.permission", "Bitte anmelden")),
        );
        assert_eq!(resolver.message_for(ErrorKind::Permission), "Bitte anmelden");
    }
}
