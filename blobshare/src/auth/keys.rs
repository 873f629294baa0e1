use std::collections::HashSet;
use tracing::warn;

/// The key shipped in the sample configuration. It is public, so it is never accepted.
pub const PLACEHOLDER_KEY: &str = "superdupersecret";

/// Immutable snapshot of the accepted upload keys.
#[derive(Debug, Clone, Default)]
pub struct KeyAuthorizer {
    accepted: HashSet<String>,
}

impl KeyAuthorizer {
    /// Build the accepted set from configured keys, discarding blank keys and the
    /// placeholder.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut accepted = HashSet::new();
        for key in keys {
            let key = key.into();
            if key.trim().is_empty() {
                warn!("Ignoring blank upload key in configuration");
                continue;
            }
            if key == PLACEHOLDER_KEY {
                warn!(
                    "Key \"{}\" is a default key, will not accept it for authorization. Change it in the configuration file",
                    PLACEHOLDER_KEY
                );
                continue;
            }
            accepted.insert(key);
        }

        if accepted.is_empty() {
            warn!("No upload keys configured, every upload will be rejected");
        }

        Self { accepted }
    }

    /// Check a presented credential. Matching is exact and case-sensitive.
    pub fn authorize(&self, presented: Option<&str>) -> bool {
        match presented {
            Some(key) if !key.trim().is_empty() => self.accepted.contains(key),
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }
}
