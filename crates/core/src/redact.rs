//! Removal of server-side paths from text shown to clients.
//!
//! The analysis program echoes absolute paths (its own location, the build
//! file, the workspace) into its progress output and results table. Those
//! prefixes are stripped before anything leaves the service.

use std::path::Path;

/// Strips a fixed set of directory prefixes from text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathRedactor {
    /// Longest first, so nested roots are removed whole.
    prefixes: Vec<String>,
}

impl PathRedactor {
    /// Redactor for `roots`. Each root is matched with and without a
    /// trailing separator, and in its canonical form when that differs.
    /// The filesystem root itself is never redacted.
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut prefixes = Vec::new();
        for root in roots {
            let root = root.as_ref();
            let canonical = root.canonicalize().ok();
            for path in std::iter::once(root).chain(canonical.as_deref()) {
                let text = path.display().to_string();
                let text = text.trim_end_matches('/');
                if text.is_empty() {
                    continue;
                }
                prefixes.push(format!("{text}/"));
                prefixes.push(text.to_string());
            }
        }
        prefixes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        prefixes.dedup();
        Self { prefixes }
    }

    pub fn redact(&self, text: &str) -> String {
        self.prefixes
            .iter()
            .fold(text.to_string(), |acc, prefix| acc.replace(prefix.as_str(), ""))
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}
