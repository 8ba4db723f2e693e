//! Ordered, namespaced key/value configuration store

use indexmap::IndexMap;
use std::path::Path;

/// Delimiter between a section prefix and the key name.
pub const SECTION_DELIMITER: char = ':';

/// Merged launcher configuration.
///
/// Keys are case-sensitive and unique; later writes win. Keys in the main
/// (unnamed) section are stored with a leading `:`, keys in a named section
/// as `Section:name`. Insertion order is preserved so that value scans and
/// `PrintConfig` output are deterministic.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    entries: IndexMap<String, String>,
}

impl ConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a raw key into its stored form.
    ///
    /// A key without a section delimiter belongs to the main section and
    /// gains the leading `:`; a key that already carries a delimiter is
    /// stored as written.
    pub fn normalize_key(key: &str) -> String {
        if key.contains(SECTION_DELIMITER) {
            key.to_string()
        } else {
            format!(":{key}")
        }
    }

    /// Set a key, overwriting any previous value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(Self::normalize_key(key), value.into());
    }

    /// Remove a key. Removing an absent key is a no-op.
    pub fn unset(&mut self, key: &str) {
        self.entries.shift_remove(&Self::normalize_key(key));
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&Self::normalize_key(key))
            .map(String::as_str)
    }

    /// Look up a boolean key. Recognizes `true`/`yes`/`1` and
    /// `false`/`no`/`0`; anything else falls back to the default.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) => match v.trim() {
                "true" | "yes" | "1" => true,
                "false" | "no" | "0" => false,
                _ => default,
            },
            None => default,
        }
    }

    /// Look up an integer key, falling back to the default on absence or
    /// parse failure.
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merge another store into this one, entry by entry. The other
    /// store's keys overwrite existing keys; keys absent from it are kept.
    pub fn merge(&mut self, other: &ConfigStore) {
        for (key, value) in other.iter() {
            self.entries.insert(key.to_string(), value.to_string());
        }
    }

    /// Highest index present in the `base.N` family, or 0 when none.
    pub fn numbered_max(&self, base: &str) -> u32 {
        let prefix = format!("{}.", Self::normalize_key(base));
        self.entries
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter_map(|n| n.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
    }

    /// Ordered values of the numbered key family `base.N`, N starting at 1.
    ///
    /// The probe tolerates a gap of one: scanning continues past a missing
    /// index up to one past the highest index seen so far, then stops. A
    /// family with a hole therefore truncates silently at the hole; this is
    /// long-standing documented behavior, not a defect to repair.
    pub fn numbered_values(&self, base: &str) -> Vec<String> {
        let base = Self::normalize_key(base);
        let mut out = Vec::new();
        let mut max_seen = 0u32;
        let mut index = 1u32;
        loop {
            if let Some(value) = self.entries.get(&format!("{base}.{index}")) {
                out.push(value.clone());
                max_seen = index;
            }
            index += 1;
            if index > max_seen + 1 {
                break;
            }
        }
        out
    }

    /// Append a value to the `base.N` family after its current maximum.
    pub fn append_numbered(&mut self, base: &str, value: impl Into<String>) {
        let next = self.numbered_max(base) + 1;
        let base = Self::normalize_key(base);
        self.entries.insert(format!("{base}.{next}"), value.into());
    }

    /// Parse flat `key=value` text with optional `[Section]` headers.
    ///
    /// Blank lines and lines starting with `#` or `;` are skipped. Keys
    /// and values are trimmed. Lines without `=` are ignored.
    pub fn parse_str(content: &str) -> Self {
        let mut store = Self::new();
        let mut section = String::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = name.trim().to_string();
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let stored = if key.contains(SECTION_DELIMITER) {
                key.to_string()
            } else if section.is_empty() {
                format!(":{key}")
            } else {
                format!("{section}:{key}")
            };
            store.entries.insert(stored, value.trim().to_string());
        }
        store
    }

    /// Load and parse a configuration file.
    pub fn parse_file(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse_str(&content))
    }

    /// Apply a transformation to every value in place.
    pub(crate) fn map_values(&mut self, mut f: impl FnMut(&str, &str) -> Option<String>) {
        let keys: Vec<String> = self.entries.keys().cloned().collect();
        for key in keys {
            let value = self.entries[&key].clone();
            if let Some(replacement) = f(&key, &value) {
                self.entries.insert(key, replacement);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_section_keys_gain_colon() {
        let mut store = ConfigStore::new();
        store.set("main.class", "com.example.App");
        assert_eq!(store.get(":main.class"), Some("com.example.App"));
        assert_eq!(store.get("main.class"), Some("com.example.App"));
    }

    #[test]
    fn test_last_write_wins() {
        let mut store = ConfigStore::new();
        store.set("key", "first");
        store.set("key", "second");
        assert_eq!(store.get("key"), Some("second"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_parse_sections_and_comments() {
        let store = ConfigStore::parse_str(
            "# comment\nmain.class=App\n[ErrorMessages]\nshow.popup=false\n; also comment\n",
        );
        assert_eq!(store.get(":main.class"), Some("App"));
        assert_eq!(store.get("ErrorMessages:show.popup"), Some("false"));
        assert!(!store.get_bool("ErrorMessages:show.popup", true));
    }

    #[test]
    fn test_numbered_values_contiguous() {
        let mut store = ConfigStore::new();
        store.set("classpath.1", "a.jar");
        store.set("classpath.2", "b.jar");
        store.set("classpath.3", "c.jar");
        assert_eq!(store.numbered_values("classpath"), vec!["a.jar", "b.jar", "c.jar"]);
    }

    #[test]
    fn test_numbered_values_truncate_at_gap() {
        let mut store = ConfigStore::new();
        store.set("classpath.1", "a.jar");
        store.set("classpath.2", "b.jar");
        store.set("classpath.4", "d.jar");
        // The probe visits index 3, sees the gap, probes one further and
        // stops; entry 4 is silently dropped.
        assert_eq!(store.numbered_values("classpath"), vec!["a.jar", "b.jar"]);
    }

    #[test]
    fn test_numbered_values_not_starting_at_one() {
        let mut store = ConfigStore::new();
        store.set("arg.2", "x");
        assert!(store.numbered_values("arg").is_empty());
    }

    #[test]
    fn test_append_numbered_after_max() {
        let mut store = ConfigStore::new();
        store.set("vmarg.1", "-Xint");
        store.set("vmarg.4", "-Xbatch");
        store.append_numbered("vmarg", "-Dx=y");
        assert_eq!(store.get(":vmarg.5"), Some("-Dx=y"));
    }

    #[test]
    fn test_merge_overwrites_entry_by_entry() {
        let mut base = ConfigStore::parse_str("a=1\nb=2\n");
        let over = ConfigStore::parse_str("b=20\nc=30\n");
        base.merge(&over);
        assert_eq!(base.get("a"), Some("1"));
        assert_eq!(base.get("b"), Some("20"));
        assert_eq!(base.get("c"), Some("30"));
    }
}
