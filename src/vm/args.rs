//! Runtime argument assembly
//!
//! Builds the final ordered argument vector: configured runtime
//! arguments, the expanded classpath, heap sizing derived from physical
//! memory, and the native library search path.

use crate::config::ConfigStore;
use crate::platform::memory::MemoryProbe;
use std::path::PathBuf;

use super::classpath;

const KEY_VMARG: &str = ":vmarg";
const KEY_CLASSPATH: &str = ":classpath";
const KEY_LIBRARY_PATH: &str = ":vm.library.path";
const KEY_HEAP_PREFERRED: &str = ":vm.heapsize.preferred";
const KEY_HEAP_MAX_PERCENT: &str = ":vm.heapsize.max.percent";
const KEY_HEAP_MIN_PERCENT: &str = ":vm.heapsize.min.percent";
const KEY_WORKING_DIRECTORY: &str = ":working.directory";

#[cfg(target_pointer_width = "64")]
const HEAP_CEILING_MB: u64 = 8000;
#[cfg(not(target_pointer_width = "64"))]
const HEAP_CEILING_MB: u64 = 1530;

/// Physical memory held back from heap sizing, in MB.
const RESERVED_MB: u64 = 80;

#[cfg(windows)]
const PATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const PATH_SEPARATOR: &str = ":";

pub struct ArgumentBuilder<'a> {
    store: &'a ConfigStore,
    probe: &'a dyn MemoryProbe,
}

impl<'a> ArgumentBuilder<'a> {
    pub fn new(store: &'a ConfigStore, probe: &'a dyn MemoryProbe) -> Self {
        ArgumentBuilder { store, probe }
    }

    pub fn build(&self) -> Vec<String> {
        let mut args = self.store.numbered_values(KEY_VMARG);

        if let Some(classpath) = self.build_classpath() {
            args.push(format!("-Djava.class.path={classpath}"));
        }
        self.append_heap_args(&mut args);

        let library_paths = self.store.numbered_values(KEY_LIBRARY_PATH);
        if !library_paths.is_empty() {
            args.push(format!(
                "-Djava.library.path={}",
                library_paths.join(PATH_SEPARATOR)
            ));
        }

        for arg in &args {
            log::debug!("Runtime arg: {}", arg);
        }
        args
    }

    fn base_dir(&self) -> PathBuf {
        self.store
            .get(KEY_WORKING_DIRECTORY)
            .or_else(|| self.store.get(crate::config::loader::KEY_CONFIG_DIR))
            .map_or_else(|| PathBuf::from("."), PathBuf::from)
    }

    fn build_classpath(&self) -> Option<String> {
        let patterns = self.store.numbered_values(KEY_CLASSPATH);
        if patterns.is_empty() {
            return None;
        }
        let base = self.base_dir();
        let entries: Vec<String> = patterns
            .iter()
            .flat_map(|pattern| classpath::expand_entry(&base, pattern))
            .map(|p| p.display().to_string())
            .collect();
        Some(entries.join(PATH_SEPARATOR))
    }

    fn append_heap_args(&self, args: &mut Vec<String>) {
        let Some(total_mb) = self.probe.total_physical_mb() else {
            log::warn!("Physical memory query failed, skipping heap sizing");
            return;
        };
        let available_mb = total_mb.saturating_sub(RESERVED_MB);
        let ceiling = available_mb.min(HEAP_CEILING_MB);

        if let Some(preferred) = self.heap_value(KEY_HEAP_PREFERRED) {
            args.push(format!("-Xmx{}m", preferred.min(ceiling)));
        } else if let Some(percent) = self.heap_percent(KEY_HEAP_MAX_PERCENT) {
            args.push(format!("-Xmx{}m", (percent * available_mb / 100).min(ceiling)));
        }

        // Minimum is computed independently of the maximum.
        if let Some(percent) = self.heap_percent(KEY_HEAP_MIN_PERCENT) {
            args.push(format!("-Xms{}m", (percent * available_mb / 100).min(ceiling)));
        }
    }

    fn heap_value(&self, key: &str) -> Option<u64> {
        self.store.get(key).map(leading_number)
    }

    fn heap_percent(&self, key: &str) -> Option<u64> {
        let percent = self.heap_value(key)?;
        if percent > 100 {
            log::warn!("Heap percentage out of range, ignored: {}", percent);
            return None;
        }
        Some(percent)
    }
}

fn leading_number(text: &str) -> u64 {
    let text = text.trim();
    let digits = text
        .split_once(|c: char| !c.is_ascii_digit())
        .map_or(text, |(d, _)| d);
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::memory::FixedProbe;

    fn store_with(pairs: &[(&str, &str)]) -> ConfigStore {
        let mut store = ConfigStore::new();
        for (k, v) in pairs {
            store.set(k, (*v).to_string());
        }
        store
    }

    #[test]
    fn test_vmargs_come_first_in_order() {
        let store = store_with(&[("vmarg.1", "-ea"), ("vmarg.2", "-verbose:gc")]);
        let probe = FixedProbe(None);
        let args = ArgumentBuilder::new(&store, &probe).build();
        assert_eq!(args, vec!["-ea", "-verbose:gc"]);
    }

    #[test]
    fn test_preferred_heap_clamped_to_available() {
        let store = store_with(&[("vm.heapsize.preferred", "4096")]);
        let probe = FixedProbe(Some(1024));
        let args = ArgumentBuilder::new(&store, &probe).build();
        assert_eq!(args, vec!["-Xmx944m"]);
    }

    #[test]
    fn test_preferred_heap_below_available_unclamped() {
        let store = store_with(&[("vm.heapsize.preferred", "512")]);
        let probe = FixedProbe(Some(4096));
        let args = ArgumentBuilder::new(&store, &probe).build();
        assert_eq!(args, vec!["-Xmx512m"]);
    }

    #[test]
    fn test_max_percent_only_without_preferred() {
        let store = store_with(&[
            ("vm.heapsize.preferred", "512"),
            ("vm.heapsize.max.percent", "50"),
        ]);
        let probe = FixedProbe(Some(2080));
        let args = ArgumentBuilder::new(&store, &probe).build();
        assert_eq!(args, vec!["-Xmx512m"]);
    }

    #[test]
    fn test_min_percent_is_independent() {
        let store = store_with(&[
            ("vm.heapsize.max.percent", "50"),
            ("vm.heapsize.min.percent", "25"),
        ]);
        let probe = FixedProbe(Some(2080));
        let args = ArgumentBuilder::new(&store, &probe).build();
        assert_eq!(args, vec!["-Xmx1000m", "-Xms500m"]);
    }

    #[test]
    fn test_percent_out_of_range_skipped() {
        let store = store_with(&[("vm.heapsize.max.percent", "150")]);
        let probe = FixedProbe(Some(2080));
        let args = ArgumentBuilder::new(&store, &probe).build();
        assert!(args.is_empty());
    }

    #[test]
    fn test_probe_failure_omits_heap_args() {
        let store = store_with(&[("vm.heapsize.preferred", "512")]);
        let probe = FixedProbe(None);
        let args = ArgumentBuilder::new(&store, &probe).build();
        assert!(args.is_empty());
    }

    #[test]
    fn test_library_path_joined() {
        let store = store_with(&[
            ("vm.library.path.1", "/opt/native"),
            ("vm.library.path.2", "/usr/lib/jni"),
        ]);
        let probe = FixedProbe(None);
        let args = ArgumentBuilder::new(&store, &probe).build();
        assert_eq!(args, vec![format!("-Djava.library.path=/opt/native{PATH_SEPARATOR}/usr/lib/jni")]);
    }

    #[test]
    fn test_classpath_between_vmargs_and_heap() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.jar"), b"").unwrap();
        let store = store_with(&[
            ("vmarg.1", "-ea"),
            ("classpath.1", "app.jar"),
            ("vm.heapsize.preferred", "128"),
            ("config.dir", &dir.path().display().to_string()),
        ]);
        let probe = FixedProbe(Some(1024));
        let args = ArgumentBuilder::new(&store, &probe).build();
        assert_eq!(args.len(), 3);
        assert_eq!(args[0], "-ea");
        assert_eq!(
            args[1],
            format!("-Djava.class.path={}", dir.path().join("app.jar").display())
        );
        assert_eq!(args[2], "-Xmx128m");
    }
}
