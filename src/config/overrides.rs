//! Command-line override layer
//!
//! Arguments carrying the override prefix (`-W` by default) patch the
//! resolved configuration in place; `-X`/`-D` style arguments become
//! extra runtime arguments; everything else is passed through to the
//! hosted program as `:arg.N` entries.

use super::store::ConfigStore;

const OVERRIDE_PREFIX_KEY: &str = ":args.override.prefix";
const ALLOW_OVERRIDES_KEY: &str = ":args.allow.overrides";
const ALLOW_VMARGS_KEY: &str = ":args.allow.vmargs";

const DEFAULT_OVERRIDE_PREFIX: &str = "-W";

/// Fold the command-line arguments (program name excluded) into the
/// configuration, final precedence.
pub fn apply_command_line(store: &mut ConfigStore, args: &[String]) {
    let prefix = store
        .get(OVERRIDE_PREFIX_KEY)
        .unwrap_or(DEFAULT_OVERRIDE_PREFIX)
        .to_string();
    let allow_overrides = store.get_bool(ALLOW_OVERRIDES_KEY, true);
    let allow_vmargs = store.get_bool(ALLOW_VMARGS_KEY, true);

    for arg in args {
        if allow_overrides {
            if let Some(rest) = arg.strip_prefix(&prefix) {
                apply_override(store, rest);
                continue;
            }
        }
        if allow_vmargs && (arg.starts_with("-X") || arg.starts_with("-D")) {
            log::debug!("Adding runtime arg from command line: {}", arg);
            store.append_numbered(":vmarg", arg);
        } else {
            store.append_numbered(":arg", arg);
        }
    }
}

/// Apply a single `[SECTION:]NAME[=VALUE]` override. A value sets the
/// key, its absence unsets it.
fn apply_override(store: &mut ConfigStore, spec: &str) {
    if spec.is_empty() {
        return;
    }
    match spec.split_once('=') {
        Some((name, value)) => {
            log::debug!("Config override: {}={}", name, value);
            store.set(name, value.to_string());
        }
        None => {
            log::debug!("Config override (unset): {}", spec);
            store.unset(spec);
        }
    }
}
