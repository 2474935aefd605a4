use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;

/// Host variables a guest may see. Everything else is dropped, so a secret
/// added to the host environment later can never reach a guest by omission.
pub const ENV_ALLOW_LIST: &[&str] = &["PATH", "HOME", "LANG", "LC_ALL", "LC_CTYPE", "TZ"];

#[cfg(windows)]
const ENV_ALLOW_LIST_PLATFORM: &[&str] = &["SystemRoot", "WINDIR", "PATHEXT", "TEMP", "TMP"];
#[cfg(not(windows))]
const ENV_ALLOW_LIST_PLATFORM: &[&str] = &[];

pub const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";
pub const DEFAULT_MODULE_PATH_VAR: &str = "PYTHONPATH";

/// Builds the complete environment for a guest from the current process's
/// variables. Pass the result to `Command::envs` after `env_clear()`.
pub fn sanitized_env(module_path: Option<(&str, &Path)>) -> BTreeMap<String, String> {
    sanitized_env_from(std::env::vars_os(), module_path)
}

pub fn sanitized_env_from<I>(vars: I, module_path: Option<(&str, &Path)>) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut env = BTreeMap::new();
    for (key, value) in vars {
        let (Ok(key), Ok(value)) = (key.into_string(), value.into_string()) else {
            continue;
        };
        if is_allowed(&key) {
            env.insert(key, value);
        }
    }

    env.entry("PATH".to_string())
        .or_insert_with(|| DEFAULT_PATH.to_string());

    if let Some((var, dir)) = module_path {
        if is_valid_env_name(var) {
            env.insert(var.to_string(), dir.display().to_string());
        }
    }

    env
}

fn is_allowed(key: &str) -> bool {
    ENV_ALLOW_LIST.contains(&key) || ENV_ALLOW_LIST_PLATFORM.contains(&key)
}

pub fn is_valid_env_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
