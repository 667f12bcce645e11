//! TOML-file [`ConfigStore`] with an environment overlay.
//!
//! Precedence is `env > file > defaults`. Environment keys are the dotted
//! path upper-cased with `_` separators and a `PERFGOV_` prefix, so
//! `decision.cooldown_ms` is overridden by `PERFGOV_DECISION_COOLDOWN_MS`.
//! Persisted values are written back to the file atomically.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use perfgov_core::tracing_config::targets;
use perfgov_core::{
    ConfigStore, ConfigValue, GovernorError, GovernorResult, read_or_recover, write_or_recover,
};
use tracing::{debug, info};

use crate::config::{CONFIG_KEYS, ConfigWarning, ValueKind, unknown_key_warnings};

pub const ENV_PREFIX: &str = "PERFGOV_";

/// Environment variable that overrides `path`.
#[must_use]
pub fn env_key_for(path: &str) -> String {
    format!("{ENV_PREFIX}{}", path.to_ascii_uppercase().replace('.', "_"))
}

#[derive(Debug, Default)]
struct Loaded {
    file: toml::Table,
    overlay: BTreeMap<String, ConfigValue>,
    env_keys_used: Vec<String>,
    warnings: Vec<ConfigWarning>,
}

#[derive(Debug)]
pub struct TomlConfigStore {
    path: Option<PathBuf>,
    env: BTreeMap<String, String>,
    loaded: RwLock<Loaded>,
}

impl TomlConfigStore {
    /// Load `path` (a missing file counts as empty) and overlay `env`.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::Io`] when a present file cannot be read and
    /// [`GovernorError::InvalidConfig`] for malformed TOML or env values.
    pub fn open<I>(path: &Path, env: I) -> GovernorResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env = perfgov_env(env);
        let loaded = load(Some(path), &env)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            env,
            loaded: RwLock::new(loaded),
        })
    }

    /// In-memory store seeded from a TOML string. `persist` updates memory only.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidConfig`] for malformed TOML or env values.
    pub fn from_toml_str<I>(contents: &str, env: I) -> GovernorResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env = perfgov_env(env);
        let file = parse_table(contents)?;
        let loaded = build(file, &env)?;
        Ok(Self {
            path: None,
            env,
            loaded: RwLock::new(loaded),
        })
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load-time warnings: unknown keys and mistyped values.
    #[must_use]
    pub fn warnings(&self) -> Vec<ConfigWarning> {
        read_or_recover(&self.loaded).warnings.clone()
    }

    /// Environment variables that overrode file values.
    #[must_use]
    pub fn env_keys_used(&self) -> Vec<String> {
        read_or_recover(&self.loaded).env_keys_used.clone()
    }

    fn lookup(&self, path: &str) -> Option<ConfigValue> {
        let loaded = read_or_recover(&self.loaded);
        if let Some(value) = loaded.overlay.get(path) {
            return Some(value.clone());
        }
        lookup_table(&loaded.file, path).and_then(to_config_value)
    }
}

impl ConfigStore for TomlConfigStore {
    fn get_f64(&self, path: &str, default: f64) -> f64 {
        match self.lookup(path) {
            Some(ConfigValue::Float(v)) => v,
            #[allow(clippy::cast_precision_loss)]
            Some(ConfigValue::Int(v)) => v as f64,
            _ => default,
        }
    }

    fn get_i64(&self, path: &str, default: i64) -> i64 {
        match self.lookup(path) {
            Some(ConfigValue::Int(v)) => v,
            _ => default,
        }
    }

    fn get_bool(&self, path: &str, default: bool) -> bool {
        match self.lookup(path) {
            Some(ConfigValue::Bool(v)) => v,
            _ => default,
        }
    }

    fn get_string(&self, path: &str, default: &str) -> String {
        match self.lookup(path) {
            Some(ConfigValue::Text(v)) => v,
            _ => default.to_owned(),
        }
    }

    fn persist(&self, path: &str, value: ConfigValue) -> GovernorResult<()> {
        let mut loaded = write_or_recover(&self.loaded);
        let mut file = loaded.file.clone();
        insert_table(&mut file, path, to_toml_value(&value)).map_err(|reason| {
            GovernorError::PersistFailed {
                key: path.to_owned(),
                source: reason.into(),
            }
        })?;

        if let Some(target) = &self.path {
            write_atomically(target, &file).map_err(|source| GovernorError::PersistFailed {
                key: path.to_owned(),
                source,
            })?;
        }

        loaded.file = file;
        // A runtime write supersedes the env value until the next refresh.
        if loaded.overlay.remove(path).is_some() {
            debug!(
                target: targets::CONFIG,
                key = path,
                "persisted value replaces environment override"
            );
        }
        debug!(target: targets::CONFIG, key = path, value = %value, "config value persisted");
        Ok(())
    }

    fn refresh(&self) -> GovernorResult<()> {
        let reloaded = load(self.path.as_deref(), &self.env)?;
        *write_or_recover(&self.loaded) = reloaded;
        info!(
            target: targets::CONFIG,
            path = ?self.path,
            "configuration source re-read"
        );
        Ok(())
    }
}

fn perfgov_env<I>(env: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    env.into_iter()
        .filter(|(key, _)| key.starts_with(ENV_PREFIX))
        .collect()
}

fn load(path: Option<&Path>, env: &BTreeMap<String, String>) -> GovernorResult<Loaded> {
    let file = match path {
        Some(path) if path.exists() => parse_table(&fs::read_to_string(path)?)?,
        Some(_) | None => toml::Table::new(),
    };
    build(file, env)
}

fn build(file: toml::Table, env: &BTreeMap<String, String>) -> GovernorResult<Loaded> {
    let mut leaves = Vec::new();
    collect_leaf_paths(&file, "", &mut leaves);
    let mut warnings = unknown_key_warnings(leaves.iter().map(String::as_str));
    warnings.extend(type_mismatch_warnings(&file));

    let mut overlay = BTreeMap::new();
    let mut env_keys_used = Vec::new();
    for key in CONFIG_KEYS {
        let env_key = env_key_for(key.path);
        if let Some(raw) = env.get(&env_key) {
            overlay.insert(key.path.to_owned(), parse_env_value(raw, key.path, key.kind)?);
            env_keys_used.push(env_key);
        }
    }

    Ok(Loaded {
        file,
        overlay,
        env_keys_used,
        warnings,
    })
}

fn parse_table(contents: &str) -> GovernorResult<toml::Table> {
    toml::from_str(contents).map_err(|error| GovernorError::InvalidConfig {
        field: "config_file".into(),
        value: "<toml>".into(),
        reason: error.to_string(),
    })
}

fn collect_leaf_paths(table: &toml::Table, prefix: &str, out: &mut Vec<String>) {
    for (name, value) in table {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        match value {
            toml::Value::Table(inner) => collect_leaf_paths(inner, &path, out),
            _ => out.push(path),
        }
    }
}

fn type_mismatch_warnings(file: &toml::Table) -> Vec<ConfigWarning> {
    CONFIG_KEYS
        .iter()
        .filter_map(|key| {
            let value = lookup_table(file, key.path)?;
            let matches = match key.kind {
                ValueKind::Bool => value.is_bool(),
                ValueKind::Int => value.is_integer(),
                ValueKind::Float => value.is_float() || value.is_integer(),
                ValueKind::Text => value.is_str(),
            };
            (!matches).then(|| ConfigWarning {
                reason_code: "config.key.type_mismatch".to_owned(),
                field: key.path.to_owned(),
                message: format!(
                    "expected {:?} for {}, found {}; using default {}",
                    key.kind,
                    key.path,
                    value.type_str(),
                    key.default
                ),
            })
        })
        .collect()
}

fn lookup_table<'a>(table: &'a toml::Table, path: &str) -> Option<&'a toml::Value> {
    let mut segments = path.split('.');
    let mut current = table.get(segments.next()?)?;
    for segment in segments {
        current = current.as_table()?.get(segment)?;
    }
    Some(current)
}

fn insert_table(table: &mut toml::Table, path: &str, value: toml::Value) -> Result<(), String> {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((leaf, parents)) = segments.split_last() else {
        return Err("empty key".to_owned());
    };
    let mut current = table;
    for segment in parents {
        let entry = current
            .entry((*segment).to_owned())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        current = entry
            .as_table_mut()
            .ok_or_else(|| format!("{segment} is not a table"))?;
    }
    current.insert((*leaf).to_owned(), value);
    Ok(())
}

fn to_config_value(value: &toml::Value) -> Option<ConfigValue> {
    match value {
        toml::Value::Boolean(v) => Some(ConfigValue::Bool(*v)),
        toml::Value::Integer(v) => Some(ConfigValue::Int(*v)),
        toml::Value::Float(v) => Some(ConfigValue::Float(*v)),
        toml::Value::String(v) => Some(ConfigValue::Text(v.clone())),
        _ => None,
    }
}

fn to_toml_value(value: &ConfigValue) -> toml::Value {
    match value {
        ConfigValue::Bool(v) => toml::Value::Boolean(*v),
        ConfigValue::Int(v) => toml::Value::Integer(*v),
        ConfigValue::Float(v) => toml::Value::Float(*v),
        ConfigValue::Text(v) => toml::Value::String(v.clone()),
    }
}

fn parse_env_value(raw: &str, field: &str, kind: ValueKind) -> GovernorResult<ConfigValue> {
    let invalid = |reason: &str| GovernorError::invalid_config(field, raw, reason);
    match kind {
        ValueKind::Bool => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(ConfigValue::Bool(true)),
            "0" | "false" | "no" | "off" => Ok(ConfigValue::Bool(false)),
            _ => Err(invalid("expected boolean (true/false/1/0/yes/no/on/off)")),
        },
        ValueKind::Int => raw
            .trim()
            .parse::<i64>()
            .map(ConfigValue::Int)
            .map_err(|_| invalid("expected integer")),
        ValueKind::Float => raw
            .trim()
            .parse::<f64>()
            .map(ConfigValue::Float)
            .map_err(|_| invalid("expected number")),
        ValueKind::Text => Ok(ConfigValue::Text(raw.to_owned())),
    }
}

fn write_atomically(
    target: &Path,
    table: &toml::Table,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let contents = toml::to_string(table)?;
    if let Some(parent) = target.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = target.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> Vec<(String, String)> {
        Vec::new()
    }

    #[test]
    fn env_key_naming() {
        assert_eq!(
            env_key_for("decision.cooldown_ms"),
            "PERFGOV_DECISION_COOLDOWN_MS"
        );
        assert_eq!(env_key_for("manual.mode"), "PERFGOV_MANUAL_MODE");
    }

    #[test]
    fn file_values_are_read_by_dotted_path() {
        let store = TomlConfigStore::from_toml_str(
            "[decision]\nstability_threshold = 3\nmax_rate = 25\n[manual]\nmode = \"lite\"\n",
            no_env(),
        )
        .unwrap();
        assert_eq!(store.get_i64("decision.stability_threshold", 5), 3);
        assert!((store.get_f64("decision.max_rate", 20.0) - 25.0).abs() < f64::EPSILON);
        assert_eq!(store.get_string("manual.mode", "full"), "lite");
        assert!(!store.get_bool("manual.enabled", false));
    }

    #[test]
    fn env_overrides_file() {
        let env = vec![
            ("PERFGOV_DECISION_STABILITY_THRESHOLD".to_owned(), "7".to_owned()),
            ("PERFGOV_MANUAL_ENABLED".to_owned(), "yes".to_owned()),
            ("HOME".to_owned(), "/root".to_owned()),
        ];
        let store =
            TomlConfigStore::from_toml_str("[decision]\nstability_threshold = 3\n", env).unwrap();
        assert_eq!(store.get_i64("decision.stability_threshold", 5), 7);
        assert!(store.get_bool("manual.enabled", false));
        assert_eq!(
            store.env_keys_used(),
            vec![
                "PERFGOV_DECISION_STABILITY_THRESHOLD".to_owned(),
                "PERFGOV_MANUAL_ENABLED".to_owned()
            ]
        );
    }

    #[test]
    fn invalid_env_value_is_rejected() {
        let env = vec![("PERFGOV_DECISION_AUTO_OPTIMIZE".to_owned(), "maybe".to_owned())];
        let err = TomlConfigStore::from_toml_str("", env).unwrap_err();
        assert!(
            matches!(err, GovernorError::InvalidConfig { field, .. } if field == "decision.auto_optimize")
        );
    }

    #[test]
    fn unknown_and_mistyped_keys_warn() {
        let store = TomlConfigStore::from_toml_str(
            "[decision]\ncooldown_ms = \"soon\"\ncooldwn_ms = 5\n",
            no_env(),
        )
        .unwrap();
        let codes: Vec<(String, String)> = store
            .warnings()
            .into_iter()
            .map(|w| (w.reason_code, w.field))
            .collect();
        assert!(codes.contains(&(
            "config.key.unknown".to_owned(),
            "decision.cooldwn_ms".to_owned()
        )));
        assert!(codes.contains(&(
            "config.key.type_mismatch".to_owned(),
            "decision.cooldown_ms".to_owned()
        )));
        assert_eq!(store.get_i64("decision.cooldown_ms", 60_000), 60_000);
    }

    #[test]
    fn malformed_toml_is_invalid_config() {
        let err = TomlConfigStore::from_toml_str("[decision\n", no_env()).unwrap_err();
        assert!(err.to_string().contains("config_file"));
    }

    #[test]
    fn persist_in_memory_updates_reads_and_clears_env_override() {
        let env = vec![("PERFGOV_MANUAL_MODE".to_owned(), "basic".to_owned())];
        let store = TomlConfigStore::from_toml_str("", env).unwrap();
        assert_eq!(store.get_string("manual.mode", "full"), "basic");
        store
            .persist("manual.mode", ConfigValue::Text("emergency".into()))
            .unwrap();
        assert_eq!(store.get_string("manual.mode", "full"), "emergency");
    }
}
