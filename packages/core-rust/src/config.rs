//! Operation catalog loading.
//!
//! Two sources are supported:
//!
//! 1. **Properties directory**: a manifest file (default
//!    `quickquarantine.properties`) maps each operation id to a per-operation
//!    properties file in the same directory. Each per-operation file carries the
//!    pool sizing keys and two `|`-separated routing lists.
//! 2. **JSON**: an object keyed by operation id whose values are [`PoolSpec`]s.
//!
//! Loading is all-or-nothing: the first malformed entry aborts the load.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::ConfigError;
use crate::spec::PoolSpec;

/// Default manifest file name.
pub const DEFAULT_MANIFEST: &str = "quickquarantine.properties";

pub const MAXIMUM_POOL_SIZE: &str = "maximumPoolSize";
pub const CORE_POOL_SIZE: &str = "corePoolSize";
pub const WORK_QUEUE_SIZE: &str = "workQueueSize";
pub const KEEP_ALIVE_TIME: &str = "keepAliveTime";
pub const ALLOW_CORE_THREAD_TIMEOUT: &str = "allowCoreThreadTimeout";
pub const HANDLER_IDS: &str = "seriesClassStaticMethodName";
pub const SUB_OPERATION_IDS: &str = "seriesOperation";

/// Separator between entries of the routing lists.
pub const LIST_SEPARATOR: char = '|';

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// Parsed `key = value` file. Keys keep first-seen order; a repeated key
/// overrides the earlier value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: Vec<(String, String)>,
}

impl Properties {
    /// Parses properties text in the `java.util.Properties` line format.
    ///
    /// - Blank lines and lines starting with `#` or `!` are skipped.
    /// - A line ending in an odd number of `\` continues on the next line,
    ///   whose leading whitespace is dropped.
    /// - The key ends at the first unescaped `=`, `:` or whitespace; one
    ///   separator and the whitespace around it are skipped.
    /// - `\t`, `\n`, `\r`, `\f`, `\uXXXX` and `\<char>` escapes are decoded
    ///   in keys and values.
    ///
    /// Unlike `java.util.Properties`, trailing whitespace of a value is
    /// trimmed and a malformed `\u` escape is kept literally.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut props = Self::default();
        let mut lines = text.lines();
        while let Some(line) = lines.next() {
            let first = line.trim_start();
            if first.is_empty() || first.starts_with('#') || first.starts_with('!') {
                continue;
            }
            let mut logical = first.to_string();
            while continues(&logical) {
                logical.pop();
                match lines.next() {
                    Some(next) => logical.push_str(next.trim_start()),
                    None => break,
                }
            }
            let (key, value) = split_entry(&logical);
            props.set(key, value);
        }
        props
    }

    /// Reads and parses a properties file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn continues(line: &str) -> bool {
    line.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> (String, String) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (at, c) in line.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '=' || c == ':' || c.is_whitespace() {
            key_end = at;
            break;
        }
    }
    let mut rest = line[key_end..].trim_start();
    if let Some(value) = rest.strip_prefix(['=', ':']) {
        rest = value.trim_start();
    }
    (unescape(&line[..key_end]), unescape(rest.trim_end()))
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Spec extraction
// ---------------------------------------------------------------------------

fn required<'a>(
    props: &'a Properties,
    operation: &str,
    key: &'static str,
) -> Result<&'a str, ConfigError> {
    match props.get(key).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing {
            operation: operation.to_string(),
            key,
        }),
    }
}

fn number<T: std::str::FromStr>(
    props: &Properties,
    operation: &str,
    key: &'static str,
) -> Result<T, ConfigError> {
    let raw = required(props, operation, key)?;
    raw.parse().map_err(|_| ConfigError::InvalidNumber {
        operation: operation.to_string(),
        key,
        value: raw.to_string(),
    })
}

fn list(props: &Properties, operation: &str, key: &'static str) -> Result<Vec<String>, ConfigError> {
    Ok(required(props, operation, key)?
        .split(LIST_SEPARATOR)
        .map(|s| s.trim().to_string())
        .collect())
}

/// Builds and validates a [`PoolSpec`] from one operation's properties.
///
/// `allowCoreThreadTimeout` is `false` only for the literal `0`.
///
/// # Errors
///
/// Fails on a missing or empty key, a non-integer size, or a spec that does
/// not pass [`PoolSpec::validate`].
pub fn spec_from_properties(operation: &str, props: &Properties) -> Result<PoolSpec, ConfigError> {
    let spec = PoolSpec {
        maximum_pool_size: number(props, operation, MAXIMUM_POOL_SIZE)?,
        core_pool_size: number(props, operation, CORE_POOL_SIZE)?,
        work_queue_size: number(props, operation, WORK_QUEUE_SIZE)?,
        keep_alive_secs: number(props, operation, KEEP_ALIVE_TIME)?,
        allow_core_thread_timeout: required(props, operation, ALLOW_CORE_THREAD_TIMEOUT)? != "0",
        sub_operation_handler_ids: list(props, operation, HANDLER_IDS)?,
        sub_operation_ids: list(props, operation, SUB_OPERATION_IDS)?,
    };
    spec.validate(operation)?;
    Ok(spec)
}

// ---------------------------------------------------------------------------
// OperationCatalog
// ---------------------------------------------------------------------------

/// Validated pool specs keyed by operation id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationCatalog {
    specs: BTreeMap<String, PoolSpec>,
}

impl OperationCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the spec for `operation` after validating it.
    ///
    /// # Errors
    ///
    /// Returns the validation error; the catalog is left unchanged.
    pub fn insert(&mut self, operation: impl Into<String>, spec: PoolSpec) -> Result<(), ConfigError> {
        let operation = operation.into();
        spec.validate(&operation)?;
        self.specs.insert(operation, spec);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, operation: &str) -> Option<&PoolSpec> {
        self.specs.get(operation)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PoolSpec)> {
        self.specs.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Loads every operation listed in `dir/manifest`.
    ///
    /// Each manifest entry is `operationId = fileName`, resolved relative to `dir`.
    ///
    /// # Errors
    ///
    /// Returns the first I/O or validation error; nothing is returned partially.
    pub fn load_dir(dir: &Path, manifest: &str) -> Result<Self, ConfigError> {
        let manifest_path = dir.join(manifest);
        info!(path = %manifest_path.display(), "loading operation manifest");
        let manifest = Properties::load(&manifest_path)?;

        let mut catalog = Self::new();
        for (operation, file_name) in manifest.iter() {
            let path = dir.join(file_name);
            debug!(operation, path = %path.display(), "loading operation configuration");
            let props = Properties::load(&path)?;
            let spec = spec_from_properties(operation, &props)?;
            info!(
                operation,
                core = spec.core_pool_size,
                maximum = spec.maximum_pool_size,
                queue = spec.work_queue_size,
                routes = spec.sub_operation_ids.len(),
                "operation configuration loaded"
            );
            catalog.specs.insert(operation.to_string(), spec);
        }
        info!(operations = catalog.len(), "operation manifest loaded");
        Ok(catalog)
    }

    /// Parses a JSON object of `operationId -> PoolSpec`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed JSON or missing fields, or
    /// the first validation error.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let specs: BTreeMap<String, PoolSpec> = serde_json::from_str(text)?;
        for (operation, spec) in &specs {
            spec.validate(operation)?;
        }
        Ok(Self { specs })
    }
}

impl IntoIterator for OperationCatalog {
    type Item = (String, PoolSpec);
    type IntoIter = std::collections::btree_map::IntoIter<String, PoolSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.specs.into_iter()
    }
}
