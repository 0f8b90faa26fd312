//! Filepath: src/infra/config.rs
//! Hierarchical JSON configuration: one user-level global file plus every
//! project-level dotfile from the filesystem root down to the start
//! directory, merged root-to-leaf.
//!
//! Merge rules:
//! - `global_excludes` accumulate across every file
//! - bindings deep-merge per field, deeper files overriding
//! - other top-level keys: deeper files override
//!
//! Every pattern and binding field remembers which files contributed it,
//! which backs `--show-config`. Discovery and auto-detection take the
//! start directory as an explicit parameter so they stay pure functions
//! of their inputs.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::core::upload::DEFAULT_MAX_WORKERS;

/// Project-level configuration dotfile name.
pub const PROJECT_CONFIG_NAME: &str = ".skiff.json";

/// User-level locations probed for the global config (first hit wins).
pub fn global_config_locations() -> Vec<PathBuf> {
    ["~/.skiff/skiff.json", "~/.config/skiff/skiff.json"]
        .iter()
        .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
        .collect()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found; checked: {searched}")]
    NotFound { searched: String },

    #[error("binding '{0}' not found in configuration")]
    UnknownBinding(String),

    #[error("binding '{alias}' is missing required field '{field}'")]
    MissingField { alias: String, field: &'static str },

    #[error("local base path '{}' does not exist", .0.display())]
    BasepathMissing(PathBuf),

    #[error("bindings {aliases:?} share the local base path '{}'; select one with --binding", .path.display())]
    AmbiguousBinding { path: PathBuf, aliases: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ftp,
    Sftp,
}

impl Protocol {
    pub fn default_port(self) -> u16 {
        match self {
            Self::Ftp => 21,
            Self::Sftp => 22,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Ftp => "FTP",
            Self::Sftp => "SFTP",
        }
    }
}

/// Binding fields as they appear in one config file: everything optional,
/// unknown keys preserved in `extra` for passthrough (e.g. `comments`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BindingPartial {
    pub protocol: Option<Protocol>,
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub key_filename: Option<String>,
    pub local_basepath: Option<String>,
    pub remote_basepath: Option<String>,
    pub excludes: Option<Vec<String>>,
    pub max_workers: Option<usize>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A fully merged and validated remote target.
#[derive(Debug, Clone)]
pub struct Binding {
    pub alias: String,
    pub protocol: Protocol,
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub key_filename: Option<PathBuf>,
    pub local_basepath: PathBuf,
    pub remote_basepath: String,
    pub excludes: Vec<String>,
    pub max_workers: usize,
    pub extra: Map<String, Value>,
}

impl Binding {
    pub fn comment(&self) -> Option<&str> {
        self.extra.get("comments").and_then(Value::as_str)
    }

    pub fn excludes_comment(&self) -> Option<&str> {
        self.extra.get("excludes_comments").and_then(Value::as_str)
    }
}

/// One config file as parsed from disk.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    global_excludes: Vec<String>,
    #[serde(default)]
    bindings: IndexMap<String, BindingPartial>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Where each merged piece of configuration came from.
#[derive(Debug, Default)]
pub struct SourceMap {
    pub config_files: Vec<PathBuf>,
    pub global_excludes: IndexMap<String, Vec<PathBuf>>,
    pub bindings: IndexMap<String, BindingSources>,
}

#[derive(Debug, Default)]
pub struct BindingSources {
    pub defined_in: Vec<PathBuf>,
    pub fields: IndexMap<&'static str, Vec<PathBuf>>,
}

/// Merged binding state before validation: fields may still be missing.
#[derive(Debug, Clone, Default)]
pub struct BindingDraft {
    partial: BindingPartial,
    local_basepath: Option<PathBuf>,
}

impl BindingDraft {
    pub fn local_basepath(&self) -> Option<&Path> {
        self.local_basepath.as_deref()
    }

    fn absorb(&mut self, incoming: BindingPartial, file_dir: &Path) {
        if let Some(raw) = &incoming.local_basepath {
            self.local_basepath = Some(resolve_basepath(raw, file_dir));
        } else if self.local_basepath.is_none() {
            // First definition without a basepath: the config file's own
            // directory is the base.
            self.local_basepath =
                Some(dunce::canonicalize(file_dir).unwrap_or_else(|_| file_dir.to_path_buf()));
        }

        let p = &mut self.partial;
        merge_field(&mut p.protocol, incoming.protocol);
        merge_field(&mut p.hostname, incoming.hostname);
        merge_field(&mut p.port, incoming.port);
        merge_field(&mut p.username, incoming.username);
        merge_field(&mut p.password, incoming.password);
        merge_field(&mut p.key_filename, incoming.key_filename);
        merge_field(&mut p.local_basepath, incoming.local_basepath);
        merge_field(&mut p.remote_basepath, incoming.remote_basepath);
        merge_field(&mut p.excludes, incoming.excludes);
        merge_field(&mut p.max_workers, incoming.max_workers);
        for (k, v) in incoming.extra {
            p.extra.insert(k, v);
        }
    }
}

fn merge_field<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

/// The fully merged configuration with its provenance.
#[derive(Debug, Default)]
pub struct Config {
    pub global_excludes: Vec<String>,
    bindings: IndexMap<String, BindingDraft>,
    pub extra: Map<String, Value>,
    pub sources: SourceMap,
    /// Non-fatal parse problems encountered during loading.
    pub warnings: Vec<String>,
}

impl Config {
    /// Discover, parse and merge every config file relevant to
    /// `start_dir`. Fails only when no file could be used at all.
    pub fn load(start_dir: &Path, global_candidates: &[PathBuf]) -> Result<Self, ConfigError> {
        let files = discover_config_files(start_dir, global_candidates);
        let mut config = Self::default();

        for path in files {
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    config
                        .warnings
                        .push(format!("Failed to read '{}': {e}", path.display()));
                    continue;
                }
            };
            match serde_json::from_str::<ConfigFile>(&text) {
                Ok(parsed) => config.absorb_file(&path, parsed),
                Err(e) => config
                    .warnings
                    .push(format!("Failed to parse '{}': {e}", path.display())),
            }
        }

        if config.sources.config_files.is_empty() {
            let mut searched: Vec<String> = global_candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            searched.push(start_dir.join(PROJECT_CONFIG_NAME).display().to_string());
            return Err(ConfigError::NotFound { searched: searched.join(", ") });
        }

        Ok(config)
    }

    fn absorb_file(&mut self, path: &Path, parsed: ConfigFile) {
        debug!(path = %path.display(), "merging config file");
        self.sources.config_files.push(path.to_path_buf());
        let file_dir = path.parent().unwrap_or_else(|| Path::new("."));

        for pattern in parsed.global_excludes {
            self.sources
                .global_excludes
                .entry(pattern.clone())
                .or_default()
                .push(path.to_path_buf());
            self.global_excludes.push(pattern);
        }

        for (alias, partial) in parsed.bindings {
            let sources = self.sources.bindings.entry(alias.clone()).or_default();
            sources.defined_in.push(path.to_path_buf());
            for field in present_fields(&partial) {
                sources
                    .fields
                    .entry(field)
                    .or_default()
                    .push(path.to_path_buf());
            }
            self.bindings
                .entry(alias)
                .or_default()
                .absorb(partial, file_dir);
        }

        for (k, v) in parsed.extra {
            self.extra.insert(k, v);
        }
    }

    pub fn comment(&self) -> Option<&str> {
        self.extra.get("comments").and_then(Value::as_str)
    }

    pub fn global_excludes_comment(&self) -> Option<&str> {
        self.extra
            .get("global_excludes_comments")
            .and_then(Value::as_str)
    }

    /// Aliases with their resolved local base paths, in definition order.
    pub fn binding_aliases(&self) -> impl Iterator<Item = (&String, Option<&Path>)> + '_ {
        self.bindings
            .iter()
            .map(|(alias, draft)| (alias, draft.local_basepath()))
    }

    /// Validate and return the named binding.
    pub fn binding(&self, alias: &str) -> Result<Binding, ConfigError> {
        let draft = self
            .bindings
            .get(alias)
            .ok_or_else(|| ConfigError::UnknownBinding(alias.to_string()))?;
        let p = &draft.partial;

        let missing = |field: &'static str| ConfigError::MissingField {
            alias: alias.to_string(),
            field,
        };
        let protocol = p.protocol.unwrap_or(Protocol::Ftp);
        let hostname = p.hostname.clone().ok_or_else(|| missing("hostname"))?;
        let username = p.username.clone().ok_or_else(|| missing("username"))?;
        let remote_basepath = p
            .remote_basepath
            .clone()
            .ok_or_else(|| missing("remote_basepath"))?;
        let local_basepath = draft
            .local_basepath
            .clone()
            .ok_or_else(|| missing("local_basepath"))?;

        Ok(Binding {
            alias: alias.to_string(),
            protocol,
            hostname,
            port: p.port.unwrap_or_else(|| protocol.default_port()),
            username,
            password: p.password.clone(),
            key_filename: p
                .key_filename
                .as_deref()
                .map(|k| PathBuf::from(shellexpand::tilde(k).into_owned())),
            local_basepath,
            remote_basepath,
            excludes: p.excludes.clone().unwrap_or_default(),
            max_workers: p.max_workers.unwrap_or(DEFAULT_MAX_WORKERS),
            extra: p.extra.clone(),
        })
    }

    /// Merged configuration as a JSON value, for `--show-config`.
    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        if !self.global_excludes.is_empty() {
            root.insert(
                "global_excludes".to_string(),
                Value::Array(
                    self.global_excludes
                        .iter()
                        .map(|p| Value::String(p.clone()))
                        .collect(),
                ),
            );
        }

        let mut bindings = Map::new();
        for (alias, draft) in &self.bindings {
            let p = &draft.partial;
            let mut b = Map::new();
            let mut put = |key: &str, v: Option<Value>| {
                if let Some(v) = v {
                    b.insert(key.to_string(), v);
                }
            };
            put(
                "protocol",
                p.protocol.map(|v| Value::String(v.label().to_lowercase())),
            );
            put("hostname", p.hostname.clone().map(Value::String));
            put("port", p.port.map(|v| Value::Number(v.into())));
            put("username", p.username.clone().map(Value::String));
            put("password", p.password.clone().map(Value::String));
            put("key_filename", p.key_filename.clone().map(Value::String));
            put(
                "local_basepath",
                draft
                    .local_basepath
                    .as_ref()
                    .map(|v| Value::String(v.display().to_string())),
            );
            put("remote_basepath", p.remote_basepath.clone().map(Value::String));
            put(
                "excludes",
                p.excludes.as_ref().map(|e| {
                    Value::Array(e.iter().map(|s| Value::String(s.clone())).collect())
                }),
            );
            put("max_workers", p.max_workers.map(|v| Value::Number(v.into())));
            for (k, v) in &p.extra {
                b.insert(k.clone(), v.clone());
            }
            bindings.insert(alias.clone(), Value::Object(b));
        }
        if !bindings.is_empty() {
            root.insert("bindings".to_string(), Value::Object(bindings));
        }

        for (k, v) in &self.extra {
            root.insert(k.clone(), v.clone());
        }
        Value::Object(root)
    }

    /// Auto-detect the binding whose local base path contains `start_dir`.
    /// The deepest base path wins; identical base paths resolve per
    /// `tie_break`. Returns `Ok(None)` when nothing matches.
    pub fn auto_detect_binding(
        &self,
        start_dir: &Path,
        tie_break: TieBreak,
    ) -> Result<Option<Detected>, ConfigError> {
        let start = dunce::canonicalize(start_dir).unwrap_or_else(|_| start_dir.to_path_buf());

        let mut matches: Vec<(&String, &Path)> = self
            .bindings
            .iter()
            .filter_map(|(alias, draft)| {
                let base = draft.local_basepath()?;
                start.starts_with(base).then_some((alias, base))
            })
            .collect();
        if matches.is_empty() {
            return Ok(None);
        }

        // Deepest base path first; the sort is stable, so definition
        // order survives within equal depths.
        matches.sort_by_key(|(_, base)| std::cmp::Reverse(base.as_os_str().len()));
        let best_path = matches[0].1.to_path_buf();
        let contenders: Vec<String> = matches
            .iter()
            .filter(|(_, base)| *base == best_path)
            .map(|(alias, _)| (*alias).clone())
            .collect();

        if contenders.len() > 1 && tie_break == TieBreak::Error {
            return Err(ConfigError::AmbiguousBinding {
                path: best_path,
                aliases: contenders,
            });
        }

        Ok(Some(Detected {
            alias: contenders[0].clone(),
            ambiguous_with: contenders[1..].to_vec(),
        }))
    }
}

/// Policy for bindings sharing the exact same local base path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    /// Pick the binding defined first in merge order.
    FirstDefined,
    /// Refuse to choose.
    Error,
}

/// Result of binding auto-detection.
#[derive(Debug)]
pub struct Detected {
    pub alias: String,
    /// Other bindings sharing the winning base path (first-defined-wins).
    pub ambiguous_with: Vec<String>,
}

/// Ordered list of config files to merge: the first existing global
/// location, then every project dotfile from the filesystem root down to
/// `start_dir`.
pub fn discover_config_files(start_dir: &Path, global_candidates: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(global) = global_candidates.iter().find(|p| p.is_file()) {
        out.push(global.clone());
    }

    let mut chain = Vec::new();
    let mut current = dunce::canonicalize(start_dir).unwrap_or_else(|_| start_dir.to_path_buf());
    loop {
        let candidate = current.join(PROJECT_CONFIG_NAME);
        if candidate.is_file() {
            chain.push(candidate);
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
    chain.reverse();
    out.extend(chain);
    out
}

fn resolve_basepath(raw: &str, file_dir: &Path) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(raw).into_owned());
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        file_dir.join(expanded)
    };
    dunce::canonicalize(&joined).unwrap_or(joined)
}

fn present_fields(p: &BindingPartial) -> Vec<&'static str> {
    let mut out = Vec::new();
    let mut add = |cond: bool, name: &'static str| {
        if cond {
            out.push(name);
        }
    };
    add(p.protocol.is_some(), "protocol");
    add(p.hostname.is_some(), "hostname");
    add(p.port.is_some(), "port");
    add(p.username.is_some(), "username");
    add(p.password.is_some(), "password");
    add(p.key_filename.is_some(), "key_filename");
    add(p.local_basepath.is_some(), "local_basepath");
    add(p.remote_basepath.is_some(), "remote_basepath");
    add(p.excludes.is_some(), "excludes");
    add(p.max_workers.is_some(), "max_workers");
    out
}
