//! `~/.hedgehogrc` settings: `key = value` lines, `#` comments and
//! `include <path>` directives resolved relative to the including file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tracing::{debug, info, trace, warn};

const RC_ENV_VAR: &str = "HEDGEHOGRC";
const RC_FILE_NAME: &str = ".hedgehogrc";
const DEFAULT_DATA_DIR: &str = ".hedgehog";

#[derive(Debug, Clone)]
pub struct Config {
    map: HashMap<String, String>,
    pub loaded_files: Vec<PathBuf>,
}

/// One meaningful line of an rc file.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RcLine {
    Setting { key: String, value: String },
    Include(String),
}

impl Default for Config {
    fn default() -> Self {
        let map = HashMap::from([
            ("data.location".to_string(), format!("~/{DEFAULT_DATA_DIR}")),
            ("color".to_string(), "on".to_string()),
        ]);
        Self {
            map,
            loaded_files: vec![],
        }
    }
}

impl Config {
    #[tracing::instrument(skip(rc_override))]
    pub fn load(rc_override: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = Config::default();

        match resolve_rc_path(rc_override)? {
            Some(path) => {
                info!(rc = %path.display(), "loading hedgehogrc");
                cfg.load_file(&path, &mut Vec::new())?;
            }
            None => debug!("no hedgehogrc found; using defaults"),
        }

        Ok(cfg)
    }

    /// Applies `key=value` overrides; a leading `rc.` on the key is dropped.
    #[tracing::instrument(skip(self, overrides))]
    pub fn apply_overrides<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (k, v) in overrides {
            let key = k.strip_prefix("rc.").unwrap_or(&k).to_string();
            debug!(key = %key, value = %v, "applying override");
            self.map.insert(key, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> anyhow::Result<Option<bool>> {
        self.map
            .get(key)
            .map(|raw| parse_bool(raw).ok_or_else(|| anyhow!("invalid boolean for {key}: {raw}")))
            .transpose()
    }

    pub fn color_enabled(&self) -> anyhow::Result<bool> {
        Ok(self.get_bool("color")?.unwrap_or(true))
    }

    /// `chain` holds the files currently being read, outermost first.
    fn load_file(&mut self, path: &Path, chain: &mut Vec<PathBuf>) -> anyhow::Result<()> {
        let path = expand_tilde(path);
        let key = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        if chain.contains(&key) {
            let cycle: Vec<String> = chain.iter().chain([&key]).map(|p| p.display().to_string()).collect();
            return Err(anyhow!("include cycle: {}", cycle.join(" -> ")));
        }

        let text = fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        self.loaded_files.push(path.clone());
        chain.push(key);

        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));

        for (line_num, raw_line) in text.lines().enumerate() {
            let parsed = parse_rc_line(raw_line)
                .with_context(|| format!("invalid config line {}:{}", path.display(), line_num + 1))?;

            match parsed {
                None => {}
                Some(RcLine::Setting { key, value }) => {
                    trace!(key = %key, value = %value, "loaded config key");
                    self.map.insert(key, value);
                }
                Some(RcLine::Include(target)) => {
                    let include_path = resolve_include_path(&base_dir, &target)?;
                    debug!(
                        file = %path.display(),
                        include = %include_path.display(),
                        line = line_num + 1,
                        "processing include"
                    );
                    if include_path.exists() {
                        self.load_file(&include_path, chain)?;
                    } else {
                        warn!(include = %include_path.display(), "include file does not exist; skipping");
                    }
                }
            }
        }

        chain.pop();
        Ok(())
    }
}

fn parse_rc_line(raw: &str) -> anyhow::Result<Option<RcLine>> {
    let line = raw.split_once('#').map_or(raw, |(before, _)| before).trim();
    if line.is_empty() {
        return Ok(None);
    }

    if let Some(target) = line.strip_prefix("include ") {
        return Ok(Some(RcLine::Include(target.trim().to_string())));
    }

    let (k, v) = line
        .split_once('=')
        .ok_or_else(|| anyhow!("expected key = value, got: {raw}"))?;
    let key = k.trim();
    if key.is_empty() {
        return Err(anyhow!("missing key before '=': {raw}"));
    }

    Ok(Some(RcLine::Setting {
        key: key.to_string(),
        value: v.trim().to_string(),
    }))
}

/// Picks the data directory (`--data`, then `data.location`) and creates it.
#[tracing::instrument(skip(cfg, override_dir))]
pub fn resolve_data_dir(cfg: &Config, override_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = match (override_dir, cfg.get("data.location")) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(location)) => expand_tilde(Path::new(&location)),
        (None, None) => home_dir()?.join(DEFAULT_DATA_DIR),
    };

    if !dir.exists() {
        info!(dir = %dir.display(), "creating data directory");
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    Ok(dir)
}

fn resolve_rc_path(override_path: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = override_path {
        return Ok(Some(path.to_path_buf()));
    }

    if let Ok(from_env) = std::env::var(RC_ENV_VAR) {
        if from_env == "/dev/null" {
            return Ok(None);
        }
        return Ok(Some(PathBuf::from(from_env)));
    }

    let candidate = home_dir()?.join(RC_FILE_NAME);
    Ok(candidate.exists().then_some(candidate))
}

fn home_dir() -> anyhow::Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))
}

fn resolve_include_path(base_dir: &Path, include: &str) -> anyhow::Result<PathBuf> {
    if include.trim().is_empty() {
        return Err(anyhow!("include path cannot be empty"));
    }

    let expanded = expand_tilde(Path::new(include));
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(base_dir.join(expanded))
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if let Some(rest) = text.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "y" | "yes" | "on" | "true" => Some(true),
        "0" | "n" | "no" | "off" | "false" => Some(false),
        _ => None,
    }
}
