//! Multi-file configuration loading.
//!
//! The entry file may name other files with `include`, either one path or a
//! list. Included files are read relative to the entry file's directory and
//! contribute whole top-level sections. A section may be defined in only one
//! file, and included files may not include further files.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

type Table = toml::map::Map<String, toml::Value>;

const INCLUDE_KEY: &str = "include";

pub struct ConfigLoader {
	base_path: PathBuf,
	/// Canonical paths read so far.
	visited: HashSet<PathBuf>,
	/// File that defined each top-level section.
	origins: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			visited: HashSet::new(),
			origins: HashMap::new(),
		}
	}

	/// Reads `entry` and its includes into one validated [`Config`].
	pub async fn load_config(&mut self, entry: impl AsRef<Path>) -> Result<Config, ConfigError> {
		let entry = self.locate(entry.as_ref())?;
		let (content, mut merged) = self.read_table(&entry).await?;
		let includes = include_paths(merged.remove(INCLUDE_KEY))?;
		if includes.is_empty() {
			// keep the original text so parse errors point at real lines
			return content.parse();
		}

		self.claim(&merged, &entry)?;
		for include in includes {
			let path = self.locate(&include)?;
			let (_, table) = self.read_table(&path).await?;
			if table.contains_key(INCLUDE_KEY) {
				return Err(ConfigError::Validation(format!(
					"Nested include in {} is not supported",
					path.display()
				)));
			}
			self.claim(&table, &path)?;
			merged.extend(table);
		}

		toml::to_string(&toml::Value::Table(merged))
			.map_err(|e| ConfigError::Parse(format!("Failed to serialize combined config: {}", e)))?
			.parse()
	}

	/// Records `path` as the origin of every section in `table`.
	fn claim(&mut self, table: &Table, path: &Path) -> Result<(), ConfigError> {
		for section in table.keys() {
			if let Some(first) = self.origins.get(section) {
				return Err(ConfigError::Validation(format!(
					"Duplicate section '{}' found in {} and {}. \
					Each top-level section must be defined in exactly one file.",
					section,
					first.display(),
					path.display()
				)));
			}
			self.origins.insert(section.clone(), path.to_path_buf());
		}
		Ok(())
	}

	/// Reads one file, resolving environment variables, exactly once.
	async fn read_table(&mut self, path: &Path) -> Result<(String, Table), ConfigError> {
		let canonical = tokio::fs::canonicalize(path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;
		if !self.visited.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include: {} was already loaded",
				canonical.display()
			)));
		}

		let content = resolve_env_vars(&tokio::fs::read_to_string(path).await?)?;
		let table: Table = toml::from_str(&content)?;
		Ok((content, table))
	}

	fn locate(&self, path: &Path) -> Result<PathBuf, ConfigError> {
		let candidate = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};
		if candidate.exists() {
			Ok(candidate)
		} else {
			Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", candidate.display()),
			)))
		}
	}
}

/// Paths named by an `include` value: a string or an array of strings.
fn include_paths(value: Option<toml::Value>) -> Result<Vec<PathBuf>, ConfigError> {
	match value {
		None => Ok(Vec::new()),
		Some(toml::Value::String(path)) => Ok(vec![PathBuf::from(path)]),
		Some(toml::Value::Array(items)) => items
			.into_iter()
			.map(|item| match item {
				toml::Value::String(path) => Ok(PathBuf::from(path)),
				_ => Err(ConfigError::Validation(
					"Include array must contain only strings".into(),
				)),
			})
			.collect(),
		Some(_) => Err(ConfigError::Validation(
			"Include must be a string or array of strings".into(),
		)),
	}
}
