use super::params::RawConfig;

use anyhow::Context;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeFormat {
    Toml,
    Json,
}

impl RecipeFormat {
    /// `.json` files are JSON, everything else is TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => RecipeFormat::Json,
            _ => RecipeFormat::Toml,
        }
    }
}

/// Load the raw recipe options from a TOML or JSON file
pub fn load_recipe<P: AsRef<Path>>(path: P) -> anyhow::Result<RawConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read recipe file '{}'", path.display()))?;
    load_recipe_from_str(&content, RecipeFormat::from_path(path))
        .with_context(|| format!("Failed to parse recipe file '{}'", path.display()))
}

/// Load the raw recipe options from a string
pub fn load_recipe_from_str(content: &str, format: RecipeFormat) -> anyhow::Result<RawConfig> {
    let raw = match format {
        RecipeFormat::Toml => toml::from_str(content)?,
        RecipeFormat::Json => serde_json::from_str(content)?,
    };
    Ok(raw)
}
