//! Export configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::assembler::{DirectoryPolicy, OutputLayout};
use crate::containers::EncodeOptions;
use crate::util::Result;

/// Settings for one export run, loadable from JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Base export directory.
    pub output_root: PathBuf,
    /// Malformed tags and rejected track edits fail the container.
    pub strict: bool,
    pub directory_policy: DirectoryPolicy,
    pub model_dir: String,
    pub map_dir: String,
    pub wmo_dir: String,
    /// Wrap animated models in an `MD21` chunk.
    pub chunked_models: bool,
    /// Prefixed to texture names that have no directory component.
    pub texture_path_prefix: Option<String>,
    /// JSON file of per-object properties.
    pub properties: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        let layout = OutputLayout::default();
        Self {
            output_root: PathBuf::from("export"),
            strict: false,
            directory_policy: DirectoryPolicy::Fresh,
            model_dir: layout.model_dir,
            map_dir: layout.map_dir,
            wmo_dir: layout.wmo_dir,
            chunked_models: false,
            texture_path_prefix: None,
            properties: None,
        }
    }
}

impl ExportConfig {
    /// Create a config writing under `output_root`.
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            ..Self::default()
        }
    }

    /// Load a JSON config file.
    ///
    /// A relative `output_root` or `properties` path is resolved against the
    /// directory of the config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&text)?;
        if let Some(base) = path.parent() {
            if config.output_root.is_relative() {
                config.output_root = base.join(&config.output_root);
            }
            if let Some(props) = config.properties.as_mut().filter(|p| p.is_relative()) {
                *props = base.join(&*props);
            }
        }
        Ok(config)
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_directory_policy(mut self, policy: DirectoryPolicy) -> Self {
        self.directory_policy = policy;
        self
    }

    pub fn with_chunked_models(mut self, chunked: bool) -> Self {
        self.chunked_models = chunked;
        self
    }

    pub fn with_texture_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.texture_path_prefix = Some(prefix.into());
        self
    }

    pub fn with_model_dir(mut self, dir: impl Into<String>) -> Self {
        self.model_dir = dir.into();
        self
    }

    pub fn with_map_dir(mut self, dir: impl Into<String>) -> Self {
        self.map_dir = dir.into();
        self
    }

    pub fn with_wmo_dir(mut self, dir: impl Into<String>) -> Self {
        self.wmo_dir = dir.into();
        self
    }

    /// Encoder switches derived from this config.
    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            strict: self.strict,
            chunked_models: self.chunked_models,
            texture_path_prefix: self.texture_path_prefix.clone(),
        }
    }

    /// Destination directory segments.
    pub fn layout(&self) -> OutputLayout {
        OutputLayout {
            map_dir: self.map_dir.clone(),
            wmo_dir: self.wmo_dir.clone(),
            model_dir: self.model_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ExportConfig::default();
        assert!(!config.strict);
        assert_eq!(config.directory_policy, DirectoryPolicy::Fresh);
        assert_eq!(config.model_dir, "Creature");
        assert_eq!(config.map_dir, "World/Maps");
        assert_eq!(config.wmo_dir, "World/wmo");
        assert_eq!(config.layout(), OutputLayout::default());
    }

    #[test]
    fn test_partial_json() {
        let config: ExportConfig =
            serde_json::from_str(r#"{"strict":true,"directory_policy":"reuse","model_dir":"Doodads"}"#).unwrap();
        assert!(config.strict);
        assert_eq!(config.directory_policy, DirectoryPolicy::Reuse);
        assert_eq!(config.layout().model_dir, "Doodads");
        assert_eq!(config.wmo_dir, "World/wmo");
        assert!(config.encode_options().strict);
    }

    #[test]
    fn test_builders() {
        let config = ExportConfig::new("/tmp/out")
            .with_chunked_models(true)
            .with_texture_path_prefix("Creature\\wolf")
            .with_map_dir("Maps");
        let opts = config.encode_options();
        assert!(opts.chunked_models);
        assert_eq!(opts.texture_path("wolf.blp"), "Creature\\wolf\\wolf.blp");
        assert_eq!(config.layout().map_dir, "Maps");
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"output_root":"out","properties":"props.json"}}"#).unwrap();
        drop(file);

        let config = ExportConfig::load(&path).unwrap();
        assert_eq!(config.output_root, dir.path().join("out"));
        assert_eq!(config.properties, Some(dir.path().join("props.json")));
    }

    #[test]
    fn test_load_rejects_bad_policy() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"directory_policy":"sometimes"}}"#).unwrap();
        assert!(ExportConfig::load(file.path()).is_err());
    }
}
