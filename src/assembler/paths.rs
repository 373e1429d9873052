//! Destination paths per container kind.

use std::path::{Component, Path, PathBuf};

use crate::containers::ContainerKind;
use crate::util::{Error, Result};

/// Check that `name` is a single plain path component.
///
/// Object names become directory and file names under the export root, so
/// empty names, `.`/`..` and anything with a separator are rejected.
pub fn validate_name(name: &str) -> Result<()> {
    let mut parts = Path::new(name).components();
    let single = matches!((parts.next(), parts.next()), (Some(Component::Normal(_)), None));
    if !single || name.contains(['/', '\\', '\0']) {
        return Err(Error::invalid(format!("{:?} is not a valid object name", name)));
    }
    Ok(())
}

/// Directory segments under the export root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputLayout {
    pub map_dir: String,
    pub wmo_dir: String,
    pub model_dir: String,
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self {
            map_dir: "World/Maps".into(),
            wmo_dir: "World/wmo".into(),
            model_dir: "Creature".into(),
        }
    }
}

impl OutputLayout {
    /// Directory holding every file of object `name` of `kind`.
    pub fn object_dir(&self, kind: ContainerKind, name: &str) -> PathBuf {
        let base = match kind {
            ContainerKind::Wdt | ContainerKind::Wdl | ContainerKind::Adt => &self.map_dir,
            ContainerKind::WmoRoot | ContainerKind::WmoGroup => &self.wmo_dir,
            ContainerKind::M2Chunked => &self.model_dir,
        };
        Path::new(base).join(name)
    }

    pub fn wdt(&self, name: &str) -> PathBuf {
        self.object_dir(ContainerKind::Wdt, name).join(format!("{}.wdt", name))
    }

    pub fn wdl(&self, name: &str) -> PathBuf {
        self.object_dir(ContainerKind::Wdl, name).join(format!("{}.wdl", name))
    }

    pub fn adt(&self, name: &str, x: u32, y: u32) -> PathBuf {
        self.object_dir(ContainerKind::Adt, name)
            .join(format!("{}_{}_{}.adt", name, x, y))
    }

    pub fn wmo_root(&self, name: &str) -> PathBuf {
        self.object_dir(ContainerKind::WmoRoot, name).join(format!("{}.wmo", name))
    }

    /// Group file `index`, numbered with three digits.
    pub fn wmo_group(&self, name: &str, index: usize) -> PathBuf {
        self.object_dir(ContainerKind::WmoGroup, name)
            .join(format!("{}_{:03}.wmo", name, index))
    }

    pub fn m2(&self, name: &str) -> PathBuf {
        self.object_dir(ContainerKind::M2Chunked, name).join(format!("{}.m2", name))
    }

    pub fn skin(&self, name: &str) -> PathBuf {
        self.object_dir(ContainerKind::M2Chunked, name).join(format!("{}00.skin", name))
    }
}
