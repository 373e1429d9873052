//! Per-asset encode drivers and the parallel batch exporter.
//!
//! Each asset becomes one [`EncodedSet`]: every file of that object, built
//! fully in memory before anything touches the disk. The [`Exporter`]
//! encodes sets in parallel, applies the directory policy once per object
//! directory and writes each file atomically. A failing asset never stops
//! the others; its error lands in the [`ExportReport`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::assembler::{prepare_directory, validate_name, write_atomic, DirectoryPolicy, OutputLayout};
use crate::config::ExportConfig;
use crate::containers::m2::{self, ModelTables};
use crate::containers::skin::SkinProfile;
use crate::containers::{adt, wdl, wdt, wmo_group, wmo_root, ContainerKind, EncodeOptions};
use crate::geometry::submeshes_by_material;
use crate::model::{AnimatedModel, Asset, StaticObject, WorldMap};
use crate::registry::{ObjectProperties, PropertyRegistry};
use crate::util::{Diagnostic, Diagnostics, Error, Result};

/// One encoded file and its path relative to the export root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedFile {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

/// Every file of one object, ready to write.
#[derive(Debug)]
pub struct EncodedSet {
    /// Short name of the object.
    pub name: String,
    /// Object directory relative to the export root.
    pub directory: PathBuf,
    pub files: Vec<EncodedFile>,
    /// Problems recorded while encoding in lenient mode.
    pub diagnostics: Diagnostics,
}

impl EncodedSet {
    fn new(name: &str, directory: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            directory,
            files: Vec::new(),
            diagnostics: Diagnostics::new(name),
        }
    }

    fn push(&mut self, path: PathBuf, bytes: Vec<u8>) {
        self.files.push(EncodedFile { path, bytes });
    }

    /// Total encoded size in bytes.
    pub fn total_bytes(&self) -> usize {
        self.files.iter().map(|f| f.bytes.len()).sum()
    }

    /// Write every file under `root`.
    ///
    /// The directory policy is applied once to the object directory, so
    /// sibling files of one object never clear each other.
    pub fn write(&self, root: &Path, policy: DirectoryPolicy) -> Result<Vec<PathBuf>> {
        validate_name(&self.name)?;
        prepare_directory(&root.join(&self.directory), policy)?;
        let mut written = Vec::with_capacity(self.files.len());
        for file in &self.files {
            let path = root.join(&file.path);
            write_atomic(&path, &file.bytes)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Encode a static object: one root file plus one file per group.
pub fn encode_static_object(
    object: &StaticObject,
    opts: &EncodeOptions,
    layout: &OutputLayout,
    props: Option<&ObjectProperties>,
) -> Result<EncodedSet> {
    validate_name(&object.name)?;
    for group in &object.groups {
        group.mesh.validate()?;
        if let Some(collision) = &group.collision {
            collision.validate()?;
        }
    }

    let mut set = EncodedSet::new(&object.name, layout.object_dir(ContainerKind::WmoRoot, &object.name));
    let names = wmo_root::group_names(object)?;
    let root = wmo_root::encode(object, &names, props, opts, &mut set.diagnostics)?;
    set.push(layout.wmo_root(&object.name), root);

    for (i, (group, &name_offset)) in object.groups.iter().zip(&names.offsets).enumerate() {
        let bytes = wmo_group::encode(group, name_offset, props)?;
        set.push(layout.wmo_group(&object.name, i), bytes);
    }
    debug!(object = %object.name, files = set.files.len(), bytes = set.total_bytes(), "encoded static object");
    Ok(set)
}

/// Encode an animated model: the model file plus its skin profile.
pub fn encode_animated_model(
    model: &AnimatedModel,
    opts: &EncodeOptions,
    layout: &OutputLayout,
    props: Option<&ObjectProperties>,
) -> Result<EncodedSet> {
    validate_name(&model.name)?;
    model.mesh.validate()?;
    if let Some(collision) = &model.collision {
        collision.validate()?;
    }

    let mut set = EncodedSet::new(&model.name, layout.object_dir(ContainerKind::M2Chunked, &model.name));
    m2::check_track_edits(model, opts.strict, &mut set.diagnostics)?;
    let tables = ModelTables::build(model, opts)?;
    tables.check_references(&mut set.diagnostics, opts.strict)?;

    let submeshes = submeshes_by_material(&model.mesh);
    let bytes = m2::encode_file(model, &tables, props, opts)?;
    set.push(layout.m2(&model.name), bytes);

    let skin = SkinProfile::build(model, &submeshes, &tables)?;
    set.push(layout.skin(&model.name), skin.encode()?);
    debug!(model = %model.name, submeshes = submeshes.ranges.len(), bytes = set.total_bytes(), "encoded animated model");
    Ok(set)
}

/// Encode a map: placement file, distant-terrain file and one file per tile.
pub fn encode_world_map(
    map: &WorldMap,
    layout: &OutputLayout,
    props: Option<&ObjectProperties>,
) -> Result<EncodedSet> {
    validate_name(&map.name)?;
    let mut set = EncodedSet::new(&map.name, layout.object_dir(ContainerKind::Wdt, &map.name));
    set.push(layout.wdt(&map.name), wdt::encode(map)?);
    set.push(layout.wdl(&map.name), wdl::encode(map)?);

    let tiles = map
        .tiles
        .par_iter()
        .map(|tile| adt::encode(tile, props).map(|bytes| (layout.adt(&map.name, tile.x, tile.y), bytes)))
        .collect::<Result<Vec<_>>>()?;
    for (path, bytes) in tiles {
        set.push(path, bytes);
    }
    debug!(map = %map.name, tiles = map.tiles.len(), bytes = set.total_bytes(), "encoded map");
    Ok(set)
}

/// Object directory an asset is written to, relative to the export root.
pub fn asset_directory(asset: &Asset, layout: &OutputLayout) -> PathBuf {
    let kind = match asset {
        Asset::StaticObject(_) => ContainerKind::WmoRoot,
        Asset::AnimatedModel(_) => ContainerKind::M2Chunked,
        Asset::WorldMap(_) => ContainerKind::Wdt,
    };
    layout.object_dir(kind, asset.name())
}

/// Encode any asset, looking up its properties by name.
pub fn encode_asset(
    asset: &Asset,
    opts: &EncodeOptions,
    layout: &OutputLayout,
    registry: &PropertyRegistry,
) -> Result<EncodedSet> {
    let props = registry.get(asset.name());
    let props = props.as_deref();
    match asset {
        Asset::StaticObject(o) => encode_static_object(o, opts, layout, props),
        Asset::AnimatedModel(m) => encode_animated_model(m, opts, layout, props),
        Asset::WorldMap(w) => encode_world_map(w, layout, props),
    }
}

/// An asset that produced no output.
#[derive(Debug)]
pub struct ExportFailure {
    pub asset: String,
    pub kind: &'static str,
    pub error: Error,
}

/// Outcome of a batch export.
#[derive(Debug, Default)]
pub struct ExportReport {
    /// Absolute paths of every file written.
    pub written: Vec<PathBuf>,
    pub failures: Vec<ExportFailure>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ExportReport {
    /// Check if every asset was written without diagnostics.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.diagnostics.is_empty()
    }

    /// Log one line per failure and per diagnostic, then the totals.
    pub fn log_summary(&self) {
        for failure in &self.failures {
            error!(asset = %failure.asset, kind = failure.kind, "export failed: {}", failure.error);
        }
        for diag in &self.diagnostics {
            error!("{}", diag);
        }
        if self.is_clean() {
            info!(files = self.written.len(), "export finished");
        } else {
            error!(
                files = self.written.len(),
                failures = self.failures.len(),
                diagnostics = self.diagnostics.len(),
                "export finished with problems"
            );
        }
    }
}

struct AssetOutcome {
    written: Vec<PathBuf>,
    diagnostics: Vec<Diagnostic>,
    failure: Option<ExportFailure>,
}

impl AssetOutcome {
    fn failed(asset: &Asset, error: Error) -> Self {
        Self {
            written: Vec::new(),
            diagnostics: Vec::new(),
            failure: Some(ExportFailure {
                asset: asset.name().to_string(),
                kind: asset.kind(),
                error,
            }),
        }
    }
}

/// Parallel batch exporter.
#[derive(Debug)]
pub struct Exporter {
    config: ExportConfig,
    registry: PropertyRegistry,
}

impl Exporter {
    /// Create an exporter with an empty property registry.
    pub fn new(config: ExportConfig) -> Self {
        Self {
            config,
            registry: PropertyRegistry::new(),
        }
    }

    /// Create an exporter, loading the properties file named by `config`.
    pub fn from_config(config: ExportConfig) -> Result<Self> {
        let registry = match &config.properties {
            Some(path) => PropertyRegistry::load_json(path)?,
            None => PropertyRegistry::new(),
        };
        Ok(Self { config, registry })
    }

    /// Use `registry` for property lookups.
    pub fn with_registry(mut self, registry: PropertyRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[inline]
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &PropertyRegistry {
        &self.registry
    }

    /// Encode and write every asset.
    ///
    /// Assets whose object directory is already claimed by an earlier asset
    /// in the batch fail instead of overwriting it.
    pub fn export(&self, assets: &[Asset]) -> ExportReport {
        let opts = self.config.encode_options();
        let layout = self.config.layout();
        let mut claimed = HashSet::new();
        let duplicate: Vec<bool> = assets
            .iter()
            .map(|a| validate_name(a.name()).is_ok() && !claimed.insert(asset_directory(a, &layout)))
            .collect();

        info!(assets = assets.len(), root = %self.config.output_root.display(), "exporting");
        let outcomes: Vec<AssetOutcome> = assets
            .par_iter()
            .zip(duplicate.par_iter())
            .map(|(asset, &dup)| {
                if dup {
                    let dir = asset_directory(asset, &layout);
                    return AssetOutcome::failed(
                        asset,
                        Error::invalid(format!("{} is already written by another asset", dir.display())),
                    );
                }
                self.export_one(asset, &opts, &layout)
            })
            .collect();

        let mut report = ExportReport::default();
        for outcome in outcomes {
            report.written.extend(outcome.written);
            report.diagnostics.extend(outcome.diagnostics);
            report.failures.extend(outcome.failure);
        }
        report
    }

    fn export_one(&self, asset: &Asset, opts: &EncodeOptions, layout: &OutputLayout) -> AssetOutcome {
        let mut set = match encode_asset(asset, opts, layout, &self.registry) {
            Ok(set) => set,
            Err(e) => {
                warn!(asset = asset.name(), kind = asset.kind(), error = %e, "encode failed");
                return AssetOutcome::failed(asset, e);
            }
        };
        let diagnostics = std::mem::take(&mut set.diagnostics).into_entries();
        match set.write(&self.config.output_root, self.config.directory_policy) {
            Ok(written) => {
                info!(asset = asset.name(), kind = asset.kind(), files = written.len(), "wrote asset");
                AssetOutcome {
                    written,
                    diagnostics,
                    failure: None,
                }
            }
            Err(e) => {
                warn!(asset = asset.name(), kind = asset.kind(), error = %e, "write failed");
                AssetOutcome {
                    diagnostics,
                    ..AssetOutcome::failed(asset, e)
                }
            }
        }
    }
}
