//! Container kinds and their chunk encoders.
//!
//! Each kind fixes its chunk layout, how a reader finds chunks (by position
//! or by tag) and the on-disk tag byte order.
//!
//! - [`wdt`] - Map placement file
//! - [`wdl`] - Distant-terrain heightmap
//! - [`adt`] - Terrain tile
//! - [`wmo_root`] / [`wmo_group`] - Static object root and group files
//! - [`m2`] / [`skin`] - Animated model and its skin profile

pub mod wdt;
pub mod wdl;
pub mod adt;
pub mod wmo_root;
pub mod wmo_group;
pub mod m2;
pub mod skin;

use std::fmt;

use crate::format::{tags, Tag, TagOrder};
use crate::util::{Diagnostics, Error, Result};

/// Version stored in the MVER chunk of map files.
pub const MAP_VERSION: u32 = 18;

/// Version stored in the MVER chunk of static object files.
pub const WMO_VERSION: u32 = 17;

/// Binary container variants produced by the encoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Map placement file (`.wdt`).
    Wdt,
    /// Distant-terrain heightmap (`.wdl`).
    Wdl,
    /// Terrain tile (`_x_y.adt`).
    Adt,
    /// Static object root (`.wmo`).
    WmoRoot,
    /// Static object group (`_000.wmo`).
    WmoGroup,
    /// Animated model wrapped in an `MD21` chunk (`.m2`).
    M2Chunked,
}

impl ContainerKind {
    /// Tag byte order on disk.
    pub const fn tag_order(self) -> TagOrder {
        match self {
            Self::M2Chunked => TagOrder::Literal,
            _ => TagOrder::Reversed,
        }
    }

    /// Chunk layout rules.
    pub const fn layout(self) -> ChunkLayout {
        use Occurrence::*;
        match self {
            Self::Wdt => ChunkLayout::positional(&[
                (tags::MVER, Required),
                (tags::MPHD, Required),
                (tags::MAIN, Required),
                (tags::MWMO, Required),
                (tags::MODF, Optional),
            ]),
            Self::Wdl => ChunkLayout::positional(&[
                (tags::MVER, Required),
                (tags::MWMO, Required),
                (tags::MWID, Required),
                (tags::MODF, Required),
                (tags::MAOF, Required),
                (tags::MARE, Repeated),
            ]),
            Self::Adt => ChunkLayout::positional(&[
                (tags::MVER, Required),
                (tags::MHDR, Required),
                (tags::MCIN, Required),
                (tags::MTEX, Required),
                (tags::MMDX, Required),
                (tags::MMID, Required),
                (tags::MWMO, Required),
                (tags::MWID, Required),
                (tags::MDDF, Required),
                (tags::MODF, Required),
                (tags::MCNK, Repeated),
            ]),
            Self::WmoRoot => ChunkLayout::positional(&[
                (tags::MVER, Required),
                (tags::MOHD, Required),
                (tags::MOTX, Required),
                (tags::MOMT, Required),
                (tags::MOGN, Required),
                (tags::MOGI, Required),
                (tags::MOSB, Required),
                (tags::MOPV, Required),
                (tags::MOPT, Required),
                (tags::MOPR, Required),
                (tags::MOVV, Required),
                (tags::MOVB, Required),
                (tags::MOLT, Required),
                (tags::MODS, Required),
                (tags::MODN, Required),
                (tags::MODD, Required),
                (tags::MFOG, Required),
            ]),
            Self::WmoGroup => ChunkLayout::positional(&[(tags::MVER, Required), (tags::MOGP, Required)]),
            Self::M2Chunked => ChunkLayout::by_tag(&[(tags::MD21, Required)]),
        }
    }

    /// Short label used in logs and diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Wdt => "wdt",
            Self::Wdl => "wdl",
            Self::Adt => "adt",
            Self::WmoRoot => "wmo_root",
            Self::WmoGroup => "wmo_group",
            Self::M2Chunked => "m2",
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How often a tag may appear in a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Occurrence {
    /// Exactly once.
    Required,
    /// Zero or one time.
    Optional,
    /// Any number of times, back to back.
    Repeated,
}

/// How a reader locates chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkLookup {
    /// By position: chunks must follow the layout order.
    Positional,
    /// By tag: any order, no duplicates of non-repeated tags.
    ByTag,
}

/// Ordered chunk rules of one container kind.
#[derive(Clone, Copy, Debug)]
pub struct ChunkLayout {
    entries: &'static [(Tag, Occurrence)],
    lookup: ChunkLookup,
}

impl ChunkLayout {
    /// Layout whose chunks must appear in entry order.
    pub const fn positional(entries: &'static [(Tag, Occurrence)]) -> Self {
        Self {
            entries,
            lookup: ChunkLookup::Positional,
        }
    }

    /// Layout whose chunks are found by tag.
    pub const fn by_tag(entries: &'static [(Tag, Occurrence)]) -> Self {
        Self {
            entries,
            lookup: ChunkLookup::ByTag,
        }
    }

    /// Layout entries in order.
    #[inline]
    pub fn entries(&self) -> &'static [(Tag, Occurrence)] {
        self.entries
    }

    /// Lookup mode.
    #[inline]
    pub fn lookup(&self) -> ChunkLookup {
        self.lookup
    }

    /// Tags in layout order, repeated and optional ones included once.
    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.entries.iter().map(|(t, _)| *t)
    }

    /// Check a tag sequence against the layout.
    ///
    /// With `complete == false` only a prefix is checked, so required
    /// chunks may still be missing at the end.
    pub fn check(&self, pushed: &[Tag], complete: bool) -> Result<()> {
        match self.lookup {
            ChunkLookup::Positional => self.check_positional(pushed, complete),
            ChunkLookup::ByTag => self.check_by_tag(pushed, complete),
        }
    }

    fn check_positional(&self, pushed: &[Tag], complete: bool) -> Result<()> {
        let mut entry = 0usize;
        let mut seen = 0usize;
        for tag in pushed {
            loop {
                let Some(&(expected, occurrence)) = self.entries.get(entry) else {
                    return Err(Error::ChunkOrder(format!("unexpected {} after the last chunk", tag)));
                };
                if expected == *tag && (occurrence == Occurrence::Repeated || seen == 0) {
                    seen += 1;
                    break;
                }
                if occurrence == Occurrence::Required && seen == 0 {
                    return Err(Error::ChunkOrder(format!("expected {} before {}", expected, tag)));
                }
                entry += 1;
                seen = 0;
            }
        }
        if complete {
            let missing = self.entries[entry.min(self.entries.len())..]
                .iter()
                .enumerate()
                .find(|(i, (_, occurrence))| *occurrence == Occurrence::Required && !(*i == 0 && seen > 0));
            if let Some((_, (tag, _))) = missing {
                return Err(Error::ChunkOrder(format!("missing required {}", tag)));
            }
        }
        Ok(())
    }

    fn check_by_tag(&self, pushed: &[Tag], complete: bool) -> Result<()> {
        for (i, tag) in pushed.iter().enumerate() {
            let Some((_, occurrence)) = self.entries.iter().find(|(t, _)| t == tag) else {
                return Err(Error::ChunkOrder(format!("{} is not part of this container", tag)));
            };
            if *occurrence != Occurrence::Repeated && pushed[..i].contains(tag) {
                return Err(Error::ChunkOrder(format!("duplicate {}", tag)));
            }
        }
        if complete {
            for (tag, occurrence) in self.entries {
                if *occurrence == Occurrence::Required && !pushed.contains(tag) {
                    return Err(Error::ChunkOrder(format!("missing required {}", tag)));
                }
            }
        }
        Ok(())
    }
}

/// Encoder switches shared by every container kind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Treat recoverable data problems as errors.
    pub strict: bool,
    /// Wrap animated models in an `MD21` chunk.
    pub chunked_models: bool,
    /// Prefix for texture names that carry no directory.
    pub texture_path_prefix: Option<String>,
}

impl EncodeOptions {
    /// Apply the texture prefix to `name` when it has no directory component.
    pub fn texture_path(&self, name: &str) -> String {
        match &self.texture_path_prefix {
            Some(prefix) if !name.contains(['/', '\\']) => {
                let sep = if prefix.ends_with(['/', '\\']) || prefix.is_empty() { "" } else { "\\" };
                format!("{}{}{}", prefix, sep, name)
            }
            _ => name.to_string(),
        }
    }
}

/// Apply the strictness policy to a data problem found while encoding.
pub(crate) fn report(diag: &mut Diagnostics, strict: bool, chunk: &str, operation: &str, message: String) -> Result<()> {
    if strict {
        return Err(Error::invalid(format!("{}: {}", operation, message)));
    }
    diag.record_message(Some(chunk), operation, message);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(kind: ContainerKind, pushed: &[Tag], complete: bool) -> Result<()> {
        kind.layout().check(pushed, complete)
    }

    #[test]
    fn test_tag_orders() {
        assert_eq!(ContainerKind::Wdt.tag_order(), TagOrder::Reversed);
        assert_eq!(ContainerKind::WmoGroup.tag_order(), TagOrder::Reversed);
        assert_eq!(ContainerKind::M2Chunked.tag_order(), TagOrder::Literal);
    }

    #[test]
    fn test_positional_accepts_layout() {
        let wdt = [tags::MVER, tags::MPHD, tags::MAIN, tags::MWMO];
        assert!(check(ContainerKind::Wdt, &wdt, true).is_ok());
        let with_modf = [tags::MVER, tags::MPHD, tags::MAIN, tags::MWMO, tags::MODF];
        assert!(check(ContainerKind::Wdt, &with_modf, true).is_ok());
    }

    #[test]
    fn test_positional_rejects_reorder() {
        let swapped = [tags::MVER, tags::MAIN, tags::MPHD];
        assert!(matches!(check(ContainerKind::Wdt, &swapped, false), Err(Error::ChunkOrder(_))));
        let doubled = [tags::MVER, tags::MVER];
        assert!(check(ContainerKind::Wdt, &doubled, false).is_err());
    }

    #[test]
    fn test_positional_prefix_and_missing() {
        let prefix = [tags::MVER, tags::MPHD];
        assert!(check(ContainerKind::Wdt, &prefix, false).is_ok());
        assert!(check(ContainerKind::Wdt, &prefix, true).is_err());
        assert!(check(ContainerKind::Wdt, &[], true).is_err());
    }

    #[test]
    fn test_repeated_chunks() {
        let mut wdl = vec![tags::MVER, tags::MWMO, tags::MWID, tags::MODF, tags::MAOF];
        assert!(check(ContainerKind::Wdl, &wdl, true).is_ok());
        wdl.extend([tags::MARE, tags::MARE, tags::MARE]);
        assert!(check(ContainerKind::Wdl, &wdl, true).is_ok());
        wdl.push(tags::MVER);
        assert!(check(ContainerKind::Wdl, &wdl, true).is_err());
    }

    #[test]
    fn test_by_tag() {
        assert!(check(ContainerKind::M2Chunked, &[tags::MD21], true).is_ok());
        assert!(check(ContainerKind::M2Chunked, &[], true).is_err());
        assert!(check(ContainerKind::M2Chunked, &[tags::MD21, tags::MD21], true).is_err());
        assert!(check(ContainerKind::M2Chunked, &[tags::MVER], false).is_err());
    }

    #[test]
    fn test_texture_path() {
        let mut opts = EncodeOptions::default();
        assert_eq!(opts.texture_path("wall01.blp"), "wall01.blp");
        opts.texture_path_prefix = Some("Creature\\wolf".into());
        assert_eq!(opts.texture_path("wolf.blp"), "Creature\\wolf\\wolf.blp");
        assert_eq!(opts.texture_path("other\\skin.blp"), "other\\skin.blp");
        opts.texture_path_prefix = Some("textures/".into());
        assert_eq!(opts.texture_path("a.blp"), "textures/a.blp");
    }
}
