//! Manifests of externally prepared corpora.
//!
//! Two layouts are read:
//! - a tab-separated table with a header row, one clip per row
//!   (`clip_path`, `client_id`, `sentence`, `canton`, ...), as distributed
//!   with crowd-sourced corpora;
//! - per-speaker `metadata.txt` files of `sample|text` lines next to the
//!   speaker's audio, where speaker and dialect are known from the folder.

use crate::error::{CorpusError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Column names accepted for each manifest field, first match wins.
const PATH_COLUMNS: [&str; 2] = ["clip_path", "path"];
const SPEAKER_COLUMNS: [&str; 3] = ["client_id", "speaker_id", "speaker"];
const TEXT_COLUMNS: [&str; 3] = ["sentence", "de_text", "text"];
const DIALECT_COLUMN: &str = "dialect";
const CANTON_COLUMN: &str = "canton";

/// Canton abbreviation to dialect region.
const CANTON_REGIONS: [(&str, &str); 22] = [
    ("AG", "Zürich"),
    ("AI", "Ostschweiz"),
    ("AR", "Ostschweiz"),
    ("BE", "Bern"),
    ("BL", "Basel"),
    ("BS", "Basel"),
    ("FR", "Bern"),
    ("GL", "Innerschweiz"),
    ("GR", "Graubünden"),
    ("JU", "Bern"),
    ("LU", "Innerschweiz"),
    ("NW", "Innerschweiz"),
    ("OW", "Innerschweiz"),
    ("SG", "Ostschweiz"),
    ("SH", "Ostschweiz"),
    ("SO", "Bern"),
    ("SZ", "Innerschweiz"),
    ("TG", "Ostschweiz"),
    ("UR", "Innerschweiz"),
    ("VS", "Wallis"),
    ("ZG", "Innerschweiz"),
    ("ZH", "Zürich"),
];

/// Maps canton abbreviations (any case) to dialect regions.
#[derive(Debug, Clone, PartialEq)]
pub struct CantonRegions(BTreeMap<String, String>);

impl Default for CantonRegions {
    fn default() -> Self {
        Self(
            CANTON_REGIONS
                .iter()
                .map(|(canton, region)| (canton.to_string(), region.to_string()))
                .collect(),
        )
    }
}

impl CantonRegions {
    /// Default table with `overrides` replacing or adding entries.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Self {
        let mut regions = Self::default();
        for (canton, region) in overrides {
            regions.0.insert(canton.to_uppercase(), region.clone());
        }
        regions
    }

    pub fn region(&self, canton: &str) -> Option<&str> {
        self.0.get(&canton.trim().to_uppercase()).map(String::as_str)
    }
}

/// How a clip path becomes a store key.
///
/// Keys follow the `{episode}_{n}` convention: underscores before the last
/// one are replaced by `-`, so the episode is everything before the last `_`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStyle {
    /// `speaker/0001.wav` → `speaker_0001`.
    #[default]
    FolderAndStem,
    /// `ch_zh_0001.wav` → `ch-zh_0001`.
    Stem,
    /// `spk-session-0042.wav` → `0042`.
    LastDashPart,
}

impl KeyStyle {
    /// Store key for a clip, `None` when the path has no file name.
    pub fn key(&self, clip: &Path) -> Option<String> {
        let stem = clip.file_stem()?.to_str()?;
        let raw = match self {
            KeyStyle::FolderAndStem => match clip
                .parent()
                .and_then(Path::file_name)
                .and_then(|name| name.to_str())
            {
                Some(folder) => format!("{}_{}", folder, stem),
                None => stem.to_string(),
            },
            KeyStyle::Stem => stem.to_string(),
            KeyStyle::LastDashPart => stem.rsplit('-').next().unwrap_or(stem).to_string(),
        };
        let key = single_separator(&raw);
        if key.is_empty() { None } else { Some(key) }
    }
}

impl fmt::Display for KeyStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyStyle::FolderAndStem => "folder-stem",
            KeyStyle::Stem => "stem",
            KeyStyle::LastDashPart => "last-dash",
        };
        f.write_str(name)
    }
}

impl FromStr for KeyStyle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "folder-stem" => Ok(KeyStyle::FolderAndStem),
            "stem" => Ok(KeyStyle::Stem),
            "last-dash" => Ok(KeyStyle::LastDashPart),
            other => Err(format!(
                "unknown key style '{}' (expected folder-stem, stem or last-dash)",
                other
            )),
        }
    }
}

/// Keep only the last `_`; earlier ones become `-`.
fn single_separator(name: &str) -> String {
    match name.rfind('_') {
        Some(idx) => format!("{}{}", name[..idx].replace('_', "-"), &name[idx..]),
        None => name.to_string(),
    }
}

/// One clip to import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportEntry {
    pub key: String,
    /// WAV file holding the clip.
    pub clip: PathBuf,
    pub speaker: String,
    pub dialect: String,
    pub text: String,
}

/// Entries of a table manifest and the rows left out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableManifest {
    pub entries: Vec<ImportEntry>,
    /// Rows without a dialect or canton.
    pub unlabelled: usize,
    /// Rows whose canton is not in the region table.
    pub unknown_canton: usize,
}

fn manifest_error(path: &Path, line: usize, message: impl Into<String>) -> CorpusError {
    CorpusError::Manifest {
        path: path.display().to_string(),
        line,
        message: message.into(),
    }
}

fn column(header: &[&str], names: &[&str]) -> Option<usize> {
    names
        .iter()
        .find_map(|name| header.iter().position(|column| column.trim() == *name))
}

/// Read a tab-separated manifest with a header row.
///
/// Clip paths are resolved against `audio_dir` and always read as `.wav`,
/// so compressed clips must be converted next to the originals first. The
/// dialect comes from a `dialect` column, or from `canton` via `regions`.
pub fn load_table(
    path: &Path,
    audio_dir: &Path,
    regions: &CantonRegions,
    style: KeyStyle,
) -> Result<TableManifest> {
    let contents = fs::read_to_string(path)?;
    let mut lines = contents.lines().enumerate();
    let Some((_, header_line)) = lines.next() else {
        return Err(manifest_error(path, 1, "missing header row"));
    };
    let header: Vec<&str> = header_line.split('\t').collect();

    let required = |names: &[&str], what: &str| {
        column(&header, names)
            .ok_or_else(|| manifest_error(path, 1, format!("no {} column ({})", what, names.join("/"))))
    };
    let path_col = required(&PATH_COLUMNS, "clip path")?;
    let speaker_col = required(&SPEAKER_COLUMNS, "speaker")?;
    let text_col = required(&TEXT_COLUMNS, "text")?;
    let dialect_col = column(&header, &[DIALECT_COLUMN]);
    let canton_col = column(&header, &[CANTON_COLUMN]);
    if dialect_col.is_none() && canton_col.is_none() {
        return Err(manifest_error(path, 1, "no dialect or canton column"));
    }

    let mut manifest = TableManifest::default();
    for (idx, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let field = |col: usize| fields.get(col).map_or("", |value| value.trim());

        let dialect = match dialect_col.map(field).filter(|value| !value.is_empty()) {
            Some(dialect) => dialect.to_string(),
            None => {
                let canton = canton_col.map_or("", field);
                if canton.is_empty() || canton.eq_ignore_ascii_case("nan") {
                    manifest.unlabelled += 1;
                    continue;
                }
                match regions.region(canton) {
                    Some(region) => region.to_string(),
                    None => {
                        tracing::warn!("{}:{}: unknown canton '{}'", path.display(), idx + 1, canton);
                        manifest.unknown_canton += 1;
                        continue;
                    }
                }
            }
        };

        let relative = Path::new(field(path_col));
        let key = style
            .key(relative)
            .ok_or_else(|| manifest_error(path, idx + 1, "empty clip path"))?;
        manifest.entries.push(ImportEntry {
            key,
            clip: audio_dir.join(relative).with_extension("wav"),
            speaker: field(speaker_col).to_string(),
            dialect,
            text: field(text_col).to_string(),
        });
    }

    tracing::debug!(
        "{}: {} clips, {} without dialect, {} with unknown canton",
        path.display(),
        manifest.entries.len(),
        manifest.unlabelled,
        manifest.unknown_canton
    );
    Ok(manifest)
}

/// Read a per-speaker `sample|text` metadata file.
///
/// Clips are `<sample>.wav` in the metadata file's directory.
pub fn load_speaker_metadata(
    path: &Path,
    speaker: &str,
    dialect: &str,
    style: KeyStyle,
) -> Result<Vec<ImportEntry>> {
    let dir = path.parent().unwrap_or(Path::new(""));
    let contents = fs::read_to_string(path)?;

    let mut entries = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut parts = line.split('|');
        let sample = parts.next().map_or("", str::trim);
        let Some(text) = parts.next() else {
            return Err(manifest_error(path, idx + 1, "expected sample|text"));
        };
        let clip = dir.join(format!("{}.wav", sample));
        let key = style
            .key(&clip)
            .ok_or_else(|| manifest_error(path, idx + 1, "empty sample name"))?;
        entries.push(ImportEntry {
            key,
            clip,
            speaker: speaker.to_string(),
            dialect: dialect.to_string(),
            text: text.trim().to_string(),
        });
    }
    Ok(entries)
}
