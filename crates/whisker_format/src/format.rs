//! The uniform format contract and the adapter registry.
//!
//! Every import/export format — the four Twine dialects, Ink JSON, and
//! native WhiskerScript — implements [`Format`]. Hosts work against the
//! trait; per-format behavior lives behind it. Registries are plain values
//! owned by whoever needs one (an engine, a CLI invocation), never process
//! globals, so concurrent sessions cannot collide.

use serde::{Deserialize, Serialize};

use whisker_base::Diagnostic;
use whisker_story::Story;

/// Which Twine story format dialect to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TwineDialect {
    #[default]
    Harlowe,
    Sugarcube,
    Chapbook,
    Snowman,
}

impl TwineDialect {
    /// The format name Twine writes into `<tw-storydata format="…">`.
    pub fn format_name(self) -> &'static str {
        match self {
            TwineDialect::Harlowe => "Harlowe",
            TwineDialect::Sugarcube => "SugarCube",
            TwineDialect::Chapbook => "Chapbook",
            TwineDialect::Snowman => "Snowman",
        }
    }

    pub fn from_format_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.starts_with("harlowe") {
            Some(TwineDialect::Harlowe)
        } else if lower.starts_with("sugarcube") {
            Some(TwineDialect::Sugarcube)
        } else if lower.starts_with("chapbook") {
            Some(TwineDialect::Chapbook)
        } else if lower.starts_with("snowman") {
            Some(TwineDialect::Snowman)
        } else {
            None
        }
    }
}

/// Options accepted by every exporter. Deserializable so config files can
/// carry them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Emit whitespace for human readers.
    pub pretty: bool,
    /// Include story metadata in the output.
    pub include_metadata: bool,
    /// Carry editor positions through the conversion.
    pub preserve_positions: bool,
    /// Target dialect for Twine HTML output.
    pub twine_format: TwineDialect,
    /// Translate macros between dialects instead of preserving them
    /// verbatim.
    pub convert_macros: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            pretty: true,
            include_metadata: true,
            preserve_positions: true,
            twine_format: TwineDialect::default(),
            convert_macros: true,
        }
    }
}

/// What to do when two imported passages share an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Keep the first definition and warn (the default).
    #[default]
    FirstWins,
    /// Treat the duplicate as an import error.
    Error,
}

/// Options accepted by every importer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    pub duplicate_policy: DuplicatePolicy,
}

/// The result of an import: a best-effort story plus diagnostics. `story`
/// is `None` only when the input was unusable.
#[derive(Debug)]
pub struct ImportResult {
    pub story: Option<Story>,
    pub diagnostics: Vec<Diagnostic>,
}

/// The result of an export.
#[derive(Debug)]
pub struct ExportResult {
    pub content: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// The uniform adapter contract.
pub trait Format {
    /// Stable lowercase name, e.g. `"harlowe"` or `"ink"`.
    fn name(&self) -> &'static str;

    /// File extensions this format claims, without dots.
    fn extensions(&self) -> &'static [&'static str];

    /// Cheap sniff: could `source` plausibly be this format?
    fn can_import(&self, source: &str) -> bool;

    fn import(&self, source: &str, options: &ImportOptions) -> ImportResult;

    /// Checks whether `story` is representable; `Err` carries the reason.
    fn can_export(&self, story: &Story) -> Result<(), String>;

    fn export(&self, story: &Story, options: &ExportOptions) -> ExportResult;
}

/// An owned collection of format adapters.
pub struct FormatRegistry {
    formats: Vec<Box<dyn Format>>,
}

impl FormatRegistry {
    /// An empty registry; use [`FormatRegistry::with_builtins`] for the
    /// standard set.
    pub fn new() -> Self {
        Self {
            formats: Vec::new(),
        }
    }

    /// A registry holding every built-in adapter.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(crate::script::WhiskerScriptFormat));
        registry.register(Box::new(crate::twine::TwineFormat::new(TwineDialect::Harlowe)));
        registry.register(Box::new(crate::twine::TwineFormat::new(TwineDialect::Sugarcube)));
        registry.register(Box::new(crate::twine::TwineFormat::new(TwineDialect::Chapbook)));
        registry.register(Box::new(crate::twine::TwineFormat::new(TwineDialect::Snowman)));
        registry.register(Box::new(crate::ink::InkFormat));
        registry
    }

    pub fn register(&mut self, format: Box<dyn Format>) {
        self.formats.push(format);
    }

    pub fn by_name(&self, name: &str) -> Option<&dyn Format> {
        self.formats
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
            .map(Box::as_ref)
    }

    pub fn by_extension(&self, ext: &str) -> Option<&dyn Format> {
        self.formats
            .iter()
            .find(|f| f.extensions().iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .map(Box::as_ref)
    }

    /// Picks an adapter for `source`. A format-name hint wins outright; an
    /// extension hint narrows to the adapters claiming that extension and
    /// sniffs among them (several Twine dialects share `.html`). Without a
    /// hint, the first adapter whose `can_import` sniff succeeds wins.
    pub fn detect<'a>(&'a self, source: &str, hint: Option<&str>) -> Option<&'a dyn Format> {
        if let Some(hint) = hint {
            if let Some(format) = self.by_name(hint) {
                return Some(format);
            }
            let claimants: Vec<&dyn Format> = self
                .formats
                .iter()
                .filter(|f| f.extensions().iter().any(|e| e.eq_ignore_ascii_case(hint)))
                .map(Box::as_ref)
                .collect();
            return claimants
                .iter()
                .copied()
                .find(|f| f.can_import(source))
                .or_else(|| claimants.first().copied());
        }
        self.formats
            .iter()
            .find(|f| f.can_import(source))
            .map(Box::as_ref)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.formats.iter().map(|f| f.name()).collect()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
