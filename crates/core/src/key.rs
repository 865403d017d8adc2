//! Sort-key templates.
//!
//! A template is a `#`-separated list of segments. The placeholders `[type]`, `[sort]`
//! and `[ver]` are substituted at build time; any other segment is a literal that must
//! appear verbatim in parsed keys.

use crate::error::{EntityError, EntityResult};

pub const KEY_SEPARATOR: char = '#';

pub const PLAIN_TEMPLATE: &str = "[type]#[sort]";
pub const VERSIONED_TEMPLATE: &str = "[type]#[sort]#[ver]";

/// Default zero-padding width of the version segment.
///
/// Padding keeps lexicographic order equal to numeric order, so the highest version is the
/// first row of a reverse scan.
pub const DEFAULT_VERSION_WIDTH: usize = 10;

/// Narrowest accepted padding width.
pub const MIN_VERSION_WIDTH: usize = DEFAULT_VERSION_WIDTH;

/// Digits of `u64::MAX`; no version needs more.
pub const MAX_VERSION_WIDTH: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Type,
    Sort,
    Version,
    Literal(String),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        match raw {
            "[type]" => Segment::Type,
            "[sort]" => Segment::Sort,
            "[ver]" => Segment::Version,
            other => Segment::Literal(other.to_string()),
        }
    }
}

/// Components recovered from a sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyParts {
    pub entity_type: String,
    pub sort: String,
    /// `None` when the template has no version segment.
    pub version: Option<u64>,
}

/// Builds and parses sort keys for one template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    template: String,
    segments: Vec<Segment>,
    version_width: usize,
    version_prefix: String,
}

impl KeyCodec {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let segments = template.split(KEY_SEPARATOR).map(Segment::parse).collect();
        Self {
            template,
            segments,
            version_width: DEFAULT_VERSION_WIDTH,
            version_prefix: String::new(),
        }
    }

    /// `[type]#[sort]`
    pub fn plain() -> Self {
        Self::new(PLAIN_TEMPLATE)
    }

    /// `[type]#[sort]#[ver]`
    pub fn versioned() -> Self {
        Self::new(VERSIONED_TEMPLATE)
    }

    /// Set the padding width, clamped to `MIN_VERSION_WIDTH..=MAX_VERSION_WIDTH`.
    pub fn with_version_width(mut self, width: usize) -> Self {
        self.version_width = width.clamp(MIN_VERSION_WIDTH, MAX_VERSION_WIDTH);
        self
    }

    pub fn version_width(&self) -> usize {
        self.version_width
    }

    /// Render versions as e.g. `v0000000003` instead of `0000000003`.
    pub fn with_version_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.version_prefix = prefix.into();
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn is_versioned(&self) -> bool {
        self.segments.contains(&Segment::Version)
    }

    pub fn render_version(&self, version: u64) -> String {
        format!(
            "{}{:0width$}",
            self.version_prefix,
            version,
            width = self.version_width
        )
    }

    /// Substitute every placeholder of the template.
    pub fn build(&self, entity_type: &str, sort: &str, version: Option<u64>) -> EntityResult<String> {
        check_segment("type", entity_type)?;
        check_segment("sort", sort)?;

        let mut rendered = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            rendered.push(match segment {
                Segment::Type => entity_type.to_string(),
                Segment::Sort => sort.to_string(),
                Segment::Version => {
                    let version = version.ok_or_else(|| {
                        EntityError::malformed_key(format!(
                            "template '{}' requires a version",
                            self.template
                        ))
                    })?;
                    let digits = version.checked_ilog10().map_or(1, |d| d as usize + 1);
                    if digits > self.version_width {
                        return Err(EntityError::malformed_key(format!(
                            "version {version} is wider than {} digits",
                            self.version_width
                        )));
                    }
                    self.render_version(version)
                }
                Segment::Literal(lit) => lit.clone(),
            });
        }
        Ok(rendered.join(&KEY_SEPARATOR.to_string()))
    }

    /// Range prefix covering every version of one logical key, trailing separator included.
    ///
    /// For templates without a version segment this is the full key.
    pub fn prefix(&self, entity_type: &str, sort: &str) -> EntityResult<String> {
        if !self.is_versioned() {
            return self.build(entity_type, sort, None);
        }
        let full = self.build(entity_type, sort, Some(0))?;
        self.without_version(&full, true)
    }

    /// Range prefix covering every key of one entity type, e.g. `PAGE#`.
    pub fn type_prefix(&self, entity_type: &str) -> EntityResult<String> {
        check_segment("type", entity_type)?;
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Type => out.push_str(entity_type),
                Segment::Literal(lit) => out.push_str(lit),
                _ => break,
            }
            out.push(KEY_SEPARATOR);
        }
        Ok(out)
    }

    /// Split a key against the template.
    pub fn parse(&self, sk: &str) -> EntityResult<KeyParts> {
        let raw: Vec<&str> = sk.split(KEY_SEPARATOR).collect();
        if raw.len() != self.segments.len() {
            return Err(EntityError::malformed_key(format!(
                "'{sk}' has {} segment(s), template '{}' expects {}",
                raw.len(),
                self.template,
                self.segments.len()
            )));
        }

        let mut parts = KeyParts {
            entity_type: String::new(),
            sort: String::new(),
            version: None,
        };
        for (segment, value) in self.segments.iter().zip(raw) {
            match segment {
                Segment::Type => parts.entity_type = value.to_string(),
                Segment::Sort => parts.sort = value.to_string(),
                Segment::Version => parts.version = Some(self.parse_version(sk, value)?),
                Segment::Literal(lit) if lit == value => {}
                Segment::Literal(lit) => {
                    return Err(EntityError::malformed_key(format!(
                        "'{sk}' does not contain literal segment '{lit}'"
                    )));
                }
            }
        }
        Ok(parts)
    }

    fn parse_version(&self, sk: &str, raw: &str) -> EntityResult<u64> {
        raw.strip_prefix(self.version_prefix.as_str())
            .and_then(|digits| {
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    None
                } else {
                    digits.parse::<u64>().ok()
                }
            })
            .ok_or_else(|| EntityError::malformed_key(format!("'{sk}' has invalid version '{raw}'")))
    }

    /// Version encoded in `sk`, or 0 when the template carries no version.
    pub fn version_of(&self, sk: &str) -> EntityResult<u64> {
        if !self.is_versioned() {
            return Ok(0);
        }
        Ok(self.parse(sk)?.version.unwrap_or(0))
    }

    /// Strip the last segment of `sk`.
    pub fn without_version(&self, sk: &str, keep_trailing_separator: bool) -> EntityResult<String> {
        let idx = sk
            .rfind(KEY_SEPARATOR)
            .ok_or_else(|| EntityError::malformed_key(format!("'{sk}' has no '{KEY_SEPARATOR}' separator")))?;
        let mut out = sk[..idx].to_string();
        if keep_trailing_separator {
            out.push(KEY_SEPARATOR);
        }
        Ok(out)
    }
}

fn check_segment(name: &str, value: &str) -> EntityResult<()> {
    if value.is_empty() {
        return Err(EntityError::malformed_key(format!("{name} segment is empty")));
    }
    if value.contains(KEY_SEPARATOR) {
        return Err(EntityError::malformed_key(format!(
            "{name} segment '{value}' contains '{KEY_SEPARATOR}'"
        )));
    }
    Ok(())
}
