//! Attribution rules deciding whether a listed track belongs to an artist.
//!
//! A track is attributed when any enabled clause holds:
//!
//! * [`AttributionClause::Primary`]: the artist is the first credited artist.
//! * [`AttributionClause::Featured`]: the artist is credited anywhere on the
//!   track and the hosting album is not a third-party compilation.
//! * [`AttributionClause::NameMatch`]: the track title contains the artist
//!   name, ignoring case. Catches remixes credited only in the title.

use std::fmt;

use regex::{Regex, RegexBuilder};
use thiserror::Error;

use crate::catalog::{AlbumSummary, TrackSummary};

/// Album-name prefixes that mark unrelated various-artists releases.
pub const DEFAULT_COMPILATION_DENYLIST: &[&str] = &[
    r"^now that'?s what i call",
    r"^(the )?best of\b",
    r"^(the )?greatest hits\b",
    r"^various artists\b",
    r"^\d+ (hits|greatest|best)\b",
    r"^top \d+\b",
    r"^(chill|summer|workout|party|indie) (hits|vibes|anthems)\b",
];

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid denylist pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("unknown attribution clause {0:?}")]
    UnknownClause(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributionClause {
    Primary,
    Featured,
    NameMatch,
}

impl AttributionClause {
    pub const ALL: [AttributionClause; 3] = [
        AttributionClause::Primary,
        AttributionClause::Featured,
        AttributionClause::NameMatch,
    ];

    pub fn parse(value: &str) -> Result<Self, PolicyError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(AttributionClause::Primary),
            "featured" => Ok(AttributionClause::Featured),
            "name" | "name_match" => Ok(AttributionClause::NameMatch),
            other => Err(PolicyError::UnknownClause(other.to_string())),
        }
    }
}

impl fmt::Display for AttributionClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributionClause::Primary => "primary",
            AttributionClause::Featured => "featured",
            AttributionClause::NameMatch => "name",
        };
        f.write_str(name)
    }
}

/// The artist a run is attributing tracks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistIdentity {
    pub id: String,
    /// Absent when the artist lookup failed; disables name matching.
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InclusionPolicy {
    clauses: Vec<AttributionClause>,
    denylist: Vec<Regex>,
    deny_appears_on_compilations: bool,
}

impl Default for InclusionPolicy {
    fn default() -> Self {
        let denylist = DEFAULT_COMPILATION_DENYLIST
            .iter()
            .filter_map(|pattern| compile_pattern(pattern).ok())
            .collect();

        Self {
            clauses: AttributionClause::ALL.to_vec(),
            denylist,
            deny_appears_on_compilations: true,
        }
    }
}

impl InclusionPolicy {
    pub fn new<S: AsRef<str>>(
        clauses: &[AttributionClause],
        denylist: &[S],
        deny_appears_on_compilations: bool,
    ) -> Result<Self, PolicyError> {
        let denylist = denylist
            .iter()
            .map(|pattern| compile_pattern(pattern.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut enabled = Vec::new();
        for clause in clauses {
            if !enabled.contains(clause) {
                enabled.push(*clause);
            }
        }

        Ok(Self {
            clauses: enabled,
            denylist,
            deny_appears_on_compilations,
        })
    }

    pub fn clauses(&self) -> &[AttributionClause] {
        &self.clauses
    }

    /// Returns the first enabled clause that attributes `track` to `artist`.
    pub fn attribute(
        &self,
        artist: &ArtistIdentity,
        album: &AlbumSummary,
        track: &TrackSummary,
    ) -> Option<AttributionClause> {
        self.clauses
            .iter()
            .copied()
            .find(|clause| self.holds(*clause, artist, album, track))
    }

    pub fn includes(
        &self,
        artist: &ArtistIdentity,
        album: &AlbumSummary,
        track: &TrackSummary,
    ) -> bool {
        self.attribute(artist, album, track).is_some()
    }

    /// Whether `album` is treated as an unrelated third-party compilation.
    pub fn is_third_party_compilation(&self, album: &AlbumSummary) -> bool {
        if self.deny_appears_on_compilations && album.is_appears_on() && album.is_compilation() {
            return true;
        }
        self.denylist.iter().any(|re| re.is_match(album.name.trim()))
    }

    fn holds(
        &self,
        clause: AttributionClause,
        artist: &ArtistIdentity,
        album: &AlbumSummary,
        track: &TrackSummary,
    ) -> bool {
        match clause {
            AttributionClause::Primary => track
                .artists
                .first()
                .is_some_and(|credit| credit.id.as_deref() == Some(artist.id.as_str())),
            AttributionClause::Featured => {
                track
                    .artists
                    .iter()
                    .any(|credit| credit.id.as_deref() == Some(artist.id.as_str()))
                    && !self.is_third_party_compilation(album)
            }
            AttributionClause::NameMatch => match artist.name.as_deref().map(str::trim) {
                Some(name) if !name.is_empty() => track
                    .name
                    .to_lowercase()
                    .contains(&name.to_lowercase()),
                _ => false,
            },
        }
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, PolicyError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| PolicyError::Pattern {
            pattern: pattern.to_string(),
            source,
        })
}
