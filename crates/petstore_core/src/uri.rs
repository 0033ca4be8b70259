//! Resource identifiers and pattern routing.
//!
//! # Responsibility
//! - Parse `content://<authority>/<collection>[/<id>]` strings.
//! - Match parsed URIs against registered patterns and report whether they
//!   address a collection or a single row.
//! - Derive MIME type tokens for collaborators.
//!
//! # Invariants
//! - Unrecognized URIs are rejected with `StoreError::NotFound` before any
//!   storage access.
//! - When several patterns match, the longest one wins; ties prefer literal
//!   segments over `#`, and `#` over `*`.

use crate::model::pet::PetId;
use crate::repo::pet_repo::{StoreError, StoreResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{Display, Formatter};

pub const SCHEME: &str = "content";
pub const CURSOR_DIR_BASE_TYPE: &str = "vnd.cursor.dir";
pub const CURSOR_ITEM_BASE_TYPE: &str = "vnd.cursor.item";

static URI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:content://)?([A-Za-z0-9][A-Za-z0-9._-]*)((?:/[^/\s]+)*)/?$")
        .expect("valid uri regex")
});
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+$").expect("valid id regex"));

/// Parsed resource identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceUri {
    authority: String,
    segments: Vec<String>,
    text: String,
}

impl ResourceUri {
    /// Parses a URI string; the `content://` prefix is optional.
    pub fn parse(value: &str) -> StoreResult<Self> {
        let trimmed = value.trim();
        let captures = URI_RE
            .captures(trimmed)
            .ok_or_else(|| StoreError::NotFound(trimmed.to_string()))?;
        let authority = captures[1].to_string();
        let segments = captures
            .get(2)
            .map(|path| {
                path.as_str()
                    .split('/')
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(Self::from_parts(authority, segments))
    }

    /// Builds the URI of a collection path under `authority`.
    pub fn collection(authority: &str, path: &str) -> Self {
        let segments = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        Self::from_parts(authority.to_string(), segments)
    }

    /// Appends a row id segment.
    pub fn with_id(&self, id: PetId) -> Self {
        let mut segments = self.segments.clone();
        segments.push(id.to_string());
        Self::from_parts(self.authority.clone(), segments)
    }

    /// Drops the last segment; `None` for a bare authority.
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self::from_parts(self.authority.clone(), rest.to_vec()))
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Segment-wise prefix test: `pets` contains `pets/3`, `pets/1` does not
    /// contain `pets/12`.
    pub fn is_ancestor_or_self_of(&self, other: &ResourceUri) -> bool {
        self.authority == other.authority
            && self.segments.len() <= other.segments.len()
            && self
                .segments
                .iter()
                .zip(other.segments.iter())
                .all(|(left, right)| left == right)
    }

    fn from_parts(authority: String, segments: Vec<String>) -> Self {
        let mut text = format!("{SCHEME}://{authority}");
        for segment in &segments {
            text.push('/');
            text.push_str(segment);
        }
        Self {
            authority,
            segments,
            text,
        }
    }
}

impl Display for ResourceUri {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Collection,
    Item,
}

/// Result of routing a URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub code: u32,
    pub kind: RouteKind,
    /// Literal segments of the matched pattern, joined with `/`.
    pub collection: String,
    pub row_id: Option<PetId>,
    pub uri: ResourceUri,
}

impl Route {
    /// URI of the addressed collection, without the row id.
    pub fn collection_uri(&self) -> ResourceUri {
        ResourceUri::collection(self.uri.authority(), &self.collection)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    Literal(String),
    /// `#`
    Number,
    /// `*`
    Any,
}

impl PatternSegment {
    fn matches(&self, segment: &str) -> bool {
        match self {
            Self::Literal(literal) => literal == segment,
            Self::Number => NUMBER_RE.is_match(segment) && segment.parse::<PetId>().is_ok(),
            Self::Any => true,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Literal(_) => 2,
            Self::Number => 1,
            Self::Any => 0,
        }
    }
}

#[derive(Debug, Clone)]
struct Pattern {
    authority: String,
    segments: Vec<PatternSegment>,
    code: u32,
}

impl Pattern {
    fn matches(&self, uri: &ResourceUri) -> bool {
        self.authority == uri.authority()
            && self.segments.len() == uri.segments().len()
            && self
                .segments
                .iter()
                .zip(uri.segments())
                .all(|(pattern, segment)| pattern.matches(segment))
    }

    fn specificity(&self) -> (usize, Vec<u8>) {
        (
            self.segments.len(),
            self.segments.iter().map(PatternSegment::rank).collect(),
        )
    }

    /// Rewrites numeric segments of a matched URI in plain decimal form, so
    /// `pets/007` and `pets/7` name the same resource.
    fn canonical(&self, uri: &ResourceUri) -> ResourceUri {
        let segments = self
            .segments
            .iter()
            .zip(uri.segments())
            .map(|(pattern, segment)| match pattern {
                PatternSegment::Number => segment
                    .parse::<PetId>()
                    .map(|id| id.to_string())
                    .unwrap_or_else(|_| segment.clone()),
                _ => segment.clone(),
            })
            .collect();
        ResourceUri::from_parts(uri.authority().to_string(), segments)
    }

    fn kind(&self) -> RouteKind {
        match self.segments.last() {
            Some(PatternSegment::Number) => RouteKind::Item,
            _ => RouteKind::Collection,
        }
    }
}

/// Registry of URI patterns.
#[derive(Debug, Clone, Default)]
pub struct UriMatcher {
    patterns: Vec<Pattern>,
}

impl UriMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `path` under `authority`; `#` matches a numeric segment and
    /// `*` any segment. A trailing `#` makes the pattern an item pattern.
    pub fn add(&mut self, authority: &str, path: &str, code: u32) {
        let segments = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| match segment {
                "#" => PatternSegment::Number,
                "*" => PatternSegment::Any,
                literal => PatternSegment::Literal(literal.to_string()),
            })
            .collect();
        self.patterns.push(Pattern {
            authority: authority.to_string(),
            segments,
            code,
        });
    }

    /// Parses and routes a URI string.
    pub fn route(&self, uri: &str) -> StoreResult<Route> {
        self.route_uri(&ResourceUri::parse(uri)?)
    }

    pub fn route_uri(&self, uri: &ResourceUri) -> StoreResult<Route> {
        let mut best: Option<&Pattern> = None;
        for pattern in self.patterns.iter().filter(|pattern| pattern.matches(uri)) {
            let better = match best {
                Some(current) => pattern.specificity() > current.specificity(),
                None => true,
            };
            if better {
                best = Some(pattern);
            }
        }
        let pattern = best.ok_or_else(|| StoreError::NotFound(uri.to_string()))?;

        let kind = pattern.kind();
        let row_id = match kind {
            RouteKind::Item => uri
                .segments()
                .last()
                .and_then(|segment| segment.parse::<PetId>().ok()),
            RouteKind::Collection => None,
        };
        let collection = pattern
            .segments
            .iter()
            .zip(uri.segments())
            .filter(|(pattern, _)| !matches!(pattern, PatternSegment::Number))
            .map(|(_, segment)| segment.as_str())
            .collect::<Vec<_>>()
            .join("/");

        Ok(Route {
            code: pattern.code,
            kind,
            collection,
            row_id,
            uri: pattern.canonical(uri),
        })
    }

    /// MIME type token of the routed resource.
    pub fn mime_type(&self, route: &Route) -> String {
        let base = match route.kind {
            RouteKind::Collection => CURSOR_DIR_BASE_TYPE,
            RouteKind::Item => CURSOR_ITEM_BASE_TYPE,
        };
        format!("{base}/{}/{}", route.uri.authority(), route.collection)
    }
}

pub const PETS: u32 = 100;
pub const PET_ID: u32 = 101;

/// Router with the pets collection and item patterns registered.
pub fn pets_matcher(authority: &str) -> UriMatcher {
    let mut matcher = UriMatcher::new();
    matcher.add(authority, crate::model::schema::PATH_PETS, PETS);
    matcher.add(
        authority,
        &format!("{}/#", crate::model::schema::PATH_PETS),
        PET_ID,
    );
    matcher
}
