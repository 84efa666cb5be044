//! LWM2M path addressing
//!
//! A path addresses a node in the LWM2M tree: `/object/instance/resource/
//! resource-instance`, each segment a non-negative integer, each level
//! requiring the previous one. The root path `/` addresses the whole tree.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Malformed LWM2M path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid LWM2M path '{path}': {reason}")]
pub struct InvalidPathError {
    /// The offending path text
    pub path: String,
    /// Why it was rejected
    pub reason: String,
}

impl InvalidPathError {
    pub(crate) fn new<P: Into<String>, R: Into<String>>(path: P, reason: R) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// An immutable LWM2M node address.
///
/// Exactly one of `is_root`, `is_object`, `is_object_instance`,
/// `is_resource`, `is_resource_instance` holds for any value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LwM2mPath {
    object_id: Option<u16>,
    object_instance_id: Option<u16>,
    resource_id: Option<u16>,
    resource_instance_id: Option<u16>,
}

impl LwM2mPath {
    /// The root path `/`.
    pub const ROOT: LwM2mPath = LwM2mPath {
        object_id: None,
        object_instance_id: None,
        resource_id: None,
        resource_instance_id: None,
    };

    /// Path addressing an object.
    pub fn object(object_id: u16) -> Self {
        Self {
            object_id: Some(object_id),
            ..Default::default()
        }
    }

    /// Path addressing an object instance.
    pub fn object_instance(object_id: u16, instance_id: u16) -> Self {
        Self {
            object_id: Some(object_id),
            object_instance_id: Some(instance_id),
            ..Default::default()
        }
    }

    /// Path addressing a resource.
    pub fn resource(object_id: u16, instance_id: u16, resource_id: u16) -> Self {
        Self {
            object_id: Some(object_id),
            object_instance_id: Some(instance_id),
            resource_id: Some(resource_id),
            ..Default::default()
        }
    }

    /// Path addressing a resource instance.
    pub fn resource_instance(
        object_id: u16,
        instance_id: u16,
        resource_id: u16,
        resource_instance_id: u16,
    ) -> Self {
        Self {
            object_id: Some(object_id),
            object_instance_id: Some(instance_id),
            resource_id: Some(resource_id),
            resource_instance_id: Some(resource_instance_id),
        }
    }

    pub fn object_id(&self) -> Option<u16> {
        self.object_id
    }

    pub fn object_instance_id(&self) -> Option<u16> {
        self.object_instance_id
    }

    pub fn resource_id(&self) -> Option<u16> {
        self.resource_id
    }

    pub fn resource_instance_id(&self) -> Option<u16> {
        self.resource_instance_id
    }

    pub fn is_root(&self) -> bool {
        self.object_id.is_none()
    }

    pub fn is_object(&self) -> bool {
        self.object_id.is_some() && self.object_instance_id.is_none()
    }

    pub fn is_object_instance(&self) -> bool {
        self.object_instance_id.is_some() && self.resource_id.is_none()
    }

    pub fn is_resource(&self) -> bool {
        self.resource_id.is_some() && self.resource_instance_id.is_none()
    }

    pub fn is_resource_instance(&self) -> bool {
        self.resource_instance_id.is_some()
    }

    /// Number of segments in this path (0 for root, 4 for a resource
    /// instance).
    pub fn depth(&self) -> usize {
        [
            self.object_id,
            self.object_instance_id,
            self.resource_id,
            self.resource_instance_id,
        ]
        .iter()
        .filter(|s| s.is_some())
        .count()
    }

    /// Whether this path equals `prefix` or is a descendant of it.
    pub fn start_with(&self, prefix: &LwM2mPath) -> bool {
        let mine = self.segments();
        let theirs = prefix.segments();
        theirs.len() <= mine.len() && mine[..theirs.len()] == theirs[..]
    }

    /// Append additional segments to this path.
    ///
    /// Fails when the result would be deeper than a resource-instance path
    /// or when `suffix` is not a valid segment sequence.
    pub fn append(&self, suffix: &str) -> Result<LwM2mPath, InvalidPathError> {
        let mut segments = self.segments();
        for part in suffix.split('/').filter(|s| !s.is_empty()) {
            let id = parse_segment(suffix, part)?;
            segments.push(id);
        }
        if segments.len() > 4 {
            return Err(InvalidPathError::new(
                format!("{}/{}", self, suffix),
                "a path has at most 4 segments",
            ));
        }
        Ok(Self::from_segments(&segments))
    }

    /// The path of the enclosing resource, when this is a resource or a
    /// resource instance path.
    pub fn to_resource_path(&self) -> Option<LwM2mPath> {
        match (self.object_id, self.object_instance_id, self.resource_id) {
            (Some(o), Some(i), Some(r)) => Some(LwM2mPath::resource(o, i, r)),
            _ => None,
        }
    }

    fn segments(&self) -> Vec<u16> {
        [
            self.object_id,
            self.object_instance_id,
            self.resource_id,
            self.resource_instance_id,
        ]
        .iter()
        .flatten()
        .copied()
        .collect()
    }

    fn from_segments(segments: &[u16]) -> LwM2mPath {
        LwM2mPath {
            object_id: segments.first().copied(),
            object_instance_id: segments.get(1).copied(),
            resource_id: segments.get(2).copied(),
            resource_instance_id: segments.get(3).copied(),
        }
    }
}

/// Reject path sets where one path is a prefix of another.
///
/// Composite requests addressing both a node and one of its descendants
/// are ambiguous and refused before any network I/O.
pub fn validate_not_overlapping(paths: &[LwM2mPath]) -> Result<(), InvalidPathError> {
    for (i, a) in paths.iter().enumerate() {
        for b in &paths[i + 1..] {
            if a.start_with(b) || b.start_with(a) {
                return Err(InvalidPathError::new(
                    a.to_string(),
                    format!("overlaps with path '{}'", b),
                ));
            }
        }
    }
    Ok(())
}

fn parse_segment(path: &str, segment: &str) -> Result<u16, InvalidPathError> {
    segment.parse::<u16>().map_err(|_| {
        InvalidPathError::new(
            path,
            format!("segment '{}' is not a non-negative integer", segment),
        )
    })
}

impl FromStr for LwM2mPath {
    type Err = InvalidPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(InvalidPathError::new(s, "path must not be empty"));
        }
        if !s.starts_with('/') {
            return Err(InvalidPathError::new(s, "path must start with '/'"));
        }
        if s == "/" {
            return Ok(LwM2mPath::ROOT);
        }
        if s.ends_with('/') {
            return Err(InvalidPathError::new(s, "trailing '/' is not allowed"));
        }

        let mut segments = Vec::with_capacity(4);
        for part in s[1..].split('/') {
            if part.is_empty() {
                return Err(InvalidPathError::new(s, "empty path segment"));
            }
            segments.push(parse_segment(s, part)?);
        }
        if segments.len() > 4 {
            return Err(InvalidPathError::new(s, "a path has at most 4 segments"));
        }
        Ok(Self::from_segments(&segments))
    }
}

impl fmt::Display for LwM2mPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "/");
        }
        for segment in self.segments() {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}
