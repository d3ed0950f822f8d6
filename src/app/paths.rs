//! Filesystem-safe path segments
//!
//! Names in a course tree are free text: they contain slashes, colons, question
//! marks, and occasionally a section literally called "CON". [`PathEscaper`]
//! turns each logical name into exactly one path segment by swapping offending
//! characters for look-alikes. Escaping is pure, total and idempotent.

use crate::constants::paths;

/// Which filesystem rules to honour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathProfile {
    /// Only the separator is special
    Posix,
    /// Reserved device names and punctuation are escaped as well
    Windows,
}

impl PathProfile {
    /// Profile of the platform the binary was built for
    pub fn native() -> Self {
        if cfg!(windows) {
            PathProfile::Windows
        } else {
            PathProfile::Posix
        }
    }
}

impl Default for PathProfile {
    fn default() -> Self {
        Self::native()
    }
}

/// Maps logical names to filesystem-safe segments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathEscaper {
    profile: PathProfile,
}

impl PathEscaper {
    pub fn new(profile: PathProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> PathProfile {
        self.profile
    }

    /// Escapes a single name into one path segment
    pub fn escape_segment(&self, name: &str) -> String {
        if name.is_empty() {
            return paths::EMPTY_SEGMENT.to_string();
        }
        if name.chars().all(|c| c == '.') {
            return name.chars().map(|_| paths::DOT_REPLACEMENT).collect();
        }

        let escaped: String = name.chars().map(|c| self.escape_char(c)).collect();
        if self.profile == PathProfile::Windows && is_reserved_name(&escaped) {
            format!("_{escaped}")
        } else {
            escaped
        }
    }

    /// Escapes every segment of a logical path
    pub fn escape_path<I, S>(&self, segments: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        segments
            .into_iter()
            .map(|segment| self.escape_segment(segment.as_ref()))
            .collect()
    }

    fn escape_char(&self, c: char) -> char {
        if c == '/' {
            return paths::SEPARATOR_REPLACEMENT;
        }
        if self.profile == PathProfile::Windows {
            let reserved = paths::RESERVED_CHARS.iter().find(|(from, _)| *from == c);
            if let Some((_, lookalike)) = reserved {
                return *lookalike;
            }
        }
        c
    }
}

/// Windows rejects device names as file stems regardless of case or extension
fn is_reserved_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name);
    paths::RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem))
}
