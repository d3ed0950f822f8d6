//! Data models for the UniMiB scraper
//!
//! The content tree of a course is a sum of two node kinds: grouping nodes
//! (sections and synthetic wrappers) and modules (resources, videos and
//! activities). Modules may themselves contain further nodes. Trees are built
//! once by the catalog and never mutated afterwards.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Id of the synthetic wrapper that never contributes a path segment
pub const ROOT_ID: i64 = -1;

/// A node of a course content tree
#[derive(Debug, Clone, PartialEq)]
pub enum ContentNode {
    Group(GroupNode),
    Module(ModuleNode),
}

impl ContentNode {
    /// Synthetic root wrapping the given children
    pub fn root(children: Vec<ContentNode>) -> Self {
        ContentNode::Group(GroupNode {
            id: ROOT_ID,
            name: String::new(),
            children,
        })
    }

    pub fn id(&self) -> i64 {
        match self {
            ContentNode::Group(group) => group.id,
            ContentNode::Module(module) => module.id,
        }
    }

    /// Raw, possibly multilingual, name
    pub fn name(&self) -> &str {
        match self {
            ContentNode::Group(group) => &group.name,
            ContentNode::Module(module) => &module.name,
        }
    }

    pub fn children(&self) -> &[ContentNode] {
        match self {
            ContentNode::Group(group) => &group.children,
            ContentNode::Module(module) => &module.children,
        }
    }

    /// Whether this node is a transparent wrapper that adds no path segment
    pub fn is_transparent(&self) -> bool {
        self.id() == ROOT_ID || self.name().is_empty()
    }
}

/// Section or synthetic wrapper
#[derive(Debug, Clone, PartialEq)]
pub struct GroupNode {
    pub id: i64,
    pub name: String,
    pub children: Vec<ContentNode>,
}

/// Leaf-bearing unit of a course
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleNode {
    pub id: i64,
    pub name: String,
    /// Moodle module type (`resource`, `kalvidres`, `forum`, ...)
    pub module_type: String,
    /// Human readable plural of the type, used in notices
    pub plural: Option<String>,
    pub payload: ModulePayload,
    pub children: Vec<ContentNode>,
}

/// What a module carries besides its children
#[derive(Debug, Clone, PartialEq)]
pub enum ModulePayload {
    None,
    Files(Vec<FileEntry>),
    Video(VideoDescriptor),
}

/// A file attached to a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub filename: String,
    pub url: String,
    pub size_bytes: u64,
    /// Entry kind; only `file` entries are downloaded
    pub kind: String,
}

/// Page embedding a video player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDescriptor {
    pub page_url: String,
    pub display_name: String,
}

/// Where the bytes of a task come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSource {
    /// Direct file URL
    File { url: String },
    /// Player page that must be resolved to a direct URL first
    Video { page_url: String },
}

/// A single transfer derived from the content tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// Filesystem-safe segments below the destination directory
    pub segments: Vec<String>,
    pub source: TaskSource,
    pub expected_size: Option<u64>,
}

impl DownloadTask {
    /// Absolute destination below `root`
    pub fn destination(&self, root: &Path) -> PathBuf {
        self.segments
            .iter()
            .fold(root.to_path_buf(), |path, segment| path.join(segment))
    }

    /// Relative path used in progress lines
    pub fn label(&self) -> String {
        self.segments.join("/")
    }

    pub fn is_video(&self) -> bool {
        matches!(self.source, TaskSource::Video { .. })
    }
}

impl fmt::Display for DownloadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// An enrolled course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseInfo {
    pub id: i64,
    /// Resolved category names from the top-level category down
    pub category_path: Vec<String>,
    /// Resolved course name
    pub name: String,
}

impl CourseInfo {
    /// Logical path of the course: its categories followed by its name
    pub fn path(&self) -> Vec<String> {
        let mut path = self.category_path.clone();
        path.push(self.name.clone());
        path
    }
}

/// Identity of the site and the signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteInfo {
    pub sitename: String,
    #[serde(default)]
    pub fullname: String,
    pub userid: i64,
    #[serde(default)]
    pub userprivateaccesskey: Option<String>,
}
