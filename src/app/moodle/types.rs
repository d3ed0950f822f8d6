//! Web-service payloads and their conversion into content trees

use std::collections::HashMap;

use serde::Deserialize;

use crate::app::models::{
    ContentNode, FileEntry, GroupNode, ModuleNode, ModulePayload, VideoDescriptor,
};
use crate::app::walker::resolve_language;
use crate::constants::{modules, moodle};

/// A course section from `core_course_get_contents`
#[derive(Debug, Clone, Deserialize)]
pub struct RawSection {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub modules: Vec<RawModule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawModule {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub modname: String,
    #[serde(default)]
    pub modplural: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub contents: Option<Vec<RawContent>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawContent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub fileurl: String,
    #[serde(default)]
    pub filesize: u64,
}

/// A course category from `core_course_get_categories`
#[derive(Debug, Clone, Deserialize)]
pub struct RawCategory {
    pub id: i64,
    pub name: String,
    /// Ids from the top-level category down to this one, as `/1/5/12`
    #[serde(default)]
    pub path: String,
}

/// An enrolment from `core_enrol_get_users_courses`
#[derive(Debug, Clone, Deserialize)]
pub struct RawCourse {
    pub id: i64,
    pub fullname: String,
    #[serde(default)]
    pub category: Option<i64>,
}

/// Exception object the web service returns instead of a result
#[derive(Debug, Clone, Deserialize)]
pub struct RawException {
    pub exception: String,
    #[serde(default)]
    pub errorcode: String,
    #[serde(default)]
    pub message: String,
}

/// Resolved category names keyed by id, with their ancestry
#[derive(Debug, Clone, Default)]
pub struct CategoryIndex {
    names: HashMap<i64, String>,
    ancestry: HashMap<i64, Vec<i64>>,
}

impl CategoryIndex {
    pub fn new(categories: Vec<RawCategory>, preferred_language: &str) -> Self {
        let mut index = Self::default();
        for category in categories {
            let ancestry = category
                .path
                .split('/')
                .filter_map(|id| id.parse::<i64>().ok())
                .collect();
            index.ancestry.insert(category.id, ancestry);
            index.names.insert(
                category.id,
                resolve_language(&category.name, preferred_language),
            );
        }
        index
    }

    /// Names from the top-level category down to `id`
    ///
    /// An unknown category yields an empty path so the course lands directly
    /// in the destination directory.
    pub fn path_of(&self, id: i64) -> Vec<String> {
        self.ancestry
            .get(&id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.names.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Rewrites a web-service file URL so it works without the web-service token
///
/// `/webservice/pluginfile.php` URLs require the token as a parameter; the
/// `/tokenpluginfile.php/<key>` form carries the user's private access key in
/// the path instead. Other URLs are returned unchanged.
pub fn rewrite_file_url(url: &str, private_access_key: Option<&str>) -> String {
    match private_access_key {
        Some(key) if url.contains(moodle::WEBSERVICE_PLUGINFILE) => {
            let rewritten = url.replacen(
                moodle::WEBSERVICE_PLUGINFILE,
                &format!("{}/{}", moodle::TOKEN_PLUGINFILE, key),
                1,
            );
            let separator = if rewritten.contains('?') { '&' } else { '?' };
            format!("{rewritten}{separator}offline=1")
        }
        _ => url.to_string(),
    }
}

/// Builds the content tree of a course from its sections
pub fn build_content_tree(
    sections: Vec<RawSection>,
    private_access_key: Option<&str>,
) -> ContentNode {
    let children = sections
        .into_iter()
        .map(|section| {
            ContentNode::Group(GroupNode {
                id: section.id,
                name: section.name,
                children: section
                    .modules
                    .into_iter()
                    .map(|module| build_module(module, private_access_key))
                    .collect(),
            })
        })
        .collect();
    ContentNode::root(children)
}

fn build_module(module: RawModule, private_access_key: Option<&str>) -> ContentNode {
    let payload = if module.modname == modules::VIDEO {
        match module.url {
            Some(page_url) => ModulePayload::Video(VideoDescriptor {
                page_url,
                display_name: module.name.clone(),
            }),
            None => ModulePayload::None,
        }
    } else {
        match module.contents {
            Some(contents) => ModulePayload::Files(
                contents
                    .into_iter()
                    .map(|content| FileEntry {
                        url: rewrite_file_url(&content.fileurl, private_access_key),
                        filename: content.filename,
                        size_bytes: content.filesize,
                        kind: content.kind,
                    })
                    .collect(),
            ),
            None => ModulePayload::None,
        }
    };

    ContentNode::Module(ModuleNode {
        id: module.id,
        name: module.name,
        module_type: module.modname,
        plural: module.modplural,
        payload,
        children: Vec::new(),
    })
}
