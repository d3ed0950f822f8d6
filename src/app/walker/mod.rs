//! Content tree traversal
//!
//! [`TreeWalker`] flattens a course tree into a lazy, pre-order stream of
//! [`WalkEvent`]s: download tasks with escaped destination paths, plus notices
//! for modules that were skipped or not recognised. The walk performs no I/O;
//! video pages are resolved later, when their task runs.
//!
//! Paths follow these rules:
//! - a node with children extends the path of its children with its resolved
//!   name, unless it is the synthetic root (`id == -1`) or its name is empty;
//! - a resource module with more than one content entry gets its own
//!   subdirectory, a single entry lands directly in the parent directory;
//! - a video module becomes `<name>.mp4`.
//!
//! Two nodes that escape to the same destination are not deduplicated; the one
//! downloaded last wins.

mod lang;

use std::collections::VecDeque;
use std::fmt;

pub use lang::resolve_language;

use crate::app::models::{
    ContentNode, DownloadTask, FileEntry, ModuleNode, ModulePayload, TaskSource,
};
use crate::app::paths::PathEscaper;
use crate::constants::{modules, moodle};

/// Why a module or entry produced no task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Activity type that never carries material
    IgnoredModule { module_type: String },
    /// Resource without any content entries
    NoContents,
    /// Content entry that is not a file
    NonFileEntry { filename: String, kind: String },
    /// Video module without a player page
    NoVideoPage,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::IgnoredModule { module_type } => write!(f, "ignored {module_type}"),
            SkipReason::NoContents => f.write_str("no contents"),
            SkipReason::NonFileEntry { filename, kind } => {
                write!(f, "{filename} is a {kind}, not a file")
            }
            SkipReason::NoVideoPage => f.write_str("video without player page"),
        }
    }
}

/// Item produced by the walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEvent {
    /// A transfer to schedule
    Task(DownloadTask),
    /// A module or entry that was deliberately skipped
    Skipped { path: Vec<String>, reason: SkipReason },
    /// A module type the walker does not know
    UnknownModule {
        path: Vec<String>,
        module_type: String,
        plural: Option<String>,
    },
}

/// Flattens content trees into download tasks
#[derive(Debug, Clone)]
pub struct TreeWalker {
    escaper: PathEscaper,
    preferred_language: String,
}

impl Default for TreeWalker {
    fn default() -> Self {
        Self::new(PathEscaper::default(), moodle::PREFERRED_LANGUAGE)
    }
}

impl TreeWalker {
    pub fn new(escaper: PathEscaper, preferred_language: impl Into<String>) -> Self {
        Self {
            escaper,
            preferred_language: preferred_language.into(),
        }
    }

    /// Resolves a multilingual name to the preferred language
    pub fn resolve_name(&self, raw: &str) -> String {
        resolve_language(raw, &self.preferred_language)
    }

    /// Walks `root`, prefixing every path with the already-resolved `base`
    pub fn walk<'a>(&'a self, root: &'a ContentNode, base: Vec<String>) -> Walk<'a> {
        Walk {
            walker: self,
            stack: vec![Frame::Enter(root, base)],
            pending: VecDeque::new(),
        }
    }

    fn dispatch(&self, module: &ModuleNode, path: &[String], out: &mut VecDeque<WalkEvent>) {
        let name = self.resolve_name(&module.name);
        let module_type = module.module_type.as_str();

        if modules::IGNORED.contains(&module_type) {
            tracing::trace!("Ignoring {} module {}", module_type, name);
            out.push_back(WalkEvent::Skipped {
                path: with_segment(path, &name),
                reason: SkipReason::IgnoredModule {
                    module_type: module_type.to_string(),
                },
            });
            return;
        }

        match module_type {
            modules::RESOURCE => self.dispatch_resource(module, &name, path, out),
            modules::VIDEO => self.dispatch_video(module, &name, path, out),
            _ => out.push_back(WalkEvent::UnknownModule {
                path: with_segment(path, &name),
                module_type: module_type.to_string(),
                plural: module.plural.clone(),
            }),
        }
    }

    fn dispatch_resource(
        &self,
        module: &ModuleNode,
        name: &str,
        path: &[String],
        out: &mut VecDeque<WalkEvent>,
    ) {
        let entries = match &module.payload {
            ModulePayload::Files(entries) if !entries.is_empty() => entries,
            _ => {
                out.push_back(WalkEvent::Skipped {
                    path: with_segment(path, name),
                    reason: SkipReason::NoContents,
                });
                return;
            }
        };

        let is_file = |entry: &FileEntry| entry.kind == modules::FILE_KIND;
        // Every entry counts, links included
        let directory = if entries.len() > 1 {
            with_segment(path, name)
        } else {
            path.to_vec()
        };

        for entry in entries {
            if is_file(entry) {
                out.push_back(WalkEvent::Task(DownloadTask {
                    segments: self.escaper.escape_path(
                        directory.iter().map(String::as_str).chain([entry.filename.as_str()]),
                    ),
                    source: TaskSource::File {
                        url: entry.url.clone(),
                    },
                    expected_size: Some(entry.size_bytes),
                }));
            } else {
                out.push_back(WalkEvent::Skipped {
                    path: with_segment(&directory, &entry.filename),
                    reason: SkipReason::NonFileEntry {
                        filename: entry.filename.clone(),
                        kind: entry.kind.clone(),
                    },
                });
            }
        }
    }

    fn dispatch_video(
        &self,
        module: &ModuleNode,
        name: &str,
        path: &[String],
        out: &mut VecDeque<WalkEvent>,
    ) {
        let ModulePayload::Video(video) = &module.payload else {
            out.push_back(WalkEvent::Skipped {
                path: with_segment(path, name),
                reason: SkipReason::NoVideoPage,
            });
            return;
        };

        let display_name = self.resolve_name(&video.display_name);
        let filename = format!("{}.{}", display_name, modules::VIDEO_EXTENSION);
        out.push_back(WalkEvent::Task(DownloadTask {
            segments: self
                .escaper
                .escape_path(path.iter().map(String::as_str).chain([filename.as_str()])),
            source: TaskSource::Video {
                page_url: video.page_url.clone(),
            },
            expected_size: None,
        }));
    }
}

fn with_segment(path: &[String], segment: &str) -> Vec<String> {
    let mut extended = path.to_vec();
    extended.push(segment.to_string());
    extended
}

enum Frame<'a> {
    /// Visit a node: schedule its children, then its own module payload
    Enter(&'a ContentNode, Vec<String>),
    /// Emit the events of a module whose children were already walked
    Dispatch(&'a ModuleNode, Vec<String>),
}

/// Lazy pre-order walk over one content tree
pub struct Walk<'a> {
    walker: &'a TreeWalker,
    stack: Vec<Frame<'a>>,
    pending: VecDeque<WalkEvent>,
}

impl Iterator for Walk<'_> {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            match self.stack.pop()? {
                Frame::Enter(node, path) => {
                    if let ContentNode::Module(module) = node {
                        self.stack.push(Frame::Dispatch(module, path.clone()));
                    }

                    let children = node.children();
                    if children.is_empty() {
                        continue;
                    }
                    let name = self.walker.resolve_name(node.name());
                    let child_path = if node.is_transparent() || name.is_empty() {
                        path
                    } else {
                        with_segment(&path, &name)
                    };
                    for child in children.iter().rev() {
                        self.stack.push(Frame::Enter(child, child_path.clone()));
                    }
                }
                Frame::Dispatch(module, path) => {
                    self.walker.dispatch(module, &path, &mut self.pending);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::{GroupNode, VideoDescriptor};
    use crate::app::paths::PathProfile;

    fn walker() -> TreeWalker {
        TreeWalker::new(PathEscaper::new(PathProfile::Posix), "it")
    }

    fn group(id: i64, name: &str, children: Vec<ContentNode>) -> ContentNode {
        ContentNode::Group(GroupNode {
            id,
            name: name.to_string(),
            children,
        })
    }

    fn module(id: i64, name: &str, module_type: &str, payload: ModulePayload) -> ContentNode {
        ContentNode::Module(ModuleNode {
            id,
            name: name.to_string(),
            module_type: module_type.to_string(),
            plural: None,
            payload,
            children: vec![],
        })
    }

    fn file(name: &str) -> FileEntry {
        FileEntry {
            filename: name.to_string(),
            url: format!("https://elearning.unimib.it/tokenpluginfile.php/k/{name}"),
            size_bytes: 42,
            kind: "file".to_string(),
        }
    }

    fn resource(id: i64, name: &str, entries: Vec<FileEntry>) -> ContentNode {
        module(id, name, "resource", ModulePayload::Files(entries))
    }

    fn tasks(events: &[WalkEvent]) -> Vec<&DownloadTask> {
        events
            .iter()
            .filter_map(|event| match event {
                WalkEvent::Task(task) => Some(task),
                _ => None,
            })
            .collect()
    }

    fn segments(task: &DownloadTask) -> Vec<&str> {
        task.segments.iter().map(String::as_str).collect()
    }

    /// Test transparent root
    ///
    /// Verifies that an unnamed root with id -1 and two children produces
    /// tasks whose paths omit the root segment.
    #[test]
    fn test_root_adds_no_segment() {
        let tree = ContentNode::root(vec![
            group(1, "Lezioni", vec![resource(10, "Slide", vec![file("a.pdf")])]),
            group(2, "Esami", vec![resource(11, "Testo", vec![file("b.pdf")])]),
        ]);

        let walker = walker();
        let events: Vec<WalkEvent> = walker.walk(&tree, vec!["Corso".into()]).collect();
        let tasks = tasks(&events);
        assert_eq!(tasks.len(), 2);
        assert_eq!(segments(tasks[0]), vec!["Corso", "Lezioni", "a.pdf"]);
        assert_eq!(segments(tasks[1]), vec!["Corso", "Esami", "b.pdf"]);
    }

    #[test]
    fn test_named_root_with_sentinel_id_adds_no_segment() {
        let tree = group(-1, "Wrapper", vec![resource(10, "Slide", vec![file("a.pdf")])]);
        let walker = walker();
        let events: Vec<WalkEvent> = walker.walk(&tree, vec![]).collect();
        assert_eq!(segments(tasks(&events)[0]), vec!["a.pdf"]);
    }

    /// Test multi-file grouping
    ///
    /// A resource with two files nests both under a directory named after the
    /// module; a single-file resource sits directly under its parent.
    #[test]
    fn test_resource_file_grouping() {
        let tree = ContentNode::root(vec![group(
            1,
            "Materiale",
            vec![
                resource(10, "Dispense", vec![file("a.pdf"), file("b.pdf")]),
                resource(11, "Orario", vec![file("orario.pdf")]),
            ],
        )]);

        let walker = walker();
        let events: Vec<WalkEvent> = walker.walk(&tree, vec![]).collect();
        let tasks = tasks(&events);
        assert_eq!(tasks.len(), 3);
        assert_eq!(segments(tasks[0]), vec!["Materiale", "Dispense", "a.pdf"]);
        assert_eq!(segments(tasks[1]), vec!["Materiale", "Dispense", "b.pdf"]);
        assert_eq!(segments(tasks[2]), vec!["Materiale", "orario.pdf"]);
        assert_eq!(tasks[0].expected_size, Some(42));
    }

    /// Test mixed resources
    ///
    /// Verifies that a link entry counts toward the subdirectory rule while
    /// only the file entry becomes a task.
    #[test]
    fn test_non_file_entries_are_skipped() {
        let mut link = file("https://example.org");
        link.kind = "url".to_string();
        let tree = resource(10, "Mixed", vec![file("a.pdf"), link]);

        let walker = walker();
        let events: Vec<WalkEvent> = walker.walk(&tree, vec!["C".into()]).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(segments(tasks(&events)[0]), vec!["C", "Mixed", "a.pdf"]);
        assert!(matches!(
            &events[1],
            WalkEvent::Skipped {
                reason: SkipReason::NonFileEntry { kind, .. },
                ..
            } if kind == "url"
        ));
    }

    #[test]
    fn test_empty_resource_is_reported() {
        let walker = walker();
        for payload in [ModulePayload::None, ModulePayload::Files(vec![])] {
            let tree = module(10, "Vuoto", "resource", payload);
            let events: Vec<WalkEvent> = walker.walk(&tree, vec![]).collect();
            assert_eq!(
                events,
                vec![WalkEvent::Skipped {
                    path: vec!["Vuoto".into()],
                    reason: SkipReason::NoContents
                }]
            );
        }
    }

    #[test]
    fn test_ignored_module_yields_no_task() {
        let tree = ContentNode::root(vec![
            module(10, "Annunci", "forum", ModulePayload::None),
            module(11, "Quiz 1", "quiz", ModulePayload::None),
        ]);
        let walker = walker();
        let events: Vec<WalkEvent> = walker.walk(&tree, vec![]).collect();
        assert!(tasks(&events).is_empty());
        assert!(events.iter().all(|event| matches!(
            event,
            WalkEvent::Skipped {
                reason: SkipReason::IgnoredModule { .. },
                ..
            }
        )));
    }

    #[test]
    fn test_unknown_module_is_reported() {
        let mut node = module(10, "Wiki", "wiki", ModulePayload::None);
        if let ContentNode::Module(module) = &mut node {
            module.plural = Some("Wikis".to_string());
        }
        let walker = walker();
        let events: Vec<WalkEvent> = walker.walk(&node, vec!["C".into()]).collect();
        assert_eq!(
            events,
            vec![WalkEvent::UnknownModule {
                path: vec!["C".into(), "Wiki".into()],
                module_type: "wiki".into(),
                plural: Some("Wikis".into()),
            }]
        );
    }

    #[test]
    fn test_video_module_becomes_mp4_task() {
        let tree = module(
            10,
            "{mlang en}Lecture 1{mlang}{mlang it}Lezione 1{mlang}",
            "kalvidres",
            ModulePayload::Video(VideoDescriptor {
                page_url: "https://elearning.unimib.it/mod/kalvidres/view.php?id=10".into(),
                display_name: "{mlang en}Lecture 1{mlang}{mlang it}Lezione 1{mlang}".into(),
            }),
        );
        let walker = walker();
        let events: Vec<WalkEvent> = walker.walk(&tree, vec!["C".into()]).collect();
        let tasks = tasks(&events);
        assert_eq!(segments(tasks[0]), vec!["C", "Lezione 1.mp4"]);
        assert!(tasks[0].is_video());
        assert_eq!(tasks[0].expected_size, None);
    }

    #[test]
    fn test_multilingual_names_are_resolved_in_paths() {
        let tree = ContentNode::root(vec![group(
            1,
            "{mlang en}Syllabus{mlang}{mlang it}Programma{mlang}",
            vec![resource(10, "x", vec![file("a.pdf")])],
        )]);
        let walker = walker();
        let events: Vec<WalkEvent> = walker.walk(&tree, vec![]).collect();
        assert_eq!(segments(tasks(&events)[0]), vec!["Programma", "a.pdf"]);

        let english = TreeWalker::new(PathEscaper::new(PathProfile::Posix), "fr");
        let events: Vec<WalkEvent> = english.walk(&tree, vec![]).collect();
        assert_eq!(segments(tasks(&events)[0]), vec!["Syllabus", "a.pdf"]);
    }

    #[test]
    fn test_paths_are_escaped() {
        let tree = group(
            1,
            "Esercizi 2023/2024",
            vec![resource(10, "x", vec![file("sol/uzioni.pdf")])],
        );
        let walker = walker();
        let events: Vec<WalkEvent> = walker.walk(&tree, vec!["A/B".into()]).collect();
        assert_eq!(
            segments(tasks(&events)[0]),
            vec!["A\u{2044}B", "Esercizi 2023\u{2044}2024", "sol\u{2044}uzioni.pdf"]
        );
    }

    /// Test pre-order with nested modules
    ///
    /// A module with children walks its children (under its own name) before
    /// emitting its own files, and siblings keep tree order.
    #[test]
    fn test_preorder_with_module_children() {
        let mut folder = resource(10, "Cartella", vec![file("own.pdf")]);
        if let ContentNode::Module(module) = &mut folder {
            module.children = vec![resource(11, "Dentro", vec![file("inner.pdf")])];
        }
        let tree = ContentNode::root(vec![
            group(1, "Uno", vec![folder]),
            group(2, "Due", vec![resource(12, "x", vec![file("last.pdf")])]),
        ]);

        let walker = walker();
        let events: Vec<WalkEvent> = walker.walk(&tree, vec![]).collect();
        let order: Vec<String> = tasks(&events).iter().map(|task| task.label()).collect();
        assert_eq!(
            order,
            vec!["Uno/Cartella/inner.pdf", "Uno/own.pdf", "Due/last.pdf"]
        );
    }

    #[test]
    fn test_duplicate_destinations_are_kept() {
        let tree = ContentNode::root(vec![
            resource(10, "a", vec![file("same.pdf")]),
            resource(11, "b", vec![file("same.pdf")]),
        ]);
        let walker = walker();
        let events: Vec<WalkEvent> = walker.walk(&tree, vec![]).collect();
        let tasks = tasks(&events);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].segments, tasks[1].segments);
    }

    #[test]
    fn test_deep_tree() {
        let mut node = resource(0, "leaf", vec![file("deep.pdf")]);
        for depth in 1..=200 {
            node = group(depth, &format!("d{depth}"), vec![node]);
        }
        let walker = walker();
        let events: Vec<WalkEvent> = walker.walk(&node, vec![]).collect();
        assert_eq!(tasks(&events)[0].segments.len(), 201);
    }
}
