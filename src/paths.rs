use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Basename of the sidecar descriptor file carried by category, subcategory,
/// and object directories.
pub const SIDECAR_FILENAME: &str = ".meta.toml";

const CATEGORIES_SEGMENT: &str = "categories";
const SUBCATEGORIES_SEGMENT: &str = "subcategories";
const OBJECTS_SEGMENT: &str = "objects";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Folder {
    Plany,
    Instrukce,
    Code,
    Docs,
    Root,
}

impl Folder {
    pub const CANONICAL: [Folder; 4] = [Folder::Plany, Folder::Instrukce, Folder::Code, Folder::Docs];

    pub fn as_str(self) -> &'static str {
        match self {
            Folder::Plany => "plany",
            Folder::Instrukce => "instrukce",
            Folder::Code => "code",
            Folder::Docs => "docs",
            Folder::Root => "root",
        }
    }

    /// Parses a path segment. Only the four canonical folder names match;
    /// "root" is a database value, never a directory on disk.
    pub fn from_segment(segment: &str) -> Option<Folder> {
        Folder::CANONICAL
            .into_iter()
            .find(|folder| folder.as_str() == segment)
    }

    /// Parses a stored database value, including the special "root".
    pub fn from_db(value: &str) -> Option<Folder> {
        if value == Folder::Root.as_str() {
            return Some(Folder::Root);
        }
        Folder::from_segment(value)
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A category, subcategory, or object directory identified by its slug chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Category {
        category: String,
    },
    Subcategory {
        category: String,
        subcategory: String,
    },
    Object {
        category: String,
        subcategory: Option<String>,
        object: String,
    },
}

impl EntityRef {
    pub fn directory(&self) -> PathBuf {
        match self {
            EntityRef::Category { category } => Path::new(CATEGORIES_SEGMENT).join(category),
            EntityRef::Subcategory {
                category,
                subcategory,
            } => Path::new(CATEGORIES_SEGMENT)
                .join(category)
                .join(SUBCATEGORIES_SEGMENT)
                .join(subcategory),
            EntityRef::Object {
                category,
                subcategory,
                object,
            } => {
                let mut dir = Path::new(CATEGORIES_SEGMENT).join(category);
                if let Some(subcategory) = subcategory {
                    dir = dir.join(SUBCATEGORIES_SEGMENT).join(subcategory);
                }
                dir.join(OBJECTS_SEGMENT).join(object)
            }
        }
    }

    pub fn sidecar_path(&self) -> PathBuf {
        self.directory().join(SIDECAR_FILENAME)
    }
}

/// A single document identified by its owning object and its place inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub category: String,
    pub subcategory: Option<String>,
    pub object: String,
    pub folder: Folder,
    pub filename: String,
}

impl DocumentRef {
    /// The canonical tree-relative path, the exact inverse of [`classify`].
    pub fn relative_path(&self) -> PathBuf {
        let object = EntityRef::Object {
            category: self.category.clone(),
            subcategory: self.subcategory.clone(),
            object: self.object.clone(),
        };
        let mut path = object.directory();
        if self.folder != Folder::Root {
            path = path.join(self.folder.as_str());
        }
        path.join(&self.filename)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreePath {
    Metadata(EntityRef),
    Document(DocumentRef),
}

/// Classifies a tree-relative path into a sidecar or document reference.
///
/// Paths outside `categories/`, dotfiles other than the sidecar, and shapes
/// that do not match the hierarchy (a non-canonical subdirectory under an
/// object, a truncated slug chain) return `None`: unrelated, not an error.
pub fn classify(relative: &Path) -> Option<TreePath> {
    let segments = normal_segments(relative)?;
    if segments.first().map(String::as_str) != Some(CATEGORIES_SEGMENT) {
        return None;
    }
    let category = segments.get(1)?.clone();
    if category.is_empty() {
        return None;
    }

    let basename = segments.last()?;
    if basename == SIDECAR_FILENAME {
        return classify_sidecar(&segments, category);
    }
    if basename.starts_with('.') {
        return None;
    }

    let (subcategory, rest) = split_subcategory(&segments[2..])?;
    let (object, remainder) = split_object(rest)?;
    let (folder, filename) = split_document(remainder)?;

    Some(TreePath::Document(DocumentRef {
        category,
        subcategory,
        object,
        folder,
        filename,
    }))
}

fn classify_sidecar(segments: &[String], category: String) -> Option<TreePath> {
    if segments.len() < 3 {
        return None;
    }
    // Everything between the category slug and the sidecar basename.
    let middle = &segments[2..segments.len() - 1];
    let entity = match middle {
        [] => EntityRef::Category { category },
        [kind, subcategory] if kind == SUBCATEGORIES_SEGMENT => EntityRef::Subcategory {
            category,
            subcategory: subcategory.clone(),
        },
        [kind, object] if kind == OBJECTS_SEGMENT => EntityRef::Object {
            category,
            subcategory: None,
            object: object.clone(),
        },
        [sub_kind, subcategory, obj_kind, object]
            if sub_kind == SUBCATEGORIES_SEGMENT && obj_kind == OBJECTS_SEGMENT =>
        {
            EntityRef::Object {
                category,
                subcategory: Some(subcategory.clone()),
                object: object.clone(),
            }
        }
        _ => return None,
    };
    Some(TreePath::Metadata(entity))
}

fn split_subcategory(rest: &[String]) -> Option<(Option<String>, &[String])> {
    match rest.first().map(String::as_str) {
        Some(SUBCATEGORIES_SEGMENT) => {
            let subcategory = rest.get(1)?.clone();
            Some((Some(subcategory), &rest[2..]))
        }
        _ => Some((None, rest)),
    }
}

fn split_object(rest: &[String]) -> Option<(String, &[String])> {
    if rest.first().map(String::as_str) != Some(OBJECTS_SEGMENT) {
        return None;
    }
    let object = rest.get(1)?.clone();
    Some((object, &rest[2..]))
}

fn split_document(remainder: &[String]) -> Option<(Folder, String)> {
    match remainder {
        [] => None,
        [first, rest @ ..] => {
            if let Some(folder) = Folder::from_segment(first) {
                if rest.is_empty() {
                    // A file named after a canonical folder; nothing to store.
                    return None;
                }
                return Some((folder, rest.join("/")));
            }
            if rest.is_empty() {
                return Some((Folder::Root, first.clone()));
            }
            // Non-standard subdirectory under the object.
            None
        }
    }
}

fn normal_segments(relative: &Path) -> Option<Vec<String>> {
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_str()?.to_string()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments)
}
