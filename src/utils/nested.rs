//! Dotted-path access into nested BSON documents ("a.b.c").
//!
//! Reads never modify the document. [`insert_path`] is the only operation
//! that creates intermediate documents.

use mongodb::bson::{Bson, Document};

/// True iff every segment of `path` resolves through nested documents to an
/// existing key.
pub fn has_path(doc: &Document, path: &str) -> bool {
    get_path(doc, path).is_some()
}

/// Value at `path`, or `None` when a segment is missing or an intermediate
/// value is not a document.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let (parents, leaf) = split_leaf(path);
    let mut current = doc;
    if let Some(parents) = parents {
        for segment in parents.split('.') {
            match current.get(segment) {
                Some(Bson::Document(child)) => current = child,
                _ => return None,
            }
        }
    }
    current.get(leaf)
}

/// Set `value` at `path`, creating intermediate documents as needed. An
/// intermediate that exists but is not a document is replaced.
pub fn insert_path(doc: &mut Document, path: &str, value: impl Into<Bson>) {
    let (parents, leaf) = split_leaf(path);
    let mut current = doc;
    if let Some(parents) = parents {
        for segment in parents.split('.') {
            current = child_mut(current, segment);
        }
    }
    current.insert(leaf, value);
}

/// Dotted paths of every leaf, in document order. Empty sub-documents count
/// as leaves.
pub fn flatten_paths(doc: &Document) -> Vec<String> {
    let mut paths = Vec::new();
    flatten_recursive(doc, "", &mut paths);
    paths
}

fn flatten_recursive(doc: &Document, prefix: &str, paths: &mut Vec<String>) {
    for (key, value) in doc {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        match value {
            Bson::Document(nested) if !nested.is_empty() => {
                flatten_recursive(nested, &full_key, paths);
            }
            _ => paths.push(full_key),
        }
    }
}

fn split_leaf(path: &str) -> (Option<&str>, &str) {
    match path.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, path),
    }
}

fn child_mut<'a>(parent: &'a mut Document, key: &str) -> &'a mut Document {
    if !matches!(parent.get(key), Some(Bson::Document(_))) {
        parent.insert(key, Document::new());
    }
    match parent.get_mut(key) {
        Some(Bson::Document(child)) => child,
        _ => unreachable!("child document was inserted above"),
    }
}
