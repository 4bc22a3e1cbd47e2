//! Turns a listing entry plus its latest revision into a [`FileRecord`].

use serde_json::Map;

use crate::contract::{ContentRevision, FileDescriptor, FileRecord};

/// Raw payload fields replaced by their unwrapped equivalents.
const RAW_FIELDS: [&str; 3] = ["text", "updated", "properties"];

/// Keys owned by typed record fields; metadata never shadows them.
const RECORD_FIELDS: [&str; 4] = ["id", "name", "contents", "modifiedDate"];

/// Builds the canonical record for one file.
///
/// Metadata is merged in order listing → revision payload → `properties`,
/// later entries winning. `id` and `name` always come from the listing.
pub fn normalize(descriptor: FileDescriptor, revision: ContentRevision) -> FileRecord {
    let FileDescriptor { id, name, listing } = descriptor;
    let ContentRevision {
        text,
        updated,
        properties,
        extra,
    } = revision;

    let mut metadata: Map<_, _> = listing;
    metadata.extend(extra);
    for key in RAW_FIELDS {
        metadata.remove(key);
    }
    metadata.extend(properties);
    for key in RECORD_FIELDS {
        metadata.remove(key);
    }

    FileRecord {
        id,
        name,
        contents: text.into_bytes(),
        modified_date: updated,
        metadata,
    }
}

/// Destination path of a file: `dest_path` and `name` joined by `/`.
pub fn cache_key(dest_path: &str, name: &str) -> String {
    let dest = dest_path.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if dest.is_empty() {
        name.to_string()
    } else {
        format!("{dest}/{name}")
    }
}
