//! Nested reading -> flat record
//!
//! PurpleAir answers with up to three levels of objects
//! (`sensor` -> `stats` -> `pm2.5_10minute`, ...). History sinks want one
//! column per leaf, so every leaf is re-keyed by its `_`-joined path.
//!
//! Rules:
//! - root scalars keep their key
//! - the depth-1 key `stats_a` is never saved, whatever it holds
//! - leaves up to depth 3 are kept, anything deeper is dropped with a warning

use crate::record::{FlatRecord, NestedRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

/// Depth-1 key whose subtree is always dropped (channel A duplicates `stats`).
pub const EXCLUDED_MARKER: &str = "stats_a";

const SEPARATOR: &str = "_";

/// How keys are derived when a depth-2 value is itself an object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth3Keys {
    /// Use the depth-3 object's own keys.
    #[default]
    Nested,
    /// Re-walk the depth-2 level instead of the depth-3 object, emitting
    /// `parent_child_grandchild_<sibling>` for every scalar sibling of the
    /// grandchild. Only needed to line up with histories recorded that way.
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    ExcludedMarker,
    TooDeep,
}

/// A subtree left out of the flat record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dropped {
    pub path: String,
    pub reason: DropReason,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Flattener {
    depth3: Depth3Keys,
}

impl Flattener {
    pub fn new(depth3: Depth3Keys) -> Self {
        Self { depth3 }
    }

    pub fn depth3_keys(&self) -> Depth3Keys {
        self.depth3
    }

    pub fn flatten(&self, nested: &NestedRecord) -> FlatRecord {
        self.flatten_report(nested).0
    }

    /// Flatten and also return every subtree that was left out.
    pub fn flatten_report(&self, nested: &NestedRecord) -> (FlatRecord, Vec<Dropped>) {
        let mut flat = FlatRecord::new();
        let mut dropped = Vec::new();

        for (key, value) in nested {
            let Value::Object(level1) = value else {
                flat.insert(key.clone(), value.clone());
                continue;
            };

            for (k1, v1) in level1 {
                let path1 = join(key, k1);

                if k1 == EXCLUDED_MARKER {
                    info!(path = %path1, "not saving {} information", EXCLUDED_MARKER);
                    dropped.push(Dropped {
                        path: path1,
                        reason: DropReason::ExcludedMarker,
                    });
                    continue;
                }

                let Value::Object(level2) = v1 else {
                    flat.insert(path1, v1.clone());
                    continue;
                };

                for (k2, v2) in level2 {
                    let path2 = join(&path1, k2);

                    let Value::Object(level3) = v2 else {
                        flat.insert(path2, v2.clone());
                        continue;
                    };

                    let third_level: &Map<String, Value> = match self.depth3 {
                        Depth3Keys::Nested => level3,
                        Depth3Keys::Legacy => level2,
                    };

                    for (k3, v3) in third_level {
                        let path3 = join(&path2, k3);
                        if v3.is_object() {
                            warn!(path = %path3, "reading nests deeper than three levels, dropping");
                            dropped.push(Dropped {
                                path: path3,
                                reason: DropReason::TooDeep,
                            });
                        } else {
                            flat.insert(path3, v3.clone());
                        }
                    }
                }
            }
        }

        (flat, dropped)
    }
}

/// Flatten with default settings (true depth-3 keys).
pub fn flatten(nested: &NestedRecord) -> FlatRecord {
    Flattener::default().flatten(nested)
}

fn join(parent: &str, child: &str) -> String {
    let mut key = String::with_capacity(parent.len() + SEPARATOR.len() + child.len());
    key.push_str(parent);
    key.push_str(SEPARATOR);
    key.push_str(child);
    key
}
