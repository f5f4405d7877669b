//! Per-tag view of the people a session is still waiting for.
//!
//! Everything here is a pure function of the target list and the recognized
//! set. Callers recompute on every change instead of caching a result.

use std::collections::HashSet;

use crate::types::{Person, PersonId, Tag};

/// One bucket of the breakdown. `tag` is `None` for the implicit "no tag" bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct TagBucket<'a> {
    pub tag: Option<&'a Tag>,
    pub people: Vec<&'a Person>,
}

impl TagBucket<'_> {
    pub fn label(&self) -> &str {
        self.tag.map(|t| t.name.as_str()).unwrap_or("No tag")
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TagBreakdown<'a> {
    pub buckets: Vec<TagBucket<'a>>,
}

impl<'a> TagBreakdown<'a> {
    /// Total entries across buckets, counting a multi-tag person once per tag.
    pub fn entry_count(&self) -> usize {
        self.buckets.iter().map(|b| b.people.len()).sum()
    }

    pub fn bucket(&self, tag_id: Option<i64>) -> Option<&TagBucket<'a>> {
        self.buckets.iter().find(|b| b.tag.map(|t| t.id) == tag_id)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Targets that have not been recognized yet, in target order.
pub fn remaining<'a>(targets: &'a [Person], recognized: &HashSet<PersonId>) -> Vec<&'a Person> {
    targets
        .iter()
        .filter(|p| !recognized.contains(&p.id))
        .collect()
}

/// Partition the not-yet-recognized targets by tag.
///
/// A person with several tags lands in each of their buckets; a person with
/// none lands in the trailing "no tag" bucket. Tag buckets keep the order in
/// which their tag is first seen.
pub fn tag_breakdown<'a>(targets: &'a [Person], recognized: &HashSet<PersonId>) -> TagBreakdown<'a> {
    let mut buckets: Vec<TagBucket<'a>> = Vec::new();
    let mut untagged: Vec<&'a Person> = Vec::new();

    for person in remaining(targets, recognized) {
        if person.tags.is_empty() {
            untagged.push(person);
            continue;
        }
        for tag in &person.tags {
            match buckets.iter_mut().find(|b| b.tag.map(|t| t.id) == Some(tag.id)) {
                Some(bucket) => bucket.people.push(person),
                None => buckets.push(TagBucket {
                    tag: Some(tag),
                    people: vec![person],
                }),
            }
        }
    }

    if !untagged.is_empty() {
        buckets.push(TagBucket {
            tag: None,
            people: untagged,
        });
    }

    TagBreakdown { buckets }
}
