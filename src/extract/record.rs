use std::borrow::Borrow;

/// Joins multi-valued fields into a single cell
pub const VALUE_SEPARATOR: &str = " | ";

/// One extracted activity: an ordered key/value map
///
/// Key order is first-insertion order and is preserved through re-insertion,
/// so extracting the same view twice yields byte-identical output. The record
/// count is small (a few dozen fields) so a vector beats a hash map here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityRecord {
    fields: Vec<(String, String)>,
}

impl ActivityRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, overwriting in place when the key already exists
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The extracted activity id, empty when it could not be derived
    pub fn id(&self) -> &str {
        self.get("Activity ID").unwrap_or("")
    }
}

/// Derives an activity id from a detail-view URL: the trailing run of digits
/// of the last path segment, or the whole segment when it carries no digit
/// suffix, or empty when there is no usable segment at all.
pub fn activity_id_from_url(url: &str) -> String {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or("");
    let Some(segment) = path.split('/').rev().find(|s| !s.is_empty()) else {
        return String::new();
    };
    let digits: String = segment
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if digits.is_empty() {
        segment.to_string()
    } else {
        digits
    }
}

/// Collapses all interior whitespace runs to single spaces and trims the ends
pub fn collapse_whitespace(text: impl Borrow<str>) -> String {
    text.borrow().split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_preserves_first_seen_position_on_overwrite() {
        let mut record = ActivityRecord::new();
        record.insert("URL", "a");
        record.insert("Title", "b");
        record.insert("URL", "c");
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["URL", "Title"]);
        assert_eq!(record.get("URL"), Some("c"));
    }

    #[test]
    fn id_comes_from_the_trailing_digits_of_the_last_segment() {
        assert_eq!(
            activity_id_from_url("https://host/account/external-activities/4711"),
            "4711"
        );
        assert_eq!(
            activity_id_from_url("https://host/activities/view-4711?tab=agenda"),
            "4711"
        );
    }

    #[test]
    fn digitless_segment_is_used_raw() {
        assert_eq!(
            activity_id_from_url("https://host/activities/summary"),
            "summary"
        );
    }

    #[test]
    fn hostless_or_empty_paths_yield_an_empty_id() {
        assert_eq!(activity_id_from_url(""), "");
        assert_eq!(activity_id_from_url("///"), "");
    }

    #[test]
    fn whitespace_runs_collapse_to_single_spaces() {
        assert_eq!(collapse_whitespace("  a \n\t b   c "), "a b c");
        assert_eq!(collapse_whitespace(""), "");
    }
}
