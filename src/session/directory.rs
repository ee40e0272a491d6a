//! Channel directory built from a server's `LIST` reply.

use crate::sort::{ColumnKind, ListSorter, SortableRow};
use std::borrow::Cow;

pub const COLUMN_NAME: usize = 0;
pub const COLUMN_USERS: usize = 1;
pub const COLUMN_TOPIC: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelListEntry {
    pub name: String,
    pub users: u32,
    pub topic: String,
}

impl SortableRow for ChannelListEntry {
    fn cell(&self, column: usize) -> Cow<'_, str> {
        match column {
            COLUMN_NAME => Cow::Borrowed(&self.name),
            COLUMN_USERS => Cow::Owned(self.users.to_string()),
            _ => Cow::Borrowed(&self.topic),
        }
    }
}

/// A sortable, filterable view over one channel listing.
#[derive(Debug, Clone)]
pub struct ChannelDirectory {
    channels: Vec<ChannelListEntry>,
    filter: String,
    filtered: Vec<usize>,
    sorter: ListSorter,
}

impl ChannelDirectory {
    pub fn new(channels: Vec<ChannelListEntry>) -> Self {
        let mut directory = Self {
            channels,
            filter: String::new(),
            filtered: Vec::new(),
            sorter: ListSorter::new(vec![ColumnKind::Text, ColumnKind::Numeric, ColumnKind::Text]),
        };
        directory.apply_filter();
        directory
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: &str) {
        self.filter = filter.to_string();
        self.apply_filter();
    }

    pub fn sort_by(&mut self, column: usize) {
        self.sorter.select(column);
        self.apply_filter();
    }

    pub fn sorter(&self) -> &ListSorter {
        &self.sorter
    }

    /// Entries matching the filter, in the current sort order.
    pub fn visible(&self) -> impl Iterator<Item = &ChannelListEntry> {
        self.filtered.iter().map(|&i| &self.channels[i])
    }

    fn apply_filter(&mut self) {
        let needle = self.filter.to_lowercase();
        self.filtered = self
            .channels
            .iter()
            .enumerate()
            .filter(|(_, ch)| {
                needle.is_empty()
                    || ch.name.to_lowercase().contains(&needle)
                    || ch.topic.to_lowercase().contains(&needle)
            })
            .map(|(i, _)| i)
            .collect();
        let channels = &self.channels;
        let sorter = &self.sorter;
        self.filtered
            .sort_by(|&a, &b| sorter.compare(&channels[a], &channels[b]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, users: u32, topic: &str) -> ChannelListEntry {
        ChannelListEntry {
            name: name.into(),
            users,
            topic: topic.into(),
        }
    }

    fn names(dir: &ChannelDirectory) -> Vec<&str> {
        dir.visible().map(|e| e.name.as_str()).collect()
    }

    fn sample() -> ChannelDirectory {
        ChannelDirectory::new(vec![
            entry("#rust", 120, "The Rust language"),
            entry("#linux", 9, "Kernel talk"),
            entry("#Go", 45, "gophers"),
        ])
    }

    #[test]
    fn test_unsorted_keeps_server_order() {
        assert_eq!(names(&sample()), vec!["#rust", "#linux", "#Go"]);
    }

    #[test]
    fn test_sort_by_users_numeric() {
        let mut dir = sample();
        dir.sort_by(COLUMN_USERS);
        assert_eq!(names(&dir), vec!["#linux", "#Go", "#rust"]);
        dir.sort_by(COLUMN_USERS);
        assert_eq!(names(&dir), vec!["#rust", "#Go", "#linux"]);
    }

    #[test]
    fn test_sort_by_name_is_case_sensitive() {
        let mut dir = sample();
        dir.sort_by(COLUMN_NAME);
        assert_eq!(names(&dir), vec!["#Go", "#linux", "#rust"]);
    }

    #[test]
    fn test_filter_matches_name_or_topic() {
        let mut dir = sample();
        dir.sort_by(COLUMN_USERS);
        dir.set_filter("KERNEL");
        assert_eq!(names(&dir), vec!["#linux"]);
        dir.set_filter("#");
        assert_eq!(names(&dir), vec!["#linux", "#Go", "#rust"]);
        dir.set_filter("");
        assert_eq!(dir.visible().count(), 3);
        assert_eq!(dir.len(), 3);
    }
}
