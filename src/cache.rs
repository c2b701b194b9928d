use std::collections::HashMap;

use crate::models::WordRow;

/// One page of view-model rows, keyed by display key.
///
/// The cache is replaced as a whole on navigation and updated one entry at a
/// time after a confirmed write. Entries are never patched field by field.
#[derive(Debug, Default, Clone)]
pub struct DisplayCache {
    order: Vec<String>,
    rows: HashMap<String, WordRow>,
}

impl DisplayCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_page(&mut self, rows: Vec<WordRow>) {
        self.order = rows.iter().map(|r| r.key.clone()).collect();
        self.rows = rows.into_iter().map(|r| (r.key.clone(), r)).collect();
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.rows.clear();
    }

    pub fn get(&self, key: &str) -> Option<&WordRow> {
        self.rows.get(key)
    }

    /// Swap in a freshly loaded row. Returns `false` (and changes nothing)
    /// when the row is not part of the current page.
    pub fn replace(&mut self, row: WordRow) -> bool {
        match self.rows.get_mut(&row.key) {
            Some(slot) => {
                *slot = row;
                true
            }
            None => false,
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &WordRow> {
        self.order.iter().filter_map(|key| self.rows.get(key))
    }

    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub total: usize,
    pub page_size: usize,
    pub page: usize,
}

impl Pagination {
    pub fn new(page_size: usize) -> Self {
        Self {
            total: 0,
            page_size: page_size.max(1),
            page: 0,
        }
    }

    pub fn page_count(&self) -> usize {
        self.total.div_ceil(self.page_size.max(1)).max(1)
    }

    pub fn offset(&self) -> usize {
        self.page * self.page_size
    }

    pub fn set_total(&mut self, total: usize) {
        self.total = total;
        self.clamp();
    }

    pub fn clamp(&mut self) {
        self.page = self.page.min(self.page_count() - 1);
    }

    pub fn next(&mut self) -> bool {
        if self.page + 1 < self.page_count() {
            self.page += 1;
            true
        } else {
            false
        }
    }

    pub fn prev(&mut self) -> bool {
        if self.page > 0 {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.page = 0;
        self.total = 0;
    }

    /// "current / count", 1-based.
    pub fn label(&self) -> String {
        format!("{} / {}", self.page + 1, self.page_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(key: &str, word: &str) -> WordRow {
        WordRow {
            display_id: 0,
            key: key.to_string(),
            word_id: 0,
            file_id: 1,
            word: word.to_string(),
            trans: String::new(),
            ipa: None,
            audio: None,
            is_unlearned: true,
        }
    }

    #[test]
    fn test_replace_page_discards_previous_entries() {
        let mut cache = DisplayCache::new();
        cache.replace_page(vec![row("1_1", "a"), row("1_2", "b")]);
        cache.replace_page(vec![row("1_3", "c")]);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("1_1").is_none());
        assert_eq!(cache.get("1_3").map(|r| r.word.as_str()), Some("c"));
    }

    #[test]
    fn test_rows_keep_query_order() {
        let mut cache = DisplayCache::new();
        cache.replace_page(vec![row("1_9", "z"), row("1_2", "b"), row("1_5", "m")]);
        let words: Vec<&str> = cache.rows().map(|r| r.word.as_str()).collect();
        assert_eq!(words, vec!["z", "b", "m"]);
    }

    #[test]
    fn test_replace_only_known_rows() {
        let mut cache = DisplayCache::new();
        cache.replace_page(vec![row("1_1", "a")]);
        assert!(cache.replace(row("1_1", "aa")));
        assert_eq!(cache.get("1_1").unwrap().word, "aa");
        assert!(!cache.replace(row("2_2", "x")));
        assert!(cache.get("2_2").is_none());
    }

    #[test]
    fn test_page_count_bounds() {
        let cases = [(0, 30, 1), (1, 30, 1), (30, 30, 1), (31, 30, 2), (95, 30, 4), (7, 1, 7)];
        for (total, size, expected) in cases {
            let mut p = Pagination::new(size);
            p.set_total(total);
            assert_eq!(p.page_count(), expected, "total={total} size={size}");
        }
    }

    #[test]
    fn test_navigation_is_bounded() {
        let mut p = Pagination::new(10);
        p.set_total(25);
        assert!(!p.prev());
        assert!(p.next());
        assert!(p.next());
        assert!(!p.next());
        assert_eq!(p.page, 2);
        assert_eq!(p.offset(), 20);
        assert_eq!(p.label(), "3 / 3");

        p.set_total(5);
        assert_eq!(p.page, 0);
    }
}
