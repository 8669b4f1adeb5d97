use crate::games::MoveBlob;
use crate::smart_sort::popularity_sort;
use std::cmp::Ordering;

pub type KeyCompare<T> = Box<dyn Fn(&T, &T) -> Ordering>;

/// Click-driven column sorting for a displayed game list. Clicking the same
/// column repeatedly toggles ascending/descending; clicking a new column
/// starts ascending again. One reserved column always runs the popularity
/// sort, whatever the click parity.
pub struct ColumnSorter<T> {
    columns: Vec<(u32, KeyCompare<T>)>,
    popularity_column: u32,
    last_column: Option<u32>,
    consecutive: u32,
}

impl<T: MoveBlob> ColumnSorter<T> {
    pub fn new(popularity_column: u32) -> Self {
        Self {
            columns: Vec::new(),
            popularity_column,
            last_column: None,
            consecutive: 0,
        }
    }

    pub fn register(&mut self, column: u32, compare: impl Fn(&T, &T) -> Ordering + 'static) {
        self.columns.retain(|(id, _)| *id != column);
        self.columns.push((column, Box::new(compare)));
    }

    /// Handle one header click over `games`. Empty lists are ignored
    /// entirely: neither the order nor the click state changes.
    pub fn click(&mut self, column: u32, games: &mut Vec<T>) {
        if games.is_empty() {
            return;
        }
        if self.last_column == Some(column) {
            self.consecutive += 1;
        } else {
            self.consecutive = 0;
        }
        self.last_column = Some(column);

        if column == self.popularity_column {
            popularity_sort(games);
            return;
        }
        let Some((_, compare)) = self.columns.iter().find(|(id, _)| *id == column) else {
            return;
        };
        if self.consecutive % 2 == 0 {
            games.sort_by(|a, b| compare(a, b));
        } else {
            games.sort_by(|a, b| compare(b, a));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Row {
        name: String,
        blob: Vec<u8>,
    }

    impl MoveBlob for Row {
        fn move_blob(&self) -> &[u8] {
            &self.blob
        }
    }

    fn rows(names: &[&str]) -> Vec<Row> {
        names
            .iter()
            .map(|n| Row {
                name: n.to_string(),
                blob: vec![b'x'],
            })
            .collect()
    }

    fn names(list: &[Row]) -> Vec<String> {
        list.iter().map(|r| r.name.clone()).collect()
    }

    fn sorter() -> ColumnSorter<Row> {
        let mut sorter = ColumnSorter::new(10);
        sorter.register(1, |a: &Row, b: &Row| a.name.cmp(&b.name));
        sorter
    }

    #[test]
    fn first_click_sorts_ascending() {
        let mut list = rows(&["carla", "ann", "bob"]);
        sorter().click(1, &mut list);
        assert_eq!(names(&list), vec!["ann", "bob", "carla"]);
    }

    #[test]
    fn second_click_inverts() {
        let mut list = rows(&["carla", "ann", "bob"]);
        let mut sorter = sorter();
        sorter.click(1, &mut list);
        sorter.click(1, &mut list);
        assert_eq!(names(&list), vec!["carla", "bob", "ann"]);
        sorter.click(1, &mut list);
        assert_eq!(names(&list), vec!["ann", "bob", "carla"]);
    }

    #[test]
    fn switching_columns_resets_to_ascending() {
        let mut list = rows(&["carla", "ann", "bob"]);
        let mut sorter = sorter();
        sorter.register(2, |a: &Row, b: &Row| a.name.len().cmp(&b.name.len()));
        sorter.click(1, &mut list);
        sorter.click(1, &mut list); // descending by name
        sorter.click(2, &mut list); // fresh column: ascending by length
        assert_eq!(names(&list), vec!["ann", "bob", "carla"]);
        sorter.click(1, &mut list); // back to name: ascending again
        assert_eq!(names(&list), vec!["ann", "bob", "carla"]);
    }

    #[test]
    fn popularity_column_ignores_parity() {
        let mut sorter: ColumnSorter<Row> = ColumnSorter::new(10);
        let make = || {
            vec![
                Row {
                    name: "x".into(),
                    blob: b"X".to_vec(),
                },
                Row {
                    name: "xy".into(),
                    blob: b"XY".to_vec(),
                },
            ]
        };
        let mut first = make();
        sorter.click(10, &mut first);
        let mut second = make();
        sorter.click(10, &mut second);
        assert_eq!(names(&first), names(&second));
        assert_eq!(names(&first), vec!["xy", "x"]);
    }

    #[test]
    fn empty_list_is_untouched() {
        let mut list: Vec<Row> = Vec::new();
        sorter().click(1, &mut list);
        assert!(list.is_empty());
    }

    #[test]
    fn unregistered_column_keeps_order() {
        let mut list = rows(&["carla", "ann"]);
        sorter().click(7, &mut list);
        assert_eq!(names(&list), vec!["carla", "ann"]);
    }
}
