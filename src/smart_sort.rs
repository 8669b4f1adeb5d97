//! Popularity sort: order games so that those sharing the longest common
//! move-sequence prefix cluster together, most-populous line first, without
//! materializing a prefix tree. O(N log N + N·L) for N games with longest
//! considered blob length L.

use crate::games::MoveBlob;
use std::cmp::Ordering;

/// Working record for one game during the sort. `counts[j]` holds the size
/// of the run this game belonged to at depth `j`; it stays 0 for depths the
/// game never reaches.
struct ClusterElement {
    original_index: usize,
    tie_break_key: u32,
    blob: Vec<u8>,
    counts: Vec<u32>,
}

/// Reorder `games` by shared-prefix popularity. Empty and single-element
/// lists are left untouched; the result is always a permutation of the
/// input, and re-sorting an already sorted list changes nothing.
pub fn popularity_sort<T: MoveBlob>(games: &mut Vec<T>) {
    popularity_sort_grouped(games, |_, _| 0);
}

/// Same, with an explicit pre-grouping key: games are partitioned by
/// ascending key first and clustered by popularity within each group.
pub fn popularity_sort_grouped<T: MoveBlob>(
    games: &mut Vec<T>,
    group_key: impl Fn(usize, &T) -> u32,
) {
    if games.len() < 2 {
        return;
    }
    let permutation = popularity_permutation(games, group_key);

    // Gather through the permutation instead of shuffling in place; the
    // counting passes above never touch the caller's list.
    let mut slots: Vec<Option<T>> = games.drain(..).map(Some).collect();
    for index in permutation {
        if let Some(game) = slots[index].take() {
            games.push(game);
        }
    }
}

fn popularity_permutation<T: MoveBlob>(
    games: &[T],
    group_key: impl Fn(usize, &T) -> u32,
) -> Vec<usize> {
    let mut elements: Vec<ClusterElement> = games
        .iter()
        .enumerate()
        .map(|(index, game)| {
            let blob = game.move_blob().to_vec();
            let counts = vec![0u32; blob.len()];
            ClusterElement {
                original_index: index,
                tie_break_key: group_key(index, game),
                blob,
                counts,
            }
        })
        .collect();

    // Pass 1: lexicographic sort brings games sharing any prefix together.
    elements.sort_by(|a, b| {
        a.tie_break_key
            .cmp(&b.tie_break_key)
            .then_with(|| a.blob.cmp(&b.blob))
    });

    // Pass 2: per column, the length of each maximal run of identical
    // tokens is exactly the population of that prefix subtree. Runs are
    // recomputed from scratch at every depth; a cluster that is unified at
    // depth j can fragment at depth j + 1.
    let mut column = 0usize;
    loop {
        let mut any_token = false;
        let mut run_start: Option<usize> = None;
        let mut current = 0u8;
        let mut run_key = 0u32;
        for i in 0..elements.len() {
            let token = elements[i].blob.get(column).copied();
            if token.is_some() {
                any_token = true;
            }
            // A run never crosses a grouping-key boundary, even when the
            // token happens to repeat across it.
            match (run_start, token) {
                (None, Some(t)) => {
                    run_start = Some(i);
                    current = t;
                    run_key = elements[i].tie_break_key;
                }
                (Some(start), Some(t)) if t != current || elements[i].tie_break_key != run_key => {
                    close_run(&mut elements, start, i, column);
                    run_start = Some(i);
                    current = t;
                    run_key = elements[i].tie_break_key;
                }
                (Some(start), None) => {
                    close_run(&mut elements, start, i, column);
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            let end = elements.len();
            close_run(&mut elements, start, end, column);
        }
        if !any_token {
            break;
        }
        column += 1;
    }

    // Pass 3: popular runs first. Positions beyond a game's own length
    // count as zero, so a line that keeps going outranks one that stops.
    elements.sort_by(compare_counts);

    elements.iter().map(|e| e.original_index).collect()
}

fn close_run(elements: &mut [ClusterElement], start: usize, end: usize, column: usize) {
    let count = (end - start) as u32;
    for element in &mut elements[start..end] {
        element.counts[column] = count;
    }
}

fn compare_counts(a: &ClusterElement, b: &ClusterElement) -> Ordering {
    a.tie_break_key.cmp(&b.tie_break_key).then_with(|| {
        let longest = a.counts.len().max(b.counts.len());
        for i in 0..longest {
            let ca = a.counts.get(i).copied().unwrap_or(0);
            let cb = b.counts.get(i).copied().unwrap_or(0);
            if ca != cb {
                // Larger count sorts first.
                return cb.cmp(&ca);
            }
        }
        // Identical count profiles: the shorter game leads.
        a.blob.len().cmp(&b.blob.len())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Game {
        tag: usize,
        blob: Vec<u8>,
    }

    impl MoveBlob for Game {
        fn move_blob(&self) -> &[u8] {
            &self.blob
        }
    }

    fn games(blobs: &[&[u8]]) -> Vec<Game> {
        blobs
            .iter()
            .enumerate()
            .map(|(tag, blob)| Game {
                tag,
                blob: blob.to_vec(),
            })
            .collect()
    }

    fn blob_strings(list: &[Game]) -> Vec<String> {
        list.iter()
            .map(|g| String::from_utf8_lossy(&g.blob).into_owned())
            .collect()
    }

    #[test]
    fn empty_and_single_are_no_ops() {
        let mut none: Vec<Game> = Vec::new();
        popularity_sort(&mut none);
        assert!(none.is_empty());

        let mut one = games(&[b"AB"]);
        popularity_sort(&mut one);
        assert_eq!(blob_strings(&one), vec!["AB"]);
    }

    #[test]
    fn output_is_a_permutation_by_identity() {
        let mut list = games(&[b"AAB", b"AAC", b"AAB", b"ABB", b"Z"]);
        let mut expected_tags: Vec<usize> = list.iter().map(|g| g.tag).collect();
        popularity_sort(&mut list);
        let mut got_tags: Vec<usize> = list.iter().map(|g| g.tag).collect();
        expected_tags.sort_unstable();
        got_tags.sort_unstable();
        assert_eq!(expected_tags, got_tags);
    }

    #[test]
    fn popular_prefix_clusters_first() {
        let mut list = games(&[b"AAB", b"AAC", b"AAB", b"ABB"]);
        popularity_sort(&mut list);
        let order = blob_strings(&list);
        // The two AAB games share depth-2 run length 2; they lead and stay
        // adjacent, ahead of AAC and ABB.
        assert_eq!(order[0], "AAB");
        assert_eq!(order[1], "AAB");
        assert!(order[2..].contains(&"AAC".to_string()));
        assert!(order[2..].contains(&"ABB".to_string()));
        let aac = order.iter().position(|b| b == "AAC");
        let abb = order.iter().position(|b| b == "ABB");
        assert!(aac < abb, "AAC shares the deeper prefix and must lead ABB");
    }

    #[test]
    fn longer_continuation_outranks_stub() {
        let mut list = games(&[b"X", b"XY"]);
        popularity_sort(&mut list);
        assert_eq!(blob_strings(&list), vec!["XY", "X"]);
    }

    #[test]
    fn sorting_twice_is_idempotent() {
        let mut list = games(&[b"AAB", b"AAC", b"AAB", b"ABB", b"X", b"XY", b"AAB"]);
        popularity_sort(&mut list);
        let first = blob_strings(&list);
        popularity_sort(&mut list);
        assert_eq!(first, blob_strings(&list));
    }

    #[test]
    fn opening_lines_order_by_population() {
        // Seven games mirroring an opening tree: the four "dd" games outrank
        // the three "dn" games at depth 1; within each branch the popular
        // "f" finish leads and the lone sideline trails.
        let mut list = games(&[
            b"dnce", b"dncf", b"dncf", b"ddce", b"ddcf", b"ddcf", b"ddxy",
        ]);
        popularity_sort(&mut list);
        assert_eq!(
            blob_strings(&list),
            vec!["ddcf", "ddcf", "ddce", "ddxy", "dncf", "dncf", "dnce"]
        );
    }

    #[test]
    fn grouping_key_partitions_before_popularity() {
        let mut list = games(&[b"AA", b"BB", b"AA", b"BB", b"BB"]);
        // Odd original indexes to group 0, even to group 1.
        popularity_sort_grouped(&mut list, |_, game| (game.tag % 2 == 0) as u32);
        let tags: Vec<usize> = list.iter().map(|g| g.tag).collect();
        // Group 0 (tags 1, 3) leads; within group 1 the two AA games beat
        // the lone BB.
        assert_eq!(tags, vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn runs_do_not_cross_group_boundaries() {
        // Group 0 ends with a B game and group 1 starts with one; the two
        // must not pool into a single run, or the lone BX would outrank the
        // pair of C games in its group.
        let mut list = games(&[b"B", b"BX", b"C", b"C"]);
        popularity_sort_grouped(&mut list, |_, game| (game.tag > 0) as u32);
        assert_eq!(blob_strings(&list), vec!["B", "C", "C", "BX"]);
    }

    #[test]
    fn short_games_excluded_from_deep_columns() {
        // "A" never reaches column 1, so its counts stay 0 there and both
        // continuations outrank it.
        let mut list = games(&[b"A", b"AB", b"AB"]);
        popularity_sort(&mut list);
        assert_eq!(blob_strings(&list), vec!["AB", "AB", "A"]);
    }
}
