use crate::color::{Color, ColorMask, Palette};
use crate::tree::Tree;

fn palette() -> Palette {
    Palette::new(&["INSERT", "UPDATE", "DELETE", "NONE"]).unwrap()
}

fn color(label: &str) -> Color {
    palette().color(label).unwrap()
}

fn mask(label: &str) -> ColorMask {
    color(label).into()
}

// [2 NONE x] [1 INSERT y] [3 NONE x] [2 DELETE z]
fn make_tree() -> Tree<&'static str> {
    let mut tree: Tree<&'static str> = Tree::new("test-cursor", palette());
    let all = tree.all_colors();
    tree.add(0, all, color("NONE"), Some("x"), 5).unwrap();
    tree.add(2, all, color("INSERT"), Some("y"), 1).unwrap();
    tree.add(6, all, color("DELETE"), Some("z"), 2).unwrap();
    tree
}

#[test]
fn test_next_all() {
    let tree = make_tree();
    let all = tree.all_colors();
    let mut cursor = tree.cursor();
    assert_eq!(cursor.index(all), None);
    assert_eq!(cursor.element(), None);

    let mut items = vec![];
    while cursor.has_next(all) {
        let element = cursor.next(all).unwrap();
        assert_eq!(cursor.element(), Some(element));
        items.push((cursor.index(all).unwrap(), *cursor.value().unwrap()));
    }
    let expect = vec![
        (0, "x"),
        (1, "x"),
        (2, "y"),
        (3, "x"),
        (4, "x"),
        (5, "x"),
        (6, "z"),
        (7, "z"),
    ];
    assert_eq!(items, expect);
    assert!(cursor.next(all).is_none());
    assert!(!cursor.has_next_node(all));
}

#[test]
fn test_next_masked() {
    let tree = make_tree();
    let (all, none) = (tree.all_colors(), mask("NONE"));
    let mut cursor = tree.cursor();

    let mut indices = vec![];
    while cursor.next(none).is_some() {
        assert_eq!(cursor.color(), Some(color("NONE")));
        indices.push((cursor.index(none).unwrap(), cursor.index(all).unwrap()));
    }
    assert_eq!(indices, vec![(0, 0), (1, 1), (2, 3), (3, 4), (4, 5)]);

    // other colors are still counted while skipped.
    assert_eq!(cursor.index(mask("INSERT")), Some(1));
    assert!(cursor.has_next(mask("DELETE")));
    cursor.next(mask("DELETE")).unwrap();
    assert_eq!(cursor.index(all), Some(6));
    assert_eq!(cursor.index(none), Some(5));
}

#[test]
fn test_next_node() {
    let tree = make_tree();
    let all = tree.all_colors();

    let mut cursor = tree.cursor();
    let mut starts = vec![];
    while let Some(element) = cursor.next_node(all) {
        starts.push(cursor.node_start_index(all));
        assert_eq!(tree.index_of_node(element, all), Ok(cursor.node_start_index(all)));
        assert_eq!(cursor.offset(), 0);
    }
    assert_eq!(starts, vec![0, 2, 3, 6]);

    let changes = mask("INSERT") | color("DELETE");
    let mut cursor = tree.cursor();
    let mut ends = vec![];
    while cursor.has_next_node(changes) {
        cursor.next_node(changes).unwrap();
        ends.push((cursor.node_start_index(all), cursor.node_end_index(changes)));
    }
    assert_eq!(ends, vec![(2, 1), (6, 3)]);
}

#[test]
fn test_next_node_mid_run() {
    let tree = make_tree();
    let all = tree.all_colors();
    let mut cursor = tree.cursor();
    cursor.next(all).unwrap();
    cursor.next(all).unwrap();
    assert_eq!(cursor.offset(), 1);
    // whole remaining run is skipped.
    cursor.next_node(all).unwrap();
    assert_eq!(cursor.index(all), Some(2));
    assert_eq!(cursor.color(), Some(color("INSERT")));
}

#[test]
fn test_cursor_at() {
    let tree = make_tree();
    let (all, none) = (tree.all_colors(), mask("NONE"));

    let mut cursor = tree.cursor_at(3, all).unwrap();
    assert_eq!(cursor.index(all), Some(2));
    cursor.next(all).unwrap();
    assert_eq!(cursor.index(all), Some(3));
    assert_eq!(cursor.value(), Some(&"x"));

    let mut cursor = tree.cursor_at(2, none).unwrap();
    assert_eq!(cursor.offset(), 1);
    cursor.next(none).unwrap();
    assert_eq!(cursor.index(none), Some(2));
    assert_eq!(cursor.index(all), Some(3));

    let mut cursor = tree.cursor_at(0, none).unwrap();
    assert!(cursor.element().is_none());
    cursor.next(none).unwrap();
    assert_eq!(cursor.index(all), Some(0));

    let mut cursor = tree.cursor_at(8, all).unwrap();
    assert!(!cursor.has_next(all));
    assert!(cursor.next(all).is_none());
}

#[test]
fn test_clone() {
    let tree = make_tree();
    let all = tree.all_colors();
    let mut cursor = tree.cursor();
    cursor.next(all).unwrap();
    cursor.next(all).unwrap();

    let mut fork = cursor.clone();
    fork.next(all).unwrap();
    fork.next(all).unwrap();
    assert_eq!(fork.index(all), Some(3));
    assert_eq!(cursor.index(all), Some(1));
    cursor.next(all).unwrap();
    assert_eq!(cursor.value(), Some(&"y"));
}

#[test]
fn test_runs_and_values() {
    let tree = make_tree();
    let all = tree.all_colors();

    let runs: Vec<(usize, Option<&&str>)> = tree.runs().map(|r| (r.size, r.value)).collect();
    assert_eq!(
        runs,
        vec![(2, Some(&"x")), (1, Some(&"y")), (3, Some(&"x")), (2, Some(&"z"))]
    );
    assert_eq!(tree.values(all).count(), 8);
    assert_eq!(tree.values(mask("NONE")).count(), 5);
    assert_eq!(tree.values(mask("UPDATE")).count(), 0);
    let deleted: Vec<&str> = tree
        .values(mask("DELETE"))
        .map(|(_, v)| *v.unwrap())
        .collect();
    assert_eq!(deleted, vec!["z", "z"]);
}

#[test]
fn test_empty_tree() {
    let tree: Tree<i64> = Tree::new("test-cursor", palette());
    let all = tree.all_colors();
    let mut cursor = tree.cursor();
    assert!(!cursor.has_next(all));
    assert!(!cursor.has_next_node(all));
    assert!(cursor.next(all).is_none());
    assert!(cursor.next_node(all).is_none());
    assert_eq!(cursor.node_end_index(all), 0);
    assert_eq!(tree.values(all).count(), 0);
}
