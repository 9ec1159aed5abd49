//! Property-based tests, random operation sequences checked against a
//! flat model of the sequence.

use colored_avl_index::{Color, ColorMask, Palette, Tree};
use proptest::prelude::*;

const LABELS: [&str; 4] = ["INSERT", "UPDATE", "DELETE", "NONE"];

#[derive(Clone, Debug)]
enum Op {
    Add {
        pos_pct: f64,
        color: usize,
        value: Option<u8>,
        size: usize,
    },
    AddMasked {
        pos_pct: f64,
        mask: u8,
        color: usize,
        value: Option<u8>,
        size: usize,
    },
    Remove {
        pos_pct: f64,
        mask: u8,
        size: usize,
    },
    Set {
        pos_pct: f64,
        color: usize,
        value: Option<u8>,
        size: usize,
    },
    Recolor {
        pos_pct: f64,
        color: usize,
    },
}

fn arbitrary_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0.0..=1.0f64, 0..4usize, prop::option::of(0..3u8), 1..4usize)
            .prop_map(|(pos_pct, color, value, size)| Op::Add { pos_pct, color, value, size }),
        2 => (0.0..=1.0f64, 0..16u8, 0..4usize, prop::option::of(0..3u8), 1..4usize)
            .prop_map(|(pos_pct, mask, color, value, size)| Op::AddMasked { pos_pct, mask, color, value, size }),
        2 => (0.0..=1.0f64, 1..16u8, 1..6usize)
            .prop_map(|(pos_pct, mask, size)| Op::Remove { pos_pct, mask, size }),
        1 => (0.0..=1.0f64, 0..4usize, prop::option::of(0..3u8), 1..3usize)
            .prop_map(|(pos_pct, color, value, size)| Op::Set { pos_pct, color, value, size }),
        1 => (0.0..=1.0f64, 0..4usize)
            .prop_map(|(pos_pct, color)| Op::Recolor { pos_pct, color }),
    ]
}

fn color(index: usize) -> Color {
    Color::from_index(index).unwrap()
}

fn position(pos_pct: f64, len: usize) -> usize {
    ((pos_pct * len as f64) as usize).min(len)
}

struct Model {
    entries: Vec<(Color, Option<u8>)>,
}

impl Model {
    fn size(&self, mask: ColorMask) -> usize {
        self.entries.iter().filter(|(c, _)| mask.contains(*c)).count()
    }

    fn positions(&self, mask: ColorMask) -> Vec<usize> {
        (0..self.entries.len())
            .filter(|i| mask.contains(self.entries[*i].0))
            .collect()
    }
}

// apply `op` to both, return false when the op did not apply.
fn apply(tree: &mut Tree<u8>, model: &mut Model, op: &Op) -> bool {
    let all = tree.all_colors();
    let len = model.entries.len();
    match op {
        Op::Add { pos_pct, color: c, value, size } => {
            let index = position(*pos_pct, len);
            tree.add(index, all, color(*c), *value, *size).unwrap();
            for _ in 0..*size {
                model.entries.insert(index, (color(*c), *value));
            }
        }
        Op::AddMasked { pos_pct, mask, color: c, value, size } => {
            // the new color is always part of the view it is added in.
            let col = color(*c);
            let mask = ColorMask::from_bits(*mask) | col;
            let positions = model.positions(mask);
            let index = position(*pos_pct, positions.len());
            tree.add(index, mask, col, *value, *size).unwrap();

            assert_eq!(tree.len(), len + size);
            for i in index..index + size {
                let element = tree.get(i, mask).unwrap();
                assert_eq!(tree.color(element).unwrap(), col);
                assert_eq!(tree.value(element).unwrap().cloned(), *value);
            }
            // lands between its neighbours in the masked view.
            let abs = tree.convert_index_color(index, mask, all).unwrap().unwrap();
            let lo = if index == 0 { 0 } else { positions[index - 1] + 1 };
            let hi = positions.get(index).copied().unwrap_or(len);
            assert!(lo <= abs && abs <= hi, "{} not in {}..={}", abs, lo, hi);
            for _ in 0..*size {
                model.entries.insert(abs, (col, *value));
            }
        }
        Op::Remove { pos_pct, mask, size } => {
            let mask = ColorMask::from_bits(*mask);
            let positions = model.positions(mask);
            if positions.is_empty() {
                return false;
            }
            let index = position(*pos_pct, positions.len() - 1);
            let size = (*size).min(positions.len() - index);
            tree.remove(index, mask, size).unwrap();
            for pos in positions[index..index + size].iter().rev() {
                model.entries.remove(*pos);
            }
        }
        Op::Set { pos_pct, color: c, value, size } => {
            if len == 0 {
                return false;
            }
            let index = position(*pos_pct, len - 1);
            let size = (*size).min(len - index);
            tree.set(index, all, color(*c), *value, size).unwrap();
            model.entries.drain(index..index + size);
            for _ in 0..size {
                model.entries.insert(index, (color(*c), *value));
            }
        }
        Op::Recolor { pos_pct, color: c } => {
            if len == 0 {
                return false;
            }
            let index = position(*pos_pct, len - 1);
            let element = tree.get(index, all).unwrap();
            let start = tree.index_of_node(element, all).unwrap();
            let run = tree.run_size(element).unwrap();
            tree.set_color(element, color(*c)).unwrap();
            for entry in model.entries[start..start + run].iter_mut() {
                entry.0 = color(*c);
            }
        }
    }
    true
}

fn build(ops: &[Op]) -> (Tree<u8>, Model) {
    let palette = Palette::new(&LABELS).unwrap();
    let mut tree = Tree::new("proptest", palette);
    let mut model = Model { entries: vec![] };
    for op in ops {
        apply(&mut tree, &mut model, op);
        tree.validate().unwrap();
    }
    (tree, model)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Every index of every color view matches the flat model.
    #[test]
    fn matches_flat_model(ops in prop::collection::vec(arbitrary_op(), 1..80), mask in 1..16u8) {
        let (tree, model) = build(&ops);
        let mask = ColorMask::from_bits(mask);

        prop_assert_eq!(tree.len(), model.entries.len());
        prop_assert_eq!(tree.size(mask), model.size(mask));
        for (index, pos) in model.positions(mask).into_iter().enumerate() {
            let element = tree.get(index, mask).unwrap();
            prop_assert_eq!(tree.color(element).unwrap(), model.entries[pos].0);
            prop_assert_eq!(tree.value(element).unwrap().cloned(), model.entries[pos].1);
        }
    }

    /// Translating into another view and back recovers the index,
    /// whenever the element belongs to both views.
    #[test]
    fn convert_round_trip(ops in prop::collection::vec(arbitrary_op(), 1..80), a in 1..16u8, b in 1..16u8) {
        let (tree, _) = build(&ops);
        let (a, b) = (ColorMask::from_bits(a), ColorMask::from_bits(b));
        for i in 0..tree.size(a) {
            let element = tree.get(i, a).unwrap();
            if b.contains(tree.color(element).unwrap()) {
                let j = tree.convert_index_color(i, a, b).unwrap().unwrap();
                prop_assert_eq!(tree.convert_index_color(j, b, a).unwrap(), Some(i));
            }
        }
    }

    /// Cursor scan yields the same sequence as indexed access.
    #[test]
    fn cursor_matches_get(ops in prop::collection::vec(arbitrary_op(), 1..80), mask in 1..16u8) {
        let (tree, model) = build(&ops);
        let mask = ColorMask::from_bits(mask);
        let mut cursor = tree.cursor();
        let mut index = 0;
        while let Some(element) = cursor.next(mask) {
            prop_assert_eq!(cursor.index(mask), Some(index));
            prop_assert_eq!(tree.get(index, mask).unwrap(), element);
            index += 1;
        }
        prop_assert_eq!(index, model.size(mask));
    }

    /// A cursor started at any index continues exactly where a full
    /// scan would.
    #[test]
    fn cursor_at_resumes(ops in prop::collection::vec(arbitrary_op(), 1..60), mask in 1..16u8, pct in 0.0..=1.0f64) {
        let (tree, _) = build(&ops);
        let mask = ColorMask::from_bits(mask);
        let all = tree.all_colors();
        let start = position(pct, tree.size(mask));
        let mut cursor = tree.cursor_at(start, mask).unwrap();
        for index in start..tree.size(mask) {
            let element = cursor.next(mask).unwrap();
            prop_assert_eq!(cursor.index(mask), Some(index));
            let abs = tree.convert_index_color(index, mask, all).unwrap();
            prop_assert_eq!(cursor.index(all), abs);
            prop_assert_eq!(tree.get(index, mask).unwrap(), element);
        }
        prop_assert!(cursor.next(mask).is_none());
    }
}
