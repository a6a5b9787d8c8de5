use proptest::prelude::*;

use crate::lru::Lru;

#[test]
fn evicts_least_recently_used() {
    let mut lru = Lru::new(2);
    assert_eq!(lru.insert("a", 1), None);
    assert_eq!(lru.insert("b", 2), None);
    assert_eq!(lru.get("a"), Some(&1));
    assert_eq!(lru.insert("c", 3), Some(("b", 2)));
    assert!(lru.contains("a") && lru.contains("c"));
    assert_eq!(lru.keys_by_recency(), vec!["a", "c"]);
}

#[test]
fn peek_does_not_refresh() {
    let mut lru = Lru::new(2);
    lru.insert(1, "one");
    lru.insert(2, "two");
    assert_eq!(lru.peek(&1), Some(&"one"));
    assert_eq!(lru.insert(3, "three"), Some((1, "one")));
}

#[test]
fn replacing_a_key_never_evicts() {
    let mut lru = Lru::new(1);
    lru.insert("k", 1);
    assert_eq!(lru.insert("k", 2), None);
    assert_eq!(lru.get("k"), Some(&2));
    assert_eq!(lru.len(), 1);
}

#[test]
fn zero_capacity_holds_one_entry() {
    let mut lru = Lru::new(0);
    assert_eq!(lru.capacity(), 1);
    lru.insert('x', ());
    assert_eq!(lru.insert('y', ()), Some(('x', ())));
}

#[test]
fn remove_and_clear() {
    let mut lru = Lru::new(4);
    lru.insert(1, 10);
    lru.insert(2, 20);
    assert_eq!(lru.remove(&1), Some(10));
    assert_eq!(lru.remove(&1), None);
    lru.clear();
    assert!(lru.is_empty());
}

#[derive(Debug, Clone)]
enum Op {
    Get(u8),
    Insert(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![(0u8..8).prop_map(Op::Get), (0u8..8).prop_map(Op::Insert)]
}

proptest! {
    /// Matches a reference recency list.
    #[test]
    fn agrees_with_recency_list(capacity in 1usize..5, ops in prop::collection::vec(op(), 0..64)) {
        let mut lru = Lru::new(capacity);
        let mut model: Vec<u8> = Vec::new();
        for op in ops {
            match op {
                Op::Get(k) => {
                    let hit = lru.get(&k).is_some();
                    prop_assert_eq!(hit, model.contains(&k));
                    if hit {
                        model.retain(|&m| m != k);
                        model.push(k);
                    }
                }
                Op::Insert(k) => {
                    let evicted = lru.insert(k, ()).map(|(key, _)| key);
                    let expected = if model.contains(&k) {
                        model.retain(|&m| m != k);
                        None
                    } else if model.len() == capacity {
                        Some(model.remove(0))
                    } else {
                        None
                    };
                    model.push(k);
                    prop_assert_eq!(evicted, expected);
                }
            }
            prop_assert!(lru.len() <= capacity);
        }
        prop_assert_eq!(lru.keys_by_recency(), model);
    }
}
