use expman_core::to_canonical_json_bytes;
use expman_registry::{content_hash, project, ConfigSummary};
use proptest::prelude::*;
use serde_json::{Map, Value};

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i32>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[a-z]{0,6}".prop_map(Value::from),
    ]
}

fn config() -> impl Strategy<Value = Entries> {
    prop::collection::vec(
        (
            "[a-d]{1,2}",
            prop::collection::vec(("[w-z]{1,2}", leaf()), 0..4),
        ),
        0..5,
    )
}

fn build(entries: &[(String, Vec<(String, Value)>)], reverse: bool) -> Value {
    let mut outer: Vec<_> = entries.to_vec();
    if reverse {
        outer.reverse();
    }
    let mut root = Map::new();
    for (key, mut children) in outer {
        if reverse {
            children.reverse();
        }
        let mut inner = Map::new();
        for (child, value) in children {
            inner.entry(child).or_insert(value);
        }
        root.entry(key).or_insert(Value::Object(inner));
    }
    Value::Object(root)
}

type Entries = Vec<(String, Vec<(String, Value)>)>;

fn dedup_first(entries: &[(String, Vec<(String, Value)>)]) -> Entries {
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for (key, children) in entries {
        if seen.contains(key) {
            continue;
        }
        seen.push(key.clone());
        let mut child_seen = Vec::new();
        let mut kept = Vec::new();
        for (child, value) in children {
            if child_seen.contains(child) {
                continue;
            }
            child_seen.push(child.clone());
            kept.push((child.clone(), value.clone()));
        }
        out.push((key.clone(), kept));
    }
    out
}

proptest! {
    #[test]
    fn insertion_order_never_changes_the_hash(
        entries in config(),
        keep in prop::collection::vec("[a-d]{1,2}(\\.[w-z]{1,2})?", 0..4),
    ) {
        let entries = dedup_first(&entries);
        let forward = build(&entries, false);
        let backward = build(&entries, true);
        let left: ConfigSummary = project(&forward, &keep);
        let right: ConfigSummary = project(&backward, &keep);
        prop_assert_eq!(
            to_canonical_json_bytes(&left).unwrap(),
            to_canonical_json_bytes(&right).unwrap()
        );
        prop_assert_eq!(content_hash(&left, 8).unwrap(), content_hash(&right, 8).unwrap());
    }

    #[test]
    fn projection_is_a_pure_function(entries in config()) {
        let value = build(&dedup_first(&entries), false);
        let keep = vec!["a".to_string(), "b.x".to_string()];
        prop_assert_eq!(project(&value, &keep), project(&value, &keep));
    }
}
