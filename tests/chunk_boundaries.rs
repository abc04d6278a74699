//! Property tests: results never depend on where chunk boundaries fall.
//!
//! Generated arrays mix indexed string fields, numbers, nested objects and
//! arrays, with structural characters and escaped quotes inside strings.

use std::fs;

use jsonidx::{
    ByteRange, DirStorage, Elements, IndexBuilder, IndexStore, ScanState,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Strings without backslashes; quotes are escaped by the serializer.
fn text() -> impl Strategy<Value = String> {
    "[a-z0-9 {}\\[\\],:\"]{0,8}"
}

fn element() -> impl Strategy<Value = Value> {
    (
        "[0-9]{1,3}",
        text(),
        any::<u16>(),
        prop::collection::vec(text(), 0..3),
        prop::option::of(("[0-9]{1,3}", text())),
    )
        .prop_map(|(id, name, n, tags, nested)| {
            let mut value = json!({"id": id, "name": name, "n": n, "tags": tags});
            if let Some((id, name)) = nested {
                value["inner"] = json!({"id": id, "name": name});
            }
            value
        })
}

fn array() -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(element(), 0..12)
}

fn build(data: &std::path::Path, chunk_size: usize) -> (TempDir, IndexStore, u64) {
    let index_dir = TempDir::new().unwrap();
    let fields = vec!["id".to_string(), "name".to_string()];
    let mut store =
        IndexStore::empty(Box::new(DirStorage::new(index_dir.path())), &fields, 99).unwrap();
    let meta = IndexBuilder::new(chunk_size).build(data, &mut store).unwrap();
    (index_dir, store, meta.total)
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn ranges_cover_each_element_once(elements in array(), pretty in any::<bool>()) {
        let text = if pretty {
            serde_json::to_string_pretty(&elements).unwrap()
        } else {
            serde_json::to_string(&elements).unwrap()
        };

        let mut ranges: Vec<ByteRange> = Vec::new();
        ScanState::new().scan(text.as_bytes(), &mut ranges);

        prop_assert_eq!(ranges.len(), elements.len());
        for (range, expected) in ranges.iter().zip(&elements) {
            let slice = &text.as_bytes()[range.start as usize..range.end as usize];
            let decoded: Value = serde_json::from_slice(slice).unwrap();
            prop_assert_eq!(&decoded, expected);
        }
    }

    #[test]
    fn chunked_build_matches_single_chunk(elements in array(), chunk_size in 1usize..48) {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data.json");
        let text = serde_json::to_string(&elements).unwrap();
        fs::write(&data, &text).unwrap();

        let (_a, whole, whole_total) = build(&data, text.len().max(1));
        let (_b, chunked, chunked_total) = build(&data, chunk_size);
        prop_assert_eq!(whole_total, elements.len() as u64);
        prop_assert_eq!(chunked_total, whole_total);

        for element in &elements {
            let id = element["id"].as_str().unwrap();
            prop_assert_eq!(
                chunked.query([("id", id)]).unwrap(),
                whole.query([("id", id)]).unwrap()
            );
            prop_assert_eq!(chunked.get_entry(id).unwrap(), whole.get_entry(id).unwrap());
        }
    }

    #[test]
    fn extraction_matches_any_chunk_size(elements in array(), chunk_size in 1usize..48) {
        let text = serde_json::to_string_pretty(&elements).unwrap();

        let extracted: Vec<Value> = Elements::new(text.as_bytes(), chunk_size)
            .map(|raw| serde_json::from_slice(&raw.unwrap()).unwrap())
            .collect();
        prop_assert_eq!(extracted, elements);
    }
}
