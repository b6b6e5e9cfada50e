use chidb::btree::Btree;
use chidb::cell::{Cell, NodeType};
use chidb::cursor::Cursor;
use chidb::error::Error;
use chidb::header::{DEFAULT_PAGE_SIZE, MAGIC};

fn tmp_path() -> tempfile::TempPath {
    tempfile::NamedTempFile::new().unwrap().into_temp_path()
}

/// S1: open(new file), close, reopen: page count = 1, node at page 1 is an
/// empty table-leaf, header magic/page size as documented.
#[test]
fn s1_header_init() {
    let path = tmp_path();
    let path_str = path.to_str().unwrap().to_string();

    let bt = Btree::open(&path_str).unwrap();
    assert_eq!(bt.header.page_size, DEFAULT_PAGE_SIZE);
    bt.close().unwrap();

    let mut bt = Btree::open(&path_str).unwrap();
    assert_eq!(bt.page_count(), 1);
    let root = bt.load_node(1).unwrap();
    assert_eq!(root.node_type, NodeType::TableLeaf);
    assert_eq!(root.n_cells, 0);

    let raw = std::fs::read(&path_str).unwrap();
    assert_eq!(&raw[0..16], MAGIC);
    assert_eq!(u16::from_be_bytes(raw[16..18].try_into().unwrap()), DEFAULT_PAGE_SIZE);
}

/// S2: insert 1000 table-leaf cells with 8-byte data, keys 1..=1000, into
/// the tree rooted at page 1. Every key must be findable; key 1001 must not
/// be; the root must have grown into an internal node.
#[test]
fn s2_split_on_1024_byte_page() {
    let path = tmp_path();
    let mut bt = Btree::open(path.to_str().unwrap()).unwrap();

    for key in 1..=1000 {
        bt.insert(1, Cell::TableLeaf { key, data: vec![0u8; 8] }).unwrap();
    }

    let root = bt.load_node(1).unwrap();
    assert_eq!(root.node_type, NodeType::TableInternal, "root should have split into an internal node");

    for key in 1..=1000 {
        assert!(bt.find(1, key as i64).unwrap().is_some(), "key {key} should be findable");
    }
    assert!(bt.find(1, 1001).unwrap().is_none());
}

/// S3: after a root-split, the root's own page number must be unchanged,
/// only its type (now table-internal).
#[test]
fn s3_root_split_preserves_root_page_number() {
    let path = tmp_path();
    let mut bt = Btree::open(path.to_str().unwrap()).unwrap();

    let root_before = bt.load_node(1).unwrap();
    assert_eq!(root_before.page.npage, 1);

    for key in 1..=500 {
        bt.insert(1, Cell::TableLeaf { key, data: vec![0u8; 16] }).unwrap();
    }

    let root_after = bt.load_node(1).unwrap();
    assert_eq!(root_after.page.npage, 1, "root page number must not change across a split");
    assert_eq!(root_after.node_type, NodeType::TableInternal);
}

/// S4: inserting (IdxKey=10, PK=1) then (IdxKey=10, PK=2) into the same
/// index tree rejects the second insert as a duplicate.
#[test]
fn s4_index_rejects_duplicate_key() {
    let path = tmp_path();
    let mut bt = Btree::open(path.to_str().unwrap()).unwrap();
    let index_root = bt.create_root(NodeType::IndexLeaf).unwrap();

    bt.insert(index_root, Cell::IndexLeaf { idx_key: 10, pk: 1 }).unwrap();
    let err = bt.insert(index_root, Cell::IndexLeaf { idx_key: 10, pk: 2 }).unwrap_err();
    assert!(matches!(err, Error::Duplicate));
}

/// S5: inserting keys {5, 2, 9, 1, 7}, rewinding, and walking `next` until
/// exhausted enumerates them in ascending order.
#[test]
fn s5_cursor_rewind_next_enumerates_in_order() {
    let path = tmp_path();
    let mut bt = Btree::open(path.to_str().unwrap()).unwrap();
    for key in [5, 2, 9, 1, 7] {
        bt.insert(1, Cell::TableLeaf { key, data: vec![] }).unwrap();
    }

    let mut cursor = Cursor::new(1);
    let mut keys = Vec::new();
    let mut has_row = cursor.rewind(&mut bt).unwrap();
    while has_row {
        keys.push(cursor.current().unwrap().key());
        has_row = cursor.next(&mut bt).unwrap();
    }
    assert_eq!(keys, vec![1, 2, 5, 7, 9]);
}

/// S6: against the same tree, `seek_ge(6)` lands on key 7; `seek_ge(10)`
/// finds nothing (10 is past the largest key, 9).
#[test]
fn s6_seek_ge() {
    let path = tmp_path();
    let mut bt = Btree::open(path.to_str().unwrap()).unwrap();
    for key in [5, 2, 9, 1, 7] {
        bt.insert(1, Cell::TableLeaf { key, data: vec![] }).unwrap();
    }

    let mut cursor = Cursor::new(1);
    assert!(cursor.seek_ge(&mut bt, 6).unwrap());
    assert_eq!(cursor.current().unwrap().key(), 7);

    assert!(!cursor.seek_ge(&mut bt, 10).unwrap());
}

/// S7: an index tree large enough to force a split still finds every
/// inserted key (including whichever ones ended up promoted to an
/// internal-only cell), enumerates them all via a cursor, and rejects a
/// repeat insert of any of them.
#[test]
fn s7_index_split_keeps_promoted_keys_findable_and_unique() {
    let path = tmp_path();
    let mut bt = Btree::open(path.to_str().unwrap()).unwrap();
    let index_root = bt.create_root(NodeType::IndexLeaf).unwrap();

    let n: i32 = 500;
    for idx_key in 0..n {
        bt.insert(index_root, Cell::IndexLeaf { idx_key, pk: idx_key }).unwrap();
    }
    let root = bt.load_node(index_root).unwrap();
    assert_eq!(root.node_type, NodeType::IndexInternal, "500 inserts should force a split");

    for idx_key in 0..n {
        let found = bt.find(index_root, idx_key as i64).unwrap();
        assert!(found.is_some(), "idx_key {idx_key} unfindable after split");
    }

    let mut cursor = Cursor::new(index_root);
    let mut keys = Vec::new();
    let mut has_row = cursor.rewind(&mut bt).unwrap();
    while has_row {
        keys.push(cursor.current().unwrap().key());
        has_row = cursor.next(&mut bt).unwrap();
    }
    let expected: Vec<i64> = (0..n as i64).collect();
    assert_eq!(keys, expected);

    for idx_key in 0..n {
        let err = bt
            .insert(index_root, Cell::IndexLeaf { idx_key, pk: idx_key + 10_000 })
            .unwrap_err();
        assert!(matches!(err, Error::Duplicate), "idx_key {idx_key} should be rejected as duplicate");
    }
}
