/*
The writable B-tree file manager: node load/allocate/write, cell get/insert
(delegated to `cell::Node`), keyed find, and balanced insert with root-split
and non-root split.

Grounded in `original_source/src/libchidb/btree.c`: `chidb_Btree_open`
(header init, folded into `Btree::open`), `chidb_Btree_getNodeByPage`
(`load_node`), `chidb_Btree_find`, `chidb_Btree_insert` (root-split path),
`chidb_Btree_insertNonFull` (leaf/interior descent and duplicate detection),
`chidb_Btree_split` (non-root split, reusing the child's own page number for
the right half). Unlike the reference, full children are split proactively
— before descent, rather than reactively discovered mid-insert — which
keeps the recursion a plain top-down pass instead of a bubble-up return
value, while producing the same tree shape.

Child-selection convention: an internal cell's key is the largest key in
its child's subtree (`key <= cell.key()` routes into `cell.child()`); keys
greater than every cell's key route through `right_page`. This is the
convention `find`, `insert_into`, and the split routines all agree on.
*/

use crate::cell::{Cell, Node, NodeType};
use crate::error::{Error, Result};
use crate::header::DatabaseHeader;
use crate::pager::{MemPage, PageNum, Pager};

pub struct Btree {
    pager: Pager,
    pub header: DatabaseHeader,
}

impl Btree {
    /// Opens `path`, initializing a fresh file header and an empty
    /// table-leaf root at page 1 if the file is new. Existing files are
    /// validated against the fixed header constants (`header::parse`).
    pub fn open(path: &str) -> Result<Self> {
        let mut pager = Pager::open(path)?;
        let header = match pager.read_header() {
            Ok(buf) => {
                let header = DatabaseHeader::parse(&buf)?;
                pager.set_page_size(header.page_size);
                pager.sync_page_count()?;
                header
            }
            Err(Error::NoHeader) => {
                let header = DatabaseHeader::new(crate::header::DEFAULT_PAGE_SIZE);
                pager.set_page_size(header.page_size);
                let mut data = vec![0u8; header.page_size as usize];
                data[0..100].copy_from_slice(&header.to_bytes());
                let page = MemPage { npage: 1, data };
                let mut root = Node::init_empty(page, NodeType::TableLeaf, header.page_size);
                root.sync_header();
                pager.write_page(&root.page)?;
                header
            }
            Err(e) => return Err(e),
        };
        Ok(Btree { pager, header })
    }

    pub fn close(self) -> Result<()> {
        self.pager.close()
    }

    pub fn page_size(&self) -> u16 {
        self.pager.page_size
    }

    pub fn page_count(&self) -> PageNum {
        self.pager.page_count()
    }

    pub fn load_node(&mut self, npage: PageNum) -> Result<Node> {
        Node::load(self.pager.read_page(npage)?)
    }

    pub fn write_node(&mut self, node: &mut Node) -> Result<()> {
        node.sync_header();
        self.pager.write_page(&node.page)
    }

    fn allocate_node(&mut self, node_type: NodeType) -> Result<Node> {
        let npage = self.pager.allocate_page()?;
        let page = self.pager.read_page(npage)?;
        Ok(Node::init_empty(page, node_type, self.pager.page_size))
    }

    /// Allocates a fresh root for a new table or index and returns its page
    /// number, used by the VM's `CreateTable`/`CreateIndex` handlers.
    pub fn create_root(&mut self, node_type: NodeType) -> Result<PageNum> {
        let mut node = self.allocate_node(node_type)?;
        let npage = node.page.npage;
        self.write_node(&mut node)?;
        Ok(npage)
    }

    /// Looks up `key` (a row key for table trees, an index key for index
    /// trees) starting from `root`. Returns the matching cell if found.
    ///
    /// An index split promotes its median key out of both leaf halves into
    /// an index-internal cell (see `split_point`), so that key only ever
    /// exists at the internal level — an exact match against an
    /// index-internal cell is itself the answer, not a routing decision.
    /// A table split instead retains a copy of the median in its left leaf,
    /// so a table-internal cell never short-circuits: `key <= c.key()`
    /// always routes into the child that holds the real row.
    pub fn find(&mut self, root: PageNum, key: i64) -> Result<Option<Cell>> {
        let node = self.load_node(root)?;
        if node.node_type.is_internal() {
            for i in 0..node.n_cells {
                let c = node.get_cell(i)?;
                if node.node_type == NodeType::IndexInternal && key == c.key() {
                    return Ok(Some(c));
                }
                if key <= c.key() {
                    return self.find(c.child().expect("internal cell has a child"), key);
                }
            }
            return self.find(node.right_page, key);
        }
        for i in 0..node.n_cells {
            let c = node.get_cell(i)?;
            if c.key() == key {
                return Ok(Some(c));
            }
            if c.key() > key {
                break;
            }
        }
        Ok(None)
    }

    /// Inserts `cell` into the tree rooted at `root`. Rejects a duplicate
    /// key with `Error::Duplicate` in both table and index trees — this
    /// repo's uniqueness policy is per-tree, not index-only (see
    /// DESIGN.md).
    pub fn insert(&mut self, root: PageNum, cell: Cell) -> Result<()> {
        let root_node = self.load_node(root)?;
        if !root_node.fits(&cell) {
            if root_node.n_cells == 0 {
                return Err(Error::NoMemory);
            }
            self.split_root(root, root_node)?;
        }
        self.insert_into(root, cell)
    }

    fn insert_into(&mut self, npage: PageNum, cell: Cell) -> Result<()> {
        let mut node = self.load_node(npage)?;
        if !node.node_type.is_internal() {
            return self.insert_leaf_cell(node, cell);
        }

        let mut chosen_idx = node.n_cells;
        let mut chosen_child = node.right_page;
        for i in 0..node.n_cells {
            let c = node.get_cell(i)?;
            if cell.key() == c.key() {
                // An internal cell's key already equals an existing entry
                // (the row key for table trees, the promoted median for
                // index trees, which never lives in a leaf). Mirrors
                // chidb_Btree_insertNonFull's `btc->key == search_btc.key`
                // check made while routing past an internal cell.
                return Err(Error::Duplicate);
            }
            if cell.key() < c.key() {
                chosen_idx = i;
                chosen_child = c.child().expect("internal cell has a child");
                break;
            }
        }

        let child_node = self.load_node(chosen_child)?;
        if !child_node.fits(&cell) {
            let (sep_cell, left_page) = self.split_node(chosen_child, child_node)?;
            if !node.fits(&sep_cell) {
                // Parent itself has no room for the promoted separator. Only
                // reachable if a prior level's proactive check was skipped;
                // treated as a hard allocation failure rather than silently
                // losing the split.
                return Err(Error::NoMemory);
            }
            node.insert_cell(chosen_idx, &sep_cell)?;
            self.write_node(&mut node)?;
            if cell.key() == sep_cell.key() {
                return Err(Error::Duplicate);
            }
            let target = if cell.key() < sep_cell.key() { left_page } else { chosen_child };
            return self.insert_into(target, cell);
        }
        self.insert_into(chosen_child, cell)
    }

    fn insert_leaf_cell(&mut self, mut node: Node, cell: Cell) -> Result<()> {
        let mut pos = node.n_cells;
        for i in 0..node.n_cells {
            let c = node.get_cell(i)?;
            if c.key() == cell.key() {
                return Err(Error::Duplicate);
            }
            if c.key() > cell.key() {
                pos = i;
                break;
            }
        }
        node.insert_cell(pos, &cell)?;
        self.write_node(&mut node)
    }

    fn median_pk(cell: &Cell) -> i32 {
        match cell {
            Cell::IndexLeaf { pk, .. } => *pk,
            Cell::IndexInternal { pk, .. } => *pk,
            _ => unreachable!("median_pk called on a table cell"),
        }
    }

    fn separator_cell(node_type: NodeType, left_page: PageNum, median: &Cell) -> Cell {
        if node_type.is_table() {
            Cell::TableInternal {
                child: left_page,
                key: median.key() as i32,
            }
        } else {
            Cell::IndexInternal {
                child: left_page,
                idx_key: median.key() as i32,
                pk: Self::median_pk(median),
            }
        }
    }

    /// `left_mid`: the index of the last cell retained in the left half.
    /// Table families retain the median cell in the left half (its key is
    /// promoted as a copy); index families exclude the median from both
    /// halves entirely (it is promoted, not duplicated) since an
    /// index-internal cell already carries the full (key, pk) pair.
    fn split_point(node_type: NodeType, n_cells: u16) -> (u16, u16) {
        let mid = (n_cells - 1) / 2;
        let left_mid = if node_type.is_table() { mid } else { mid.saturating_sub(1) };
        (mid, left_mid)
    }

    /// Splits a non-root node that is about to overflow. Allocates ONE new
    /// page for the left half; the right half reuses `npage` (reinitialized
    /// in place), matching `chidb_Btree_split`. Returns the promoted
    /// separator cell (to be inserted into the parent) and the new left
    /// page's number.
    fn split_node(&mut self, npage: PageNum, old_node: Node) -> Result<(Cell, PageNum)> {
        let (mid, left_mid) = Self::split_point(old_node.node_type, old_node.n_cells);
        let median = old_node.get_cell(mid)?;

        let mut left = self.allocate_node(old_node.node_type)?;
        for i in 0..=left_mid {
            let c = old_node.get_cell(i)?;
            let slot = left.n_cells;
            left.insert_cell(slot, &c)?;
        }
        if old_node.node_type.is_internal() {
            left.right_page = median.child().expect("internal median has a child");
        }

        let right_mem = MemPage {
            npage,
            data: vec![0u8; self.pager.page_size as usize],
        };
        let mut right = Node::init_empty(right_mem, old_node.node_type, self.pager.page_size);
        for i in (mid + 1)..old_node.n_cells {
            let c = old_node.get_cell(i)?;
            let slot = right.n_cells;
            right.insert_cell(slot, &c)?;
        }
        if old_node.node_type.is_internal() {
            right.right_page = old_node.right_page;
        }

        let left_page = left.page.npage;
        self.write_node(&mut left)?;
        self.write_node(&mut right)?;

        Ok((Self::separator_cell(old_node.node_type, left_page, &median), left_page))
    }

    /// Splits a full root. Unlike `split_node`, BOTH halves get freshly
    /// allocated pages; the root's own page number is reinitialized in
    /// place as an internal node of the matching family, so the root page
    /// number never changes across a root-split (see scenario S3).
    fn split_root(&mut self, root_npage: PageNum, old_node: Node) -> Result<()> {
        let (mid, left_mid) = Self::split_point(old_node.node_type, old_node.n_cells);
        let median = old_node.get_cell(mid)?;

        let mut left = self.allocate_node(old_node.node_type)?;
        for i in 0..=left_mid {
            let c = old_node.get_cell(i)?;
            let slot = left.n_cells;
            left.insert_cell(slot, &c)?;
        }
        if old_node.node_type.is_internal() {
            left.right_page = median.child().expect("internal median has a child");
        }

        let mut right = self.allocate_node(old_node.node_type)?;
        for i in (mid + 1)..old_node.n_cells {
            let c = old_node.get_cell(i)?;
            let slot = right.n_cells;
            right.insert_cell(slot, &c)?;
        }
        if old_node.node_type.is_internal() {
            right.right_page = old_node.right_page;
        }

        let left_page = left.page.npage;
        let right_page = right.page.npage;
        self.write_node(&mut left)?;
        self.write_node(&mut right)?;

        let root_mem = MemPage {
            npage: root_npage,
            data: vec![0u8; self.pager.page_size as usize],
        };
        let mut new_root = Node::init_empty(root_mem, old_node.node_type.internal_sibling(), self.pager.page_size);
        new_root.right_page = right_page;
        let sep_cell = Self::separator_cell(old_node.node_type, left_page, &median);
        new_root.insert_cell(0, &sep_cell)?;
        self.write_node(&mut new_root)
    }

    /// In-order scan of every cell in the tree rooted at `root`, left to
    /// right (including promoted index-internal cells, see `scan_into`).
    /// Used by `.scan` and by tests; `Cursor` is the incrementally-steppable
    /// equivalent used by the VM.
    pub fn scan(&mut self, root: PageNum) -> Result<Vec<Cell>> {
        let mut out = Vec::new();
        self.scan_into(root, &mut out)?;
        Ok(out)
    }

    fn scan_into(&mut self, npage: PageNum, out: &mut Vec<Cell>) -> Result<()> {
        let node = self.load_node(npage)?;
        if node.node_type.is_internal() {
            // An index-internal cell carries a promoted median that never
            // lives in a leaf, so it is emitted in its in-order position,
            // between its child subtree and the next one. A table-internal
            // cell is pure routing; its row lives in a leaf already.
            let data_bearing = node.node_type == NodeType::IndexInternal;
            for i in 0..node.n_cells {
                let c = node.get_cell(i)?;
                self.scan_into(c.child().expect("internal cell has a child"), out)?;
                if data_bearing {
                    out.push(c);
                }
            }
            self.scan_into(node.right_page, out)
        } else {
            for i in 0..node.n_cells {
                out.push(node.get_cell(i)?);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Key;

    fn open_tmp() -> (Btree, tempfile::TempPath) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.into_temp_path();
        let bt = Btree::open(path.to_str().unwrap()).unwrap();
        (bt, path)
    }

    #[test]
    fn fresh_file_has_table_leaf_root_at_page_1() {
        let (mut bt, _path) = open_tmp();
        let root = bt.load_node(1).unwrap();
        assert_eq!(root.node_type, NodeType::TableLeaf);
        assert_eq!(root.n_cells, 0);
    }

    #[test]
    fn insert_and_find_round_trips() {
        let (mut bt, _path) = open_tmp();
        for key in [5, 2, 9, 1, 7] {
            bt.insert(1, Cell::TableLeaf { key, data: vec![key as u8] }).unwrap();
        }
        for key in [5, 2, 9, 1, 7] {
            let found = bt.find(1, key as i64).unwrap().expect("key present");
            match found {
                Cell::TableLeaf { key: k, data } => {
                    assert_eq!(k, key);
                    assert_eq!(data, vec![key as u8]);
                }
                _ => panic!("wrong cell variant"),
            }
        }
        assert!(bt.find(1, 1000).unwrap().is_none());
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let (mut bt, _path) = open_tmp();
        bt.insert(1, Cell::TableLeaf { key: 1, data: vec![] }).unwrap();
        let err = bt.insert(1, Cell::TableLeaf { key: 1, data: vec![] }).unwrap_err();
        assert!(matches!(err, Error::Duplicate));
    }

    #[test]
    fn many_inserts_split_and_preserve_root_page_number() {
        let (mut bt, _path) = open_tmp();
        let n: Key = 1000;
        for key in 0..n {
            bt.insert(1, Cell::TableLeaf { key, data: vec![0u8; 8] }).unwrap();
        }
        let root = bt.load_node(1).unwrap();
        assert_eq!(root.node_type, NodeType::TableInternal);

        for key in 0..n {
            assert!(bt.find(1, key as i64).unwrap().is_some(), "missing key {key}");
        }
        assert!(bt.find(1, n as i64 + 1).unwrap().is_none());

        let scanned = bt.scan(1).unwrap();
        assert_eq!(scanned.len(), n as usize);
    }

    #[test]
    fn index_tree_rejects_duplicate_idx_key() {
        let (mut bt, _path) = open_tmp();
        let index_root = bt.create_root(NodeType::IndexLeaf).unwrap();
        bt.insert(index_root, Cell::IndexLeaf { idx_key: 10, pk: 1 }).unwrap();
        let err = bt.insert(index_root, Cell::IndexLeaf { idx_key: 10, pk: 2 }).unwrap_err();
        assert!(matches!(err, Error::Duplicate));
    }

    #[test]
    fn index_split_keeps_promoted_median_findable_and_unique() {
        let (mut bt, _path) = open_tmp();
        let index_root = bt.create_root(NodeType::IndexLeaf).unwrap();
        let n: i32 = 500;
        for idx_key in 0..n {
            bt.insert(index_root, Cell::IndexLeaf { idx_key, pk: idx_key }).unwrap();
        }
        let root = bt.load_node(index_root).unwrap();
        assert_eq!(root.node_type, NodeType::IndexInternal);

        for idx_key in 0..n {
            let found = bt
                .find(index_root, idx_key as i64)
                .unwrap()
                .unwrap_or_else(|| panic!("missing idx_key {idx_key}"));
            assert_eq!(found.key(), idx_key as i64);
        }

        let scanned = bt.scan(index_root).unwrap();
        assert_eq!(scanned.len(), n as usize);

        for idx_key in 0..n {
            let err = bt
                .insert(index_root, Cell::IndexLeaf { idx_key, pk: idx_key + 1000 })
                .unwrap_err();
            assert!(matches!(err, Error::Duplicate), "idx_key {idx_key} not rejected");
        }
    }
}
