/*
A stateful position in a B-tree: a path stack from root to the current
cell. Grounded in `original_source/src/libchidb/dbm-cursor.c`'s
`chidb_dbm_cursor_node_list_t` (`npage`, `ncell`, `is_right`, `parent`) and
its `rewind`/`next`/`prev`/`seek*` family: frames here own a loaded `Node`
outright instead of sharing one through `parent` links, avoiding a cyclic
ownership graph. A `Cursor` holds only its path state,
not the pager — every stepping method takes `&mut Btree` explicitly, so the
VM's register file, cursor array and `Btree` can live side by side in one
struct without a self-referential borrow.

An index split promotes its median key to an internal-only cell instead of
retaining a leaf copy (unlike a table split), so an index-internal frame can
itself be the cursor's current position. `at_key` distinguishes, for such a
frame, whether traversal has descended into `cell`'s child (not yet visited
the key) or is sitting on the key itself. Table-internal frames never set
it: their cells are pure routing, the data always lives in a leaf.
*/

use crate::btree::Btree;
use crate::cell::{Cell, NodeType};
use crate::error::{Error, Result};
use crate::pager::PageNum;

struct CursorFrame {
    node: crate::cell::Node,
    cell: u16,
    /// For an index-internal frame: true when positioned on `cell`'s own
    /// key rather than part-way through descending into its child.
    at_key: bool,
    /// True once this internal frame's position is "past the last cell",
    /// i.e. routed through `right_page` rather than a numbered cell.
    is_right: bool,
}

impl CursorFrame {
    fn is_data_bearing(&self) -> bool {
        self.node.node_type == NodeType::IndexInternal
    }
}

pub struct Cursor {
    root: PageNum,
    stack: Vec<CursorFrame>,
}

impl Cursor {
    pub fn new(root: PageNum) -> Self {
        Cursor { root, stack: Vec::new() }
    }

    pub fn close(self) {}

    pub fn root(&self) -> PageNum {
        self.root
    }

    /// Positions at the first (smallest-key) cell in the tree.
    pub fn rewind(&mut self, bt: &mut Btree) -> Result<bool> {
        self.stack.clear();
        self.descend_leftmost(bt, self.root)?;
        Ok(self.has_current())
    }

    fn has_current(&self) -> bool {
        match self.stack.last() {
            None => false,
            Some(frame) if frame.node.node_type.is_internal() => {
                frame.is_data_bearing() && frame.at_key && frame.cell < frame.node.n_cells
            }
            Some(frame) => frame.cell < frame.node.n_cells,
        }
    }

    fn descend_leftmost(&mut self, bt: &mut Btree, start: PageNum) -> Result<()> {
        let mut npage = start;
        loop {
            let node = bt.load_node(npage)?;
            if node.node_type.is_internal() {
                if node.n_cells == 0 {
                    let next = node.right_page;
                    self.stack.push(CursorFrame { node, cell: 0, at_key: false, is_right: true });
                    npage = next;
                } else {
                    let next = node.get_cell(0)?.child().expect("internal cell has a child");
                    self.stack.push(CursorFrame { node, cell: 0, at_key: false, is_right: false });
                    npage = next;
                }
            } else {
                self.stack.push(CursorFrame { node, cell: 0, at_key: false, is_right: false });
                return Ok(());
            }
        }
    }

    fn descend_rightmost(&mut self, bt: &mut Btree, start: PageNum) -> Result<()> {
        let mut npage = start;
        loop {
            let node = bt.load_node(npage)?;
            if node.node_type.is_internal() {
                let next = node.right_page;
                self.stack.push(CursorFrame { node, cell: 0, at_key: false, is_right: true });
                npage = next;
            } else {
                let last = node.n_cells.saturating_sub(1);
                self.stack.push(CursorFrame { node, cell: last, at_key: false, is_right: false });
                return Ok(());
            }
        }
    }

    /// Walks up the stack from an exhausted position until it finds the
    /// next unvisited position: an index-internal frame's own key, a
    /// sibling child, or `right_page`.
    fn climb(&mut self, bt: &mut Btree) -> Result<bool> {
        while let Some(frame) = self.stack.last_mut() {
            if frame.is_right {
                self.stack.pop();
                continue;
            }
            if frame.is_data_bearing() && !frame.at_key {
                frame.at_key = true;
                return Ok(true);
            }
            if frame.cell + 1 < frame.node.n_cells {
                frame.cell += 1;
                frame.at_key = false;
                let npage = frame.node.get_cell(frame.cell)?.child().expect("internal cell has a child");
                self.descend_leftmost(bt, npage)?;
                return Ok(true);
            }
            let npage = frame.node.right_page;
            frame.is_right = true;
            frame.at_key = false;
            self.descend_leftmost(bt, npage)?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn next(&mut self, bt: &mut Btree) -> Result<bool> {
        match self.stack.last() {
            None => Ok(false),
            Some(top) if !top.node.node_type.is_internal() && top.cell + 1 < top.node.n_cells => {
                self.stack.last_mut().unwrap().cell += 1;
                Ok(true)
            }
            Some(top) if !top.node.node_type.is_internal() => {
                self.stack.pop();
                self.climb(bt)
            }
            // Top is an index-internal frame sitting on its own key: advance
            // past it without popping, it is not a child subtree to descend
            // out of.
            Some(_) => self.climb(bt),
        }
    }

    /// Symmetric to `climb`, walking backward.
    fn climb_back(&mut self, bt: &mut Btree) -> Result<bool> {
        while let Some(frame) = self.stack.last_mut() {
            let data_bearing = frame.is_data_bearing();
            if frame.is_right {
                if frame.node.n_cells > 0 {
                    frame.is_right = false;
                    frame.cell = frame.node.n_cells - 1;
                    if data_bearing {
                        frame.at_key = true;
                        return Ok(true);
                    }
                    let npage = frame.node.get_cell(frame.cell)?.child().expect("internal cell has a child");
                    self.descend_rightmost(bt, npage)?;
                    return Ok(true);
                }
                self.stack.pop();
                continue;
            }
            if data_bearing && frame.at_key {
                frame.at_key = false;
                let npage = frame.node.get_cell(frame.cell)?.child().expect("internal cell has a child");
                self.descend_rightmost(bt, npage)?;
                return Ok(true);
            }
            if frame.cell > 0 {
                frame.cell -= 1;
                if data_bearing {
                    frame.at_key = true;
                    return Ok(true);
                }
                let npage = frame.node.get_cell(frame.cell)?.child().expect("internal cell has a child");
                self.descend_rightmost(bt, npage)?;
                return Ok(true);
            }
            self.stack.pop();
        }
        Ok(false)
    }

    pub fn prev(&mut self, bt: &mut Btree) -> Result<bool> {
        match self.stack.last() {
            None => Ok(false),
            Some(top) if !top.node.node_type.is_internal() && top.cell > 0 => {
                self.stack.last_mut().unwrap().cell -= 1;
                Ok(true)
            }
            Some(top) if !top.node.node_type.is_internal() => {
                self.stack.pop();
                self.climb_back(bt)
            }
            Some(_) => self.climb_back(bt),
        }
    }

    /// Positions at the first cell with key >= `key` (possibly in a later
    /// leaf than the one containing keys < `key`, or on an index-internal
    /// frame if the promoted median is the answer).
    pub fn seek_ge(&mut self, bt: &mut Btree, key: i64) -> Result<bool> {
        self.stack.clear();
        self.descend_to_key(bt, self.root, key)
    }

    pub fn seek_gt(&mut self, bt: &mut Btree, key: i64) -> Result<bool> {
        let found = self.seek_ge(bt, key)?;
        if found && self.current()?.key() == key {
            return self.next(bt);
        }
        Ok(found)
    }

    pub fn seek_lt(&mut self, bt: &mut Btree, key: i64) -> Result<bool> {
        if self.seek_ge(bt, key)? {
            self.prev(bt)
        } else {
            self.seek_last(bt)
        }
    }

    pub fn seek_le(&mut self, bt: &mut Btree, key: i64) -> Result<bool> {
        if self.seek_gt(bt, key)? {
            self.prev(bt)
        } else {
            self.seek_last(bt)
        }
    }

    pub fn seek_eq(&mut self, bt: &mut Btree, key: i64) -> Result<bool> {
        let found = self.seek_ge(bt, key)?;
        Ok(found && self.current()?.key() == key)
    }

    fn seek_last(&mut self, bt: &mut Btree) -> Result<bool> {
        self.stack.clear();
        self.descend_rightmost(bt, self.root)?;
        Ok(self.has_current())
    }

    /// Descends the subtree rooted at `npage` looking for the first data
    /// position (leaf cell, or index-internal cell) with key >= `key`.
    /// Returns whether one exists in this subtree, leaving the path stack
    /// unchanged (from its length on entry) on failure.
    ///
    /// Follows the same child-selection convention as `Btree::insert`/
    /// `Btree::find` (`key <= cell.key()` routes left). A table-internal
    /// cell never matches directly: its child subtree is searched first,
    /// and since a table split retains the median in its left leaf, that
    /// search always succeeds when `key <= cell.key()`. An index-internal
    /// cell's own key answers the search when its child subtree has
    /// nothing at or above `key`, since the promoted median never lives in
    /// a leaf.
    fn descend_to_key(&mut self, bt: &mut Btree, npage: PageNum, key: i64) -> Result<bool> {
        let node = bt.load_node(npage)?;
        if !node.node_type.is_internal() {
            let mut idx = node.n_cells;
            for i in 0..node.n_cells {
                if node.get_cell(i)?.key() >= key {
                    idx = i;
                    break;
                }
            }
            let found = idx < node.n_cells;
            if found {
                self.stack.push(CursorFrame { node, cell: idx, at_key: false, is_right: false });
            }
            return Ok(found);
        }

        let data_bearing = node.node_type == NodeType::IndexInternal;
        let frame_idx = self.stack.len();
        for i in 0..node.n_cells {
            let c = node.get_cell(i)?;
            if key <= c.key() {
                let child = c.child().expect("internal cell has a child");
                if self.descend_to_key(bt, child, key)? {
                    self.stack.insert(frame_idx, CursorFrame { node, cell: i, at_key: false, is_right: false });
                    return Ok(true);
                }
                if data_bearing {
                    self.stack.push(CursorFrame { node, cell: i, at_key: true, is_right: false });
                    return Ok(true);
                }
                return Ok(false);
            }
        }

        let right_page = node.right_page;
        let n_cells = node.n_cells;
        if self.descend_to_key(bt, right_page, key)? {
            self.stack.insert(frame_idx, CursorFrame { node, cell: n_cells, at_key: false, is_right: true });
            return Ok(true);
        }
        Ok(false)
    }

    pub fn current(&self) -> Result<Cell> {
        let frame = self.stack.last().ok_or(Error::Empty)?;
        if frame.node.node_type.is_internal() {
            if frame.is_data_bearing() && frame.at_key && frame.cell < frame.node.n_cells {
                return frame.node.get_cell(frame.cell);
            }
            return Err(Error::Empty);
        }
        if frame.cell >= frame.node.n_cells {
            return Err(Error::Empty);
        }
        frame.node.get_cell(frame.cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::Btree;

    fn open_tmp() -> (Btree, tempfile::TempPath) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.into_temp_path();
        let bt = Btree::open(path.to_str().unwrap()).unwrap();
        (bt, path)
    }

    #[test]
    fn rewind_and_next_enumerate_in_order() {
        let (mut bt, _path) = open_tmp();
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

    #[test]
    fn seek_ge_lands_on_first_key_at_or_above_target() {
        let (mut bt, _path) = open_tmp();
        for key in [1, 3, 5, 7, 9] {
            bt.insert(1, Cell::TableLeaf { key, data: vec![] }).unwrap();
        }
        let mut cursor = Cursor::new(1);
        assert!(cursor.seek_ge(&mut bt, 4).unwrap());
        assert_eq!(cursor.current().unwrap().key(), 5);

        assert!(cursor.seek_ge(&mut bt, 5).unwrap());
        assert_eq!(cursor.current().unwrap().key(), 5);

        assert!(!cursor.seek_ge(&mut bt, 100).unwrap());
    }

    #[test]
    fn seek_le_lands_on_last_key_at_or_below_target() {
        let (mut bt, _path) = open_tmp();
        for key in [1, 3, 5, 7, 9] {
            bt.insert(1, Cell::TableLeaf { key, data: vec![] }).unwrap();
        }
        let mut cursor = Cursor::new(1);
        assert!(cursor.seek_le(&mut bt, 4).unwrap());
        assert_eq!(cursor.current().unwrap().key(), 3);

        assert!(cursor.seek_le(&mut bt, 9).unwrap());
        assert_eq!(cursor.current().unwrap().key(), 9);
    }

    #[test]
    fn cursor_surfaces_promoted_index_median_after_split() {
        let (mut bt, _path) = open_tmp();
        let root = bt.create_root(NodeType::IndexLeaf).unwrap();
        for pk in 1..=400 {
            bt.insert(root, Cell::IndexLeaf { idx_key: pk, pk }).unwrap();
        }
        let mut cursor = Cursor::new(root);
        let mut keys = Vec::new();
        let mut has_row = cursor.rewind(&mut bt).unwrap();
        while has_row {
            keys.push(cursor.current().unwrap().key());
            has_row = cursor.next(&mut bt).unwrap();
        }
        let expected: Vec<i64> = (1..=400).collect();
        assert_eq!(keys, expected);
    }
}
