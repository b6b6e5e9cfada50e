/*
The schema table: the one B-tree every database file roots at page 1,
listing every other table/index by name and root page number. Built atop
the writable `Btree`/`record` stack, with a `TableInfo` row shape matching
`get_master_table`'s old read-only equivalent.

Row shape: (obj_type, name, table_name, root_page, sql) — same five columns
`sqlite_schema`/`sqlite_master` uses, encoded via the record codec.
*/

use crate::btree::Btree;
use crate::cell::{Cell, NodeType};
use crate::error::{Error, Result};
use crate::pager::PageNum;
use crate::record::Record;
use crate::sql_data_types::SerialData;

pub const SCHEMA_ROOT: PageNum = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub obj_type: String,
    pub name: String,
    pub table_name: String,
    pub root_page: PageNum,
    pub sql: String,
}

impl TableInfo {
    fn to_record(&self) -> Record {
        Record::new(vec![
            SerialData::Text(self.obj_type.clone()),
            SerialData::Text(self.name.clone()),
            SerialData::Text(self.table_name.clone()),
            SerialData::I32(self.root_page as i32),
            SerialData::Text(self.sql.clone()),
        ])
    }

    fn from_record(record: &Record) -> Result<Self> {
        let text = |i: usize| -> Result<String> {
            match record.serial_data.get(i) {
                Some(SerialData::Text(s)) => Ok(s.clone()),
                _ => Err(Error::Parse(format!("schema row column {i} is not text"))),
            }
        };
        let root_page = match record.serial_data.get(3) {
            Some(SerialData::I32(v)) => *v as PageNum,
            _ => return Err(Error::Parse("schema row column 3 is not an int32".into())),
        };
        Ok(TableInfo {
            obj_type: text(0)?,
            name: text(1)?,
            table_name: text(2)?,
            root_page,
            sql: text(4)?,
        })
    }
}

fn next_key(bt: &mut Btree) -> Result<i32> {
    let rows = bt.scan(SCHEMA_ROOT)?;
    Ok(rows.iter().map(|c| c.key()).max().map(|k| k as i32 + 1).unwrap_or(0))
}

/// Allocates a root page for a table and records it in the schema table.
pub fn create_table(bt: &mut Btree, name: &str, sql: &str) -> Result<PageNum> {
    let root_page = bt.create_root(NodeType::TableLeaf)?;
    let info = TableInfo {
        obj_type: "table".to_string(),
        name: name.to_string(),
        table_name: name.to_string(),
        root_page,
        sql: sql.to_string(),
    };
    let key = next_key(bt)?;
    let data = info.to_record().to_be_bytes();
    bt.insert(SCHEMA_ROOT, Cell::TableLeaf { key, data })?;
    Ok(root_page)
}

/// Allocates a root page for an index and records it in the schema table.
pub fn create_index(bt: &mut Btree, name: &str, table_name: &str, sql: &str) -> Result<PageNum> {
    let root_page = bt.create_root(NodeType::IndexLeaf)?;
    let info = TableInfo {
        obj_type: "index".to_string(),
        name: name.to_string(),
        table_name: table_name.to_string(),
        root_page,
        sql: sql.to_string(),
    };
    let key = next_key(bt)?;
    let data = info.to_record().to_be_bytes();
    bt.insert(SCHEMA_ROOT, Cell::TableLeaf { key, data })?;
    Ok(root_page)
}

pub fn list(bt: &mut Btree) -> Result<Vec<TableInfo>> {
    bt.scan(SCHEMA_ROOT)?
        .into_iter()
        .map(|c| match c {
            Cell::TableLeaf { data, .. } => {
                let (record, _) = Record::from_be_bytes(&data)?;
                TableInfo::from_record(&record)
            }
            _ => Err(Error::Parse("schema table holds a non-leaf cell".into())),
        })
        .collect()
}

pub fn get(bt: &mut Btree, name: &str) -> Result<Option<TableInfo>> {
    Ok(list(bt)?.into_iter().find(|t| t.name == name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_tmp() -> (Btree, tempfile::TempPath) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.into_temp_path();
        let bt = Btree::open(path.to_str().unwrap()).unwrap();
        (bt, path)
    }

    #[test]
    fn create_table_registers_schema_row() {
        let (mut bt, _path) = open_tmp();
        let root = create_table(&mut bt, "widgets", "CREATE TABLE widgets (id)").unwrap();
        let info = get(&mut bt, "widgets").unwrap().expect("row present");
        assert_eq!(info.root_page, root);
        assert_eq!(info.obj_type, "table");
    }

    #[test]
    fn create_index_registers_schema_row() {
        let (mut bt, _path) = open_tmp();
        create_table(&mut bt, "widgets", "CREATE TABLE widgets (id)").unwrap();
        let idx_root = create_index(&mut bt, "widgets_idx", "widgets", "CREATE INDEX widgets_idx ON widgets (id)").unwrap();
        let info = get(&mut bt, "widgets_idx").unwrap().expect("row present");
        assert_eq!(info.root_page, idx_root);
        assert_eq!(info.table_name, "widgets");
    }
}
