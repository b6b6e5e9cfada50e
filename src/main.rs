use anyhow::{bail, Result};
use env_logger::Env;

use chidb::btree::Btree;
use chidb::cell::Cell;
use chidb::record::Record;
use chidb::schema;

fn format_row(data: &[u8]) -> Result<String> {
    let (record, _) = Record::from_be_bytes(data)?;
    Ok(format!("{:?}", record.serial_data))
}

fn format_cell(cell: &Cell) -> Result<String> {
    match cell {
        Cell::TableLeaf { key, data } => Ok(format!("{key} | {}", format_row(data)?)),
        Cell::IndexLeaf { idx_key, pk } => Ok(format!("idx_key={idx_key} pk={pk}")),
        Cell::TableInternal { child, key } => Ok(format!("-> page {child} (key <= {key})")),
        Cell::IndexInternal { child, idx_key, pk } => {
            Ok(format!("-> page {child} (idx_key <= {idx_key}, pk={pk})"))
        }
    }
}

// Driver program exercising the library's B-tree/VM stack without a SQL
// front end: a small set of dot-commands operate directly on root page
// numbers or on the schema table's name index.
fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("debug")).init();

    let args = std::env::args().collect::<Vec<_>>();
    match args.len() {
        0 | 1 => bail!("Missing <database path> and <command>"),
        2 => bail!("Missing <command>"),
        _ => {}
    }

    let mut bt = Btree::open(&args[1])?;
    let command = args[2].as_str();

    match command {
        ".header" => {
            let h = &bt.header;
            println!("page_size: {}", h.page_size);
            println!("file_change_counter: {}", h.file_change_counter);
            println!("schema_cookie: {}", h.schema_cookie);
            println!("user_version: {}", h.user_version);
        }
        ".pages" => {
            println!("{}", bt.page_count());
        }
        ".tables" => {
            let names: Vec<String> = schema::list(&mut bt)?
                .into_iter()
                .filter(|t| t.obj_type == "table")
                .map(|t| t.name)
                .collect();
            println!("{}", names.join(", "));
        }
        ".table" => {
            let table_name = args.get(3).ok_or_else(|| anyhow::anyhow!("Missing <table name>"))?;
            let info = schema::get(&mut bt, table_name)?
                .ok_or_else(|| anyhow::anyhow!("no such table: {table_name}"))?;
            let rows = bt.scan(info.root_page)?;
            println!("{} rows for table {table_name}:", rows.len());
            for cell in &rows {
                println!("{}", format_cell(cell)?);
            }
        }
        ".index" => {
            let index_name = args.get(3).ok_or_else(|| anyhow::anyhow!("Missing <index name>"))?;
            let info = schema::get(&mut bt, index_name)?
                .ok_or_else(|| anyhow::anyhow!("no such index: {index_name}"))?;
            let rows = bt.scan(info.root_page)?;
            println!("{} rows for index {index_name}:", rows.len());
            for cell in &rows {
                println!("{}", format_cell(cell)?);
            }
        }
        ".get" => {
            let root: u32 = args.get(3).ok_or_else(|| anyhow::anyhow!("Missing <root>"))?.parse()?;
            let key: i64 = args.get(4).ok_or_else(|| anyhow::anyhow!("Missing <key>"))?.parse()?;
            match bt.find(root, key)? {
                Some(cell) => println!("{}", format_cell(&cell)?),
                None => println!("(not found)"),
            }
        }
        ".put" => {
            let root: u32 = args.get(3).ok_or_else(|| anyhow::anyhow!("Missing <root>"))?.parse()?;
            let key: i32 = args.get(4).ok_or_else(|| anyhow::anyhow!("Missing <key>"))?.parse()?;
            let value = args.get(5).ok_or_else(|| anyhow::anyhow!("Missing <data>"))?.clone();
            let data = Record::new(vec![chidb::sql_data_types::SerialData::Text(value)]).to_be_bytes();
            bt.insert(root, Cell::TableLeaf { key, data })?;
            println!("inserted key {key} into page {root}");
        }
        ".scan" => {
            let root: u32 = args.get(3).ok_or_else(|| anyhow::anyhow!("Missing <root>"))?.parse()?;
            for cell in bt.scan(root)? {
                println!("{}", format_cell(&cell)?);
            }
        }
        ".create" => {
            let name = args.get(3).ok_or_else(|| anyhow::anyhow!("Missing <table name>"))?;
            let root = schema::create_table(&mut bt, name, &format!("CREATE TABLE {name}"))?;
            println!("created table {name} at page {root}");
        }
        _ => bail!("Unknown command: {command}"),
    }

    Ok(())
}
