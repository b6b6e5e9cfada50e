/*
Owns the backing file. Pages are 1-indexed, fixed size P. Page 1 carries the
100-byte file header ahead of its node body; every other page is exactly P
bytes of node.

This is deliberately a pass-through pager: every `read_page` is a fresh
`seek` + `read`, every `write_page` a fresh `seek` + `write`. A caching
pager is a legitimate drop-in as long as it preserves write-through
semantics (a `read_page` after a `write_page` for the same page observes
the write); this repo does not need one to be correct, only to be slow,
and slow is out of scope.
*/

use std::convert::TryInto;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

use log::debug;

use crate::error::{Error, Result};

pub const FILE_HEADER_SIZE: usize = 100;

pub type PageNum = u32;

/// An exclusively-owned in-memory copy of one page.
#[derive(Debug, Clone)]
pub struct MemPage {
    pub npage: PageNum,
    pub data: Vec<u8>,
}

impl MemPage {
    fn zeroed(npage: PageNum, page_size: u16) -> Self {
        MemPage {
            npage,
            data: vec![0u8; page_size as usize],
        }
    }
}

#[derive(Debug)]
pub struct Pager {
    file: File,
    pub page_size: u16,
    n_pages: PageNum,
}

impl Pager {
    /// Opens (creating if necessary) the backing file. Does not itself
    /// write a header; callers that find the file empty are expected to
    /// call `write_header` and `write_page` for the freshly-initialized
    /// page 1, same division of labor as `chidb_Btree_open`.
    pub fn open(path: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let mut pager = Pager {
            file,
            page_size: 1024,
            n_pages: 0,
        };
        let len = pager.file.metadata()?.len();
        if len > 0 {
            pager.n_pages = 0; // recomputed once the header tells us page_size
        }
        Ok(pager)
    }

    pub fn close(self) -> Result<()> {
        Ok(())
    }

    /// Reads the fixed 100-byte file header. Returns `Error::NoHeader` if
    /// the file is empty (the signal the B-tree layer uses to trigger
    /// initialization).
    pub fn read_header(&mut self) -> Result<[u8; FILE_HEADER_SIZE]> {
        let len = self.file.metadata()?.len();
        if len == 0 {
            return Err(Error::NoHeader);
        }
        let mut buf = [0u8; FILE_HEADER_SIZE];
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Recomputes the authoritative page count from file size / page size.
    /// Must be called once `page_size` is known (after header parse).
    pub fn sync_page_count(&mut self) -> Result<()> {
        self.n_pages = self.real_db_size()?;
        Ok(())
    }

    pub fn real_db_size(&mut self) -> Result<PageNum> {
        let len = self.file.metadata()?.len();
        let pages = len / self.page_size as u64;
        Ok(pages as PageNum)
    }

    pub fn page_count(&self) -> PageNum {
        self.n_pages
    }

    pub fn read_page(&mut self, npage: PageNum) -> Result<MemPage> {
        if npage < 1 || npage > self.n_pages {
            return Err(Error::InvalidPage(npage));
        }
        let mut buf = vec![0u8; self.page_size as usize];
        let offset = (npage as u64 - 1) * self.page_size as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(MemPage { npage, data: buf })
    }

    pub fn write_page(&mut self, page: &MemPage) -> Result<()> {
        debug_assert_eq!(page.data.len(), self.page_size as usize);
        let offset = (page.npage as u64 - 1) * self.page_size as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&page.data)?;
        self.file.sync_data()?;
        if page.npage > self.n_pages {
            self.n_pages = page.npage;
        }
        Ok(())
    }

    /// Returns the smallest unused page number >= 2 and extends the file to
    /// accommodate it; monotonic, derived from the page count.
    pub fn allocate_page(&mut self) -> Result<PageNum> {
        let npage = (self.n_pages + 1).max(2);
        let blank = MemPage::zeroed(npage, self.page_size);
        self.write_page(&blank)?;
        debug!("allocated page {npage}");
        Ok(npage)
    }

    pub fn set_page_size(&mut self, page_size: u16) {
        self.page_size = page_size;
    }
}

pub fn be16(n: u16) -> [u8; 2] {
    n.to_be_bytes()
}

pub fn be32(n: u32) -> [u8; 4] {
    n.to_be_bytes()
}

pub fn read_be16(buf: &[u8], off: usize) -> Result<u16> {
    Ok(u16::from_be_bytes(buf[off..off + 2].try_into().map_err(
        |_| Error::CorruptHeader("truncated u16".into()),
    )?))
}

pub fn read_be32(buf: &[u8], off: usize) -> Result<u32> {
    Ok(u32::from_be_bytes(buf[off..off + 4].try_into().map_err(
        |_| Error::CorruptHeader("truncated u32".into()),
    )?))
}
