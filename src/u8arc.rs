//! Writing of U8 archives.
//!
//! The pipeline only ever produces one shape of archive: a root node, a
//! single subdirectory and the course files inside it. The writer still
//! computes the node table, string pool and aligned data region generally,
//! so adding files is just repeated [U8Archive::add_file] calls.
use std::io::{Seek, SeekFrom, Write};

use binrw::{BinReaderExt, BinResult, BinWrite};
use log::debug;

const MAGIC: u32 = 0x55AA382D;
/// Offset of the node table from the start of the file.
const NODE_TABLE_OFFSET: u32 = 0x20;
const NODE_SIZE: u32 = 0x0C;
const DATA_ALIGN: u32 = 0x20;

#[derive(Debug, Clone)]
struct FileEntry {
    name: String,
    data: Vec<u8>,
}

/// An in-memory U8 archive under construction.
///
/// Files live in one subdirectory of the root. Write order is insertion
/// order, which fixes the node table and data layout.
#[derive(Debug, Clone)]
pub struct U8Archive {
    directory: String,
    files: Vec<FileEntry>,
}

impl U8Archive {
    /// An empty archive whose files will live under `directory`.
    pub fn new(directory: &str) -> Self {
        Self {
            directory: directory.to_string(),
            files: Vec::new(),
        }
    }

    pub fn add_file(&mut self, name: &str, data: Vec<u8>) {
        self.files.push(FileEntry {
            name: name.to_string(),
            data,
        });
    }

    /// Serializes the archive. The layout is computed up front, so nothing
    /// is backpatched.
    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> BinResult<()> {
        // Nodes: root, the directory, then one per file.
        let node_count = 2 + self.files.len() as u32;

        let mut string_pool = Vec::new();
        string_pool.push(0); // root's empty name
        let dir_name_off = string_pool.len() as u32;
        push_name(&mut string_pool, &self.directory);
        let file_name_offs: Vec<u32> = self
            .files
            .iter()
            .map(|file| {
                let off = string_pool.len() as u32;
                push_name(&mut string_pool, &file.name);
                off
            })
            .collect();

        let meta_size = node_count * NODE_SIZE + string_pool.len() as u32;
        let data_start = align(NODE_TABLE_OFFSET + meta_size, DATA_ALIGN);

        let mut data_offs = Vec::with_capacity(self.files.len());
        let mut data_cursor = data_start;
        for file in &self.files {
            data_offs.push(data_cursor);
            data_cursor = align(data_cursor + file.data.len() as u32, DATA_ALIGN);
        }

        debug!(
            "u8 archive: {} nodes, data region at {data_start:#x}",
            node_count
        );

        let be = binrw::Endian::Big;
        MAGIC.write_options(writer, be, ())?;
        NODE_TABLE_OFFSET.write_options(writer, be, ())?;
        meta_size.write_options(writer, be, ())?;
        data_start.write_options(writer, be, ())?;
        [0u8; 16].write_options(writer, be, ())?;

        // Root directory spans every node.
        write_node(writer, 1, 0, 0, node_count)?;
        // The single subdirectory: parent is the root, spans the rest.
        write_node(writer, 1, dir_name_off, 0, node_count)?;
        for (index, file) in self.files.iter().enumerate() {
            write_node(
                writer,
                0,
                file_name_offs[index],
                data_offs[index],
                file.data.len() as u32,
            )?;
        }
        string_pool.write_options(writer, be, ())?;

        for (index, file) in self.files.iter().enumerate() {
            pad_to(writer, data_offs[index] as u64)?;
            file.data.write_options(writer, be, ())?;
        }
        pad_to(writer, data_cursor as u64)?;

        Ok(())
    }
}

/// A decoded file node, used by tests and archive inspection.
#[derive(Debug, PartialEq, Clone)]
pub struct ExtractedFile {
    pub path: String,
    pub data: Vec<u8>,
}

/// Reads back the files of an archive in node order, with paths relative to
/// the root.
pub fn extract(archive: &[u8]) -> BinResult<Vec<ExtractedFile>> {
    let mut reader = std::io::Cursor::new(archive);
    let magic = reader.read_be::<u32>()?;
    if magic != MAGIC {
        return Err(binrw::Error::BadMagic {
            pos: 0,
            found: Box::new(magic),
        });
    }
    let node_table_off = reader.read_be::<u32>()? as u64;

    reader.seek(SeekFrom::Start(node_table_off))?;
    let root_type = reader.read_be::<u8>()?;
    let _ = reader.read_be::<[u8; 7]>()?;
    let node_count = reader.read_be::<u32>()?;
    debug_assert_eq!(1, root_type);

    let string_pool_off = node_table_off + node_count as u64 * NODE_SIZE as u64;

    // Directory nodes carry the index their subtree ends at.
    let mut dir_stack: Vec<(String, u32)> = vec![(String::new(), node_count)];
    let mut files = Vec::new();
    for index in 1..node_count {
        reader.seek(SeekFrom::Start(node_table_off + index as u64 * NODE_SIZE as u64))?;
        let kind = reader.read_be::<u8>()?;
        let name_off = {
            let hi = reader.read_be::<u8>()? as u32;
            let lo = reader.read_be::<u16>()? as u32;
            (hi << 16) | lo
        };
        let data_off = reader.read_be::<u32>()?;
        let size = reader.read_be::<u32>()?;

        while let Some((_, end)) = dir_stack.last() {
            if index >= *end {
                dir_stack.pop();
            } else {
                break;
            }
        }

        let name = read_pool_name(archive, string_pool_off as usize + name_off as usize)?;
        let dir = &dir_stack.last().map(|(d, _)| d.clone()).unwrap_or_default();
        let path = if dir.is_empty() {
            name.clone()
        } else {
            format!("{dir}/{name}")
        };

        if kind == 1 {
            dir_stack.push((path, size));
        } else {
            let data = archive[data_off as usize..(data_off + size) as usize].to_vec();
            files.push(ExtractedFile { path, data });
        }
    }

    Ok(files)
}

fn read_pool_name(archive: &[u8], start: usize) -> BinResult<String> {
    let end = archive[start..]
        .iter()
        .position(|&b| b == 0)
        .map(|len| start + len)
        .ok_or_else(|| binrw::Error::AssertFail {
            pos: start as u64,
            message: "unterminated archive node name".to_string(),
        })?;
    String::from_utf8(archive[start..end].to_vec()).map_err(|_| binrw::Error::AssertFail {
        pos: start as u64,
        message: "archive node name is not UTF-8".to_string(),
    })
}

fn push_name(pool: &mut Vec<u8>, name: &str) {
    pool.extend_from_slice(name.as_bytes());
    pool.push(0);
}

/// Writes one 12 byte node: type, 24-bit name offset, data offset, size.
fn write_node<W: Write + Seek>(
    writer: &mut W,
    kind: u8,
    name_off: u32,
    data_off: u32,
    size: u32,
) -> BinResult<()> {
    let be = binrw::Endian::Big;
    kind.write_options(writer, be, ())?;
    ((name_off >> 16) as u8).write_options(writer, be, ())?;
    (name_off as u16).write_options(writer, be, ())?;
    data_off.write_options(writer, be, ())?;
    size.write_options(writer, be, ())?;
    Ok(())
}

fn align(value: u32, to: u32) -> u32 {
    value.div_ceil(to) * to
}

fn pad_to<W: Write + Seek>(writer: &mut W, target: u64) -> BinResult<()> {
    let pos = writer.stream_position()?;
    for _ in pos..target {
        writer.write_all(&[0]).map_err(binrw::Error::Io)?;
    }
    Ok(())
}
