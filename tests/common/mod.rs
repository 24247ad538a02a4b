//! Synthetic ROOT files for integration tests.
#![allow(dead_code)]

use byteorder::{BigEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use std::io::Write;

pub const BEGIN: usize = 100;

/// How a tree record's payload is stored.
#[derive(Debug, Clone, Copy)]
pub enum Codec {
    None,
    Zlib,
    Zstd,
    Lz4,
    /// Zlib for the first half, zstd for the rest.
    TwoBlocks,
    /// A single block with an unknown algorithm magic.
    UnknownTag([u8; 2]),
}

enum Item {
    Tree {
        name: String,
        cycle: i16,
        class: String,
        raw_len: usize,
        payload: Vec<u8>,
    },
    Dir(Dir),
}

#[derive(Default)]
pub struct Dir {
    name: String,
    items: Vec<Item>,
}

impl Dir {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            items: Vec::new(),
        }
    }

    pub fn tree(self, name: &str, entries: i64, codec: Codec) -> Self {
        self.tree_cycle(name, 1, entries, codec)
    }

    pub fn tree_cycle(mut self, name: &str, cycle: i16, entries: i64, codec: Codec) -> Self {
        let raw = tree_record(name, entries, 3);
        self.items.push(Item::Tree {
            name: name.to_string(),
            cycle,
            class: "TTree".to_string(),
            raw_len: raw.len(),
            payload: compress(&raw, codec),
        });
        self
    }

    /// A key of some other class with an uncompressed payload.
    pub fn object(mut self, name: &str, class: &str) -> Self {
        self.items.push(Item::Tree {
            name: name.to_string(),
            cycle: 1,
            class: class.to_string(),
            raw_len: 16,
            payload: vec![0u8; 16],
        });
        self
    }

    pub fn subdir(mut self, dir: Dir) -> Self {
        self.items.push(Item::Dir(dir));
        self
    }

    /// Write this directory's contents and key list, returning the key
    /// list's (offset, length).
    fn emit(
        &self,
        out: &mut Vec<u8>,
        layout: Layout,
        dir_seek: usize,
        class: &str,
    ) -> (usize, usize) {
        let mut keys = Vec::new();
        for item in &self.items {
            match item {
                Item::Tree {
                    name,
                    cycle,
                    class,
                    raw_len,
                    payload,
                } => {
                    let mut key = Key::new(layout, class, name)
                        .at(out.len(), dir_seek)
                        .holding(*raw_len, payload.len());
                    key.cycle = *cycle;
                    key.write(out);
                    out.extend_from_slice(payload);
                    keys.push(key);
                }
                Item::Dir(dir) => {
                    let seek = out.len();
                    let record_len = layout.directory_record_len();
                    let key = Key::new(layout, "TDirectory", &dir.name)
                        .at(seek, dir_seek)
                        .holding(record_len, record_len);
                    key.write(out);
                    let record_pos = out.len();
                    out.resize(record_pos + record_len, 0);
                    let (seek_keys, nbytes_keys) = dir.emit(out, layout, seek, "TDirectory");
                    let record = DirectoryFields {
                        nbytes_keys,
                        nbytes_name: 0,
                        seek_dir: seek,
                        seek_parent: dir_seek,
                        seek_keys,
                    };
                    let mut bytes = Vec::new();
                    record.write(&mut bytes, layout);
                    out[record_pos..record_pos + record_len].copy_from_slice(&bytes);
                    keys.push(key);
                }
            }
        }

        let seek_keys = out.len();
        let listed: usize = 4 + keys.iter().map(Key::len).sum::<usize>();
        let head = Key::new(layout, class, &self.name)
            .at(seek_keys, dir_seek)
            .holding(listed, listed);
        head.write(out);
        out.write_i32::<BigEndian>(keys.len() as i32).unwrap();
        for key in &keys {
            key.write(out);
        }
        (seek_keys, out.len() - seek_keys)
    }
}

/// Record widths: 32-bit seek fields, or 64-bit ones for files past 2 GiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Small,
    Big,
}

impl Layout {
    fn file_version(self) -> i32 {
        match self {
            Layout::Small => 62_206,
            Layout::Big => 1_062_206,
        }
    }

    fn key_version(self) -> i16 {
        match self {
            Layout::Small => 4,
            Layout::Big => 1004,
        }
    }

    fn directory_version(self) -> i16 {
        match self {
            Layout::Small => 5,
            Layout::Big => 1005,
        }
    }

    fn seek_len(self) -> usize {
        match self {
            Layout::Small => 4,
            Layout::Big => 8,
        }
    }

    fn directory_record_len(self) -> usize {
        18 + 3 * self.seek_len()
    }

    fn write_seek(self, out: &mut Vec<u8>, value: usize) {
        match self {
            Layout::Small => out.write_i32::<BigEndian>(value as i32).unwrap(),
            Layout::Big => out.write_i64::<BigEndian>(value as i64).unwrap(),
        }
    }
}

struct Key {
    layout: Layout,
    nbytes: usize,
    objlen: usize,
    cycle: i16,
    seek_key: usize,
    seek_pdir: usize,
    class: String,
    name: String,
}

impl Key {
    fn new(layout: Layout, class: &str, name: &str) -> Self {
        Self {
            layout,
            nbytes: 0,
            objlen: 0,
            cycle: 1,
            seek_key: 0,
            seek_pdir: 0,
            class: class.to_string(),
            name: name.to_string(),
        }
    }

    fn at(mut self, seek_key: usize, seek_pdir: usize) -> Self {
        self.seek_key = seek_key;
        self.seek_pdir = seek_pdir;
        self
    }

    /// Object of `objlen` bytes stored in `stored` bytes after the key.
    fn holding(mut self, objlen: usize, stored: usize) -> Self {
        self.objlen = objlen;
        self.nbytes = self.len() + stored;
        self
    }

    fn len(&self) -> usize {
        18 + 2 * self.layout.seek_len() + 1 + self.class.len() + 1 + self.name.len() + 1
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.write_i32::<BigEndian>(self.nbytes as i32).unwrap();
        out.write_i16::<BigEndian>(self.layout.key_version()).unwrap();
        out.write_i32::<BigEndian>(self.objlen as i32).unwrap();
        out.write_u32::<BigEndian>(0).unwrap();
        out.write_i16::<BigEndian>(self.len() as i16).unwrap();
        out.write_i16::<BigEndian>(self.cycle).unwrap();
        self.layout.write_seek(out, self.seek_key);
        self.layout.write_seek(out, self.seek_pdir);
        put_string(out, &self.class);
        put_string(out, &self.name);
        put_string(out, "");
    }
}

fn put_string(out: &mut Vec<u8>, s: &str) {
    out.push(s.len() as u8);
    out.extend_from_slice(s.as_bytes());
}

struct DirectoryFields {
    nbytes_keys: usize,
    nbytes_name: usize,
    seek_dir: usize,
    seek_parent: usize,
    seek_keys: usize,
}

impl DirectoryFields {
    fn write(&self, out: &mut Vec<u8>, layout: Layout) {
        out.write_i16::<BigEndian>(layout.directory_version()).unwrap();
        out.write_u32::<BigEndian>(0).unwrap();
        out.write_u32::<BigEndian>(0).unwrap();
        out.write_i32::<BigEndian>(self.nbytes_keys as i32).unwrap();
        out.write_i32::<BigEndian>(self.nbytes_name as i32).unwrap();
        layout.write_seek(out, self.seek_dir);
        layout.write_seek(out, self.seek_parent);
        layout.write_seek(out, self.seek_keys);
    }
}

/// Layout of a built file, for tests that corrupt specific records.
pub struct Built {
    pub bytes: Vec<u8>,
    pub keys_offset: usize,
    pub keys_len: usize,
}

impl Built {
    /// Offset of the first entry key inside the root key list.
    pub fn first_entry_offset(&self) -> usize {
        let head_keylen = i16::from_be_bytes([
            self.bytes[self.keys_offset + 14],
            self.bytes[self.keys_offset + 15],
        ]) as usize;
        self.keys_offset + head_keylen + 4
    }
}

/// Build a small-layout ROOT file whose root directory holds `root`'s items.
pub fn build(file_name: &str, root: Dir) -> Built {
    build_with(file_name, root, Layout::Small)
}

/// Build a ROOT file with the given record widths.
pub fn build_with(file_name: &str, root: Dir, layout: Layout) -> Built {
    let mut out = vec![0u8; BEGIN];
    let name_title = 1 + file_name.len() + 1;
    let record_len = layout.directory_record_len();
    let objlen = name_title + record_len;
    let root_key = Key::new(layout, "TFile", file_name)
        .at(BEGIN, 0)
        .holding(objlen, objlen);
    root_key.write(&mut out);
    put_string(&mut out, file_name);
    put_string(&mut out, "");
    let record_pos = out.len();
    out.resize(record_pos + record_len, 0);

    let root = Dir {
        name: file_name.to_string(),
        ..root
    };
    let (keys_offset, keys_len) = root.emit(&mut out, layout, BEGIN, "TFile");
    let nbytes_name = root_key.len() + name_title;
    let record = DirectoryFields {
        nbytes_keys: keys_len,
        nbytes_name,
        seek_dir: BEGIN,
        seek_parent: 0,
        seek_keys: keys_offset,
    };
    let mut bytes = Vec::new();
    record.write(&mut bytes, layout);
    out[record_pos..record_pos + record_len].copy_from_slice(&bytes);

    let mut header = Vec::new();
    header.extend_from_slice(b"root");
    header.write_i32::<BigEndian>(layout.file_version()).unwrap();
    header.write_i32::<BigEndian>(BEGIN as i32).unwrap();
    layout.write_seek(&mut header, out.len()); // fEND
    layout.write_seek(&mut header, 0); // fSeekFree
    header.write_i32::<BigEndian>(0).unwrap(); // fNbytesFree
    header.write_i32::<BigEndian>(0).unwrap(); // nfree
    header.write_i32::<BigEndian>(nbytes_name as i32).unwrap();
    header.write_u8(layout.seek_len() as u8).unwrap();
    header.write_i32::<BigEndian>(101).unwrap();
    layout.write_seek(&mut header, 0); // fSeekInfo
    header.write_i32::<BigEndian>(0).unwrap(); // fNbytesInfo
    header.extend_from_slice(&[0u8; 18]);
    out[..header.len()].copy_from_slice(&header);

    Built {
        bytes: out,
        keys_offset,
        keys_len,
    }
}

/// Shorthand: a file with one tree `Events` of `entries` entries.
pub fn events_file(entries: i64, codec: Codec) -> Vec<u8> {
    build("test.root", Dir::default().tree("Events", entries, codec)).bytes
}

fn streamed(out: &mut Vec<u8>, version: u16, body: &[u8]) {
    out.write_u32::<BigEndian>(0x4000_0000 | (body.len() as u32 + 2)).unwrap();
    out.write_u16::<BigEndian>(version).unwrap();
    out.extend_from_slice(body);
}

fn tobject(out: &mut Vec<u8>) {
    out.write_u16::<BigEndian>(1).unwrap();
    out.write_u32::<BigEndian>(0).unwrap();
    out.write_u32::<BigEndian>(0x0300_0000).unwrap();
}

/// A version 20 tree record with `entries` entries and `branches` branches.
pub fn tree_record(name: &str, entries: i64, branches: i32) -> Vec<u8> {
    let mut body = Vec::new();

    let mut named = Vec::new();
    tobject(&mut named);
    put_string(&mut named, name);
    put_string(&mut named, &"synthetic tree ".repeat(8));
    streamed(&mut body, 1, &named);

    let mut line = Vec::new();
    for v in [602i16, 1, 1] {
        line.write_i16::<BigEndian>(v).unwrap();
    }
    streamed(&mut body, 2, &line);
    streamed(&mut body, 2, &[0, 0, 0, 0]);
    streamed(&mut body, 2, &[0, 1, 0, 1, 0x3f, 0x80, 0, 0]);

    body.write_i64::<BigEndian>(entries).unwrap();
    for v in [4096i64, 2048, 1024, 1024] {
        body.write_i64::<BigEndian>(v).unwrap();
    }
    body.write_f64::<BigEndian>(1.0).unwrap();
    for v in [0i32, 25, 0, 8] {
        body.write_i32::<BigEndian>(v).unwrap();
    }
    let cluster_ranges = 2u32;
    body.write_u32::<BigEndian>(cluster_ranges).unwrap();
    for v in [i64::MAX, 1_000_000, 100_000_000, -300_000_000, -30_000_000, 1_000_000] {
        body.write_i64::<BigEndian>(v).unwrap();
    }
    for _ in 0..2 {
        body.write_u8(1).unwrap();
        for i in 0..cluster_ranges {
            body.write_i64::<BigEndian>(i as i64 * 1000).unwrap();
        }
    }
    streamed(&mut body, 1, &[0]);

    let mut array = Vec::new();
    tobject(&mut array);
    put_string(&mut array, "");
    array.write_i32::<BigEndian>(branches).unwrap();
    array.write_i32::<BigEndian>(0).unwrap();
    array.extend_from_slice(&[0u8; 32]);
    streamed(&mut body, 3, &array);
    body.extend_from_slice(&[0u8; 64]);

    let mut out = Vec::new();
    streamed(&mut out, 20, &body);
    out
}

fn block_header(magic: &[u8; 2], compressed: usize, raw: usize) -> Vec<u8> {
    let mut out = magic.to_vec();
    out.push(if magic == b"ZL" { 8 } else { 1 });
    out.extend_from_slice(&(compressed as u32).to_le_bytes()[..3]);
    out.extend_from_slice(&(raw as u32).to_le_bytes()[..3]);
    out
}

fn block(raw: &[u8], magic: &[u8; 2]) -> Vec<u8> {
    match magic {
        b"ZL" => {
            let mut enc = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            enc.write_all(raw).unwrap();
            let data = enc.finish().unwrap();
            [block_header(magic, data.len(), raw.len()), data].concat()
        }
        b"ZS" => {
            let data = zstd::bulk::compress(raw, 3).unwrap();
            [block_header(magic, data.len(), raw.len()), data].concat()
        }
        b"L4" => {
            let data = lz4_flex::block::compress(raw);
            let checksum = xxhash_rust::xxh64::xxh64(&data, 0);
            [
                block_header(magic, data.len() + 8, raw.len()),
                checksum.to_be_bytes().to_vec(),
                data,
            ]
            .concat()
        }
        other => [block_header(other, 4, raw.len()), vec![0xAB; 4]].concat(),
    }
}

pub fn compress(raw: &[u8], codec: Codec) -> Vec<u8> {
    match codec {
        Codec::None => raw.to_vec(),
        Codec::Zlib => block(raw, b"ZL"),
        Codec::Zstd => block(raw, b"ZS"),
        Codec::Lz4 => block(raw, b"L4"),
        Codec::TwoBlocks => {
            let (a, b) = raw.split_at(raw.len() / 2);
            [block(a, b"ZL"), block(b, b"ZS")].concat()
        }
        Codec::UnknownTag(magic) => block(raw, &magic),
    }
}
