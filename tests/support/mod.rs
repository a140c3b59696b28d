//! Raw XDF chunk reader used only by this crate's own integration tests to
//! assert on-disk file shape (spec.md §8). Not a production reader: the spec
//! only requires a Writer (§4.3), so this lives under `tests/`, not `src/`.

use std::fs::File;
use std::io::{BufReader, Read};
use xdf_recorder::xdf::varlen::read_varlen;

pub struct ParsedChunk {
    pub tag: u16,
    pub content: Vec<u8>,
}

pub fn parse_file(path: &std::path::Path) -> Vec<ParsedChunk> {
    let mut reader = BufReader::new(File::open(path).expect("open xdf file"));
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).expect("read magic");
    assert_eq!(&magic, b"XDF:");

    let mut chunks = Vec::new();
    loop {
        let chunk_len = match read_varlen(&mut reader) {
            Ok(len) => len,
            Err(_) => break, // EOF
        };
        let mut tag_buf = [0u8; 2];
        reader.read_exact(&mut tag_buf).expect("read tag");
        let tag = u16::from_le_bytes(tag_buf);
        let content_len = chunk_len as usize - 2;
        let mut content = vec![0u8; content_len];
        reader.read_exact(&mut content).expect("read content");
        chunks.push(ParsedChunk { tag, content });
    }
    chunks
}

/// `stream_id:u32` prefix shared by StreamHeader/Samples/ClockOffset/Footer.
pub fn chunk_stream_id(chunk: &ParsedChunk) -> u32 {
    u32::from_le_bytes(chunk.content[0..4].try_into().expect("stream_id prefix"))
}

/// Decodes the `NumSamples` varlen field of a Samples chunk (content is
/// `stream_id:u32` followed by the varlen sample count, then sample bytes).
pub fn samples_chunk_count(chunk: &ParsedChunk) -> u64 {
    let mut cursor = std::io::Cursor::new(&chunk.content[4..]);
    read_varlen(&mut cursor).expect("read NumSamples")
}

pub fn footer_field<'a>(xml: &'a str, tag: &str) -> &'a str {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open).unwrap_or_else(|| panic!("missing <{tag}>")) + open.len();
    let end = xml[start..].find(&close).unwrap_or_else(|| panic!("missing </{tag}>"));
    &xml[start..start + end]
}
