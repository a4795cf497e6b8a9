//! PNG text chunk extraction
//!
//! Layout: 8-byte signature, then repeating chunks of
//! `[4-byte BE length][4-byte type][length bytes payload][4-byte CRC]`.
//! tEXt payloads are `keyword\0text`, both Latin-1.

use tracing::debug;

/// Fixed 8-byte PNG file signature
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Keywords that may carry generation metadata
const CANDIDATE_KEYWORDS: &[&str] = &["Description", "Comment"];

/// Substrings identifying generation metadata
const METADATA_MARKERS: &[&str] = &["Steps:", "\"prompt\":", "\"steps\":"];

/// A raw chunk borrowed from the image buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub kind: [u8; 4],
    pub payload: &'a [u8],
}

/// Iterator over the chunks following the signature.
///
/// Stops at the end of the buffer or at the first truncated chunk.
pub struct Chunks<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let header = self.data.get(self.offset..self.offset.checked_add(8)?)?;
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let kind = [header[4], header[5], header[6], header[7]];

        let start = self.offset + 8;
        let end = start.checked_add(length)?;
        let payload = self.data.get(start..end)?;

        // CRC is not verified
        self.offset = end.checked_add(4)?;
        Some(Chunk { kind, payload })
    }
}

/// Whether `data` starts with the PNG signature
pub fn is_png(data: &[u8]) -> bool {
    data.starts_with(&PNG_SIGNATURE)
}

/// Walk the chunks of a PNG buffer; `None` if the signature is wrong
pub fn chunks(data: &[u8]) -> Option<Chunks<'_>> {
    is_png(data).then_some(Chunks { data, offset: 8 })
}

/// Decode bytes as Latin-1 (one byte per character)
fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Split a tEXt payload into keyword and text
pub fn split_text_chunk(payload: &[u8]) -> Option<(String, String)> {
    let nul = payload.iter().position(|&b| b == 0)?;
    Some((latin1(&payload[..nul]), latin1(&payload[nul + 1..])))
}

/// Find the first tEXt chunk carrying generation metadata.
///
/// Returns `None` for non-PNG input or when no candidate matches; never fails.
pub fn extract(data: &[u8]) -> Option<String> {
    let Some(chunks) = chunks(data) else {
        debug!("Not a PNG buffer ({} bytes)", data.len());
        return None;
    };

    for chunk in chunks {
        if &chunk.kind != b"tEXt" {
            continue;
        }
        let Some((keyword, text)) = split_text_chunk(chunk.payload) else {
            continue;
        };
        if !CANDIDATE_KEYWORDS.contains(&keyword.as_str()) {
            continue;
        }
        if METADATA_MARKERS.iter().any(|m| text.contains(m)) {
            debug!("Found generation metadata in '{}' chunk", keyword);
            return Some(text);
        }
    }

    None
}
