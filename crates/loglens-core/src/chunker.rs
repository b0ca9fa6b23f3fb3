// Chunker - turn raw log text into stable, embeddable chunks
//
// Policy: logical-line based. Input splits on '\n', blank lines are skipped,
// every remaining line becomes one chunk. Identical input always yields
// identical chunk boundaries AND identical chunk ids, so re-indexing the
// same corpus is a no-op at the content level.

use uuid::Uuid;

use crate::{ChunkSource, LogChunk};

/// Derive the stable chunk id from corpus identity, position and content.
/// UUID v5 keeps ids reproducible across processes.
fn chunk_id(corpus: &str, line: usize, content: &str) -> Uuid {
    let name = format!("{}:{}:{}", corpus, line, content);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

/// Split raw log text into chunks for the given corpus.
/// Line numbers are 1-based and refer to the raw input, blank lines included.
pub fn chunk_logs(corpus: &str, raw: &str) -> Vec<LogChunk> {
    let mut chunks = Vec::new();

    for (idx, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let line_no = idx + 1;
        chunks.push(LogChunk {
            id: chunk_id(corpus, line_no, trimmed),
            content: trimmed.to_string(),
            source: ChunkSource {
                file: corpus.to_string(),
                line: line_no,
            },
        });
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunking_skips_blank_lines() {
        let raw = "ERROR: db timeout\n\n   \nWARN: retrying\n";
        let chunks = chunk_logs("app-logs", raw);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "ERROR: db timeout");
        assert_eq!(chunks[0].source.line, 1);
        assert_eq!(chunks[1].content, "WARN: retrying");
        assert_eq!(chunks[1].source.line, 4);
    }

    #[test]
    fn test_chunking_is_stable() {
        let raw = "line one\nline two\nline three";
        let first = chunk_logs("corpus-a", raw);
        let second = chunk_logs("corpus-a", raw);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.content, b.content);
        }
    }

    #[test]
    fn test_chunk_ids_differ_across_corpora() {
        let raw = "same line";
        let a = chunk_logs("corpus-a", raw);
        let b = chunk_logs("corpus-b", raw);
        assert_ne!(a[0].id, b[0].id);
    }

    #[test]
    fn test_chunk_ids_differ_across_lines() {
        // same content on two lines must not collapse to one id
        let raw = "dup\ndup";
        let chunks = chunk_logs("corpus-a", raw);
        assert_eq!(chunks.len(), 2);
        assert_ne!(chunks[0].id, chunks[1].id);
    }
}
