use std::collections::VecDeque;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ".", "!", "?", ",", " ", ""];

/// Sizes are measured in characters. Separators stay attached to the piece they end, so
/// joining the pieces of a window reproduces the source text.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<&'static str>,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separators: DEFAULT_SEPARATORS.to_vec(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[&'static str]) -> Vec<String> {
        let (idx, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
            .map(|(idx, sep)| (idx, *sep))
            .unwrap_or((separators.len(), ""));
        let remaining = separators.get(idx + 1..).unwrap_or(&[]);

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split_inclusive(separator).collect()
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }

            if remaining.is_empty() {
                let piece = piece.trim();
                if !piece.is_empty() {
                    chunks.push(piece.to_string());
                }
            } else {
                chunks.extend(self.split_with(piece, remaining));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }

        chunks
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut out = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !window.is_empty() {
                if let Some(chunk) = join(&window) {
                    out.push(chunk);
                }
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total = total.saturating_sub(char_len(front)),
                        None => break,
                    }
                }
            }

            window.push_back(piece);
            total += len;
        }

        if let Some(chunk) = join(&window) {
            out.push(chunk);
        }

        out
    }
}

fn join(window: &VecDeque<&str>) -> Option<String> {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraphs(count: usize) -> String {
        (0..count)
            .map(|i| format!("문단 {i:02} {}", "가".repeat(90)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = TextSplitter::default().split("배열의 길이는 length로 구한다.");
        assert_eq!(chunks, vec!["배열의 길이는 length로 구한다.".to_string()]);
    }

    #[test]
    fn long_text_splits_into_bounded_overlapping_windows() {
        let text = paragraphs(30);
        let chunks = TextSplitter::default().split(&text);

        assert!(chunks.len() >= 3, "got {} chunks", chunks.len());
        assert!(chunks.iter().all(|c| c.chars().count() <= DEFAULT_CHUNK_SIZE));

        for pair in chunks.windows(2) {
            let head: String = pair[1].chars().take(20).collect();
            assert!(pair[0].contains(&head), "no overlap between consecutive chunks");
        }
        assert!(chunks[0].starts_with("문단 00"));
        assert!(chunks.last().is_some_and(|c| c.ends_with(&"가".repeat(90))));
    }

    #[test]
    fn unbroken_text_falls_back_to_hard_cut() {
        let text = "x".repeat(2500);
        let chunks = TextSplitter::new(1000, 200).split(&text);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.len() <= 1000));
    }

    #[test]
    fn overlap_is_clamped_below_chunk_size() {
        let splitter = TextSplitter::new(10, 50);
        let chunks = splitter.split(&"abc ".repeat(20));
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }
}
