//! Fixed-size chunking of normalized text.

/// Split `text` into pieces of at most `size` characters.
///
/// Splits on character boundaries, never inside a code point. An empty text
/// gives no chunks; a `size` of 0 is treated as 1.
pub fn chunk(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(text.len() / size + 1);
    let mut rest = text;

    while !rest.is_empty() {
        let end = rest
            .char_indices()
            .nth(size)
            .map_or(rest.len(), |(idx, _)| idx);
        let (head, tail) = rest.split_at(end);
        chunks.push(head);
        rest = tail;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_into_fixed_pieces() {
        assert_eq!(chunk("abcdefg", 3), vec!["abc", "def", "g"]);
        assert_eq!(chunk("abc", 3), vec!["abc"]);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk("", 3800).is_empty());
    }

    #[test]
    fn counts_characters_not_bytes() {
        let chunks = chunk("éééé", 3);
        assert_eq!(chunks, vec!["ééé", "é"]);
    }

    #[test]
    fn long_text_round_trips() {
        let text = "x".repeat(3800 * 2 + 17);
        let chunks = chunk(&text, 3800);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 17);
        assert_eq!(chunks.concat(), text);
    }
}
