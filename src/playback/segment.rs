//! Response segmentation

/// Does this word close a sentence (`end.`, `really?!`, `"quote."`)
fn ends_sentence(word: &str) -> bool {
    word.trim_end_matches(['"', '\'', ')', ']', '”', '’'])
        .ends_with(['.', '!', '?', '…'])
}

/// Split `text` into chunks of at most `max_words` words
///
/// Chunks that would be cut mid-sentence are shortened back to the last
/// sentence end inside them, when there is one.
#[must_use]
pub fn segment(text: &str, max_words: usize) -> Vec<String> {
    let max_words = max_words.max(1);
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let mut end = (start + max_words).min(words.len());

        if end < words.len()
            && !ends_sentence(words[end - 1])
            && let Some(cut) = (start..end - 1).rev().find(|&i| ends_sentence(words[i]))
        {
            end = cut + 1;
        }

        chunks.push(words[start..end].join(" "));
        start = end;
    }

    chunks
}
