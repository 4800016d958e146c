//! Report chunker.
//!
//! Splits multi-line report text into transport-safe blocks without
//! ever breaking a line in half. Joining the returned blocks with
//! `"\n"` reconstructs the input exactly.

/// Split `text` into blocks each under `limit` bytes.
///
/// Lines accumulate into the current block while
/// `block.len() + 1 + line.len() < limit`; a line that would not fit
/// starts the next block. A single line of `limit` bytes or more
/// still becomes its own (oversized) block, unsplit.
pub fn chunk(text: &str, limit: usize) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut has_line = false;

    for line in text.split('\n') {
        if !has_line {
            current.push_str(line);
            has_line = true;
        } else if current.len() + 1 + line.len() < limit {
            current.push('\n');
            current.push_str(line);
        } else {
            blocks.push(std::mem::take(&mut current));
            current.push_str(line);
        }
    }

    blocks.push(current);
    blocks
}
