//! Knuth-Morris-Pratt delimiter search used by the chunked stream.
//!
//! Two operations are needed on every refill: find the last complete
//! delimiter in a window (KMP over the reversed window and pattern), and
//! measure how much of the delimiter the window's tail already spells out
//! (the forward KMP automaton state after the last byte).

/// Failure function: `table[i]` is the length of the longest proper prefix of
/// `pattern[..=i]` that is also a suffix of it.
fn failure_table(pattern: impl Iterator<Item = u8>) -> Vec<usize> {
    let pat: Vec<u8> = pattern.collect();
    let mut table = vec![0usize; pat.len()];
    let mut k = 0;
    for i in 1..pat.len() {
        while k > 0 && pat[i] != pat[k] {
            k = table[k - 1];
        }
        if pat[i] == pat[k] {
            k += 1;
        }
        table[i] = k;
    }
    table
}

/// Position just past the last complete occurrence of `pattern` in `window`.
///
/// Scans from the end of the window towards its start, so the first match
/// found is the rightmost one.
pub fn rfind_end(window: &[u8], pattern: &[u8]) -> Option<usize> {
    let m = pattern.len();
    if m == 0 || window.len() < m {
        return None;
    }

    let table = failure_table(pattern.iter().rev().copied());
    let rev_pat = |i: usize| pattern[m - 1 - i];

    let mut matched = 0;
    for (consumed, &byte) in window.iter().rev().enumerate() {
        while matched > 0 && byte != rev_pat(matched) {
            matched = table[matched - 1];
        }
        if byte == rev_pat(matched) {
            matched += 1;
        }
        if matched == m {
            // Reversed text [consumed + 1 - m, consumed] maps back to
            // window[len - consumed - 1 .. len - consumed - 1 + m].
            let start = window.len() - consumed - 1;
            return Some(start + m);
        }
    }
    None
}

/// Streaming matcher tracking how many leading bytes of a pattern the most
/// recent input has matched.
#[derive(Clone, Debug)]
pub struct PrefixMatcher<'p> {
    pattern: &'p [u8],
    table: Vec<usize>,
    matched: usize,
}

impl<'p> PrefixMatcher<'p> {
    pub fn new(pattern: &'p [u8]) -> Self {
        Self {
            pattern,
            table: failure_table(pattern.iter().copied()),
            matched: 0,
        }
    }

    /// Bytes of the pattern matched so far.
    #[inline]
    pub fn matched(&self) -> usize {
        self.matched
    }

    /// Advance by one byte. Returns `true` when a full occurrence completes.
    pub fn feed(&mut self, byte: u8) -> bool {
        if self.pattern.is_empty() {
            return false;
        }
        while self.matched > 0 && byte != self.pattern[self.matched] {
            self.matched = self.table[self.matched - 1];
        }
        if byte == self.pattern[self.matched] {
            self.matched += 1;
        }
        if self.matched == self.pattern.len() {
            self.matched = self.table[self.matched - 1];
            return true;
        }
        false
    }
}

/// Length of the longest proper prefix of `pattern` that ends `window`.
pub fn partial_suffix_len(window: &[u8], pattern: &[u8]) -> usize {
    if pattern.len() < 2 {
        return 0;
    }
    // Only the last `m - 1` bytes can take part in a proper prefix.
    let start = window.len().saturating_sub(pattern.len() - 1);
    let mut matcher = PrefixMatcher::new(pattern);
    for &byte in &window[start..] {
        matcher.feed(byte);
    }
    matcher.matched()
}
