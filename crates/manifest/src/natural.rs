//! Natural ("human") string ordering.
//!
//! Strings are split into alternating runs of ASCII digits and everything
//! else. Digit runs compare by numeric value, other runs compare
//! lexicographically, and a digit run sorts before a text run at the same
//! position. Strings that tie under these rules (`"01"` vs `"1"`) fall back
//! to plain byte order so the comparator stays a total order.

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chunk<'a> {
    Number(&'a str),
    Text(&'a str),
}

struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.as_bytes().first()?;
        let numeric = first.is_ascii_digit();
        let end = self
            .rest
            .bytes()
            .position(|byte| byte.is_ascii_digit() != numeric)
            .unwrap_or(self.rest.len());
        // Digits are ASCII, so `end` always falls on a char boundary.
        let (head, tail) = self.rest.split_at(end);
        self.rest = tail;
        Some(if numeric {
            Chunk::Number(head)
        } else {
            Chunk::Text(head)
        })
    }
}

fn chunks(value: &str) -> Chunks<'_> {
    Chunks { rest: value }
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_chunks(a: Chunk<'_>, b: Chunk<'_>) -> Ordering {
    match (a, b) {
        (Chunk::Number(a), Chunk::Number(b)) => compare_numbers(a, b),
        (Chunk::Text(a), Chunk::Text(b)) => a.cmp(b),
        (Chunk::Number(_), Chunk::Text(_)) => Ordering::Less,
        (Chunk::Text(_), Chunk::Number(_)) => Ordering::Greater,
    }
}

/// Compares two strings in natural order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = chunks(a);
    let mut right = chunks(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match compare_chunks(x, y) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}

/// Sorts and de-duplicates values in natural order of their string form.
pub fn natural_sorted<T, F>(mut values: Vec<T>, as_str: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    values.sort_by(|a, b| natural_cmp(as_str(a), as_str(b)));
    values.dedup_by(|a, b| as_str(a) == as_str(b));
    values
}
