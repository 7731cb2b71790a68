//! Fixed little-endian wire types for the composite-grid setup exchanges.
//!
//! Every buffer is a flat sequence of 8-byte words. Counts and indices are
//! `u64`, values are the IEEE-754 bits of an `f64`, and an absent index is
//! [`WireWord::NONE`].

use crate::amgdd_error::AmgDdError;
use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::size_of;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// One 8-byte word, stored pre-LE.
#[repr(transparent)]
#[derive(Copy, Clone, Pod, Zeroable, PartialEq, Eq)]
pub struct WireWord(u64);

const_assert_eq!(size_of::<WireWord>(), 8);

impl WireWord {
    /// Marker for an absent index.
    pub const NONE: u64 = u64::MAX;

    pub fn of(w: u64) -> Self {
        Self(w.to_le())
    }

    pub fn get(self) -> u64 {
        u64::from_le(self.0)
    }
}

impl std::fmt::Debug for WireWord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Count prefix used by the size handshakes.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u64,
}

const_assert_eq!(size_of::<WireCount>(), 8);

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u64).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u64::from_le(self.n_le) as usize
    }
}

/// Copy received bytes into an aligned word buffer.
pub fn words_from_bytes(bytes: &[u8]) -> Result<Vec<WireWord>, AmgDdError> {
    if bytes.len() % size_of::<WireWord>() != 0 {
        return Err(AmgDdError::MalformedBuffer(format!(
            "{} bytes is not a whole number of words",
            bytes.len()
        )));
    }
    let mut out = vec![WireWord::zeroed(); bytes.len() / size_of::<WireWord>()];
    cast_slice_mut(&mut out).copy_from_slice(bytes);
    Ok(out)
}

/// Append-only builder for a word buffer.
#[derive(Default, Debug)]
pub struct WireWriter {
    words: Vec<WireWord>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            words: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn push_count(&mut self, n: usize) {
        self.words.push(WireWord::of(n as u64));
    }

    pub fn push_index(&mut self, i: usize) {
        self.words.push(WireWord::of(i as u64));
    }

    pub fn push_opt_index(&mut self, i: Option<usize>) {
        self.words
            .push(WireWord::of(i.map_or(WireWord::NONE, |i| i as u64)));
    }

    pub fn push_value(&mut self, v: f64) {
        self.words.push(WireWord::of(v.to_bits()));
    }

    pub fn push_flag(&mut self, b: bool) {
        self.words.push(WireWord::of(b as u64));
    }

    /// Overwrite a previously pushed word (used for back-patched counts).
    pub fn patch_count(&mut self, at: usize, n: usize) {
        self.words[at] = WireWord::of(n as u64);
    }

    pub fn extend(&mut self, other: WireWriter) {
        self.words.extend(other.words);
    }

    pub fn finish(self) -> Vec<WireWord> {
        self.words
    }
}

/// Cursor over a received word buffer. Every read is bounds checked.
#[derive(Debug)]
pub struct WireReader<'a> {
    words: &'a [WireWord],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(words: &'a [WireWord]) -> Self {
        Self { words, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.words.len() - self.pos
    }

    fn next(&mut self, what: &str) -> Result<u64, AmgDdError> {
        let w = self.words.get(self.pos).ok_or_else(|| {
            AmgDdError::MalformedBuffer(format!(
                "truncated at word {} while reading {what}",
                self.pos
            ))
        })?;
        self.pos += 1;
        Ok(w.get())
    }

    pub fn count(&mut self) -> Result<usize, AmgDdError> {
        let n = self.next("count")?;
        if n > self.words.len() as u64 {
            return Err(AmgDdError::MalformedBuffer(format!(
                "count {n} exceeds buffer length {}",
                self.words.len()
            )));
        }
        Ok(n as usize)
    }

    pub fn index(&mut self) -> Result<usize, AmgDdError> {
        let i = self.next("index")?;
        if i == WireWord::NONE {
            return Err(AmgDdError::MalformedBuffer(format!(
                "absent index at word {} where one is required",
                self.pos - 1
            )));
        }
        Ok(i as usize)
    }

    pub fn opt_index(&mut self) -> Result<Option<usize>, AmgDdError> {
        let i = self.next("optional index")?;
        Ok((i != WireWord::NONE).then_some(i as usize))
    }

    pub fn value(&mut self) -> Result<f64, AmgDdError> {
        Ok(f64::from_bits(self.next("value")?))
    }

    pub fn flag(&mut self) -> Result<bool, AmgDdError> {
        match self.next("flag")? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(AmgDdError::MalformedBuffer(format!(
                "flag word {other} at {}",
                self.pos - 1
            ))),
        }
    }

    /// Fail unless every word was consumed.
    pub fn finish(self) -> Result<(), AmgDdError> {
        if self.pos == self.words.len() {
            Ok(())
        } else {
            Err(AmgDdError::MalformedBuffer(format!(
                "{} trailing words",
                self.words.len() - self.pos
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_reader_agree() {
        let mut w = WireWriter::new();
        w.push_count(2);
        w.push_index(17);
        w.push_opt_index(None);
        w.push_value(-0.25);
        w.push_flag(true);
        let words = w.finish();
        let mut r = WireReader::new(&words);
        assert_eq!(r.count().unwrap(), 2);
        assert_eq!(r.index().unwrap(), 17);
        assert_eq!(r.opt_index().unwrap(), None);
        assert_eq!(r.value().unwrap(), -0.25);
        assert!(r.flag().unwrap());
        r.finish().unwrap();
    }

    #[test]
    fn truncated_buffer_is_an_error() {
        let words = vec![WireWord::of(1)];
        let mut r = WireReader::new(&words);
        r.index().unwrap();
        assert!(matches!(r.value(), Err(AmgDdError::MalformedBuffer(_))));
    }

    #[test]
    fn oversized_count_is_rejected() {
        let words = vec![WireWord::of(1_000)];
        assert!(WireReader::new(&words).count().is_err());
    }

    #[test]
    fn bytes_must_be_word_aligned() {
        assert!(words_from_bytes(&[0u8; 12]).is_err());
        let w = words_from_bytes(cast_slice(&[WireWord::of(5)])).unwrap();
        assert_eq!(w[0].get(), 5);
    }

    #[test]
    fn trailing_words_are_reported() {
        let words = vec![WireWord::of(1), WireWord::of(2)];
        let mut r = WireReader::new(&words);
        r.index().unwrap();
        assert!(r.finish().is_err());
    }
}
