//! Positional-numeral q-gram codes.
//!
//! A window `w` of length `q` over ranks `< alpha_size` maps to
//! `sum(w[i] * alpha_size^(q-1-i))`. Codes of consecutive windows are derived
//! from each other in O(1) with [`QgramCodec::enumerate`].

use crate::core::error::QgramError;
use std::iter::FusedIterator;

pub type QgramCode = u64;

/// One window of a sequence: its code and start position.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct QgramWindow {
    pub code: QgramCode,
    pub position: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct QgramCodec {
    alpha_size: u64,
    q: usize,
    // alpha_size^(q-1), weight of the leftmost symbol
    multiplier: u64,
    // alpha_size^q; may be exactly 2^64
    code_space: u128,
}

/// Largest `q` whose code space fits into a `u64` for `alpha_size`.
/// Unbounded alphabets of size 1 are capped at `usize::MAX`.
pub fn max_q(alpha_size: usize) -> usize {
    if alpha_size <= 1 {
        return usize::MAX;
    }
    let limit = 1u128 << 64;
    let mut q = 0usize;
    let mut space = 1u128;
    while let Some(next) = space.checked_mul(alpha_size as u128).filter(|&s| s <= limit) {
        space = next;
        q += 1;
    }
    q
}

impl QgramCodec {
    pub fn new(alpha_size: usize, q: usize) -> Result<Self, QgramError> {
        if q == 0 {
            return Err(QgramError::InvalidConfig("q must be >= 1".to_string()));
        }
        if alpha_size == 0 || alpha_size > 256 {
            return Err(QgramError::InvalidConfig(format!(
                "alphabet size must be in 1..=256, got {}",
                alpha_size
            )));
        }
        let exp = u32::try_from(q).map_err(|_| QgramError::Range { alpha_size, q })?;
        let code_space = (alpha_size as u128)
            .checked_pow(exp)
            .filter(|&s| s <= 1u128 << 64)
            .ok_or(QgramError::Range { alpha_size, q })?;
        // alpha_size^(q-1) < 2^64 follows from the check above
        let multiplier = (alpha_size as u64).pow(exp - 1);
        Ok(Self {
            alpha_size: alpha_size as u64,
            q,
            multiplier,
            code_space,
        })
    }

    pub fn q(&self) -> usize {
        self.q
    }

    pub fn alpha_size(&self) -> usize {
        self.alpha_size as usize
    }

    pub fn code_space(&self) -> u128 {
        self.code_space
    }

    /// Horner evaluation of a window.
    pub fn encode(&self, window: &[u8]) -> Result<QgramCode, QgramError> {
        if window.len() != self.q {
            return Err(QgramError::LengthMismatch {
                expected: self.q,
                actual: window.len(),
            });
        }
        let mut code = 0u64;
        for (position, &s) in window.iter().enumerate() {
            if s as u64 >= self.alpha_size {
                return Err(QgramError::InvalidSymbol {
                    symbol: s,
                    position,
                });
            }
            code = code * self.alpha_size + s as u64;
        }
        Ok(code)
    }

    pub fn decode(&self, code: QgramCode) -> Result<Vec<u8>, QgramError> {
        let mut window = vec![0u8; self.q];
        self.decode_into(code, &mut window)?;
        Ok(window)
    }

    /// Writes the window of `code` into `out[..q]`.
    pub fn decode_into(&self, mut code: QgramCode, out: &mut [u8]) -> Result<(), QgramError> {
        if code as u128 >= self.code_space {
            return Err(QgramError::CodeOutOfRange { code });
        }
        if out.len() < self.q {
            return Err(QgramError::LengthMismatch {
                expected: self.q,
                actual: out.len(),
            });
        }
        for i in (0..self.q).rev() {
            out[i] = (code % self.alpha_size) as u8;
            code /= self.alpha_size;
        }
        Ok(())
    }

    /// Iterates the codes of all windows of `seq` in position order.
    ///
    /// Every symbol is validated once here, so the iterator itself cannot fail.
    pub fn enumerate<'a>(&self, seq: &'a [u8]) -> Result<QgramIter<'a>, QgramError> {
        if let Some(position) = seq.iter().position(|&s| s as u64 >= self.alpha_size) {
            return Err(QgramError::InvalidSymbol {
                symbol: seq[position],
                position,
            });
        }
        Ok(QgramIter::new(*self, seq))
    }
}

/// Rolling iterator over the windows of one sequence. A clone continues from
/// the same position; call [`QgramCodec::enumerate`] again to start over.
#[derive(Clone, Debug)]
pub struct QgramIter<'a> {
    codec: QgramCodec,
    seq: &'a [u8],
    next_pos: usize,
    code: QgramCode,
}

impl<'a> QgramIter<'a> {
    fn new(codec: QgramCodec, seq: &'a [u8]) -> Self {
        Self {
            codec,
            seq,
            next_pos: 0,
            code: 0,
        }
    }

    #[inline]
    fn windows_left(&self) -> usize {
        (self.seq.len() + 1).saturating_sub(self.codec.q + self.next_pos)
    }
}

impl Iterator for QgramIter<'_> {
    type Item = QgramWindow;

    #[inline]
    fn next(&mut self) -> Option<QgramWindow> {
        if self.windows_left() == 0 {
            return None;
        }
        let pos = self.next_pos;
        let a = self.codec.alpha_size;
        if pos == 0 {
            let mut code = 0u64;
            for &s in &self.seq[..self.codec.q] {
                code = code * a + s as u64;
            }
            self.code = code;
        } else {
            let dropped = self.seq[pos - 1] as u64;
            let added = self.seq[pos - 1 + self.codec.q] as u64;
            self.code = (self.code - self.codec.multiplier * dropped) * a + added;
        }
        self.next_pos += 1;
        Some(QgramWindow {
            code: self.code,
            position: pos,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.windows_left();
        (n, Some(n))
    }
}

impl ExactSizeIterator for QgramIter<'_> {}

impl FusedIterator for QgramIter<'_> {}
