//! Symbol alphabets: dense byte → rank mapping.
//!
//! An alphabet is described by a spec string of `|`-separated groups, e.g.
//! `"Aa|Cc|Gg|TtUu"`. Every byte of group `i` maps to rank `i`; the first byte
//! of a group is the symbol printed for that rank.

use crate::core::error::QgramError;

const UNDEFINED: u16 = u16::MAX;

pub const DNA_SPEC: &str = "Aa|Cc|Gg|TtUu";
pub const PROTEIN_SPEC: &str =
    "Aa|Cc|Dd|Ee|Ff|Gg|Hh|Ii|Kk|Ll|Mm|Nn|Pp|Qq|Rr|Ss|Tt|Vv|Ww|Yy";

#[derive(Clone, Debug)]
pub struct Alphabet {
    ranks: [u16; 256],
    symbols: Vec<u8>,
}

impl Alphabet {
    pub fn from_spec(spec: &str) -> Result<Self, QgramError> {
        if spec.is_empty() {
            return Err(QgramError::InvalidAlphabet("empty spec".to_string()));
        }
        let mut seen = [UNDEFINED; 256];
        for (rank, group) in spec.as_bytes().split(|&b| b == b'|').enumerate() {
            if group.is_empty() {
                return Err(QgramError::InvalidAlphabet(format!(
                    "group {} is empty",
                    rank
                )));
            }
            if rank >= 256 {
                return Err(QgramError::InvalidAlphabet(
                    "more than 256 symbol groups".to_string(),
                ));
            }
            for &b in group {
                let slot = &mut seen[b as usize];
                if *slot != UNDEFINED && *slot != rank as u16 {
                    return Err(QgramError::InvalidAlphabet(format!(
                        "byte {:?} appears in groups {} and {}",
                        b as char, slot, rank
                    )));
                }
                *slot = rank as u16;
            }
        }
        Ok(Self::assemble(spec))
    }

    // Builds the tables of a spec already known to be well formed.
    fn assemble(spec: &str) -> Self {
        let mut ranks = [UNDEFINED; 256];
        let mut symbols = Vec::new();
        for (rank, group) in spec.as_bytes().split(|&b| b == b'|').enumerate() {
            for &b in group {
                ranks[b as usize] = rank as u16;
            }
            symbols.extend(group.first());
        }
        Self { ranks, symbols }
    }

    pub fn dna() -> Self {
        Self::assemble(DNA_SPEC)
    }

    pub fn protein() -> Self {
        Self::assemble(PROTEIN_SPEC)
    }

    pub fn size(&self) -> usize {
        self.symbols.len()
    }

    #[inline]
    pub fn rank(&self, byte: u8) -> Option<u8> {
        let r = self.ranks[byte as usize];
        if r == UNDEFINED { None } else { Some(r as u8) }
    }

    /// Canonical symbol of `rank`. Panics if `rank >= size()`.
    #[inline]
    pub fn symbol(&self, rank: u8) -> u8 {
        self.symbols[rank as usize]
    }

    /// Maps raw bytes to ranks, failing on the first undefined byte.
    pub fn encode(&self, raw: &[u8]) -> Result<Vec<u8>, QgramError> {
        raw.iter()
            .enumerate()
            .map(|(position, &b)| {
                self.rank(b)
                    .ok_or(QgramError::InvalidSymbol { symbol: b, position })
            })
            .collect()
    }

    /// Splits raw bytes at undefined symbols into maximal runs of ranks.
    /// Empty runs are dropped.
    pub fn segments(&self, raw: &[u8]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut current = Vec::new();
        for &b in raw {
            match self.rank(b) {
                Some(r) => current.push(r),
                None => {
                    if !current.is_empty() {
                        out.push(std::mem::take(&mut current));
                    }
                }
            }
        }
        if !current.is_empty() {
            out.push(current);
        }
        out
    }

    pub fn render(&self, ranks: &[u8]) -> String {
        ranks.iter().map(|&r| self.symbol(r) as char).collect()
    }
}
