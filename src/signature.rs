//! Signature value types and their text rendering.
//!
//! A signature renders as lowercase 8-digit hex groups separated by single
//! spaces, e.g. `e3b0c442 98fc1c14 9afbf4c8`. Master signatures render
//! wildcard positions as `*`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const WILDCARD_MARKER: &str = "*";

const BLOCK_HEX_WIDTH: usize = 8;

/// 32-bit digest of one chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DigestBlock(u32);

impl DigestBlock {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DigestBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseSignatureError {
    #[error("invalid block {group:?} at position {position}: expected 8 hex digits")]
    InvalidBlock { position: usize, group: String },
    #[error("hex string length {0} is not a multiple of 8")]
    BadLength(usize),
}

impl FromStr for DigestBlock {
    type Err = ParseSignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_block(0, s)
    }
}

fn parse_block(position: usize, group: &str) -> Result<DigestBlock, ParseSignatureError> {
    let invalid = || ParseSignatureError::InvalidBlock {
        position,
        group: group.to_string(),
    };
    if group.len() != BLOCK_HEX_WIDTH || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    u32::from_str_radix(group, 16)
        .map(DigestBlock)
        .map_err(|_| invalid())
}

/// Splits a rendering into groups. A single run of hex digits longer than one
/// block is the legacy concatenated form and is cut every 8 characters.
fn split_groups(s: &str) -> Result<Vec<&str>, ParseSignatureError> {
    let groups: Vec<&str> = s.split_whitespace().collect();
    match groups.as_slice() {
        [single] if single.len() > BLOCK_HEX_WIDTH && single.is_ascii() => {
            if single.len() % BLOCK_HEX_WIDTH != 0 {
                return Err(ParseSignatureError::BadLength(single.len()));
            }
            Ok((0..single.len())
                .step_by(BLOCK_HEX_WIDTH)
                .map(|i| &single[i..i + BLOCK_HEX_WIDTH])
                .collect())
        }
        _ => Ok(groups),
    }
}

/// Ordered digest blocks, one per chunk in chunk order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    blocks: Vec<DigestBlock>,
}

impl Signature {
    pub fn new(blocks: Vec<DigestBlock>) -> Self {
        Self { blocks }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> &[DigestBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The signature as a master pattern with no wildcards.
    pub fn to_pattern(&self) -> Vec<MasterBlock> {
        self.blocks.iter().copied().map(MasterBlock::Exact).collect()
    }

    /// Rows of `columns` groups, for terminal display.
    pub fn grid(&self, columns: usize) -> String {
        render_grid(self.blocks.iter().map(|b| b.to_string()), columns)
    }
}

impl From<Vec<DigestBlock>> for Signature {
    fn from(blocks: Vec<DigestBlock>) -> Self {
        Self::new(blocks)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{block}")?;
        }
        Ok(())
    }
}

impl FromStr for Signature {
    type Err = ParseSignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        split_groups(s)?
            .into_iter()
            .enumerate()
            .map(|(i, g)| parse_block(i, g))
            .collect::<Result<Vec<_>, _>>()
            .map(Signature::new)
    }
}

/// One position of a master signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MasterBlock {
    Exact(DigestBlock),
    Wildcard,
}

impl fmt::Display for MasterBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasterBlock::Exact(block) => write!(f, "{block}"),
            MasterBlock::Wildcard => f.write_str(WILDCARD_MARKER),
        }
    }
}

/// Template for a family of near-duplicate signatures. Positions on which
/// every member agreed are exact; the rest are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MasterSignature {
    blocks: Vec<MasterBlock>,
}

impl MasterSignature {
    pub fn new(blocks: Vec<MasterBlock>) -> Self {
        Self { blocks }
    }

    /// Merge member patterns position by position. The result is as long as
    /// the longest member; positions past the shortest member, or on which
    /// members disagree, become wildcards.
    pub fn merge<'a, I>(members: I) -> Self
    where
        I: IntoIterator<Item = &'a [MasterBlock]>,
    {
        let members: Vec<&[MasterBlock]> = members.into_iter().collect();
        let shortest = members.iter().map(|m| m.len()).min().unwrap_or(0);
        let longest = members.iter().map(|m| m.len()).max().unwrap_or(0);

        let blocks = (0..longest)
            .map(|i| {
                if i >= shortest {
                    return MasterBlock::Wildcard;
                }
                let first = members[0][i];
                if matches!(first, MasterBlock::Exact(_)) && members.iter().all(|m| m[i] == first) {
                    first
                } else {
                    MasterBlock::Wildcard
                }
            })
            .collect();
        Self { blocks }
    }

    pub fn blocks(&self) -> &[MasterBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn wildcard_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b, MasterBlock::Wildcard))
            .count()
    }

    pub fn grid(&self, columns: usize) -> String {
        render_grid(self.blocks.iter().map(|b| b.to_string()), columns)
    }
}

impl fmt::Display for MasterSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{block}")?;
        }
        Ok(())
    }
}

impl FromStr for MasterSignature {
    type Err = ParseSignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split_whitespace()
            .enumerate()
            .map(|(i, g)| {
                if g == WILDCARD_MARKER {
                    Ok(MasterBlock::Wildcard)
                } else {
                    parse_block(i, g).map(MasterBlock::Exact)
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map(MasterSignature::new)
    }
}

fn render_grid(groups: impl Iterator<Item = String>, columns: usize) -> String {
    let groups: Vec<String> = groups.collect();
    groups
        .chunks(columns.max(1))
        .map(|row| row.join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(values: &[u32]) -> Signature {
        Signature::new(values.iter().copied().map(DigestBlock::new).collect())
    }

    #[test]
    fn renders_lowercase_padded_hex() {
        let s = sig(&[0xe3b0c442, 0x98fc1c14, 0x0000000a]);
        assert_eq!(s.to_string(), "e3b0c442 98fc1c14 0000000a");
        assert_eq!(Signature::empty().to_string(), "");
    }

    #[test]
    fn parses_rendered_form() {
        let s: Signature = "e3b0c442 98fc1c14\n9afbf4c8".parse().unwrap();
        assert_eq!(s, sig(&[0xe3b0c442, 0x98fc1c14, 0x9afbf4c8]));
        assert_eq!(s.to_string().parse::<Signature>().unwrap(), s);
    }

    #[test]
    fn parses_legacy_concatenated_form() {
        let s: Signature = "e3b0c44298fc1c14".parse().unwrap();
        assert_eq!(s, sig(&[0xe3b0c442, 0x98fc1c14]));
        assert_eq!(
            "e3b0c44298fc".parse::<Signature>(),
            Err(ParseSignatureError::BadLength(12))
        );
    }

    #[test]
    fn rejects_bad_groups() {
        let err = "e3b0c442 zzzzzzzz".parse::<Signature>().unwrap_err();
        assert!(matches!(err, ParseSignatureError::InvalidBlock { position: 1, .. }));
        assert!("abc".parse::<Signature>().is_err());
    }

    #[test]
    fn grid_has_four_columns() {
        let s = sig(&[1, 2, 3, 4, 5]);
        assert_eq!(
            s.grid(4),
            "00000001 00000002 00000003 00000004\n00000005"
        );
    }

    #[test]
    fn merge_wildcards_disagreements_and_tail() {
        let a = sig(&[1, 2, 3, 4]).to_pattern();
        let b = sig(&[1, 9, 3]).to_pattern();
        let c = sig(&[1, 2, 3, 4, 5]).to_pattern();
        let master = MasterSignature::merge([a.as_slice(), b.as_slice(), c.as_slice()]);
        assert_eq!(master.to_string(), "00000001 * 00000003 * *");
        assert_eq!(master.len(), 5);
        assert_eq!(master.wildcard_count(), 3);
    }

    #[test]
    fn merge_keeps_existing_wildcards() {
        let existing: MasterSignature = "00000001 * 00000003".parse().unwrap();
        let member = sig(&[1, 2, 3]).to_pattern();
        let master = MasterSignature::merge([existing.blocks(), member.as_slice()]);
        assert_eq!(master, existing);
    }

    #[test]
    fn master_round_trips_through_text() {
        let text = "deadbeef * 00c0ffee";
        let master: MasterSignature = text.parse().unwrap();
        assert_eq!(master.to_string(), text);
    }
}
