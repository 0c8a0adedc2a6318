//! Text canonicalization applied before chunking.
//!
//! Normalizing text-like input (decode to UTF-8, drop control characters,
//! collapse whitespace runs, fold case) keeps signatures stable across files
//! that differ only in line endings, indentation or capitalisation.

use std::borrow::Cow;

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::ContentKind;

/// Which canonicalization steps run. Decoding happens whenever any step is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeConfig {
    pub fold_case: bool,
    pub collapse_whitespace: bool,
    pub strip_control_chars: bool,
}

impl NormalizeConfig {
    pub const fn text() -> Self {
        Self {
            fold_case: true,
            collapse_whitespace: true,
            strip_control_chars: true,
        }
    }

    pub const fn binary() -> Self {
        Self {
            fold_case: false,
            collapse_whitespace: false,
            strip_control_chars: false,
        }
    }

    pub fn for_kind(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Text => Self::text(),
            ContentKind::Binary => Self::binary(),
        }
    }

    pub fn is_noop(&self) -> bool {
        !(self.fold_case || self.collapse_whitespace || self.strip_control_chars)
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self::text()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    config: NormalizeConfig,
}

impl Normalizer {
    pub fn new(config: NormalizeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> NormalizeConfig {
        self.config
    }

    /// Canonicalize `bytes`, decoding with `declared` when they are not UTF-8.
    ///
    /// Undecodable input is returned unchanged. Output is always either the
    /// input or valid UTF-8, which makes the operation idempotent.
    pub fn normalize<'a>(&self, bytes: &'a [u8], declared: Option<&'static Encoding>) -> Cow<'a, [u8]> {
        if self.config.is_noop() {
            return Cow::Borrowed(bytes);
        }

        let Some(decoded) = decode(bytes, declared) else {
            debug!(len = bytes.len(), "input not decodable as text; skipping normalization");
            return Cow::Borrowed(bytes);
        };

        let mut text = decoded;
        if self.config.strip_control_chars && text.chars().any(is_stripped_control) {
            text = Cow::Owned(text.chars().filter(|&c| !is_stripped_control(c)).collect());
        }
        if self.config.collapse_whitespace {
            text = Cow::Owned(text.split_whitespace().collect::<Vec<_>>().join(" "));
        }
        if self.config.fold_case {
            text = Cow::Owned(text.to_lowercase());
        }

        match text {
            Cow::Borrowed(s) if s.len() == bytes.len() => Cow::Borrowed(bytes),
            other => Cow::Owned(other.into_owned().into_bytes()),
        }
    }
}

const BYTE_ORDER_MARK: char = '\u{feff}';

fn is_stripped_control(c: char) -> bool {
    c.is_control() && !c.is_whitespace()
}

/// Decode to UTF-8. Valid UTF-8 is already canonical; otherwise a byte order
/// mark wins over the declared encoding. Every U+FEFF is dropped, not only a
/// leading one.
fn decode<'a>(bytes: &'a [u8], declared: Option<&'static Encoding>) -> Option<Cow<'a, str>> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Some(drop_byte_order_marks(Cow::Borrowed(text)));
    }
    let (encoding, body) = match Encoding::for_bom(bytes) {
        Some((encoding, bom_len)) => (encoding, &bytes[bom_len..]),
        None => (declared?, bytes),
    };
    let text = encoding.decode_without_bom_handling_and_without_replacement(body)?;
    Some(drop_byte_order_marks(Cow::Owned(text.into_owned())))
}

fn drop_byte_order_marks(text: Cow<'_, str>) -> Cow<'_, str> {
    if text.contains(BYTE_ORDER_MARK) {
        Cow::Owned(text.replace(BYTE_ORDER_MARK, ""))
    } else {
        text
    }
}
