//! Text/binary classification and encoding detection.
//!
//! The hasher only consumes the [`ContentClassifier`] trait; the sniffing
//! implementation here is a lightweight default for the command line tool.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Binary,
}

pub trait ContentClassifier: Send + Sync {
    fn classify(&self, bytes: &[u8]) -> ContentKind;

    /// `None` means the encoding is unknown.
    fn detect_encoding(&self, bytes: &[u8]) -> Option<&'static Encoding>;
}

/// Inspects a bounded prefix: byte order marks, NUL bytes, UTF-8 validity and
/// the share of non-whitespace control bytes.
#[derive(Debug, Clone, Copy)]
pub struct SniffingClassifier {
    sample_len: usize,
}

impl SniffingClassifier {
    pub const DEFAULT_SAMPLE_LEN: usize = 8192;

    pub fn new(sample_len: usize) -> Self {
        Self {
            sample_len: sample_len.max(1),
        }
    }

    fn sample<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        &bytes[..bytes.len().min(self.sample_len)]
    }
}

impl Default for SniffingClassifier {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SAMPLE_LEN)
    }
}

/// Valid UTF-8, allowing a sequence cut off at the end of the sample.
fn is_utf8_prefix(sample: &[u8]) -> bool {
    match std::str::from_utf8(sample) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

impl ContentClassifier for SniffingClassifier {
    fn classify(&self, bytes: &[u8]) -> ContentKind {
        if Encoding::for_bom(bytes).is_some() {
            return ContentKind::Text;
        }
        let sample = self.sample(bytes);
        if sample.is_empty() || sample.contains(&0) {
            return ContentKind::Binary;
        }
        if is_utf8_prefix(sample) {
            return ContentKind::Text;
        }
        let controls = sample
            .iter()
            .filter(|&&b| (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c)) || b == 0x7f)
            .count();
        if controls * 100 < sample.len() {
            ContentKind::Text
        } else {
            ContentKind::Binary
        }
    }

    fn detect_encoding(&self, bytes: &[u8]) -> Option<&'static Encoding> {
        if let Some((encoding, _)) = Encoding::for_bom(bytes) {
            return Some(encoding);
        }
        let sample = self.sample(bytes);
        if is_utf8_prefix(sample) {
            Some(UTF_8)
        } else if self.classify(bytes) == ContentKind::Text {
            Some(WINDOWS_1252)
        } else {
            None
        }
    }
}
