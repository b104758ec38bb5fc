//! Line decoding with encoding auto-detection.
//!
//! Game servers on Windows often write UTF-16LE logs, sometimes without a
//! byte-order mark. [`detect_encoding`] guesses from a sample, and
//! [`LineDecoder`] frames and decodes lines in the detected encoding,
//! switching once to the alternate encoding if the guess turns out wrong.

use std::borrow::Cow;
use std::fmt;

/// Supported log encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Utf16Le,
}

impl Encoding {
    /// The other supported encoding.
    pub fn alternate(self) -> Self {
        match self {
            Self::Utf8 => Self::Utf16Le,
            Self::Utf16Le => Self::Utf8,
        }
    }

    /// Code unit size in bytes.
    pub fn unit_len(self) -> usize {
        match self {
            Self::Utf8 => 1,
            Self::Utf16Le => 2,
        }
    }

    fn decode_raw(self, bytes: &[u8]) -> (Cow<'_, str>, bool) {
        let codec = match self {
            Self::Utf8 => encoding_rs::UTF_8,
            Self::Utf16Le => encoding_rs::UTF_16LE,
        };
        codec.decode_without_bom_handling(bytes)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Utf8 => "utf-8",
            Self::Utf16Le => "utf-16le",
        })
    }
}

/// NUL ratio above which a sample is treated as UTF-16LE.
const NUL_RATIO_THRESHOLD: f64 = 0.2;

/// Guesses the encoding of a log file from its first bytes.
///
/// A BOM wins; otherwise more than 20% NUL bytes means UTF-16LE.
/// An empty sample is UTF-8.
pub fn detect_encoding(sample: &[u8]) -> Encoding {
    if sample.starts_with(&[0xFF, 0xFE]) {
        return Encoding::Utf16Le;
    }
    if sample.starts_with(&[0xEF, 0xBB, 0xBF]) || sample.is_empty() {
        return Encoding::Utf8;
    }
    let nuls = sample.iter().filter(|&&b| b == 0).count();
    if nuls as f64 / sample.len() as f64 > NUL_RATIO_THRESHOLD {
        Encoding::Utf16Le
    } else {
        Encoding::Utf8
    }
}

/// Removes a leading BOM and every control character except TAB.
pub fn clean_line(text: &str) -> String {
    text.strip_prefix('\u{feff}')
        .unwrap_or(text)
        .chars()
        .filter(|&c| c == '\t' || c >= ' ')
        .collect()
}

/// Per-stream decoder state.
///
/// Unknown until [`observe_sample`](Self::observe_sample) sees at least
/// one code unit; reset on every reopen so a rotated file is detected
/// afresh.
#[derive(Debug, Default)]
pub struct LineDecoder {
    encoding: Option<Encoding>,
    switched: bool,
    /// The last switch split a `0A 00` terminator; its `00` is unread
    realign: bool,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The detected encoding, if any.
    pub fn encoding(&self) -> Option<Encoding> {
        self.encoding
    }

    /// The encoding used for framing and decoding; UTF-8 while unknown.
    pub fn active(&self) -> Encoding {
        self.encoding.unwrap_or(Encoding::Utf8)
    }

    /// Detects the encoding from `sample` unless already known.
    ///
    /// A sample shorter than one UTF-16 code unit decides nothing: the
    /// encoding stays unknown and [`active`](Self::active) reports UTF-8.
    pub fn observe_sample(&mut self, sample: &[u8]) -> Encoding {
        match self.encoding {
            Some(enc) => enc,
            None if sample.len() < 2 => self.active(),
            None => {
                let enc = detect_encoding(sample);
                self.encoding = Some(enc);
                enc
            }
        }
    }

    /// Returns to the unknown state.
    pub fn reset(&mut self) {
        self.encoding = None;
        self.switched = false;
        self.realign = false;
    }

    /// Whether the caller must drop one `00` byte before framing the next
    /// line. Clears the flag.
    ///
    /// Set when a line framed as UTF-8 turned out to be UTF-16LE: framing
    /// stopped at the `0A` of the `0A 00` terminator.
    pub fn take_realign(&mut self) -> bool {
        std::mem::take(&mut self.realign)
    }

    /// Byte length of the first complete line in `buf`, terminator
    /// included.
    ///
    /// UTF-16LE lines end at the code unit `0A 00` on an even offset;
    /// `buf` must start on a code unit boundary.
    pub fn find_line_end(&self, buf: &[u8]) -> Option<usize> {
        match self.active() {
            Encoding::Utf8 => buf.iter().position(|&b| b == b'\n').map(|i| i + 1),
            Encoding::Utf16Le => buf
                .chunks_exact(2)
                .position(|unit| unit == [0x0A, 0x00])
                .map(|i| i * 2 + 2),
        }
    }

    /// Decodes one framed line and cleans it.
    ///
    /// Malformed sequences are replaced, never rejected. If the active
    /// encoding produced replacements and the alternate decodes the same
    /// bytes cleanly, the decoder switches to the alternate for the rest
    /// of the stream. That happens at most once per stream.
    pub fn decode_line(&mut self, bytes: &[u8]) -> String {
        let active = self.active();
        let (text, had_errors) = active.decode_raw(bytes);
        if had_errors && !self.switched {
            let alternate = active.alternate();
            let split_unit = active == Encoding::Utf8
                && bytes.len() % 2 == 1
                && bytes.last() == Some(&b'\n');
            let candidate = if split_unit {
                &bytes[..bytes.len() - 1]
            } else {
                bytes
            };
            let (alt_text, alt_errors) = alternate.decode_raw(candidate);
            if !alt_errors {
                tracing::info!(
                    from = %active,
                    to = %alternate,
                    "malformed input, switching encoding for this stream"
                );
                self.encoding = Some(alternate);
                self.switched = true;
                self.realign = split_unit;
                return clean_line(&alt_text);
            }
        }
        clean_line(&text)
    }
}
