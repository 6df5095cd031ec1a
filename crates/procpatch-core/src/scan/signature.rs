use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Byte pattern used to locate a code site.
///
/// Every token is either an exact byte or a wildcard (`??`). Catalogues in
/// use today only carry exact bytes, which take a `memmem` fast path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ByteSignature {
    tokens: Vec<Option<u8>>,
}

impl ByteSignature {
    pub fn exact(bytes: &[u8]) -> Self {
        Self {
            tokens: bytes.iter().copied().map(Some).collect(),
        }
    }

    pub fn from_tokens(tokens: Vec<Option<u8>>) -> Self {
        Self { tokens }
    }

    /// Parse `"74 4F ?? 8B"` style text
    pub fn parse(text: &str) -> Result<Self> {
        let mut tokens = Vec::new();
        for token in text.split_whitespace() {
            if token == "??" || token == "?" {
                tokens.push(None);
                continue;
            }

            let value = u8::from_str_radix(token, 16).map_err(|e| {
                Error::InvalidSignature(format!("invalid token '{}': {}", token, e))
            })?;
            tokens.push(Some(value));
        }

        if tokens.is_empty() {
            return Err(Error::InvalidSignature("pattern is empty".to_string()));
        }

        Ok(Self { tokens })
    }

    pub fn tokens(&self) -> &[Option<u8>] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// True when no token is a wildcard
    pub fn is_exact(&self) -> bool {
        self.tokens.iter().all(Option::is_some)
    }

    pub fn exact_bytes(&self) -> Option<Vec<u8>> {
        self.tokens.iter().copied().collect()
    }

    pub fn matches(&self, window: &[u8]) -> bool {
        window.len() == self.tokens.len()
            && self
                .tokens
                .iter()
                .zip(window)
                .all(|(token, byte)| token.is_none_or(|value| value == *byte))
    }

    /// Offset of the first match in `haystack`
    pub fn find_in(&self, haystack: &[u8]) -> Option<usize> {
        if self.is_empty() || haystack.len() < self.len() {
            return None;
        }

        match self.exact_bytes() {
            Some(needle) => memchr::memmem::find(haystack, &needle),
            None => haystack
                .windows(self.len())
                .position(|window| self.matches(window)),
        }
    }

    /// Signature as it reads after `bytes` were written at match-relative
    /// `offset`.
    ///
    /// Returns `None` when the written range does not overlap the signature,
    /// does not change any of its bytes, or lies outside the `i64` range.
    pub fn overlay(&self, offset: i64, bytes: &[u8]) -> Option<Self> {
        let sig_len = i64::try_from(self.len()).ok()?;
        let start = offset.max(0);
        let end = offset.checked_add(i64::try_from(bytes.len()).ok()?)?.min(sig_len);
        if start >= end {
            return None;
        }

        let mut tokens = self.tokens.clone();
        for position in start..end {
            tokens[position as usize] = Some(bytes[(position - offset) as usize]);
        }

        (tokens != self.tokens).then_some(Self { tokens })
    }
}

impl fmt::Display for ByteSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .tokens
            .iter()
            .map(|token| match token {
                Some(value) => format!("{:02X}", value),
                None => "??".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        f.write_str(&text)
    }
}

impl FromStr for ByteSignature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ByteSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SignatureRepr {
    Text(String),
    Bytes(Vec<u8>),
}

impl<'de> Deserialize<'de> for ByteSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match SignatureRepr::deserialize(deserializer)? {
            SignatureRepr::Text(text) => Self::parse(&text).map_err(serde::de::Error::custom),
            SignatureRepr::Bytes(bytes) => Ok(Self::exact(&bytes)),
        }
    }
}

/// Parse space-separated hex bytes without wildcards
pub fn parse_hex_bytes(text: &str) -> Result<Vec<u8>> {
    ByteSignature::parse(text)?
        .exact_bytes()
        .ok_or_else(|| Error::InvalidSignature(format!("wildcards not allowed in '{}'", text)))
}

pub fn format_hex_bytes(bytes: &[u8]) -> String {
    ByteSignature::exact(bytes).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_wildcards() {
        let sig = ByteSignature::parse("48 8D 0D ?? ?? ?? ??").unwrap();
        assert_eq!(sig.len(), 7);
        assert_eq!(sig.tokens()[2], Some(0x0D));
        assert_eq!(sig.tokens()[3], None);
        assert!(!sig.is_exact());
        assert_eq!(sig.to_string(), "48 8D 0D ?? ?? ?? ??");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ByteSignature::parse("").is_err());
        assert!(ByteSignature::parse("74 4G").is_err());
        assert!(parse_hex_bytes("90 ??").is_err());
        assert_eq!(parse_hex_bytes("90 90").unwrap(), vec![0x90, 0x90]);
    }

    #[test]
    fn test_find_in_exact_and_wildcard() {
        let haystack = [0x00, 0x74, 0x4F, 0x01, 0x74, 0x4F];
        assert_eq!(ByteSignature::exact(&[0x74, 0x4F]).find_in(&haystack), Some(1));

        let wild = ByteSignature::from_tokens(vec![Some(0x4F), None, Some(0x4F)]);
        assert_eq!(wild.find_in(&[0x4F, 0x00, 0x00, 0x4F]), None);
        assert_eq!(wild.find_in(&[0x4F, 0x74, 0x4F]), Some(0));
        assert_eq!(ByteSignature::exact(&[1, 2, 3]).find_in(&[1, 2]), None);
    }

    #[test]
    fn test_overlay() {
        let sig = ByteSignature::exact(&[0x74, 0x4F, 0x8B, 0x05]);

        let patched = sig.overlay(0, &[0x90, 0x90]).unwrap();
        assert_eq!(patched.to_string(), "90 90 8B 05");

        // Partially past the end: only the overlapping byte is replaced
        let tail = sig.overlay(3, &[0xEB, 0x00]).unwrap();
        assert_eq!(tail.to_string(), "74 4F 8B EB");

        // Negative offset reaching into the signature
        let head = sig.overlay(-1, &[0x00, 0xEB]).unwrap();
        assert_eq!(head.to_string(), "EB 4F 8B 05");

        assert!(sig.overlay(4, &[0x90]).is_none());
        assert!(sig.overlay(0, &[0x74]).is_none());

        assert!(sig.overlay(i64::MAX, &[0x90, 0x90]).is_none());
        assert!(sig.overlay(i64::MIN, &[0x90, 0x90]).is_none());
    }

    #[test]
    fn test_deserialize_text_and_array() {
        let from_text: ByteSignature = serde_json::from_str("\"74 4F\"").unwrap();
        let from_array: ByteSignature = serde_json::from_str("[116, 79]").unwrap();
        assert_eq!(from_text, from_array);
        assert_eq!(serde_json::to_string(&from_text).unwrap(), "\"74 4F\"");
    }
}
