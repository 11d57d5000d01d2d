//! # gpt2-tokenizer
//!
//! Tokenization for gpt2-complete.
//!
//! This crate provides:
//! - A `Tokenizer` trait for pluggable tokenization backends
//! - [`HfTokenizer`], the GPT-2 byte-level BPE loaded from a `tokenizer.json`
//! - [`ByteTokenizer`], a reference byte-level tokenizer for testing

use std::path::Path;

use gpt2_engine::TokenId;

/// GPT-2's end-of-text marker; doubles as the padding token.
pub const END_OF_TEXT: &str = "<|endoftext|>";

/// Error type for tokenization operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenizerError {
    #[error("Failed to load tokenizer: {0}")]
    Load(String),
    #[error("Tokenizer has no {0} token")]
    MissingSpecialToken(String),
    #[error("Invalid token ID: {0}")]
    InvalidToken(TokenId),
    #[error("Encoding error: {0}")]
    EncodingError(String),
    #[error("Decoding error: {0}")]
    DecodingError(String),
}

pub type TokenizerResult<T> = std::result::Result<T, TokenizerError>;

/// Core tokenizer trait. Implementations can be swapped without changing app code.
pub trait Tokenizer: Send + Sync {
    /// Encode text into a sequence of token IDs. No special tokens are added.
    fn encode(&self, text: &str) -> TokenizerResult<Vec<TokenId>>;

    /// Decode a sequence of tokens into text, optionally dropping special tokens.
    fn decode(&self, tokens: &[TokenId], skip_special_tokens: bool) -> TokenizerResult<String>;

    /// The end-of-sequence token.
    fn eos_token_id(&self) -> TokenId;

    /// The token used to pad finished sequences in a batch.
    fn pad_token_id(&self) -> TokenId {
        self.eos_token_id()
    }

    /// Get vocabulary size, special tokens included.
    fn vocab_size(&self) -> usize;
}

/// GPT-2 tokenizer backed by the `tokenizers` crate.
///
/// Padding is configured to use the end-of-text token, so batches of
/// sequences that finish at different lengths pad uniformly.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
    eos_id: TokenId,
}

impl HfTokenizer {
    /// Load a `tokenizer.json` from disk.
    pub fn from_file(path: impl AsRef<Path>) -> TokenizerResult<Self> {
        let path = path.as_ref();
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| TokenizerError::Load(format!("{}: {e}", path.display())))?;
        Self::from_tokenizer(inner)
    }

    /// Wrap an already-built tokenizer. It must know the end-of-text token.
    pub fn from_tokenizer(mut inner: tokenizers::Tokenizer) -> TokenizerResult<Self> {
        let eos_id = inner
            .token_to_id(END_OF_TEXT)
            .ok_or_else(|| TokenizerError::MissingSpecialToken(END_OF_TEXT.to_string()))?;

        inner.with_padding(Some(tokenizers::PaddingParams {
            pad_id: eos_id,
            pad_token: END_OF_TEXT.to_string(),
            ..Default::default()
        }));

        Ok(Self { inner, eos_id })
    }

    /// Access the wrapped tokenizer.
    pub fn inner(&self) -> &tokenizers::Tokenizer {
        &self.inner
    }
}

impl Tokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> TokenizerResult<Vec<TokenId>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| TokenizerError::EncodingError(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, tokens: &[TokenId], skip_special_tokens: bool) -> TokenizerResult<String> {
        self.inner
            .decode(tokens, skip_special_tokens)
            .map_err(|e| TokenizerError::DecodingError(e.to_string()))
    }

    fn eos_token_id(&self) -> TokenId {
        self.eos_id
    }

    fn pad_token_id(&self) -> TokenId {
        self.inner
            .get_padding()
            .map(|p| p.pad_id)
            .unwrap_or(self.eos_id)
    }

    fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }
}

/// Reference byte-level tokenizer for tests.
///
/// - One token per UTF-8 byte (ids 0..=255)
/// - Id 256 is the end-of-text token
/// - Deterministic and lossless for any input
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteTokenizer;

impl ByteTokenizer {
    pub const EOS: TokenId = 256;
    pub const VOCAB_SIZE: usize = 257;

    pub fn new() -> Self {
        Self
    }
}

impl Tokenizer for ByteTokenizer {
    fn encode(&self, text: &str) -> TokenizerResult<Vec<TokenId>> {
        Ok(text.bytes().map(TokenId::from).collect())
    }

    fn decode(&self, tokens: &[TokenId], skip_special_tokens: bool) -> TokenizerResult<String> {
        let mut bytes = Vec::with_capacity(tokens.len());
        for &id in tokens {
            match id {
                0..=255 => bytes.push(id as u8),
                Self::EOS if skip_special_tokens => {}
                Self::EOS => bytes.extend_from_slice(END_OF_TEXT.as_bytes()),
                other => return Err(TokenizerError::InvalidToken(other)),
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn eos_token_id(&self) -> TokenId {
        Self::EOS
    }

    fn vocab_size(&self) -> usize {
        Self::VOCAB_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_encode_simple() {
        let tok = ByteTokenizer::new();
        assert_eq!(tok.encode("hi").unwrap(), vec![104, 105]);
    }

    #[test]
    fn byte_encode_empty_string() {
        let tok = ByteTokenizer::new();
        assert!(tok.encode("").unwrap().is_empty());
    }

    #[test]
    fn byte_decode_roundtrip_multibyte() {
        let tok = ByteTokenizer::new();
        let original = "trời đẹp";
        let encoded = tok.encode(original).unwrap();
        assert_eq!(tok.decode(&encoded, true).unwrap(), original);
    }

    #[test]
    fn byte_decode_skips_eos_when_asked() {
        let tok = ByteTokenizer::new();
        let tokens = [104, 105, ByteTokenizer::EOS, ByteTokenizer::EOS];
        assert_eq!(tok.decode(&tokens, true).unwrap(), "hi");
        assert_eq!(
            tok.decode(&tokens, false).unwrap(),
            "hi<|endoftext|><|endoftext|>"
        );
    }

    #[test]
    fn byte_decode_invalid_token_errors() {
        let tok = ByteTokenizer::new();
        assert_eq!(
            tok.decode(&[999], true).unwrap_err(),
            TokenizerError::InvalidToken(999)
        );
    }

    #[test]
    fn byte_pad_defaults_to_eos() {
        let tok = ByteTokenizer::new();
        assert_eq!(tok.pad_token_id(), tok.eos_token_id());
        assert_eq!(tok.vocab_size(), 257);
    }
}
