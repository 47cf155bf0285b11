use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};

/// Standard alphabet, canonical padding, and trailing bits tolerated the way
/// `atob` tolerates them.
const ATOB: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::RequireCanonical),
);

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid base64url key: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Number of `=` characters needed to bring `len` to a multiple of four.
pub fn padding_for(len: usize) -> usize {
    (4 - len % 4) % 4
}

/// Decodes a base64url string (padded or not) into the raw key bytes handed
/// to the push manager as `applicationServerKey`.
pub fn url_base64_to_bytes(input: &str) -> Result<Vec<u8>, KeyError> {
    let mut standard = String::with_capacity(input.len() + 3);
    standard.extend(
        input
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .map(|c| match c {
                '-' => '+',
                '_' => '/',
                c => c,
            }),
    );
    standard.extend(std::iter::repeat('=').take(padding_for(standard.len())));

    Ok(ATOB.decode(standard)?)
}
