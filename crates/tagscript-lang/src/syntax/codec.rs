//! Persisted compiled form: one format-version byte followed by the
//! MessagePack encoding of the program tree.

use thiserror::Error as ThisError;

use crate::syntax::cst::Program;

pub const FORMAT_VERSION: u8 = 1;

#[derive(Debug, ThisError)]
pub enum CodecError {
    #[error("compiled buffer is empty")]
    Empty,
    #[error("compiled format version {0} is not supported (expected {FORMAT_VERSION})")]
    Version(u8),
    #[error("failed to encode program: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode program: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

pub fn encode(program: &Program) -> Result<Vec<u8>, CodecError> {
    let mut out = vec![FORMAT_VERSION];
    rmp_serde::encode::write(&mut out, program)?;
    Ok(out)
}

pub fn decode(bytes: &[u8]) -> Result<Program, CodecError> {
    let (&version, body) = bytes.split_first().ok_or(CodecError::Empty)?;
    if version != FORMAT_VERSION {
        return Err(CodecError::Version(version));
    }
    Ok(rmp_serde::from_slice(body)?)
}
