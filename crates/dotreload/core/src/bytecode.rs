// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Binary image format for modules and debug symbols
//!
//! `header (8 bytes) | blake3 checksum of payload (32 bytes) | payload`, where the
//! payload is the bincode encoding of the object graph.

use crate::module::{Module, ModuleUid};
use crate::symbols::DebugSymbols;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

/// Kind of content an image carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ImageKind {
    Module = 0,
    Symbols = 1,
}

impl ImageKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ImageKind::Module),
            1 => Some(ImageKind::Symbols),
            _ => None,
        }
    }

    fn magic(self) -> [u8; 5] {
        match self {
            ImageKind::Module => ImageHeader::MODULE_MAGIC,
            ImageKind::Symbols => ImageHeader::SYMBOLS_MAGIC,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("image is truncated: {0} bytes")]
    Truncated(usize),

    #[error("invalid magic number")]
    InvalidMagic,

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),

    #[error("expected a {expected:?} image, found kind byte {found}")]
    KindMismatch { expected: ImageKind, found: u8 },

    #[error("payload checksum mismatch")]
    ChecksumMismatch,

    #[error("encoding failed: {0}")]
    Encode(String),

    #[error("decoding failed: {0}")]
    Decode(String),

    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    #[error("debug symbols belong to module {symbols}, not {module}")]
    SymbolMismatch { module: ModuleUid, symbols: ModuleUid },
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Header of a DotReload image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageHeader {
    pub magic: [u8; 5],
    pub version: u8,
    pub kind: ImageKind,
    pub reserved: u8,
}

impl ImageHeader {
    pub const MODULE_MAGIC: [u8; 5] = *b"DRMOD";
    pub const SYMBOLS_MAGIC: [u8; 5] = *b"DRSYM";
    pub const CURRENT_VERSION: u8 = 1;

    pub fn new(kind: ImageKind) -> Self {
        ImageHeader {
            magic: kind.magic(),
            version: Self::CURRENT_VERSION,
            kind,
            reserved: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[0..5].copy_from_slice(&self.magic);
        bytes[5] = self.version;
        bytes[6] = self.kind as u8;
        bytes[7] = self.reserved;
        bytes
    }

    /// Parse and check a header of the expected kind
    pub fn from_bytes(bytes: &[u8], expected: ImageKind) -> CodecResult<Self> {
        if bytes.len() < Self::size() {
            return Err(CodecError::Truncated(bytes.len()));
        }
        if bytes[0..5] != expected.magic() {
            return Err(CodecError::InvalidMagic);
        }
        if bytes[5] != Self::CURRENT_VERSION {
            return Err(CodecError::UnsupportedVersion(bytes[5]));
        }
        let kind = ImageKind::from_u8(bytes[6])
            .filter(|k| *k == expected)
            .ok_or(CodecError::KindMismatch { expected, found: bytes[6] })?;

        Ok(ImageHeader {
            magic: expected.magic(),
            version: bytes[5],
            kind,
            reserved: bytes[7],
        })
    }

    pub const fn size() -> usize {
        8 // 5 (magic) + 1 (version) + 1 (kind) + 1 (reserved)
    }
}

const CHECKSUM_LEN: usize = 32;

fn encode<T: Serialize>(kind: ImageKind, value: &T) -> CodecResult<Vec<u8>> {
    let payload = bincode::serde::encode_to_vec(value, bincode::config::standard()).map_err(|e| CodecError::Encode(e.to_string()))?;
    let mut image = Vec::with_capacity(ImageHeader::size() + CHECKSUM_LEN + payload.len());
    image.extend_from_slice(&ImageHeader::new(kind).to_bytes());
    image.extend_from_slice(blake3::hash(&payload).as_bytes());
    image.extend_from_slice(&payload);
    Ok(image)
}

fn decode<T: DeserializeOwned>(kind: ImageKind, image: &[u8]) -> CodecResult<T> {
    ImageHeader::from_bytes(image, kind)?;
    let body = &image[ImageHeader::size()..];
    if body.len() < CHECKSUM_LEN {
        return Err(CodecError::Truncated(image.len()));
    }
    let (checksum, payload) = body.split_at(CHECKSUM_LEN);
    if blake3::hash(payload).as_bytes() != checksum {
        return Err(CodecError::ChecksumMismatch);
    }
    let (value, read): (T, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard()).map_err(|e| CodecError::Decode(e.to_string()))?;
    if read != payload.len() {
        return Err(CodecError::TrailingBytes(payload.len() - read));
    }
    Ok(value)
}

/// Serialize a module into an image
pub fn write_module(module: &Module) -> CodecResult<Vec<u8>> {
    let image = encode(ImageKind::Module, module)?;
    debug!(module = %module.name, bytes = image.len(), "wrote module image");
    Ok(image)
}

/// Parse a module image
pub fn read_module(image: &[u8]) -> CodecResult<Module> {
    decode(ImageKind::Module, image)
}

pub fn write_symbols(symbols: &DebugSymbols) -> CodecResult<Vec<u8>> {
    encode(ImageKind::Symbols, symbols)
}

/// Parse a symbols image and check it belongs to the module with identity `module`
pub fn read_symbols(image: &[u8], module: ModuleUid) -> CodecResult<DebugSymbols> {
    let symbols: DebugSymbols = decode(ImageKind::Symbols, image)?;
    if symbols.module_id != module {
        return Err(CodecError::SymbolMismatch {
            module,
            symbols: symbols.module_id,
        });
    }
    Ok(symbols)
}

/// Parse a module together with its optional symbols
pub fn read_module_with_symbols(image: &[u8], symbols: Option<&[u8]>) -> CodecResult<(Module, Option<DebugSymbols>)> {
    let module = read_module(image)?;
    let symbols = symbols.map(|bytes| read_symbols(bytes, module.uid)).transpose()?;
    Ok((module, symbols))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{FieldDef, TypeDef, TypeSig};
    use crate::symbols::SourceLocation;

    fn sample() -> Module {
        let mut module = Module::new("Codec.Sample");
        let ty = module.add_type(TypeDef::class("Sample", "Holder"));
        module.add_field(ty, FieldDef::new_static("count", TypeSig::I32)).unwrap();
        module
    }

    #[test]
    fn test_header_layout() {
        let bytes = ImageHeader::new(ImageKind::Symbols).to_bytes();
        assert_eq!(&bytes[0..5], b"DRSYM");
        assert_eq!(bytes[5], ImageHeader::CURRENT_VERSION);
        assert_eq!(bytes[6], 1);
        assert_eq!(ImageHeader::size(), bytes.len());
    }

    #[test]
    fn test_module_image_round_trip() {
        let module = sample();
        let image = write_module(&module).unwrap();
        assert_eq!(read_module(&image).unwrap(), module);
    }

    #[test]
    fn test_corrupt_payload_detected() {
        let mut image = write_module(&sample()).unwrap();
        let last = image.len() - 1;
        image[last] ^= 0xff;
        assert_eq!(read_module(&image).unwrap_err(), CodecError::ChecksumMismatch);
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let module = sample();
        let symbols = write_symbols(&DebugSymbols::new(module.uid)).unwrap();
        assert_eq!(read_module(&symbols).unwrap_err(), CodecError::InvalidMagic);
        assert_eq!(read_module(b"DRM").unwrap_err(), CodecError::Truncated(3));
    }

    #[test]
    fn test_symbols_must_match_module() {
        let module = sample();
        let mut symbols = DebugSymbols::new(ModuleUid::derive(b"someone else"));
        symbols.set_field_location(crate::module::FieldId(0), SourceLocation::new("x.src", 1, 1));
        let bytes = write_symbols(&symbols).unwrap();
        let image = write_module(&module).unwrap();

        let err = read_module_with_symbols(&image, Some(&bytes)).unwrap_err();
        assert!(matches!(err, CodecError::SymbolMismatch { .. }));
        assert!(read_module_with_symbols(&image, None).unwrap().1.is_none());
    }
}
