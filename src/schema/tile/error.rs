use thiserror::Error;

use std::path::PathBuf;


#[derive(Error, Debug)]
pub enum TileReadError {
    #[error("An IO error while reading a tile: {0}")]
    Io(#[from] std::io::Error),
    #[error("Tile file not found at path: {0:?}")]
    NotFound(PathBuf),
    #[error("Tile is not a valid PNG: {0}")]
    Decode(#[from] png::DecodingError),
    #[error("Tile has unsupported pixel layout {color_type:?} at {bit_depth:?}")]
    UnsupportedLayout {
        color_type: png::ColorType,
        bit_depth: png::BitDepth,
    },
    #[error("Decoded tile buffer does not match its {width}x{height} dimensions")]
    InvalidDimensions {
        width: u32,
        height: u32,
    },
}

#[derive(Error, Debug)]
pub enum TileWriteError {
    #[error("An IO error while writing a tile: {0}")]
    Io(#[from] std::io::Error),
    #[error("Tile could not be encoded as PNG: {0}")]
    Encode(#[from] png::EncodingError),
}
