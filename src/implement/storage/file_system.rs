use crate::schema::tile::coord::Coord;
use crate::schema::tile::error::{TileReadError, TileWriteError};
use crate::schema::tile::record::{MapId, Zoom};

use image::RgbaImage;
use log::debug;

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::result::Result;
use std::vec::Vec;


const RGBA_CHANNELS: usize = 4;

/// Tile files below the grid storage root. All paths handed in or out are relative to the root.
pub struct TileFileSystem {
    root: PathBuf,
}

impl TileFileSystem {
    pub fn new(root: &Path) -> TileFileSystem {
        TileFileSystem {
            root: root.to_path_buf(),
        }
    }

    pub fn tile_relative_path(
        tenant_id: &str,
        map_id: MapId,
        zoom: Zoom,
        coord: &Coord,
    ) -> String {
        format!("tenants/{}/{}/{}/{}.png", tenant_id, map_id, zoom, coord.name())
    }

    pub fn grid_relative_path(grid_id: &str) -> String {
        format!("grids/{}.png", grid_id)
    }

    pub fn absolute_path(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }

    pub fn exists(&self, relative_path: &str) -> bool {
        !relative_path.is_empty() && self.absolute_path(relative_path).is_file()
    }

    pub fn file_size(&self, relative_path: &str) -> Result<u64, std::io::Error> {
        Ok(fs::metadata(self.absolute_path(relative_path))?.len())
    }

    pub fn read_image(&self, relative_path: &str) -> Result<RgbaImage, TileReadError> {
        let path = self.absolute_path(relative_path);
        if !self.exists(relative_path) {
            return Err(TileReadError::NotFound(path));
        }
        let file = File::open(&path)?;
        return decode_png(BufReader::new(file));
    }

    /// Writes the image next to its destination and renames it into place, creating
    /// directories as needed. Returns the size of the new file.
    pub fn write_image(
        &self,
        relative_path: &str,
        image: &RgbaImage,
    ) -> Result<u64, TileWriteError> {
        let path = self.absolute_path(relative_path);
        if let Some(directory) = path.parent() {
            fs::create_dir_all(directory)?;
        }
        let encoded = encode_png(image)?;
        let staging_path = path.with_extension("png.tmp");
        fs::write(&staging_path, &encoded)?;
        fs::rename(&staging_path, &path)?;
        debug!("TileFileSystem::write_image - wrote {} bytes to {:?}", encoded.len(), path);
        return Ok(encoded.len() as u64);
    }
}

/// Lossless RGBA8 encoding tuned for speed: no filtering and the fastest deflate level.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, png::EncodingError> {
    let mut buffer = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut buffer, image.width(), image.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(png::Compression::Fast);
        encoder.set_filter(png::FilterType::NoFilter);
        encoder.set_adaptive_filter(png::AdaptiveFilterType::NonAdaptive);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(image.as_raw())?;
        writer.finish()?;
    }
    return Ok(buffer);
}

pub fn decode_png<R: Read>(input: R) -> Result<RgbaImage, TileReadError> {
    let mut decoder = png::Decoder::new(input);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info()?;
    let mut buffer = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buffer)?;
    if info.bit_depth != png::BitDepth::Eight {
        return Err(TileReadError::UnsupportedLayout {
            color_type: info.color_type,
            bit_depth: info.bit_depth,
        });
    }
    let pixels = &buffer[..info.buffer_size()];
    let pixel_count = (info.width as usize) * (info.height as usize);
    let mut rgba = Vec::with_capacity(pixel_count * RGBA_CHANNELS);
    match info.color_type {
        png::ColorType::Rgba => rgba.extend_from_slice(pixels),
        png::ColorType::Rgb => {
            for pixel in pixels.chunks_exact(3) {
                rgba.extend_from_slice(&[pixel[0], pixel[1], pixel[2], u8::MAX]);
            }
        },
        png::ColorType::GrayscaleAlpha => {
            for pixel in pixels.chunks_exact(2) {
                rgba.extend_from_slice(&[pixel[0], pixel[0], pixel[0], pixel[1]]);
            }
        },
        png::ColorType::Grayscale => {
            for pixel in pixels.iter() {
                rgba.extend_from_slice(&[*pixel, *pixel, *pixel, u8::MAX]);
            }
        },
        other => {
            return Err(TileReadError::UnsupportedLayout {
                color_type: other,
                bit_depth: info.bit_depth,
            });
        },
    };
    return RgbaImage::from_raw(info.width, info.height, rgba).ok_or(
        TileReadError::InvalidDimensions {
            width: info.width,
            height: info.height,
        }
    );
}


#[cfg(test)]
pub mod test_utils {
    use super::*;
    use image::Rgba;


    pub fn solid_tile(size: u32, colour: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(size, size, Rgba(colour))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::test_utils::solid_tile;
    use mktemp::Temp;
    use std::error::Error;
    use std::io::Cursor;

    #[test]
    fn test_tile_relative_path_layout() -> Result<(), Box<dyn Error>> {
        assert_eq!(
            "tenants/t1/3/2/-1_4.png",
            TileFileSystem::tile_relative_path("t1", 3, 2, &Coord::new(-1, 4)),
            "Unexpected tile path layout"
        );
        assert_eq!("grids/abc.png", TileFileSystem::grid_relative_path("abc"), "Unexpected grid path layout");
        Ok(())
    }

    #[test]
    fn test_write_then_read_image() -> Result<(), Box<dyn Error>> {
        let root = Temp::new_dir()?;
        let files = TileFileSystem::new(root.as_ref());
        let path = TileFileSystem::tile_relative_path("t1", 1, 1, &Coord::new(0, 0));
        let expected = solid_tile(100, [10, 20, 30, 255]);
        let size = files.write_image(&path, &expected)?;
        assert!(files.exists(&path), "Tile file was not created");
        assert_eq!(size, files.file_size(&path)?, "Reported size does not match the file");
        assert!(!files.absolute_path(&format!("{}.tmp", path)).exists(), "Staging file was left behind");
        let actual = files.read_image(&path)?;
        assert_eq!(expected, actual, "Tile pixels changed after a write and read");
        Ok(())
    }

    #[test]
    fn test_write_replaces_existing_file() -> Result<(), Box<dyn Error>> {
        let root = Temp::new_dir()?;
        let files = TileFileSystem::new(root.as_ref());
        let path = TileFileSystem::tile_relative_path("t1", 1, 1, &Coord::new(0, 0));
        files.write_image(&path, &solid_tile(100, [255, 0, 0, 255]))?;
        let replacement = solid_tile(100, [0, 0, 255, 255]);
        files.write_image(&path, &replacement)?;
        assert_eq!(replacement, files.read_image(&path)?, "Tile was not replaced");
        Ok(())
    }

    #[test]
    fn test_read_missing_image() -> Result<(), Box<dyn Error>> {
        let root = Temp::new_dir()?;
        let files = TileFileSystem::new(root.as_ref());
        match files.read_image("grids/missing.png") {
            Err(TileReadError::NotFound(_)) => (),
            other => panic!("Expected NotFound, got {:?}", other.map(|_| ())),
        }
        assert!(!files.exists(""), "Empty path should never exist");
        Ok(())
    }

    #[test]
    fn test_read_corrupt_image() -> Result<(), Box<dyn Error>> {
        let root = Temp::new_dir()?;
        let files = TileFileSystem::new(root.as_ref());
        fs::create_dir_all(files.absolute_path("grids"))?;
        fs::write(files.absolute_path("grids/corrupt.png"), b"definitely not a png")?;
        assert!(files.read_image("grids/corrupt.png").is_err(), "Corrupt tile was decoded");
        Ok(())
    }

    #[test]
    fn test_decode_rgb_adds_opaque_alpha() -> Result<(), Box<dyn Error>> {
        let mut encoded = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut encoded, 2, 1);
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header()?;
            writer.write_image_data(&[1, 2, 3, 4, 5, 6])?;
            writer.finish()?;
        }
        let decoded = decode_png(Cursor::new(encoded))?;
        assert_eq!(&[1, 2, 3, 255, 4, 5, 6, 255][..], decoded.as_raw().as_slice(), "Unexpected RGBA expansion");
        Ok(())
    }

    #[test]
    fn test_decode_grayscale_alpha() -> Result<(), Box<dyn Error>> {
        let mut encoded = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut encoded, 1, 1);
            encoder.set_color(png::ColorType::GrayscaleAlpha);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header()?;
            writer.write_image_data(&[9, 128])?;
            writer.finish()?;
        }
        let decoded = decode_png(Cursor::new(encoded))?;
        assert_eq!(&[9, 9, 9, 128][..], decoded.as_raw().as_slice(), "Unexpected RGBA expansion");
        Ok(())
    }
}
