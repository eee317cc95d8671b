//! GeoTIFF raster tiles.
//!
//! Tiles are expected to be north-up with a ModelTiepoint (tag 33922) and
//! ModelPixelScale (tag 33550) pair describing a lat/lon grid. Multi-sample
//! images are split into one plane per band. The GDAL_NODATA tag (42113)
//! supplies the nodata value when present.

use std::fs::File;
use std::io::{BufWriter, Read, Seek};
use std::path::Path;

use cube_processor::{BoundingBox, CubeError, GridGeometry, RasterSource, RasterTile};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tracing::debug;

use crate::error::{GranuleError, GranuleResult};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

/// GeoKey directory declaring a geographic WGS 84 (EPSG:4326) raster.
const EPSG_4326_GEOKEYS: [u16; 16] = [
    1, 1, 0, 3, // header: version, revision, minor, key count
    1024, 0, 1, 2, // GTModelType = geographic
    1025, 0, 1, 1, // GTRasterType = pixel is area
    2048, 0, 1, 4326, // GeographicType = WGS 84
];

/// [`RasterSource`] backed by GeoTIFF files on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffSource;

impl RasterSource for GeoTiffSource {
    fn open(&self, path: &Path) -> cube_processor::Result<RasterTile> {
        read_geotiff(path).map_err(|e| CubeError::mosaic(path.display().to_string(), e.to_string()))
    }
}

/// Decode a GeoTIFF tile into band planes.
pub fn read_geotiff(path: &Path) -> GranuleResult<RasterTile> {
    let file = File::open(path)?;
    let mut decoder = Decoder::new(file)?;

    // Allow tiles larger than the decoder's default limits
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024;
    limits.intermediate_buffer_size = 1024 * 1024 * 1024;
    limits.ifd_value_size = 1024 * 1024 * 1024;
    decoder = decoder.with_limits(limits);

    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);
    let bbox = read_extent(&mut decoder, width, height)?;
    let nodata = read_nodata(&mut decoder);
    let samples = decode_samples(&mut decoder)?;

    let pixels = width * height;
    if pixels == 0 || samples.len() % pixels != 0 {
        return Err(GranuleError::invalid(format!(
            "{} samples do not fill a {}x{} image",
            samples.len(),
            width,
            height
        )));
    }
    let bands_per_pixel = samples.len() / pixels;
    let bands = deinterleave(samples, bands_per_pixel);
    debug!(path = %path.display(), width, height, bands = bands.len(), "Decoded GeoTIFF");

    Ok(RasterTile {
        geometry: GridGeometry::new(bbox, width, height),
        bands,
        nodata,
    })
}

/// Write one north-up float32 band as a GeoTIFF with EPSG:4326 geokeys.
pub fn write_geotiff(
    path: &Path,
    geometry: &GridGeometry,
    data: &[f32],
    nodata: Option<f32>,
) -> GranuleResult<()> {
    if data.len() != geometry.len() {
        return Err(GranuleError::invalid(format!(
            "band has {} samples, grid has {}",
            data.len(),
            geometry.len()
        )));
    }
    let (res_x, res_y) = geometry.resolution();
    let scale = [res_x, res_y, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, geometry.bbox.min_lon, geometry.bbox.max_lat, 0.0];

    let file = BufWriter::new(File::create(path)?);
    let mut encoder = TiffEncoder::new(file)?;
    let mut image =
        encoder.new_image::<colortype::Gray32Float>(geometry.width as u32, geometry.height as u32)?;
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &scale[..])?;
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])?;
    image
        .encoder()
        .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &EPSG_4326_GEOKEYS[..])?;
    if let Some(nodata) = nodata {
        let text = nodata.to_string();
        image
            .encoder()
            .write_tag(Tag::Unknown(GDAL_NODATA), text.as_str())?;
    }
    image.write_data(data)?;
    Ok(())
}

/// Geographic extent from the tiepoint and pixel scale tags.
fn read_extent<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    width: usize,
    height: usize,
) -> GranuleResult<BoundingBox> {
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::Unknown(MODEL_TIEPOINT))
        .map_err(|_| GranuleError::missing("ModelTiepoint tag"))?;
    let scale = decoder
        .get_tag_f64_vec(Tag::Unknown(MODEL_PIXEL_SCALE))
        .map_err(|_| GranuleError::missing("ModelPixelScale tag"))?;
    if tiepoint.len() < 6 || scale.len() < 2 {
        return Err(GranuleError::invalid("truncated georeferencing tags"));
    }

    // Tiepoint format: [i, j, k, x, y, z] ties raster (i, j) to model (x, y)
    let (scale_x, scale_y) = (scale[0], scale[1]);
    let min_lon = tiepoint[3] - tiepoint[0] * scale_x;
    let max_lat = tiepoint[4] + tiepoint[1] * scale_y;
    Ok(BoundingBox::new(
        min_lon,
        max_lat - height as f64 * scale_y,
        min_lon + width as f64 * scale_x,
        max_lat,
    ))
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f32> {
    decoder
        .get_tag_ascii_string(Tag::Unknown(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse().ok())
}

fn decode_samples<R: Read + Seek>(decoder: &mut Decoder<R>) -> GranuleResult<Vec<f32>> {
    Ok(match decoder.read_image()? {
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
    })
}

/// Split pixel-interleaved samples into one plane per band.
fn deinterleave(samples: Vec<f32>, bands: usize) -> Vec<Vec<f32>> {
    if bands <= 1 {
        return vec![samples];
    }
    let pixels = samples.len() / bands;
    let mut planes = vec![Vec::with_capacity(pixels); bands];
    for pixel in samples.chunks_exact(bands) {
        for (plane, &value) in planes.iter_mut().zip(pixel) {
            plane.push(value);
        }
    }
    planes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_geotiff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.tif");
        let geometry = GridGeometry::new(BoundingBox::new(-10.0, 40.0, -6.0, 42.0), 4, 2);
        let data: Vec<f32> = (0..8).map(|v| v as f32).collect();

        write_geotiff(&path, &geometry, &data, Some(255.0)).unwrap();
        let tile = read_geotiff(&path).unwrap();

        assert!(tile.geometry.approx_eq(&geometry));
        assert_eq!(tile.bands, vec![data]);
        assert_eq!(tile.nodata, Some(255.0));
        assert!(tile.is_nodata(255.0));
    }

    #[test]
    fn test_source_maps_errors_to_mosaic() {
        let err = GeoTiffSource
            .open(Path::new("/nonexistent/tile.tif"))
            .unwrap_err();
        assert!(matches!(err, CubeError::Mosaic { .. }));
    }

    #[test]
    fn test_write_rejects_wrong_length() {
        let dir = tempfile::tempdir().unwrap();
        let geometry = GridGeometry::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 2, 2);
        assert!(write_geotiff(&dir.path().join("x.tif"), &geometry, &[1.0], None).is_err());
    }

    #[test]
    fn test_deinterleave() {
        let planes = deinterleave(vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0], 2);
        assert_eq!(planes, vec![vec![1.0, 2.0, 3.0], vec![10.0, 20.0, 30.0]]);
    }
}
