use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use image::{imageops, imageops::FilterType, DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::ArrayViewD;

use crate::catalog::{ClassCatalog, BACKGROUND};
use crate::class_map::ClassMap;
use crate::errors::{DentalSegError, Result};

pub const DEFAULT_ALPHA: f32 = 0.6;

const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Tints every non-background pixel of `original` with its class color. See
/// [`render_class_map`].
pub fn render(
    original: &DynamicImage,
    prediction: ArrayViewD<f32>,
    catalog: &ClassCatalog,
    alpha: f32,
) -> Result<RgbImage> {
    let class_map = ClassMap::from_prediction(prediction, catalog)?;
    render_class_map(original, &class_map, catalog, alpha)
}

/// Resizes `original` to the class map's resolution and alpha-blends each
/// non-background pixel toward its class color. Background pixels keep the
/// resized original color.
pub fn render_class_map(
    original: &DynamicImage,
    class_map: &ClassMap,
    catalog: &ClassCatalog,
    alpha: f32,
) -> Result<RgbImage> {
    check_alpha(alpha)?;
    let (height, width) = class_map.dim();
    let (width, height) = (to_u32(width, "width")?, to_u32(height, "height")?);

    let resized = imageops::resize(&original.to_rgb8(), width, height, FilterType::Lanczos3);
    let classes = class_map.view();

    let mut overlay = RgbImage::new(width, height);
    for (x, y, pixel) in overlay.enumerate_pixels_mut() {
        let source = *resized.get_pixel(x, y);
        let id = classes[[y as usize, x as usize]];
        *pixel = match catalog.get(id) {
            Some(class) if id != BACKGROUND => blend(source, class.rgb(), alpha),
            Some(_) => source,
            None => {
                return Err(DentalSegError::shape(format!(
                    "class id {id} is not in a catalog of {} classes",
                    catalog.len()
                )))
            }
        };
    }
    Ok(overlay)
}

/// `round(alpha * color + (1 - alpha) * original)` per channel.
pub fn blend(original: Rgb<u8>, color: Rgb<u8>, alpha: f32) -> Rgb<u8> {
    let mix = |o: u8, c: u8| {
        (alpha * f32::from(c) + (1.0 - alpha) * f32::from(o))
            .round()
            .clamp(0.0, 255.0) as u8
    };
    let (Rgb([r, g, b]), Rgb([cr, cg, cb])) = (original, color);
    Rgb([mix(r, cr), mix(g, cg), mix(b, cb)])
}

pub fn check_alpha(alpha: f32) -> Result<()> {
    if alpha.is_finite() && (0.0..=1.0).contains(&alpha) {
        Ok(())
    } else {
        Err(DentalSegError::validation(
            "alpha",
            format!("must be within [0, 1], got {alpha}"),
        ))
    }
}

fn to_u32(value: usize, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| DentalSegError::shape(format!("{field} {value} is too large")))
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| DentalSegError::image("PNG encode", e))?;
    Ok(buffer.into_inner())
}

pub fn to_data_uri(image: &RgbImage) -> Result<String> {
    let png = encode_png(image)?;
    Ok(format!("{PNG_DATA_URI_PREFIX}{}", B64.encode(png)))
}
