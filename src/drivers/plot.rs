use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::LineSeries;
use plotters::prelude::*;

use crate::drivers::buffer::Sample;
use crate::drivers::error::PlotError;

#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub raw_color: RGBColor,
    pub filtered_color: RGBColor,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 500,
            background: RGBColor(255, 255, 255),
            raw_color: RGBColor(31, 119, 180),
            filtered_color: RGBColor(255, 127, 14),
        }
    }
}

/// Renders raw and filtered voltage against session time as a PNG.
pub fn render_capture_png(samples: &[Sample], style: &PlotStyle) -> Result<Vec<u8>, PlotError> {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return Err(PlotError::Empty);
    };
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let (y_min, y_max) = samples
            .iter()
            .flat_map(|s| [s.raw, s.filtered])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        let pad = ((y_max - y_min) * 0.05).max(0.1);
        let x_end = if last.timestamp > first.timestamp {
            last.timestamp
        } else {
            first.timestamp + 1.0
        };
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption("Captured voltage", ("sans-serif", 20).into_font())
            .set_label_area_size(LabelAreaPosition::Left, 50)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(first.timestamp..x_end, (y_min - pad)..(y_max + pad))?;
        chart
            .configure_mesh()
            .x_desc("Tiempo (s)")
            .y_desc("Voltaje (V)")
            .light_line_style(&BLACK.mix(0.05))
            .draw()?;
        let raw_color = style.raw_color;
        chart
            .draw_series(LineSeries::new(
                samples.iter().map(|s| (s.timestamp, s.raw)),
                &raw_color,
            ))?
            .label("Voltaje de Entrada")
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &raw_color));
        let filtered_color = style.filtered_color;
        chart
            .draw_series(LineSeries::new(
                samples.iter().map(|s| (s.timestamp, s.filtered)),
                &filtered_color,
            ))?
            .label("Voltaje Filtrado")
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &filtered_color));
        chart
            .configure_series_labels()
            .border_style(&BLACK.mix(0.3))
            .background_style(&style.background)
            .draw()?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}

pub fn export_capture_png(
    samples: &[Sample],
    style: &PlotStyle,
    path: &Path,
) -> Result<(), PlotError> {
    let png = render_capture_png(samples, style)?;
    std::fs::write(path, png).map_err(|e| PlotError::Render(format!("{}: {e}", path.display())))?;
    log::info!("Exported plot to {}", path.display());
    Ok(())
}

fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, PlotError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| PlotError::Render("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    DynamicImage::ImageRgb8(image).write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
