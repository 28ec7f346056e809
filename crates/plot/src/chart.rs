//! Four-panel PNG chart of the per-epoch means.

use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;

use autogan_common::{AutoGanError, LossName, Result};

use crate::means::EpochMeans;

const SIZE: (u32, u32) = (2400, 400);
const BACKGROUND: RGBColor = RGBColor(0xf0, 0xf0, 0xf0);
const STEELBLUE: RGBColor = RGBColor(70, 130, 180);
const GOLDENROD: RGBColor = RGBColor(218, 165, 32);
const DARKSEAGREEN: RGBColor = RGBColor(143, 188, 143);
const PALEVIOLETRED: RGBColor = RGBColor(219, 112, 147);

/// One subplot: title and its `(label, loss, colour)` lines.
struct Panel {
    title: &'static str,
    lines: &'static [(&'static str, LossName, RGBColor)],
}

const PANELS: [Panel; 4] = [
    Panel {
        title: "G and D loss",
        lines: &[
            ("G Train", LossName::GGan, STEELBLUE),
            ("G Val", LossName::ValGGan, GOLDENROD),
            ("D real", LossName::DReal, DARKSEAGREEN),
            ("D fake", LossName::DFake, PALEVIOLETRED),
        ],
    },
    Panel {
        title: "L1 loss",
        lines: &[
            ("Train", LossName::GL1, STEELBLUE),
            ("Val", LossName::ValGL1, GOLDENROD),
        ],
    },
    Panel {
        title: "SSIM",
        lines: &[("Val", LossName::Ssim, GOLDENROD)],
    },
    Panel {
        title: "PSNR",
        lines: &[("Val", LossName::Psnr, GOLDENROD)],
    },
];

fn render_err(e: impl std::fmt::Display) -> AutoGanError {
    AutoGanError::Render(e.to_string())
}

/// Render `means` to `path`, one panel per loss group side by side.
pub fn render_chart(means: &EpochMeans, path: &Path) -> Result<()> {
    if means.is_empty() {
        return Err(AutoGanError::Render("no epochs to plot".to_string()));
    }
    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    for (area, panel) in root.split_evenly((1, PANELS.len())).iter().zip(&PANELS) {
        draw_panel(area, panel, means)?;
    }
    root.present().map_err(render_err)?;
    tracing::debug!(path = %path.display(), epochs = means.len(), "Chart rendered");
    Ok(())
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &Panel,
    means: &EpochMeans,
) -> Result<()> {
    let series: Vec<_> = panel
        .lines
        .iter()
        .map(|&(label, name, color)| (label, color, means.series(name)))
        .collect();

    let x = padded_range(&means.epochs, 0.0);
    let ys: Vec<f64> = series.iter().flat_map(|s| s.2.iter().copied()).collect();
    let y = padded_range(&ys, 0.05);

    let mut chart = ChartBuilder::on(area)
        .margin(15)
        .caption(panel.title, ("sans-serif", 22))
        .x_label_area_size(40)
        .y_label_area_size(55)
        .build_cartesian_2d(x, y)
        .map_err(render_err)?;
    chart.plotting_area().fill(&BACKGROUND).map_err(render_err)?;

    chart
        .configure_mesh()
        .x_desc("Epoch")
        .y_desc("Loss")
        .light_line_style(WHITE)
        .bold_line_style(RGBColor(128, 128, 128).mix(0.5))
        .draw()
        .map_err(render_err)?;

    for (label, color, values) in series {
        let points = means.epochs.iter().copied().zip(values);
        chart
            .draw_series(LineSeries::new(points, color.stroke_width(1)))
            .map_err(render_err)?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(render_err)?;
    Ok(())
}

/// `[min, max]` widened by `pad` of its span, or by ±0.5 when flat.
fn padded_range(values: &[f64], pad: f64) -> std::ops::Range<f64> {
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(l, h), &v| (l.min(v), h.max(v)));
    if !lo.is_finite() {
        return 0.0..1.0;
    }
    let span = hi - lo;
    if span <= 0.0 {
        return (lo - 0.5)..(hi + 0.5);
    }
    (lo - pad * span)..(hi + pad * span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges() {
        assert_eq!(padded_range(&[1.0, 3.0], 0.0), 1.0..3.0);
        assert_eq!(padded_range(&[1.0, 3.0], 0.5), 0.0..4.0);
        assert_eq!(padded_range(&[2.0], 0.05), 1.5..2.5);
        assert_eq!(padded_range(&[f64::INFINITY, 1.0, 2.0], 0.0), 1.0..2.0);
        assert_eq!(padded_range(&[], 0.1), 0.0..1.0);
    }

    #[test]
    fn every_loss_is_charted() {
        let charted: Vec<LossName> = PANELS
            .iter()
            .flat_map(|p| p.lines.iter().map(|l| l.1))
            .collect();
        for name in LossName::ALL {
            assert!(charted.contains(&name), "{name} missing");
        }
    }

    #[test]
    fn empty_means_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let means = EpochMeans {
            epochs: vec![],
            values: vec![],
        };
        let path = dir.path().join("graph.png");
        assert!(matches!(render_chart(&means, &path), Err(AutoGanError::Render(_))));
        assert!(!path.exists());
    }
}
