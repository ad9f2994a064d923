//! Chart rendering
//!
//! Charts are best effort. A build without the `figures` feature gets
//! [`NoopRenderer`], and the analyze phase records why figures were skipped
//! instead of failing.

use std::path::Path;

use anyhow::Result;

/// Title and axis descriptions of one chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartLabels<'a> {
    pub title: &'a str,
    pub x_desc: &'a str,
    pub y_desc: &'a str,
}

pub const PUBS_BY_YEAR_LABELS: ChartLabels<'static> = ChartLabels {
    title: "Publications by Year",
    x_desc: "Year",
    y_desc: "Count",
};

pub const YOY_GROWTH_LABELS: ChartLabels<'static> = ChartLabels {
    title: "Year-over-Year Growth",
    x_desc: "Year",
    y_desc: "YoY %",
};

/// Draws a line-with-markers chart of `(year, value)` points to a PNG.
pub trait ChartRenderer {
    /// Why this renderer cannot draw, or `None` when it can.
    fn unavailable_reason(&self) -> Option<&str> {
        None
    }

    fn line_chart(&self, labels: &ChartLabels<'_>, points: &[(i32, f64)], path: &Path) -> Result<()>;
}

/// Draws nothing.
#[derive(Debug, Clone)]
pub struct NoopRenderer {
    reason: String,
}

impl NoopRenderer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl ChartRenderer for NoopRenderer {
    fn unavailable_reason(&self) -> Option<&str> {
        Some(&self.reason)
    }

    fn line_chart(&self, _labels: &ChartLabels<'_>, _points: &[(i32, f64)], _path: &Path) -> Result<()> {
        Ok(())
    }
}

/// Whether this build can render PNG charts.
pub const fn figures_available() -> bool {
    cfg!(feature = "figures")
}

/// Best renderer this build offers.
pub fn select_renderer() -> Box<dyn ChartRenderer> {
    #[cfg(feature = "figures")]
    {
        Box::new(png::PngRenderer::default())
    }
    #[cfg(not(feature = "figures"))]
    {
        Box::new(NoopRenderer::new(
            "built without the `figures` feature; rebuild with --features figures",
        ))
    }
}

#[cfg(feature = "figures")]
pub use png::PngRenderer;

#[cfg(feature = "figures")]
mod png {
    use std::path::{Path, PathBuf};
    use std::sync::OnceLock;

    use anyhow::{Context, Result, anyhow};
    use plotters::prelude::*;
    use plotters::style::FontStyle;

    use super::{ChartLabels, ChartRenderer};

    const FONT_FAMILY: &str = "sans-serif";

    /// Overrides the font search with a specific `.ttf`/`.otf` file.
    pub const FONT_ENV: &str = "BIBLINE_CHART_FONT";

    const FONT_PATTERNS: &[&str] = &[
        "/usr/share/fonts/**/DejaVuSans.ttf",
        "/usr/share/fonts/**/LiberationSans-Regular.ttf",
        "/usr/share/fonts/**/*.ttf",
        "/usr/local/share/fonts/**/*.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
        "/Library/Fonts/*.ttf",
        "C:/Windows/Fonts/arial.ttf",
    ];

    static FONT_READY: OnceLock<bool> = OnceLock::new();

    fn font_candidates() -> impl Iterator<Item = PathBuf> {
        let explicit = std::env::var_os(FONT_ENV).map(PathBuf::from);
        let found = FONT_PATTERNS
            .iter()
            .filter_map(|pattern| glob::glob(pattern).ok())
            .flat_map(|paths| paths.flatten());
        explicit.into_iter().chain(found)
    }

    /// Register the first loadable font for text rendering. Plotters keeps
    /// registered fonts for the life of the process, hence the leak.
    fn font_ready() -> bool {
        *FONT_READY.get_or_init(|| {
            for path in font_candidates() {
                let Ok(bytes) = std::fs::read(&path) else {
                    continue;
                };
                let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
                if plotters::style::register_font(FONT_FAMILY, FontStyle::Normal, bytes).is_ok() {
                    log::debug!("Chart font {}", path.display());
                    return true;
                }
            }
            log::warn!("No usable font found (set {FONT_ENV}); charts drawn without titles or axis labels");
            false
        })
    }

    /// Plotters bitmap renderer.
    #[derive(Debug, Clone, Copy)]
    pub struct PngRenderer {
        pub width: u32,
        pub height: u32,
    }

    impl Default for PngRenderer {
        fn default() -> Self {
            Self {
                width: 800,
                height: 480,
            }
        }
    }

    impl ChartRenderer for PngRenderer {
        fn line_chart(&self, labels: &ChartLabels<'_>, points: &[(i32, f64)], path: &Path) -> Result<()> {
            anyhow::ensure!(!points.is_empty(), "no points to plot");
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }

            let x_min = points.iter().map(|p| p.0).min().unwrap_or_default();
            let x_max = points.iter().map(|p| p.0).max().unwrap_or_default().max(x_min + 1);
            let y_min = points.iter().map(|p| p.1).fold(0.0, f64::min);
            let y_max = points.iter().map(|p| p.1).fold(0.0, f64::max);
            let pad = ((y_max - y_min) * 0.1).max(1.0);
            let text = font_ready();

            let root = BitMapBackend::new(path, (self.width, self.height)).into_drawing_area();
            root.fill(&WHITE).map_err(|e| anyhow!("{e}"))?;
            let mut builder = ChartBuilder::on(&root);
            builder.margin(24);
            if text {
                builder
                    .caption(labels.title, (FONT_FAMILY, 24))
                    .x_label_area_size(40)
                    .y_label_area_size(56);
            }
            let mut chart = builder
                .build_cartesian_2d(x_min..x_max, (y_min - pad)..(y_max + pad))
                .map_err(|e| anyhow!("{e}"))?;

            if text {
                chart
                    .configure_mesh()
                    .x_desc(labels.x_desc)
                    .y_desc(labels.y_desc)
                    .label_style((FONT_FAMILY, 14))
                    .light_line_style(WHITE)
                    .draw()
                    .map_err(|e| anyhow!("{e}"))?;
            }

            // zero baseline
            chart
                .draw_series(LineSeries::new([(x_min, 0.0), (x_max, 0.0)], &BLACK.mix(0.4)))
                .map_err(|e| anyhow!("{e}"))?;
            chart
                .draw_series(LineSeries::new(points.iter().copied(), &BLUE))
                .map_err(|e| anyhow!("{e}"))?;
            chart
                .draw_series(points.iter().map(|&p| Circle::new(p, 4, BLUE.filled())))
                .map_err(|e| anyhow!("{e}"))?;

            root.present()
                .map_err(|e| anyhow!("failed to write {}: {e}", path.display()))?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_draws_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.png");
        let r = NoopRenderer::new("no charting");
        assert_eq!(r.unavailable_reason(), Some("no charting"));
        r.line_chart(&PUBS_BY_YEAR_LABELS, &[(2020, 1.0)], &path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn selected_renderer_matches_build() {
        let r = select_renderer();
        assert_eq!(r.unavailable_reason().is_none(), figures_available());
    }

    #[cfg(feature = "figures")]
    #[test]
    fn png_written_for_both_charts() {
        let dir = tempfile::tempdir().unwrap();
        let charts = [
            ("pubs.png", PUBS_BY_YEAR_LABELS, vec![(2020, 3.0), (2021, 4.0)]),
            ("yoy.png", YOY_GROWTH_LABELS, vec![(2021, 33.3), (2022, -12.5)]),
        ];
        for (name, labels, points) in charts {
            let path = dir.path().join("figs").join(name);
            PngRenderer::default().line_chart(&labels, &points, &path).unwrap();
            let bytes = std::fs::read(&path).unwrap();
            assert!(bytes.len() > 8, "{name} is empty");
            assert_eq!(&bytes[1..4], b"PNG");
        }
    }

    #[test]
    fn chart_labels() {
        assert_eq!(PUBS_BY_YEAR_LABELS.title, "Publications by Year");
        assert_eq!(YOY_GROWTH_LABELS.y_desc, "YoY %");
    }
}
