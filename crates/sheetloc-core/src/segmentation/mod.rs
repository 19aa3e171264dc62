//! Panel segmentation and side-panel selection.
//!
//! A drawing sheet is framed by ruled lines. The long horizontal rules give
//! the working band of the sheet; vertical rules inside that band split it
//! into column panels, the rightmost of which is normally the title block.
//!
//! Every "no lines" outcome is a soft miss: segmentation returns an empty
//! vector and never fails.

mod lines;

pub use lines::{merge_positions, LineDetector, LineSegment};

use std::path::PathBuf;

use image::{imageops::FilterType, DynamicImage, GrayImage, Luma};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::edges::canny;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geometry::{crop_gray, Rect};
use crate::models::config::SegmentationConfig;
use crate::raster;

/// A rectangular region bounded by detected rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Panel {
    /// Panel bounds in page coordinates.
    pub rect: Rect,
    /// The horizontal band the panel was cut from.
    pub band: Rect,
}

/// Splits page images into panels.
#[derive(Debug, Clone)]
pub struct PanelSegmenter {
    config: SegmentationConfig,
    max_working_side: u32,
    debug_dir: Option<PathBuf>,
}

impl PanelSegmenter {
    pub fn new(config: SegmentationConfig) -> Self {
        Self {
            config,
            max_working_side: 0,
            debug_dir: None,
        }
    }

    /// Segment a downscaled copy whose longer side is at most `side` pixels (0 = off).
    ///
    /// Pixel thresholds then apply at the reduced resolution.
    pub fn with_max_working_side(mut self, side: u32) -> Self {
        self.max_working_side = side;
        self
    }

    /// Dump intermediate rasters into `dir`.
    pub fn with_debug_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.debug_dir = dir;
        self
    }

    /// Panels ordered left to right, pairwise non-overlapping.
    pub fn segment(&self, image: &DynamicImage) -> Vec<Panel> {
        let gray = image.to_luma8();
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }

        let longest = width.max(height);
        if self.max_working_side == 0 || longest <= self.max_working_side {
            return self.segment_gray(&gray);
        }

        let factor = self.max_working_side as f64 / longest as f64;
        let work_w = ((width as f64 * factor).round() as u32).max(1);
        let work_h = ((height as f64 * factor).round() as u32).max(1);
        debug!("Segmenting at {}x{} (from {}x{})", work_w, work_h, width, height);

        let working = image::imageops::resize(&gray, work_w, work_h, FilterType::Triangle);
        let (fx, fy) = (width as f64 / work_w as f64, height as f64 / work_h as f64);
        self.segment_gray(&working)
            .into_iter()
            .map(|panel| Panel {
                rect: panel.rect.scale(fx, fy).clamp(width, height),
                band: panel.band.scale(fx, fy).clamp(width, height),
            })
            .collect()
    }

    fn segment_gray(&self, gray: &GrayImage) -> Vec<Panel> {
        let cfg = &self.config;
        let debug_dir = self.debug_dir.as_deref();

        let binary = raster::binarize_inverted(gray, cfg.binarize_threshold);
        let dilated = raster::dilate_square(&binary, cfg.dilation_kernel);
        raster::save_debug(debug_dir, "01_binary", &binary);
        raster::save_debug(debug_dir, "02_dilated", &dilated);

        let rows = self.horizontal_rules(&dilated);
        debug!("Found {} horizontal rules", rows.len());
        if rows.is_empty() {
            return Vec::new();
        }

        let band = self.working_band(gray, &rows);
        debug!("Working band {}", band);

        let columns = match crop_gray(&binary, &band) {
            Ok(band_binary) => self.vertical_rules(&band_binary),
            Err(e) => {
                warn!("Cannot crop working band: {}", e);
                return Vec::new();
            }
        };
        debug!("Found {} vertical rules", columns.len());
        if columns.is_empty() {
            return Vec::new();
        }

        let panels = self.cut_panels(gray, &band, &columns);
        debug!("Segmented {} panels", panels.len());

        if debug_dir.is_some() {
            let mut overlay = gray.clone();
            for r in panels.iter().map(|p| p.rect).filter(|r| !r.is_empty()) {
                draw_hollow_rect_mut(
                    &mut overlay,
                    imageproc::rect::Rect::at(r.x1, r.y1).of_size(r.width(), r.height()),
                    Luma([128]),
                );
            }
            raster::save_debug(debug_dir, "04_panels", &overlay);
        }

        panels
    }

    /// Y positions of long, near-horizontal rules, sorted and de-duplicated.
    fn horizontal_rules(&self, dilated: &GrayImage) -> Vec<i32> {
        let cfg = &self.config;
        let detector = LineDetector {
            vote_threshold: cfg.horizontal_vote_threshold,
            suppression_radius: cfg.suppression_radius,
            min_length: (dilated.width() as f32 * cfg.horizontal_min_length_ratio) as u32,
            max_gap: cfg.max_line_gap,
        };

        let mut ys: Vec<i32> = detector
            .detect(dilated)
            .iter()
            .filter(|s| s.is_horizontal(cfg.axis_tolerance))
            .map(LineSegment::mid_y)
            .collect();
        ys.sort_unstable();
        merge_positions(&ys, cfg.axis_tolerance)
    }

    /// Band from the first non-empty gap between rules to the last one.
    ///
    /// When rules exist but no gap between them holds content, the full
    /// image height is used.
    fn working_band(&self, gray: &GrayImage, rows: &[i32]) -> Rect {
        let cfg = &self.config;
        let (width, height) = gray.dimensions();
        let mut top: Option<i32> = None;
        let mut bottom = 0;

        for pair in rows.windows(2) {
            let gap = Rect::new(0, pair[0], width as i32, pair[1]).clamp(width, height);
            if raster::is_mostly_empty(gray, &gap, cfg.binarize_threshold, cfg.empty_fraction) {
                continue;
            }
            top.get_or_insert(pair[0]);
            bottom = pair[1];
        }

        match top {
            Some(top) => Rect::new(0, top, width as i32, bottom).clamp(width, height),
            None => {
                warn!("No non-empty band between {} horizontal rules, using full height", rows.len());
                Rect::full(width, height)
            }
        }
    }

    /// X positions (band-local) of tall, near-vertical rules inside the band.
    fn vertical_rules(&self, band_binary: &GrayImage) -> Vec<i32> {
        let cfg = &self.config;
        let band_height = band_binary.height();

        let dilated = raster::dilate_square(band_binary, cfg.dilation_kernel);
        let edges = canny(&dilated, cfg.canny_low, cfg.canny_high);
        raster::save_debug(self.debug_dir.as_deref(), "03_band_edges", &edges);

        let detector = LineDetector {
            vote_threshold: (band_height as f32 * cfg.vertical_vote_ratio) as u32,
            suppression_radius: cfg.suppression_radius,
            min_length: cfg.vertical_min_length,
            max_gap: cfg.max_line_gap,
        };

        let mut xs: Vec<i32> = detector
            .detect(&edges)
            .iter()
            .filter(|s| s.is_vertical(cfg.axis_tolerance))
            .map(LineSegment::mid_x)
            .collect();
        xs.sort_unstable();
        xs.dedup();
        xs
    }

    /// Walk consecutive rule positions; the last boundary is the band's right edge.
    fn cut_panels(&self, gray: &GrayImage, band: &Rect, columns: &[i32]) -> Vec<Panel> {
        let cfg = &self.config;
        let band_width = band.width();
        let min_width = (band_width as f32 * cfg.min_panel_width_ratio) as u32;

        let right_edges = columns.iter().skip(1).copied().chain(std::iter::once(band_width as i32));
        columns
            .iter()
            .zip(right_edges)
            .filter_map(|(&left, right)| {
                let rect = Rect::new(band.x1 + left, band.y1, band.x1 + right, band.y2)
                    .clamp(gray.width(), gray.height());
                if rect.width() < min_width {
                    return None;
                }
                if raster::is_mostly_empty(gray, &rect, cfg.binarize_threshold, cfg.empty_fraction) {
                    return None;
                }
                Some(Panel { rect, band: *band })
            })
            .collect()
    }
}

/// Segment with a default segmenter built from `config`.
pub fn segment_panels(image: &DynamicImage, config: &SegmentationConfig) -> Vec<Panel> {
    PanelSegmenter::new(config.clone()).segment(image)
}

/// The rightmost panel, provided there are at least two.
///
/// A single panel covers the whole sheet and is not a title block.
pub fn select_side_panel(panels: &[Panel]) -> Option<&Panel> {
    if panels.len() < 2 {
        return None;
    }
    panels.iter().max_by_key(|p| p.rect.x1)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect as DrawRect;
    use pretty_assertions::assert_eq;

    fn ink(page: &mut GrayImage, x: i32, y: i32, w: u32, h: u32) {
        draw_filled_rect_mut(page, DrawRect::at(x, y).of_size(w, h), Luma([0]));
    }

    /// A 1000x700 sheet: rules at y=50/650 and x=20/700/980, text blocks in each column.
    pub(crate) fn synthetic_sheet() -> GrayImage {
        let mut page = GrayImage::from_pixel(1000, 700, Luma([255]));
        ink(&mut page, 20, 50, 963, 3);
        ink(&mut page, 20, 650, 963, 3);
        for x in [20, 700, 980] {
            ink(&mut page, x, 50, 3, 603);
        }
        // drawing content
        ink(&mut page, 100, 150, 300, 120);
        ink(&mut page, 250, 400, 200, 60);
        // title block text
        for row in 0..6 {
            ink(&mut page, 740, 100 + row * 60, 180, 12);
        }
        ink(&mut page, 760, 560, 120, 40);
        page
    }

    #[test]
    fn test_segments_synthetic_sheet() {
        let image = DynamicImage::ImageLuma8(synthetic_sheet());
        let panels = segment_panels(&image, &SegmentationConfig::default());

        assert!(panels.len() >= 2, "panels: {:?}", panels);
        for pair in panels.windows(2) {
            assert!(pair[0].rect.x1 < pair[1].rect.x1);
            assert!(!pair[0].rect.overlaps(&pair[1].rect));
        }

        let side = select_side_panel(&panels).unwrap();
        assert!((690..=720).contains(&side.rect.x1), "side panel {}", side.rect);
        assert!(side.rect.x2 <= 1000);
        assert!(side.rect.fits_within(1000, 700));
    }

    #[test]
    fn test_segmentation_is_idempotent() {
        let image = DynamicImage::ImageLuma8(synthetic_sheet());
        let config = SegmentationConfig::default();
        assert_eq!(segment_panels(&image, &config), segment_panels(&image, &config));
    }

    #[test]
    fn test_downscaled_segmentation_projects_back() {
        let image = DynamicImage::ImageLuma8(synthetic_sheet());
        let mut config = SegmentationConfig::default();
        config.binarize_threshold = 127;
        config.vertical_min_length = 50;
        config.horizontal_vote_threshold = 50;
        let panels = PanelSegmenter::new(config)
            .with_max_working_side(500)
            .segment(&image);

        let side = select_side_panel(&panels).unwrap();
        assert!((680..=730).contains(&side.rect.x1), "side panel {}", side.rect);
        assert!(panels.iter().all(|p| p.rect.fits_within(1000, 700)));
    }

    #[test]
    fn test_blank_page_has_no_panels() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(400, 300, Luma([255])));
        assert!(segment_panels(&image, &SegmentationConfig::default()).is_empty());
    }

    #[test]
    fn test_single_panel_is_not_a_side_panel() {
        let panel = Panel {
            rect: Rect::new(0, 0, 100, 100),
            band: Rect::new(0, 0, 100, 100),
        };
        assert!(select_side_panel(&[panel]).is_none());
        assert!(select_side_panel(&[]).is_none());

        let right = Panel {
            rect: Rect::new(100, 0, 150, 100),
            ..panel
        };
        assert_eq!(select_side_panel(&[panel, right]), Some(&right));
    }

    #[test]
    fn test_band_falls_back_to_full_height() {
        let segmenter = PanelSegmenter::new(SegmentationConfig::default());
        let gray = GrayImage::from_pixel(200, 100, Luma([255]));
        assert_eq!(segmenter.working_band(&gray, &[10, 90]), Rect::full(200, 100));

        let mut gray = gray;
        ink(&mut gray, 50, 40, 20, 20);
        assert_eq!(segmenter.working_band(&gray, &[10, 30, 90]), Rect::new(0, 30, 200, 90));
    }
}
