//! Fine-pitch quad package paste regeneration
//!
//! Detects a four-sided ring of narrow rectangular pads (QFN/QFP) in the
//! paste layer. Sides whose web between pads is thinner than the minimum
//! printable feature are replaced by a few long slots, and a large center
//! pad is split into a windowpane. Detection is scored; anything short of
//! a confident match leaves the paste untouched.

use crate::polygon::{self, rect_polygon, union_all};
use geo::{Area, BooleanOps, BoundingRect, Centroid, MinimumRotatedRect, MultiPoint, Rotate};
use stencilforge_core::{pt, MultiPolygon, Point2, Polygon, QfnReport};
use stencilforge_settings::QfnSettings;
use tracing::{debug, info};

/// One side of the package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Top,
    Right,
    Bottom,
    Left,
}

impl Side {
    pub fn name(self) -> &'static str {
        match self {
            Side::Top => "top",
            Side::Right => "right",
            Side::Bottom => "bottom",
            Side::Left => "left",
        }
    }

    /// Top and bottom rows run along x in the normalized frame
    fn runs_along_x(self) -> bool {
        matches!(self, Side::Top | Side::Bottom)
    }
}

/// Rotated-rectangle measurements of a polygon
#[derive(Debug, Clone, Copy)]
struct RectMetrics {
    area: f64,
    long: f64,
    short: f64,
    /// Long edge direction in degrees, [0, 180)
    angle: f64,
}

fn normalize_angle(deg: f64) -> f64 {
    deg.rem_euclid(180.0)
}

fn rotate_point(p: Point2, deg: f64) -> Point2 {
    let (sin, cos) = deg.to_radians().sin_cos();
    pt(p.x * cos - p.y * sin, p.x * sin + p.y * cos)
}

fn rect_metrics(rect: &Polygon<f64>) -> Option<RectMetrics> {
    let coords = &rect.exterior().0;
    if coords.len() < 4 {
        return None;
    }
    let mut edges: Vec<(f64, f64, f64)> = (0..4)
        .map(|i| {
            let (a, b) = (coords[i], coords[(i + 1) % coords.len()]);
            let (dx, dy) = (b.x - a.x, b.y - a.y);
            (dx.hypot(dy), dx, dy)
        })
        .collect();
    edges.sort_by(|a, b| b.0.total_cmp(&a.0));
    let (long, dx, dy) = edges[0];
    Some(RectMetrics {
        area: rect.unsigned_area(),
        long,
        short: edges[3].0,
        angle: normalize_angle(dy.atan2(dx).to_degrees()),
    })
}

fn median(values: &[f64]) -> f64 {
    let mut v = values.to_vec();
    if v.is_empty() {
        return 0.0;
    }
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    if v.len() % 2 == 1 {
        v[mid]
    } else {
        (v[mid - 1] + v[mid]) / 2.0
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// `1 - cv / target_cv`, floored at zero
fn variation_score(values: &[f64], target_cv: f64) -> f64 {
    let m = mean(values);
    if values.is_empty() || m <= 0.0 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    (1.0 - variance.sqrt() / m / target_cv).max(0.0)
}

/// Pad that passed the shape filter
#[derive(Debug, Clone)]
struct PadCandidate {
    polygon_index: usize,
    area: f64,
    short: f64,
    angle: f64,
    center: Point2,
    /// Center in the package frame
    center_norm: Point2,
    angle_norm: f64,
}

#[derive(Debug, Clone)]
struct Row {
    /// Candidate indices sorted along the row
    pads: Vec<usize>,
    /// Median cross-row coordinate
    coord: f64,
}

#[derive(Debug, Clone)]
struct QfnGroup {
    angle: f64,
    sides: Vec<(Side, Row)>,
    center: Point2,
    center_pad: Option<usize>,
}

/// Detect and regenerate quad-package paste apertures
pub struct QfnRegenerator<'a> {
    settings: &'a QfnSettings,
}

impl<'a> QfnRegenerator<'a> {
    pub fn new(settings: &'a QfnSettings) -> Self {
        Self { settings }
    }

    /// Regenerated paste, or the input unchanged with the reason recorded
    pub fn regenerate(&self, paste: &MultiPolygon<f64>) -> (MultiPolygon<f64>, QfnReport) {
        let mut report = QfnReport::default();
        match self.try_regenerate(paste, &mut report) {
            Ok(region) => {
                info!(
                    "QFN regenerated: sides={:?} windows={} score={:.2}",
                    report.regenerated_sides,
                    report.center_pad_windows,
                    report.score.unwrap_or(0.0)
                );
                (region, report)
            }
            Err(reason) => {
                debug!("QFN regeneration skipped: {}", reason);
                report.regenerated_sides.clear();
                report.center_pad_windows = 0;
                report.skipped_reason = Some(reason);
                (paste.clone(), report)
            }
        }
    }

    fn try_regenerate(&self, paste: &MultiPolygon<f64>, report: &mut QfnReport) -> Result<MultiPolygon<f64>, String> {
        let polys = &paste.0;
        let mut pads = self.candidates(polys);
        report.candidates = pads.len();
        if pads.len() < self.settings.min_candidates {
            return Err(format!(
                "{} pad candidates, need {}",
                pads.len(),
                self.settings.min_candidates
            ));
        }

        let group = self.build_group(&mut pads, polys)?;
        let score = self.score(&group, &pads);
        report.score = Some(score);
        if score < self.settings.confidence_threshold {
            return Err(format!(
                "score {:.2} below threshold {:.2}",
                score, self.settings.confidence_threshold
            ));
        }
        self.rebuild(&group, &pads, polys, report)
    }

    fn candidates(&self, polys: &[Polygon<f64>]) -> Vec<PadCandidate> {
        let s = self.settings;
        polys
            .iter()
            .enumerate()
            .filter_map(|(i, poly)| {
                let m = rect_metrics(&poly.minimum_rotated_rect()?)?;
                if m.area <= 0.0 || m.short <= 0.0 {
                    return None;
                }
                let area = poly.unsigned_area();
                let aspect = m.long / m.short;
                let keep = area / m.area >= s.min_rectangularity
                    && (s.min_aspect..=s.max_aspect).contains(&aspect)
                    && m.short <= s.max_pad_width_mm;
                let center = poly.centroid()?;
                keep.then(|| PadCandidate {
                    polygon_index: i,
                    area,
                    short: m.short,
                    angle: m.angle,
                    center: center.0,
                    center_norm: center.0,
                    angle_norm: m.angle,
                })
            })
            .collect()
    }

    fn build_group(&self, pads: &mut [PadCandidate], polys: &[Polygon<f64>]) -> Result<QfnGroup, String> {
        let s = self.settings;
        let centers = MultiPoint::from(pads.iter().map(|p| (p.center.x, p.center.y)).collect::<Vec<_>>());
        let angle = centers
            .minimum_rotated_rect()
            .as_ref()
            .and_then(rect_metrics)
            .map(|m| m.angle)
            .ok_or("pad centers have no bounding rectangle")?;
        for pad in pads.iter_mut() {
            pad.center_norm = rotate_point(pad.center, -angle);
            pad.angle_norm = normalize_angle(pad.angle - angle);
        }

        // Pads stand perpendicular to their side: long-along-x pads form the
        // left and right columns, long-along-y pads the top and bottom rows.
        let along_x: Vec<usize> = (0..pads.len())
            .filter(|&i| pads[i].angle_norm <= 30.0 || pads[i].angle_norm >= 150.0)
            .collect();
        let along_y: Vec<usize> = (0..pads.len())
            .filter(|&i| (60.0..=120.0).contains(&pads[i].angle_norm))
            .collect();
        if along_x.len() < s.min_group_size || along_y.len() < s.min_group_size {
            return Err(format!(
                "orientation groups too small ({} / {})",
                along_x.len(),
                along_y.len()
            ));
        }

        let columns = self.cluster_rows(pads, &along_x, false);
        let rows = self.cluster_rows(pads, &along_y, true);
        if rows.len() < 2 || columns.len() < 2 {
            return Err(format!("found {} rows and {} columns", rows.len(), columns.len()));
        }

        let center = pt(
            median(&pads.iter().map(|p| p.center_norm.x).collect::<Vec<_>>()),
            median(&pads.iter().map(|p| p.center_norm.y).collect::<Vec<_>>()),
        );

        let sides = vec![
            (Side::Top, rows[rows.len() - 1].clone()),
            (Side::Right, columns[columns.len() - 1].clone()),
            (Side::Bottom, rows[0].clone()),
            (Side::Left, columns[0].clone()),
        ];
        let counts: Vec<usize> = sides.iter().map(|(_, r)| r.pads.len()).collect();
        let (min, max) = (
            counts.iter().copied().min().unwrap_or(0),
            counts.iter().copied().max().unwrap_or(0),
        );
        if min < s.min_row_pads {
            return Err(format!("a side has only {min} pads"));
        }
        let allowed = 2usize.max((s.side_count_tolerance * max as f64).floor() as usize);
        if max - min > allowed {
            return Err(format!("side pad counts {counts:?} are unbalanced"));
        }

        let center_pad = self.center_pad(pads, polys, center, angle);
        Ok(QfnGroup {
            angle,
            sides,
            center,
            center_pad,
        })
    }

    /// Group pads into rows sorted by cross coordinate
    ///
    /// `by_y` clusters on y and sorts each row along x.
    fn cluster_rows(&self, pads: &[PadCandidate], members: &[usize], by_y: bool) -> Vec<Row> {
        let cross = |i: usize| if by_y { pads[i].center_norm.y } else { pads[i].center_norm.x };
        let along = |i: usize| if by_y { pads[i].center_norm.x } else { pads[i].center_norm.y };
        let widths: Vec<f64> = members.iter().map(|&i| pads[i].short).collect();
        let tol = (1.5 * median(&widths)).max(0.5 * self.settings.min_feature_mm);

        let mut sorted = members.to_vec();
        sorted.sort_by(|&a, &b| cross(a).total_cmp(&cross(b)));

        let mut rows = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        let mut flush = |current: &mut Vec<usize>| {
            if current.len() >= self.settings.min_row_pads {
                let coords: Vec<f64> = current.iter().map(|&i| cross(i)).collect();
                let mut row = std::mem::take(current);
                row.sort_by(|&a, &b| along(a).total_cmp(&along(b)));
                rows.push(Row {
                    pads: row,
                    coord: median(&coords),
                });
            }
            current.clear();
        };
        let mut last: Option<f64> = None;
        for i in sorted {
            let value = cross(i);
            if last.is_some_and(|l| (value - l).abs() > tol) {
                flush(&mut current);
            }
            current.push(i);
            last = Some(value);
        }
        flush(&mut current);
        rows
    }

    /// Largest polygon well above the median pad area near the package center
    fn center_pad(&self, pads: &[PadCandidate], polys: &[Polygon<f64>], center: Point2, angle: f64) -> Option<usize> {
        let median_area = median(&pads.iter().map(|p| p.area).collect::<Vec<_>>());
        if median_area <= 0.0 {
            return None;
        }
        let reach = 1.0f64.max(4.0 * median_area.sqrt());
        polys
            .iter()
            .enumerate()
            .filter_map(|(i, poly)| {
                let area = poly.unsigned_area();
                if area < self.settings.center_pad_area_ratio * median_area {
                    return None;
                }
                let c = rotate_point(poly.centroid()?.0, -angle);
                ((c.x - center.x).hypot(c.y - center.y) <= reach).then_some((i, area))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    fn side_pitches(side: Side, row: &Row, pads: &[PadCandidate]) -> Vec<f64> {
        let along: Vec<f64> = row
            .pads
            .iter()
            .map(|&i| {
                if side.runs_along_x() {
                    pads[i].center_norm.x
                } else {
                    pads[i].center_norm.y
                }
            })
            .collect();
        along.windows(2).map(|w| w[1] - w[0]).collect()
    }

    fn score(&self, group: &QfnGroup, pads: &[PadCandidate]) -> f64 {
        let s = self.settings;
        let pitch = mean(
            &group
                .sides
                .iter()
                .map(|(side, row)| variation_score(&Self::side_pitches(*side, row, pads), s.pitch_cv_scale))
                .collect::<Vec<_>>(),
        );
        let widths: Vec<f64> = group
            .sides
            .iter()
            .flat_map(|(_, row)| row.pads.iter().map(|&i| pads[i].short))
            .collect();
        let width = variation_score(&widths, s.width_cv_scale);
        let counts: Vec<f64> = group.sides.iter().map(|(_, r)| r.pads.len() as f64).collect();
        let max = counts.iter().copied().fold(0.0, f64::max);
        let min = counts.iter().copied().fold(f64::INFINITY, f64::min);
        let symmetry = if max > 0.0 { (1.0 - (max - min) / max).max(0.0) } else { 0.0 };

        let mut score = mean(&[pitch, width, symmetry, 1.0]);
        if group.center_pad.is_some() {
            score += s.center_pad_bonus;
        }
        score.clamp(0.0, 1.0)
    }

    fn rebuild(
        &self,
        group: &QfnGroup,
        pads: &[PadCandidate],
        polys: &[Polygon<f64>],
        report: &mut QfnReport,
    ) -> Result<MultiPolygon<f64>, String> {
        let min_feature = self.settings.min_feature_mm;
        let mut consumed = vec![false; polys.len()];
        for (_, row) in &group.sides {
            for &i in &row.pads {
                consumed[pads[i].polygon_index] = true;
            }
        }
        if let Some(c) = group.center_pad {
            consumed[c] = true;
        }

        let mut out: Vec<Polygon<f64>> = polys
            .iter()
            .zip(&consumed)
            .filter(|(_, c)| !**c)
            .map(|(p, _)| p.clone())
            .collect();

        for (side, row) in &group.sides {
            let pitches = Self::side_pitches(*side, row, pads);
            if pitches.is_empty() {
                return Err(format!("{} side has no pitch", side.name()));
            }
            let pitch = median(&pitches);
            let width = median(&row.pads.iter().map(|&i| pads[i].short).collect::<Vec<_>>());
            if pitch - width < min_feature {
                let slots = self.slots(*side, row, pads, group);
                if slots.is_empty() {
                    return Err(format!("{} side produced no slots", side.name()));
                }
                out.extend(slots);
                report.regenerated_sides.push(side.name().to_string());
            } else {
                out.extend(row.pads.iter().map(|&i| polys[pads[i].polygon_index].clone()));
            }
        }

        if let Some(c) = group.center_pad {
            match self.windowpane(&polys[c], group.angle) {
                Some(windows) => {
                    report.center_pad_windows = windows.len();
                    out.extend(windows);
                }
                None => out.push(polys[c].clone()),
            }
        }

        Ok(polygon::repair(&union_all(out)))
    }

    /// Two to four long slots replacing one row of pads
    fn slots(&self, side: Side, row: &Row, pads: &[PadCandidate], group: &QfnGroup) -> Vec<Polygon<f64>> {
        let min_feature = self.settings.min_feature_mm;
        let count = row.pads.len();
        let n = match count {
            0..=6 => 2,
            7..=12 => 3,
            _ => 4,
        };
        let along: Vec<f64> = row
            .pads
            .iter()
            .map(|&i| {
                if side.runs_along_x() {
                    pads[i].center_norm.x
                } else {
                    pads[i].center_norm.y
                }
            })
            .collect();
        let lo = along.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = along.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let span = hi - lo;
        if span <= 0.0 {
            return Vec::new();
        }

        let width = median(&row.pads.iter().map(|&i| pads[i].short).collect::<Vec<_>>());
        let slot_w = min_feature.max(width);
        let slot_len = (2.0 * slot_w).max(0.8 * span).max(0.6 * span);
        let (low, high) = (lo + slot_len / 2.0, hi - slot_len / 2.0);

        let center_cross = if side.runs_along_x() { group.center.y } else { group.center.x };
        let outward = if row.coord > center_cross { 1.0 } else { -1.0 };
        let cross = row.coord + outward * (0.3 * slot_w).min(0.25);

        (0..n)
            .map(|i| {
                let t = (i as f64 + 0.5) / n as f64;
                let c = if high < low {
                    (lo + hi) / 2.0
                } else {
                    (lo + t * span).clamp(low, high)
                };
                let slot = if side.runs_along_x() {
                    rect_polygon(c - slot_len / 2.0, cross - slot_w / 2.0, c + slot_len / 2.0, cross + slot_w / 2.0)
                } else {
                    rect_polygon(cross - slot_w / 2.0, c - slot_len / 2.0, cross + slot_w / 2.0, c + slot_len / 2.0)
                };
                slot.rotate_around_point(group.angle, geo::Point::new(0.0, 0.0))
            })
            .collect()
    }

    /// N×N windows inside the center pad at roughly the configured open ratio
    fn windowpane(&self, pad: &Polygon<f64>, angle: f64) -> Option<Vec<Polygon<f64>>> {
        let min_feature = self.settings.min_feature_mm;
        let origin = geo::Point::new(0.0, 0.0);
        let local = pad.rotate_around_point(-angle, origin);
        let bounds = local.bounding_rect()?;
        let (w, h) = (bounds.width(), bounds.height());
        if w <= 2.0 * min_feature || h <= 2.0 * min_feature {
            return None;
        }
        let n = match w.min(h) {
            s if s < 3.0 => 2,
            s if s < 6.0 => 3,
            _ => 4,
        };
        let nf = n as f64;
        let web = min_feature;
        let cell_w_max = (w - (nf + 1.0) * web) / nf;
        let cell_h_max = (h - (nf + 1.0) * web) / nf;
        if cell_w_max < min_feature || cell_h_max < min_feature {
            return None;
        }

        let target = local.unsigned_area() * self.settings.window_open_ratio;
        let max_area = cell_w_max * cell_h_max * nf * nf;
        let scale = (target / max_area).min(1.0).sqrt();
        let cell_w = min_feature.max(cell_w_max * scale);
        let cell_h = min_feature.max(cell_h_max * scale);
        let center = bounds.center();
        let start_x = center.x - (nf * cell_w + (nf - 1.0) * web) / 2.0;
        let start_y = center.y - (nf * cell_h + (nf - 1.0) * web) / 2.0;

        let local_mp = MultiPolygon::new(vec![local]);
        let mut windows = Vec::new();
        for r in 0..n {
            for c in 0..n {
                let x0 = start_x + c as f64 * (cell_w + web);
                let y0 = start_y + r as f64 * (cell_h + web);
                let cell = MultiPolygon::new(vec![rect_polygon(x0, y0, x0 + cell_w, y0 + cell_h)]);
                let clipped = cell.intersection(&local_mp);
                if clipped.unsigned_area() < 0.5 * min_feature * min_feature {
                    continue;
                }
                windows.extend(clipped.rotate_around_point(angle, origin).0);
            }
        }
        (!windows.is_empty()).then_some(windows)
    }
}
