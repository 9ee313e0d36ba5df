//! Printable clinical report (PDF)

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Local};
use log::info;
use printpdf::*;

use crate::error::GlucoError;
use crate::model::GlucoseLog;
use crate::stats::{trend_series, DashboardStats};
use crate::thresholds::{self, GlucoseStatus, HYPER, HYPO, TARGET_MAX, TARGET_MIN};
use crate::window::ChartRange;

/// PDF document dimensions (A4)
const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;

/// Journal rows printed under the chart
pub const REPORT_ROW_LIMIT: usize = 30;

const fn rgb(r: f32, g: f32, b: f32) -> Color {
    Color::Rgb(Rgb { r, g, b, icc_profile: None })
}

const INK: Color = rgb(0.0, 0.0, 0.0);
const MUTED: Color = rgb(0.5, 0.5, 0.5);
const RULE: Color = rgb(0.9, 0.9, 0.9);
const PAPER: Color = rgb(1.0, 1.0, 1.0);
const ZEBRA: Color = rgb(0.96, 0.96, 0.96);
const TARGET_BAND: Color = rgb(0.85, 0.95, 0.88);

const DOT_RADIUS_MM: f32 = 1.2;

/// Everything printed on the report
pub struct ReportInput<'a> {
    pub profile_id: &'a str,
    pub range: ChartRange,
    /// Window-filtered entries, newest first
    pub logs: &'a [GlucoseLog],
    /// Statistics over the whole collection
    pub stats: DashboardStats,
    pub generated: DateTime<Local>,
}

/// Render the report to PDF bytes
pub fn render_report(input: &ReportInput) -> Vec<u8> {
    let mut doc = PdfDocument::new("Glucose Report");

    let ops = build_report_page(input);
    let page = PdfPage::new(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), ops);
    doc.with_pages(vec![page]);

    let mut warnings = Vec::new();
    doc.save(&PdfSaveOptions::default(), &mut warnings)
}

/// Render and write the report to a file
pub fn write_report<P: AsRef<Path>>(path: P, input: &ReportInput) -> Result<(), GlucoError> {
    let bytes = render_report(input);

    let mut file = File::create(path.as_ref())
        .map_err(|e| GlucoError::Report(format!("Failed to create file: {}", e)))?;
    file.write_all(&bytes)
        .map_err(|e| GlucoError::Report(format!("Failed to write PDF: {}", e)))?;

    info!("Wrote report with {} entries to {}", input.logs.len(), path.as_ref().display());
    Ok(())
}

/// Text shown in the value column; `-` for entries without a reading
pub fn format_level(log: &GlucoseLog) -> String {
    if log.has_reading() {
        format!("{} mg/dL", log.effective_level())
    } else {
        "-".to_string()
    }
}

pub fn format_insulin(log: &GlucoseLog) -> String {
    if log.insulin_units > 0.0 {
        format!("{}u ({})", log.insulin_units, log.insulin_type.label())
    } else {
        "-".to_string()
    }
}

pub fn format_carbs(log: &GlucoseLog) -> String {
    if log.carbs > 0 {
        format!("{}g", log.carbs)
    } else {
        "-".to_string()
    }
}

fn status_color(status: GlucoseStatus) -> Color {
    match status {
        GlucoseStatus::Hypo => rgb(0.9, 0.3, 0.3),
        GlucoseStatus::Normal => rgb(0.3, 0.7, 0.3),
        GlucoseStatus::Hyper => rgb(0.9, 0.6, 0.3),
    }
}

fn at(x: f32, y: f32) -> LinePoint {
    LinePoint { p: Point::new(Mm(x), Mm(y)), bezier: false }
}

enum Paint {
    Fill(Color),
    /// Outline color and thickness in points
    Stroke(Color, f32),
}

/// Drawing operations for one page, coordinates in mm from the bottom left
#[derive(Default)]
struct Canvas {
    ops: Vec<Op>,
}

impl Canvas {
    fn text(&mut self, text: &str, x: f32, y: f32, size: f32, bold: bool, color: Color) {
        let font = if bold { BuiltinFont::HelveticaBold } else { BuiltinFont::Helvetica };
        self.ops.extend([
            Op::SetFillColor { col: color },
            Op::StartTextSection,
            Op::SetFontSizeBuiltinFont { size: Pt(size), font },
            Op::SetTextCursor { pos: Point::new(Mm(x), Mm(y)) },
            Op::WriteTextBuiltinFont { items: vec![TextItem::Text(text.to_string())], font },
            Op::EndTextSection,
        ]);
    }

    fn line(&mut self, from: (f32, f32), to: (f32, f32), color: Color, width: f32) {
        self.ops.extend([
            Op::SetOutlineColor { col: color },
            Op::SetOutlineThickness { pt: Pt(width) },
            Op::DrawLine {
                line: Line { points: vec![at(from.0, from.1), at(to.0, to.1)], is_closed: false },
            },
        ]);
    }

    /// Horizontal rule across the chart or page
    fn rule(&mut self, x: f32, y: f32, width: f32, color: Color, thickness: f32) {
        self.line((x, y), (x + width, y), color, thickness);
    }

    fn rect(&mut self, x: f32, y: f32, width: f32, height: f32, paint: Paint) {
        let mode = match paint {
            Paint::Fill(color) => {
                self.ops.push(Op::SetFillColor { col: color });
                PaintMode::Fill
            }
            Paint::Stroke(color, thickness) => {
                self.ops.push(Op::SetOutlineColor { col: color });
                self.ops.push(Op::SetOutlineThickness { pt: Pt(thickness) });
                PaintMode::Stroke
            }
        };
        let corners = vec![at(x, y), at(x + width, y), at(x + width, y + height), at(x, y + height)];
        self.ops.push(Op::DrawPolygon {
            polygon: Polygon {
                rings: vec![PolygonRing { points: corners }],
                mode,
                winding_order: WindingOrder::NonZero,
            },
        });
    }

    fn dot(&mut self, x: f32, y: f32, color: Color) {
        let r = DOT_RADIUS_MM;
        self.rect(x - r, y - r, 2.0 * r, 2.0 * r, Paint::Fill(color));
    }
}

fn build_report_page(input: &ReportInput) -> Vec<Op> {
    let mut page = Canvas::default();
    let right_column = PAGE_WIDTH_MM - MARGIN_MM - 55.0;
    let content_width = PAGE_WIDTH_MM - 2.0 * MARGIN_MM;
    let mut y = PAGE_HEIGHT_MM - MARGIN_MM;

    page.text("Glucose Report", MARGIN_MM, y, 24.0, true, INK);
    page.text(&format!("Profile: {}", input.profile_id), right_column, y, 10.0, true, INK);
    y -= 8.0;
    page.text("Clinical summary", MARGIN_MM, y, 10.0, false, MUTED);
    page.text(&format!("Period: {}", input.range.as_str().to_uppercase()), right_column, y, 9.0, false, MUTED);
    y -= 8.0;
    page.rule(MARGIN_MM, y, content_width, INK, 1.5);
    y -= 14.0;

    draw_stat_cards(&mut page, &input.stats, y);
    y -= 30.0;
    draw_trend_chart(&mut page, input.logs, y);
    y -= 95.0;
    draw_journal_table(&mut page, input.logs, y);

    page.rule(MARGIN_MM, MARGIN_MM + 6.0, content_width, RULE, 0.5);
    page.text("Automated report, not a medical diagnosis", MARGIN_MM, MARGIN_MM, 7.0, false, MUTED);
    page.text(
        &format!("Generated on {}", input.generated.format("%Y-%m-%d %H:%M")),
        PAGE_WIDTH_MM - MARGIN_MM - 45.0, MARGIN_MM, 7.0, false, MUTED,
    );

    page.ops
}

fn draw_stat_cards(page: &mut Canvas, stats: &DashboardStats, top: f32) {
    let gap = 4.0;
    let card_width = (PAGE_WIDTH_MM - 2.0 * MARGIN_MM - 3.0 * gap) / 4.0;
    let card_height = 22.0;
    let y = top - card_height;

    let cards = [
        ("Avg glucose", stats.average_level.to_string(), "mg/dL"),
        ("Time in range", format!("{}%", stats.time_in_range), "TIR"),
        ("Hypo events", stats.hypo_count.to_string(), "events"),
        ("Hyper events", stats.hyper_count.to_string(), "events"),
    ];
    for (i, (label, value, unit)) in cards.iter().enumerate() {
        let x = MARGIN_MM + i as f32 * (card_width + gap);
        page.rect(x, y, card_width, card_height, Paint::Stroke(INK, 1.0));
        page.text(label, x + 3.0, y + card_height - 6.0, 7.0, true, MUTED);
        page.text(value, x + 3.0, y + 7.0, 16.0, true, INK);
        page.text(unit, x + card_width - 14.0, y + 3.0, 7.0, false, MUTED);
    }
}

fn draw_trend_chart(page: &mut Canvas, logs: &[GlucoseLog], top: f32) {
    page.text("Glucose trends", MARGIN_MM, top, 10.0, true, INK);

    let left = MARGIN_MM + 12.0;
    let height = 70.0;
    let bottom = top - 8.0 - height;
    let width = PAGE_WIDTH_MM - 2.0 * MARGIN_MM - 12.0;

    let points: Vec<_> = trend_series(logs).into_iter().filter(|p| p.level > 0.0).collect();
    if points.is_empty() {
        page.text("No readings in this period", left, bottom + height / 2.0, 10.0, false, MUTED);
        return;
    }

    // mg/dL shown between 40 and 300, values outside are clamped to the frame
    let to_y = |level: f64| {
        let y = bottom + ((level as f32 - 40.0) / 260.0) * height;
        y.clamp(bottom, bottom + height)
    };

    let band_low = to_y(TARGET_MIN);
    page.rect(left, band_low, width, to_y(TARGET_MAX) - band_low, Paint::Fill(TARGET_BAND));
    page.rect(left, bottom, width, height, Paint::Stroke(INK, 0.5));

    for mg_dl in [50.0, 100.0, 150.0, 200.0, 250.0, 300.0] {
        page.rule(left, to_y(mg_dl), width, RULE, 0.3);
        page.text(&mg_dl.to_string(), MARGIN_MM, to_y(mg_dl) - 1.5, 7.0, false, MUTED);
    }
    page.rule(left, to_y(HYPO), width, status_color(GlucoseStatus::Hypo), 0.8);
    page.rule(left, to_y(HYPER), width, status_color(GlucoseStatus::Hyper), 0.8);

    let legend = [
        (GlucoseStatus::Hypo, format!("< {}", HYPO)),
        (GlucoseStatus::Normal, thresholds::format_target_range()),
        (GlucoseStatus::Hyper, format!("> {}", HYPER)),
    ];
    for (i, (status, range)) in legend.iter().enumerate() {
        let x = left + i as f32 * 50.0;
        page.dot(x, bottom - 5.0, status_color(*status));
        page.text(&format!("{} {}", status.label(), range), x + 3.0, bottom - 6.0, 7.0, false, MUTED);
    }

    let n = points.len();
    let x_at = |i: usize| {
        if n > 1 {
            left + i as f32 * width / (n - 1) as f32
        } else {
            left + width / 2.0
        }
    };
    for (i, pair) in points.windows(2).enumerate() {
        page.line((x_at(i), to_y(pair[0].level)), (x_at(i + 1), to_y(pair[1].level)), MUTED, 0.8);
    }
    for (i, point) in points.iter().enumerate() {
        page.dot(x_at(i), to_y(point.level), status_color(thresholds::classify(point.level)));
    }
}

fn draw_journal_table(page: &mut Canvas, logs: &[GlucoseLog], top: f32) {
    let width = PAGE_WIDTH_MM - 2.0 * MARGIN_MM;
    let columns = [MARGIN_MM + 2.0, MARGIN_MM + 45.0, MARGIN_MM + 80.0, MARGIN_MM + 130.0];
    let mut y = top;

    page.text("Journal history", MARGIN_MM, y, 10.0, true, INK);
    y -= 8.0;

    page.rect(MARGIN_MM, y - 2.0, width, 7.0, Paint::Fill(INK));
    for (x, header) in columns.iter().zip(["Date/Time", "Value", "Insulin", "Carbs"]) {
        page.text(header, *x, y, 7.0, true, PAPER);
    }
    y -= 7.0;

    if logs.is_empty() {
        page.text("No entries in this period", MARGIN_MM + 2.0, y, 8.0, false, MUTED);
        return;
    }

    for (row, log) in logs.iter().take(REPORT_ROW_LIMIT).enumerate() {
        if row % 2 == 1 {
            page.rect(MARGIN_MM, y - 1.5, width, 4.5, Paint::Fill(ZEBRA));
        }
        let value_color = if log.has_reading() { status_color(log.status()) } else { MUTED };
        let when = log.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string();

        page.text(&when, columns[0], y, 7.0, false, MUTED);
        page.text(&format_level(log), columns[1], y, 7.0, true, value_color);
        page.text(&format_insulin(log), columns[2], y, 7.0, false, INK);
        page.text(&format_carbs(log), columns[3], y, 7.0, false, INK);
        y -= 4.5;
    }
}
