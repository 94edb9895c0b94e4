// Render module for turning detection results into the output panel

use std::fmt::Write;

use tracing::debug;

use crate::models::{glyph_for, DetectionResult};

/// Message shown when the frame had no face in it
pub const NO_FACE_MESSAGE: &str = "No faces detected. Try again.";

/// Message shown when the detector failed
pub const ANALYSIS_FAILED_MESSAGE: &str = "Analysis failed. Please try again.";

/// Rounds a score to the nearest whole percent, halves rounding up.
/// Results are clamped to 0..=100; NaN becomes 0.
pub fn percent(score: f64) -> u8 {
    if score.is_nan() {
        return 0;
    }
    (score * 100.0 + 0.5).floor().clamp(0.0, 100.0) as u8
}

/// Sort key for scores; NaN ranks below everything
fn rank(score: f64) -> f64 {
    if score.is_nan() {
        f64::NEG_INFINITY
    } else {
        score
    }
}

/// One expression line of the result card
#[derive(Clone, Debug, PartialEq)]
pub struct ExpressionRow {
    pub label: String,
    pub glyph: &'static str,
    pub score: f64,
    pub percent: u8,
}

impl ExpressionRow {
    fn new(label: &str, score: f64) -> Self {
        Self {
            label: label.to_string(),
            glyph: glyph_for(label),
            score,
            percent: percent(score),
        }
    }

    /// Filled width of the bar, in percent of the track
    pub fn bar_width(&self) -> u8 {
        self.percent
    }
}

/// Dominant expression plus every expression ranked by score
#[derive(Clone, Debug, PartialEq)]
pub struct ResultCard {
    pub dominant: ExpressionRow,
    pub rows: Vec<ExpressionRow>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum OutputContent {
    #[default]
    Empty,
    /// Informational text, e.g. no face found
    Message(String),
    /// Recoverable error text
    Failure(String),
    Card(ResultCard),
}

/// The output container: busy flag plus whatever was last rendered
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutputPanel {
    busy: bool,
    content: OutputContent,
}

impl OutputPanel {
    pub fn busy(&self) -> bool {
        self.busy
    }

    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    pub fn content(&self) -> &OutputContent {
        &self.content
    }

    pub fn clear(&mut self) {
        self.busy = false;
        self.content = OutputContent::Empty;
    }

    /// HTML for the panel contents, mirroring the layout of the result card
    pub fn to_markup(&self) -> String {
        let mut html = String::new();
        let busy = if self.busy { "true" } else { "false" };
        let _ = write!(html, r#"<section id="output-section" aria-busy="{busy}">"#);
        match &self.content {
            OutputContent::Empty => {}
            OutputContent::Message(text) => {
                let _ = write!(html, r#"<p class="small-muted">{}</p>"#, escape(text));
            }
            OutputContent::Failure(text) => {
                let _ = write!(html, r#"<p class="error" role="alert">{}</p>"#, escape(text));
            }
            OutputContent::Card(card) => write_card(&mut html, card),
        }
        html.push_str("</section>");
        html
    }
}

fn write_card(html: &mut String, card: &ResultCard) {
    let dominant = &card.dominant;
    let _ = write!(
        html,
        r#"<div class="result-card"><h2 class="result-title">Detection Results</h2><div class="result-dominant">Dominant: <strong>{} {}</strong> — {}%</div><div class="grid">"#,
        escape(&dominant.label),
        dominant.glyph,
        dominant.percent
    );
    for row in &card.rows {
        let _ = write!(
            html,
            r#"<div class="expr-row"><span>{} {}</span><span>{}%</span><div class="bar"><span style="width:{}%"></span></div></div>"#,
            row.glyph,
            escape(&row.label),
            row.percent,
            row.bar_width()
        );
    }
    html.push_str("</div></div>");
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Builds the result card for a detection result
#[derive(Debug, Default)]
pub struct ResultRenderer;

impl ResultRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Replaces the panel contents with the rendering of `result`.
    ///
    /// Only the first face is shown; any further faces are ignored.
    pub fn render(&self, result: &DetectionResult, output: &mut OutputPanel) {
        output.clear();

        let card = result.primary().and_then(|face| {
            let mut rows: Vec<ExpressionRow> = face
                .expressions
                .iter()
                .map(|(label, score)| ExpressionRow::new(label, score))
                .collect();
            // Stable: equal scores keep detector order
            rows.sort_by(|a, b| rank(b.score).total_cmp(&rank(a.score)));
            let dominant = rows.first()?.clone();
            Some(ResultCard { dominant, rows })
        });

        match card {
            Some(card) => {
                debug!(
                    dominant = %card.dominant.label,
                    percent = card.dominant.percent,
                    faces = result.faces.len(),
                    "rendered result card"
                );
                output.content = OutputContent::Card(card);
            }
            None => output.content = OutputContent::Message(NO_FACE_MESSAGE.to_string()),
        }
    }

    /// Shows a recoverable error in place of results
    pub fn render_failure(&self, message: &str, output: &mut OutputPanel) {
        output.clear();
        output.content = OutputContent::Failure(message.to_string());
    }
}
