//! Detail panel view model: rating gauge, time-range label and description rendering.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::models::{Description, LocalityRecord};

lazy_static! {
    static ref FIGURE: Regex = Regex::new(r"\d+(?:\.\d+)?%?").expect("figure pattern is valid");
}

/// Angular span of the gauge arc, a half circle.
pub const GAUGE_SWEEP_DEGREES: f64 = 180.0;

/// Number of highlight bullets pulled out of a narrative description.
const NARRATIVE_HIGHLIGHTS: usize = 3;

/// Rating gauge. Value is clamped to 0..=100 and mapped linearly onto the arc.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Gauge {
    value: f64,
}

impl Gauge {
    pub fn new(rating: f64) -> Self {
        let value = if rating.is_nan() {
            0.0
        } else {
            rating.clamp(0.0, 100.0)
        };
        Self { value }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Share of the arc that is filled, 0.0..=1.0
    pub fn fraction(&self) -> f64 {
        self.value / 100.0
    }

    pub fn sweep_degrees(&self) -> f64 {
        self.fraction() * GAUGE_SWEEP_DEGREES
    }

    /// (visible, total) dash lengths for an arc path of `arc_length` units
    pub fn dash(&self, arc_length: f64) -> (f64, f64) {
        (self.fraction() * arc_length, arc_length)
    }

    /// Text shown in the middle of the gauge, e.g. `72%`
    pub fn label(&self) -> String {
        if self.value.fract() == 0.0 {
            format!("{}%", self.value as i64)
        } else {
            format!("{:.1}%", self.value)
        }
    }
}

/// Display-only horizon for the rating. Not wired to any rating source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub years: u32,
}

impl TimeRange {
    pub fn label(&self) -> String {
        match self.years {
            1 => "in next 1 year".to_string(),
            n => format!("in next {n} years"),
        }
    }
}

/// Icon kinds cycled through by the structured fact list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FactIcon {
    Building,
    School,
    Hospital,
    Park,
    Dining,
    Transit,
}

impl FactIcon {
    pub const ALL: [FactIcon; 6] = [
        FactIcon::Building,
        FactIcon::School,
        FactIcon::Hospital,
        FactIcon::Park,
        FactIcon::Dining,
        FactIcon::Transit,
    ];

    pub fn for_index(index: usize) -> Self {
        Self::ALL[index % Self::ALL.len()]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactRow {
    pub icon: FactIcon,
    pub text: String,
}

/// A run of narrative text; figures are rendered apart from prose.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Segment {
    Text(String),
    Figure(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DescriptionView {
    Facts(Vec<FactRow>),
    Narrative {
        segments: Vec<Segment>,
        highlights: Vec<String>,
    },
}

impl DescriptionView {
    pub fn render(description: &Description) -> Self {
        match description {
            Description::Structured(facts) => Self::Facts(render_facts(facts)),
            Description::Narrative(text) => Self::Narrative {
                segments: split_figures(text),
                highlights: highlights(text),
            },
        }
    }
}

fn render_facts(facts: &[String]) -> Vec<FactRow> {
    facts
        .iter()
        .enumerate()
        .map(|(i, text)| FactRow {
            icon: FactIcon::for_index(i),
            text: text.clone(),
        })
        .collect()
}

/// Splits prose into text and figure runs. Empty runs are dropped.
pub fn split_figures(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0;
    for m in FIGURE.find_iter(text) {
        if m.start() > cursor {
            segments.push(Segment::Text(text[cursor..m.start()].to_string()));
        }
        segments.push(Segment::Figure(m.as_str().to_string()));
        cursor = m.end();
    }
    if cursor < text.len() {
        segments.push(Segment::Text(text[cursor..].to_string()));
    }
    segments
}

/// First few non-empty sentence fragments, split on `.`
///
/// Decimal points split too ("2.5%" yields "2" and "5%"); this matches how
/// the highlights have always been produced.
pub fn highlights(text: &str) -> Vec<String> {
    text.split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(NARRATIVE_HIGHLIGHTS)
        .map(str::to_string)
        .collect()
}

/// Everything the detail panel shows for the current locality.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailView {
    pub name: String,
    pub gauge: Gauge,
    pub time_range: TimeRange,
    pub description: DescriptionView,
}

/// Holds the time-range control; the record itself belongs to the search controller.
#[derive(Debug, Clone)]
pub struct DetailPanel {
    time_range: TimeRange,
}

impl DetailPanel {
    pub fn new(default_years: u32) -> Self {
        Self {
            time_range: TimeRange {
                years: default_years,
            },
        }
    }

    pub fn set_time_range(&mut self, years: u32) {
        tracing::debug!("Time range set to {} years (display only)", years);
        self.time_range = TimeRange { years };
    }

    pub fn time_range(&self) -> TimeRange {
        self.time_range
    }

    pub fn view(&self, record: &LocalityRecord) -> DetailView {
        DetailView {
            name: record.name.clone(),
            gauge: Gauge::new(record.rating),
            time_range: self.time_range,
            description: DescriptionView::render(&record.description),
        }
    }
}
