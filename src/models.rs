// Core data models for the expression booth

/// Represents a single video frame with RGB data
#[derive(Clone, Debug)]
pub struct Frame {
    /// Raw RGB pixel data (width * height * 3 bytes)
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl Frame {
    /// Creates a new Frame with the given parameters
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }
}

/// The fixed set of expressions the classifier scores
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Expression {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
}

impl Expression {
    /// Canonical order in which detectors report scores
    pub const ALL: [Expression; 7] = [
        Expression::Neutral,
        Expression::Happy,
        Expression::Sad,
        Expression::Angry,
        Expression::Fearful,
        Expression::Disgusted,
        Expression::Surprised,
    ];

    /// Lowercase label as reported by the detector
    pub fn label(self) -> &'static str {
        match self {
            Expression::Neutral => "neutral",
            Expression::Happy => "happy",
            Expression::Sad => "sad",
            Expression::Angry => "angry",
            Expression::Fearful => "fearful",
            Expression::Disgusted => "disgusted",
            Expression::Surprised => "surprised",
        }
    }

    /// Emoji shown next to the label
    pub fn glyph(self) -> &'static str {
        match self {
            Expression::Neutral => "😐",
            Expression::Happy => "😄",
            Expression::Sad => "😢",
            Expression::Angry => "😠",
            Expression::Fearful => "😨",
            Expression::Disgusted => "🤢",
            Expression::Surprised => "😲",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.label() == label)
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Looks up the glyph for a label; labels outside the fixed set get none
pub fn glyph_for(label: &str) -> &'static str {
    Expression::from_label(label).map_or("", Expression::glyph)
}

/// Confidence per expression label, in the order the detector produced them
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpressionScores {
    entries: Vec<(String, f64)>,
}

impl ExpressionScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the score for a label, keeping the label's original position if already present
    pub fn insert(&mut self, label: impl Into<String>, score: f64) {
        let label = label.into();
        match self.entries.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 = score,
            None => self.entries.push((label, score)),
        }
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, score)| *score)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(l, s)| (l.as_str(), *s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<L: Into<String>> FromIterator<(L, f64)> for ExpressionScores {
    fn from_iter<I: IntoIterator<Item = (L, f64)>>(iter: I) -> Self {
        let mut scores = Self::new();
        for (label, score) in iter {
            scores.insert(label, score);
        }
        scores
    }
}

/// Expression scores for one detected face
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FaceExpressions {
    pub expressions: ExpressionScores,
}

impl FaceExpressions {
    pub fn new(expressions: ExpressionScores) -> Self {
        Self { expressions }
    }
}

/// Every face found in one captured frame, in detector order. Empty when no face was found.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    pub faces: Vec<FaceExpressions>,
}

impl DetectionResult {
    pub fn new(faces: Vec<FaceExpressions>) -> Self {
        Self { faces }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// The face whose scores drive the rendered output
    pub fn primary(&self) -> Option<&FaceExpressions> {
        self.faces.first()
    }
}
