use serde::{Deserialize, Serialize};

/// The three diagnostic categories the classifier emits, in output-vector order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Diagnosis {
    Bacterial,
    Normal,
    Viral,
}

// Index order of the classifier's probability vector.
const DIAGNOSES: [Diagnosis; 3] = [Diagnosis::Bacterial, Diagnosis::Normal, Diagnosis::Viral];

impl Diagnosis {
    pub const COUNT: usize = DIAGNOSES.len();

    pub fn from_index(index: usize) -> Option<Self> {
        DIAGNOSES.get(index).copied()
    }

    pub fn index(&self) -> usize {
        match self {
            Diagnosis::Bacterial => 0,
            Diagnosis::Normal => 1,
            Diagnosis::Viral => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Diagnosis::Bacterial => "bacterial",
            Diagnosis::Normal => "normal",
            Diagnosis::Viral => "viral",
        }
    }

    pub fn all() -> &'static [Diagnosis] {
        &DIAGNOSES
    }
}

impl std::fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successful forward pass, reduced to the label the collaborators display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub probabilities: Vec<f32>,
    pub class_index: usize,
    pub label: Diagnosis,
    /// Probability of `label` in percent, in (0, 100].
    pub confidence: f32,
}

impl Classification {
    /// Builds a classification from a raw probability vector.
    ///
    /// Returns `None` when the vector does not have exactly one entry per [`Diagnosis`],
    /// contains non-finite values, or its maximum is not strictly positive.
    pub fn from_probabilities(probabilities: &[f32]) -> Option<Self> {
        if probabilities.len() != Diagnosis::COUNT {
            return None;
        }
        if probabilities.iter().any(|p| !p.is_finite()) {
            return None;
        }

        let class_index = argmax(probabilities)?;
        let max = probabilities[class_index];
        if max <= 0.0 {
            return None;
        }

        Some(Self {
            probabilities: probabilities.to_vec(),
            class_index,
            label: Diagnosis::from_index(class_index)?,
            confidence: (max * 100.0).min(100.0),
        })
    }
}

/// Stable argmax: on ties the lowest index wins.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Outcome of asking the engine for a prediction.
#[derive(Debug, Clone, PartialEq)]
pub enum Inference {
    Classified(Classification),
    /// Sentinel returned when no usable model is loaded or the forward pass failed.
    Degraded { reason: String },
}

impl Inference {
    pub fn classification(&self) -> Option<&Classification> {
        match self {
            Inference::Classified(c) => Some(c),
            Inference::Degraded { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Inference::Degraded { .. })
    }

    pub fn class_index(&self) -> Option<usize> {
        self.classification().map(|c| c.class_index)
    }
}
