//! Qualitative bands for comparison metrics; NaN reads as the least similar band.

use std::fmt;

use crate::types::ComparisonResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SimilarityBand {
    VerySimilar,
    GoodConcordance,
    ModerateSimilarity,
    SignificantDifferences,
}

impl SimilarityBand {
    pub fn classify(percentage: f64) -> Self {
        if percentage >= 90.0 {
            SimilarityBand::VerySimilar
        } else if percentage >= 70.0 {
            SimilarityBand::GoodConcordance
        } else if percentage >= 50.0 {
            SimilarityBand::ModerateSimilarity
        } else {
            SimilarityBand::SignificantDifferences
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SimilarityBand::VerySimilar => "very similar",
            SimilarityBand::GoodConcordance => "good concordance",
            SimilarityBand::ModerateSimilarity => "moderate similarity",
            SimilarityBand::SignificantDifferences => "significant differences",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SimilarityBand::VerySimilar => {
                "The trees are very similar, with practically identical topologies."
            }
            SimilarityBand::GoodConcordance => {
                "The trees show good concordance, with a few minor differences."
            }
            SimilarityBand::ModerateSimilarity => {
                "The trees are moderately similar, with notable topological differences."
            }
            SimilarityBand::SignificantDifferences => {
                "The trees show significant differences in their topology."
            }
        }
    }
}

impl fmt::Display for SimilarityBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TopologyBand {
    VerySimilar,
    MinorDifferences,
    NotableDifferences,
    VeryDifferent,
}

impl TopologyBand {
    pub fn classify(normalized_rf: f64) -> Self {
        if normalized_rf < 0.1 {
            TopologyBand::VerySimilar
        } else if normalized_rf < 0.3 {
            TopologyBand::MinorDifferences
        } else if normalized_rf < 0.6 {
            TopologyBand::NotableDifferences
        } else {
            TopologyBand::VeryDifferent
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TopologyBand::VerySimilar => "very similar topology",
            TopologyBand::MinorDifferences => "minor topological differences",
            TopologyBand::NotableDifferences => "notable topological differences",
            TopologyBand::VeryDifferent => "very different topology",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            TopologyBand::VerySimilar => {
                "Very low distance: the trees are topologically very similar."
            }
            TopologyBand::MinorDifferences => {
                "Low distance: minor differences in how the sequences are grouped."
            }
            TopologyBand::NotableDifferences => {
                "Moderate distance: notable differences in tree structure."
            }
            TopologyBand::VeryDifferent => {
                "High distance: the trees have very different topologies."
            }
        }
    }
}

impl fmt::Display for TopologyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparisonInterpretation {
    pub similarity: SimilarityBand,
    pub topology: TopologyBand,
}

pub fn interpret(result: &ComparisonResult) -> ComparisonInterpretation {
    ComparisonInterpretation {
        similarity: SimilarityBand::classify(result.similarity.percentage),
        topology: TopologyBand::classify(result.rf_distance.normalized),
    }
}
