use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// The toxicity categories the classifier scores independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToxicityLabel {
    Toxicity,
    SevereToxicity,
    Obscene,
    Threat,
    Insult,
    SexualExplicit,
    IdentityAttack,
}

/// Column headers of the results table, in display order.
///
/// `identity_attack` has no column and is never displayed.
pub const HEADER: [&str; 8] = [
    "Text",
    "Toxicity",
    "Obscene",
    "Threat",
    "Insult",
    "Sexual_Explicit",
    "Severe_Toxicity",
    "Time",
];

lazy_static! {
    static ref BY_NAME: HashMap<&'static str, ToxicityLabel> = ToxicityLabel::all()
        .iter()
        .map(|label| (label.as_str(), *label))
        .collect();
}

impl ToxicityLabel {
    pub fn all() -> &'static [ToxicityLabel] {
        &[
            ToxicityLabel::Toxicity,
            ToxicityLabel::SevereToxicity,
            ToxicityLabel::Obscene,
            ToxicityLabel::Threat,
            ToxicityLabel::Insult,
            ToxicityLabel::SexualExplicit,
            ToxicityLabel::IdentityAttack,
        ]
    }

    /// The identifier the model reports, e.g. `severe_toxicity`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToxicityLabel::Toxicity => "toxicity",
            ToxicityLabel::SevereToxicity => "severe_toxicity",
            ToxicityLabel::Obscene => "obscene",
            ToxicityLabel::Threat => "threat",
            ToxicityLabel::Insult => "insult",
            ToxicityLabel::SexualExplicit => "sexual_explicit",
            ToxicityLabel::IdentityAttack => "identity_attack",
        }
    }

    /// Whether the results table has a column for this label.
    pub fn is_displayed(&self) -> bool {
        HEADER.iter().any(|column| column.eq_ignore_ascii_case(self.as_str()))
    }

    /// Output order of the unbiased multi-label toxicity checkpoints.
    pub fn default_model_order() -> Vec<String> {
        [
            ToxicityLabel::Toxicity,
            ToxicityLabel::SevereToxicity,
            ToxicityLabel::Obscene,
            ToxicityLabel::IdentityAttack,
            ToxicityLabel::Insult,
            ToxicityLabel::Threat,
            ToxicityLabel::SexualExplicit,
        ]
        .iter()
        .map(|label| label.as_str().to_string())
        .collect()
    }
}

impl fmt::Display for ToxicityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown toxicity label: {0}")]
pub struct UnknownLabel(pub String);

impl FromStr for ToxicityLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BY_NAME
            .get(s.trim().to_lowercase().as_str())
            .copied()
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for label in ToxicityLabel::all() {
            assert_eq!(label.as_str().parse::<ToxicityLabel>().unwrap(), *label);
        }
        assert_eq!("Sexual_Explicit".parse::<ToxicityLabel>().unwrap(), ToxicityLabel::SexualExplicit);
        assert!("spam".parse::<ToxicityLabel>().is_err());
    }

    #[test]
    fn test_identity_attack_not_displayed() {
        let hidden: Vec<_> = ToxicityLabel::all()
            .iter()
            .filter(|label| !label.is_displayed())
            .collect();
        assert_eq!(hidden, vec![&ToxicityLabel::IdentityAttack]);
    }

    #[test]
    fn test_default_model_order_covers_all_labels() {
        let order = ToxicityLabel::default_model_order();
        assert_eq!(order.len(), ToxicityLabel::all().len());
        for label in ToxicityLabel::all() {
            assert!(order.iter().any(|name| name == label.as_str()));
        }
    }
}
