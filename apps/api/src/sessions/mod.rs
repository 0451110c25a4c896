//! Session management surface: listing, search, titles, rename/delete,
//! analytics and result export.

use serde::Serialize;

pub mod export;
pub mod handlers;
pub mod titles;

/// Score distribution used as a quick hiring signal in session analytics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreBands {
    pub excellent: usize,
    pub good: usize,
    pub average: usize,
    pub poor: usize,
}

pub fn score_bands(scores: impl IntoIterator<Item = f64>) -> ScoreBands {
    let mut bands = ScoreBands::default();
    for score in scores {
        if score >= 9.0 {
            bands.excellent += 1;
        } else if score >= 7.0 {
            bands.good += 1;
        } else if score >= 5.0 {
            bands.average += 1;
        } else {
            bands.poor += 1;
        }
    }
    bands
}
