//! Text front-ends for analyses.

pub mod yaml;
