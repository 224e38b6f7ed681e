// src/variance.rs

use serde::Serialize;
use std::io::Write;

use crate::error::{Result, SvdImageError};
use crate::types::{CumulativeVarianceSeries, Decomposition};

/// Running sum of the decomposition's explained-variance ratios, in component
/// order (component 1 has the largest singular value).
///
/// Values are capped at 1.0 so round-off in a full-rank fit never reports more
/// than all of the variance.
pub fn cumulative_variance(decomposition: &Decomposition) -> Result<CumulativeVarianceSeries> {
    let ratios = &decomposition.explained_variance_ratio;
    if ratios.is_empty() {
        return Err(SvdImageError::EmptyDecomposition);
    }
    let values = ratios
        .iter()
        .scan(0.0_f64, |running, &ratio| {
            *running += ratio.max(0.0);
            Some(running.min(1.0))
        })
        .collect();
    Ok(CumulativeVarianceSeries { values })
}

#[derive(Serialize)]
struct VariancePoint {
    component: usize,
    cumulative_variance: f64,
}

#[derive(Serialize)]
struct VarianceChart<'a> {
    title: &'a str,
    x_label: &'a str,
    y_label: &'a str,
    points: Vec<VariancePoint>,
}

/// Writes the series as `component,cumulative_variance` CSV rows.
pub fn write_csv<W: Write>(series: &CumulativeVarianceSeries, mut out: W) -> Result<()> {
    writeln!(out, "component,cumulative_variance")?;
    for (component, value) in series.points() {
        writeln!(out, "{},{}", component, value)?;
    }
    out.flush()?;
    Ok(())
}

/// Serializes the series as a JSON line chart description.
pub fn to_json(series: &CumulativeVarianceSeries) -> Result<String> {
    let chart = VarianceChart {
        title: "Cumulative Variance Explained",
        x_label: "Number of Components",
        y_label: "Cumulative Variance Explained",
        points: series
            .points()
            .map(|(component, cumulative_variance)| VariancePoint {
                component,
                cumulative_variance,
            })
            .collect(),
    };
    serde_json::to_string_pretty(&chart)
        .map_err(|e| SvdImageError::InvalidInput(format!("failed to serialize variance series: {}", e)))
}
