//! Screenshot verification against the preset markers.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use wlgrab_capture_engine::Screenshot;
use wlgrab_render_engine::compositor::canvas_size;

use crate::synthetic::{Marker, Preset};

/// Allowed per-channel difference. Marker centres are far from any edge,
/// so only rounding in the filters shows up.
pub const CHANNEL_TOLERANCE: u8 = 3;

#[derive(Debug, Serialize)]
pub struct TestReport {
    pub preset: Preset,
    pub region: String,
    pub scale: f64,
    pub sources: usize,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub expected_width: u32,
    pub expected_height: u32,
    pub markers: Vec<MarkerCheck>,
    /// Markers outside the captured region.
    pub skipped: usize,
    pub overall_status: TestStatus,
}

#[derive(Debug, Serialize)]
pub struct MarkerCheck {
    pub name: &'static str,
    pub canvas_x: u32,
    pub canvas_y: u32,
    pub expected: [u8; 3],
    /// Straight RGBA at the marker centre.
    pub actual: [u8; 4],
    pub max_channel_error: u8,
    pub passed: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum TestStatus {
    Pass,
    Fail,
    Warning,
}

/// Sample every marker centre that lies inside the screenshot.
pub fn check_markers(shot: &Screenshot, markers: &[Marker]) -> (Vec<MarkerCheck>, usize) {
    let mut checks = Vec::new();
    let mut skipped = 0;

    for marker in markers {
        let cx = ((marker.x - shot.region.x) as f64 + 0.5) * shot.scale;
        let cy = ((marker.y - shot.region.y) as f64 + 0.5) * shot.scale;
        let pixel = (cx >= 0.0 && cy >= 0.0)
            .then(|| (cx.floor() as u32, cy.floor() as u32))
            .and_then(|(x, y)| shot.canvas.pixel(x, y).map(|argb| (x, y, argb)));

        let Some((canvas_x, canvas_y, argb)) = pixel else {
            tracing::debug!(marker = marker.name, "Marker outside the captured region");
            skipped += 1;
            continue;
        };

        // Opaque pixels need no unpremultiplication.
        let actual = [(argb >> 16) as u8, (argb >> 8) as u8, argb as u8, (argb >> 24) as u8];
        let max_channel_error = (0..3)
            .map(|i| actual[i].abs_diff(marker.rgb[i]))
            .max()
            .unwrap_or(0);
        let passed = actual[3] == 0xff && max_channel_error <= CHANNEL_TOLERANCE;

        if passed {
            tracing::debug!(marker = marker.name, canvas_x, canvas_y, "Marker matched");
        } else {
            tracing::warn!(
                marker = marker.name,
                canvas_x,
                canvas_y,
                expected = ?marker.rgb,
                actual = ?actual,
                "Marker mismatch"
            );
        }

        checks.push(MarkerCheck {
            name: marker.name,
            canvas_x,
            canvas_y,
            expected: marker.rgb,
            actual,
            max_channel_error,
            passed,
        });
    }

    (checks, skipped)
}

pub fn build_report(preset: Preset, shot: &Screenshot, markers: &[Marker]) -> TestReport {
    let (expected_width, expected_height) = canvas_size(shot.region, shot.scale);
    let (checks, skipped) = check_markers(shot, markers);

    let size_ok =
        shot.canvas.width() == expected_width && shot.canvas.height() == expected_height;
    let overall_status = if !size_ok || checks.iter().any(|c| !c.passed) {
        TestStatus::Fail
    } else if checks.is_empty() {
        TestStatus::Warning
    } else {
        TestStatus::Pass
    };

    let passed = checks.iter().filter(|c| c.passed).count();
    tracing::info!(
        ?preset,
        passed,
        total = checks.len(),
        skipped,
        ?overall_status,
        "Marker verification finished"
    );

    TestReport {
        preset,
        region: shot.region.to_string(),
        scale: shot.scale,
        sources: shot.source_count,
        canvas_width: shot.canvas.width(),
        canvas_height: shot.canvas.height(),
        expected_width,
        expected_height,
        markers: checks,
        skipped,
        overall_status,
    }
}

pub fn write_report(path: &Path, report: &TestReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report {}", path.display()))?;
    tracing::info!(path = %path.display(), "Wrote verification report");
    Ok(())
}
