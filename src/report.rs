//! Artifact output.
//!
//! Writes the JSON artifact and a human-readable text report next to it,
//! and prints a short summary to stdout.

use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result};

use crate::pipeline::BenchmarkArtifact;
use crate::stats::MetricKey;

/// Filesystem-safe stem for an app name
pub fn file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    if stem.is_empty() {
        "benchmark".to_string()
    } else {
        stem
    }
}

/// Write the JSON artifact
pub fn generate_json_report(artifact: &BenchmarkArtifact, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(artifact)
        .context("Failed to serialize artifact to JSON")?;

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON artifact to {}", output_path.display()))?;

    log::info!("JSON artifact written to {}", output_path.display());
    Ok(())
}

/// Read a previously written artifact
pub fn load_artifact(path: &Path) -> Result<BenchmarkArtifact> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read artifact {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse artifact {}", path.display()))
}

fn section(lines: &mut Vec<String>, title: &str) {
    lines.push("=".repeat(80));
    lines.push(format!("{:^80}", title));
    lines.push("=".repeat(80));
    lines.push(String::new());
}

fn opt_ms(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.0}ms", v))
        .unwrap_or_else(|| "n/a".to_string())
}

/// Render the text report
pub fn render_text_report(artifact: &BenchmarkArtifact) -> String {
    let mut lines: Vec<String> = Vec::new();
    let meta = &artifact.metadata;
    let score = &artifact.score;
    let avg = &artifact.averages;

    section(&mut lines, "COOKIE BANNER BENCHMARK");

    lines.push(format!("App: {}", meta.name));
    lines.push(format!("Run Date: {}", meta.timestamp));
    if let Some(ref url) = meta.page_url {
        lines.push(format!("Target: {}", url));
    }
    lines.push(format!(
        "Iterations: {} of {} completed",
        meta.iterations, meta.requested_iterations
    ));
    if meta.baseline {
        lines.push("Baseline: yes (reference run)".to_string());
    }
    lines.push(format!("Bundle Type: {:?}", meta.tech_stack.bundle_type));
    if !meta.tech_stack.frameworks.is_empty() {
        lines.push(format!("Frameworks: {}", meta.tech_stack.frameworks.join(", ")));
    }
    lines.push(String::new());

    // Score
    section(&mut lines, "SCORE");
    lines.push(format!("Total: {}/100 ({})", score.total_score, score.grade));
    lines.push(String::new());
    for category in &score.categories {
        lines.push(format!(
            "{:<18} {:>5.1}/100  (weight {:.0}%)",
            category.category.label(),
            category.score,
            category.weight * 100.0
        ));
        for detail in &category.details {
            let value = detail
                .value
                .map(|v| format!("{:.2}{}", v, detail.unit))
                .unwrap_or_else(|| "-".to_string());
            lines.push(format!(
                "  {:<28} {:>12}  {:>5.1}/{:<4.0} {}",
                detail.name, value, detail.points, detail.max_points, detail.reason
            ));
        }
    }
    lines.push(String::new());
    lines.push(format!(
        "Open Source: {} ({:?}{})",
        if score.open_source.is_open_source { "yes" } else { "no" },
        score.open_source.rule,
        score
            .open_source
            .evidence
            .as_deref()
            .map(|e| format!(": {}", e))
            .unwrap_or_default()
    ));
    lines.push(String::new());

    // Banner
    section(&mut lines, "COOKIE BANNER");
    lines.push(format!(
        "Detected: {} ({:.0}% of iterations)",
        if avg.banner_detected { "yes" } else { "no" },
        artifact.summary.banner_detection_rate * 100.0
    ));
    if avg.banner_detected {
        lines.push(format!("  Render: {:.0}ms", avg.banner_render_ms));
        lines.push(format!("  Visible: {:.0}ms", avg.banner_visible_ms));
        lines.push(format!("  Interactive: {:.0}ms", avg.banner_interactive_ms));
        lines.push(format!("  Layout shift: {:.4}", avg.banner_layout_shift));
        lines.push(format!(
            "  Viewport coverage: {:.1}%",
            avg.banner_viewport_coverage_percent
        ));
    }
    lines.push(format!(
        "Regulatory friction delay: {}",
        opt_ms(avg.regulatory_friction_delay_ms)
    ));
    lines.push(String::new());

    // Core metrics
    section(&mut lines, "METRICS (TRIMMED MEAN)");
    lines.push(format!(
        "{:<28} {:>10} {:>10} {:>10} {:>8}  {}",
        "Metric", "Trimmed", "Median", "P95", "CV%", "Stable"
    ));
    for key in MetricKey::ALL {
        if let Some(m) = artifact.summary.get(key) {
            lines.push(format!(
                "{:<28} {:>10.2} {:>10.2} {:>10.2} {:>8.1}  {}",
                format!("{:?}", key),
                m.trimmed_mean,
                m.median,
                m.p95,
                m.cv_percent,
                if m.stable { "yes" } else { "NO" }
            ));
        }
    }
    lines.push(String::new());

    lines.push("Network:".to_string());
    lines.push(format!("  Total size: {:.1}KB", avg.total_size_kb));
    lines.push(format!("  Bundled scripts: {:.1}KB", avg.bundled_size_kb));
    lines.push(format!("  Third-party: {:.1}KB", avg.third_party_size_kb));
    lines.push(format!(
        "  Banner vendor: {:.1}KB over {:.0} request(s)",
        avg.banner_vendor_size_kb, avg.banner_vendor_requests
    ));
    lines.push(format!("  Requests: {:.0}", avg.request_count));
    lines.push(String::new());

    if !artifact.summary.warnings.is_empty() {
        lines.push("Warnings:".to_string());
        for warning in &artifact.summary.warnings {
            lines.push(format!("  - {}", warning));
        }
        lines.push(String::new());
    }

    if !score.insights.is_empty() || !score.recommendations.is_empty() {
        section(&mut lines, "INSIGHTS");
        for insight in &score.insights {
            lines.push(format!("  * {}", insight));
        }
        if !score.recommendations.is_empty() {
            lines.push(String::new());
            lines.push("Recommendations:".to_string());
            for (i, rec) in score.recommendations.iter().enumerate() {
                lines.push(format!("  {}. {}", i + 1, rec));
            }
        }
        lines.push(String::new());
    }

    // Footer
    lines.push("=".repeat(80));
    lines.join("\n")
}

/// Write the text report
pub fn generate_text_report(artifact: &BenchmarkArtifact, output_path: &Path) -> Result<()> {
    fs::write(output_path, render_text_report(artifact))
        .with_context(|| format!("Failed to write text report to {}", output_path.display()))?;

    log::info!("Text report written to {}", output_path.display());
    Ok(())
}

/// Write `<name>.json` and `<name>.txt` into `output_dir`
pub fn write_artifact(
    artifact: &BenchmarkArtifact,
    output_dir: &Path,
) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let stem = file_stem(&artifact.metadata.name);
    let json_path = output_dir.join(format!("{}.json", stem));
    let text_path = output_dir.join(format!("{}.txt", stem));
    generate_json_report(artifact, &json_path)?;
    generate_text_report(artifact, &text_path)?;
    Ok((json_path, text_path))
}

/// Print a summary to stdout
pub fn print_summary(artifact: &BenchmarkArtifact) {
    let score = &artifact.score;
    let avg = &artifact.averages;

    println!("\n=== COOKIE BANNER BENCHMARK: {} ===\n", artifact.metadata.name);
    println!("Score: {}/100 ({})", score.total_score, score.grade);
    for category in &score.categories {
        println!("  {}: {:.1}", category.category.label(), category.score);
    }

    println!("\nBanner:");
    if avg.banner_detected {
        println!("  Visible: {:.0}ms", avg.banner_visible_ms);
        println!("  Interactive: {:.0}ms", avg.banner_interactive_ms);
    } else {
        println!("  Not detected");
    }

    println!("\nPage:");
    println!("  FCP: {}", opt_ms(avg.first_contentful_paint_ms));
    println!("  LCP: {}", opt_ms(avg.largest_contentful_paint_ms));
    println!("  Total size: {:.1}KB", avg.total_size_kb);

    if !artifact.summary.unstable_metrics.is_empty() {
        println!(
            "\nUnstable metrics: {}",
            artifact
                .summary
                .unstable_metrics
                .iter()
                .map(|k| format!("{:?}", k))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    println!();
}
