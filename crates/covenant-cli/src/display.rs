//! Per-scope summaries printed after each stage.

use std::fmt::Write;

use covenant_ai::ExtractReport;
use covenant_search::ScopeReport;
use covenant_store::MergeReport;

const MAX_GAPS: usize = 10;

pub fn print_search_summary(reports: &[ScopeReport]) {
    print!("{}", render_search(reports));
}

pub fn print_extract_summary(reports: &[ExtractReport]) {
    print!("{}", render_extract(reports));
}

pub fn print_normalize_summary(report: &MergeReport) {
    print!("{}", render_normalize(report));
}

fn line(out: &mut String, label: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "  {label:<26} {value}");
}

fn render_search(reports: &[ScopeReport]) -> String {
    let mut out = String::new();
    for r in reports {
        let _ = writeln!(out, "=== {} ===", r.scope);
        line(&mut out, "hits", r.found);
        line(&mut out, "duplicates", r.duplicates);
        line(&mut out, "skipped (not HTML)", r.skipped);
        line(&mut out, "downloaded", r.downloaded);
        line(&mut out, "reused", r.reused);
        line(&mut out, "admitted", r.admitted);
        line(&mut out, "rejected", r.rejected);
        line(&mut out, "fetch failed", r.fetch_failed);
        if !r.gaps.is_empty() {
            let _ = writeln!(out, "  search gaps ({}):", r.gaps.len());
            for gap in r.gaps.iter().take(MAX_GAPS) {
                let _ = writeln!(out, "    {} page {}: {}", gap.year, gap.page, gap.error);
            }
            if r.gaps.len() > MAX_GAPS {
                let _ = writeln!(out, "    ... and {} more", r.gaps.len() - MAX_GAPS);
            }
        }
        out.push('\n');
    }
    out
}

fn render_extract(reports: &[ExtractReport]) -> String {
    let mut out = String::new();
    for r in reports {
        let _ = writeln!(out, "=== {} ===", r.scope);
        line(&mut out, "admitted", r.admitted);
        line(&mut out, "extracted", r.extracted);
        line(&mut out, "already extracted", r.unchanged);
        line(&mut out, "skipped (too short)", r.skipped);
        line(&mut out, "missing document", r.missing);
        line(&mut out, "failed", r.failed);
        out.push('\n');
    }
    out
}

fn render_normalize(report: &MergeReport) -> String {
    let mut out = String::new();
    for s in &report.scopes {
        let _ = writeln!(out, "=== {} ===", s.scope);
        line(&mut out, "records", s.total);
        line(&mut out, "with metadata", s.kept);
        line(&mut out, "unmapped category", s.unmapped);
        out.push('\n');
    }
    let _ = writeln!(
        out,
        "{} entries written to {}",
        report.entries,
        report.output.display()
    );
    out
}
