//! Plain-text rendering of category reports.

use crate::catalog::Lane;
use crate::evaluate::{CategoryReport, ProbeResult};
use mmp_exact::hex_bits;
use std::io::{self, Write};

const RULE_WIDTH: usize = 64;
const DESCRIPTION_WIDTH: usize = 54;

fn rule(out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))
}

fn label(result: &ProbeResult) -> String {
    if result.lane == Lane::ORIGIN {
        result.description.to_string()
    } else {
        format!(
            "{} @({}, {})",
            result.description, result.lane.row, result.lane.col
        )
    }
}

/// Writes a header per category, one `[PASS]`/`[FAIL]` line per result and
/// a footer with the overall pass count. `verbose` adds the expected and
/// observed bit patterns under each failing line.
pub fn write_report(
    out: &mut dyn Write,
    unit: &str,
    reports: &[CategoryReport],
    verbose: bool,
) -> io::Result<()> {
    rule(out)?;
    writeln!(out, " MMA binary64 semantics probe: {unit}")?;
    rule(out)?;

    for report in reports {
        writeln!(out)?;
        writeln!(out, "{}", report.category.title())?;
        writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
        for result in &report.results {
            let verdict = if result.passed { "[PASS]" } else { "[FAIL]" };
            writeln!(out, "  {:<DESCRIPTION_WIDTH$} {verdict}", label(result))?;
            if verbose && !result.passed {
                writeln!(out, "      expected {}", result.expected)?;
                writeln!(
                    out,
                    "      observed {} ({:e})",
                    hex_bits(result.observed),
                    result.observed
                )?;
                writeln!(out, "      reason   {}", result.reason_code)?;
            }
        }
        writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
        writeln!(
            out,
            "  {}/{} passed",
            report.pass_count(),
            report.case_count()
        )?;
        writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
    }

    let passed: usize = reports.iter().map(CategoryReport::pass_count).sum();
    let total: usize = reports.iter().map(CategoryReport::case_count).sum();
    writeln!(out)?;
    rule(out)?;
    writeln!(out, " {passed}/{total} probes passed")?;
    rule(out)
}

#[cfg(test)]
mod tests {
    use super::write_report;
    use crate::catalog::{Lane, ProbeCategory};
    use crate::evaluate::{CategoryReport, ProbeResult};
    use mmp_exact::next_up;

    fn result(description: &'static str, passed: bool, lane: Lane) -> ProbeResult {
        ProbeResult {
            category: ProbeCategory::RoundingMode,
            id: "probe",
            description,
            lane,
            expected: "== 0x4000000000000000 (2e0)".to_string(),
            observed: next_up(2.0),
            baseline: None,
            passed,
            reason_code: if passed {
                "probe_passed"
            } else {
                "probe_value_mismatch"
            },
            operand_fingerprint: String::new(),
        }
    }

    fn render(reports: &[CategoryReport], verbose: bool) -> String {
        let mut out = Vec::new();
        write_report(&mut out, "emulated:test", reports, verbose).expect("write to vec");
        String::from_utf8(out).expect("utf8 report")
    }

    #[test]
    fn lines_are_padded_and_tagged() {
        let reports = vec![CategoryReport {
            category: ProbeCategory::RoundingMode,
            results: vec![
                result("tie goes to even", true, Lane::ORIGIN),
                result("above midpoint", false, Lane { row: 1, col: 2 }),
            ],
        }];
        let text = render(&reports, false);
        assert!(text.contains("C. Rounding mode"));
        let pass_line = text
            .lines()
            .find(|line| line.contains("tie goes to even"))
            .expect("pass line");
        assert!(pass_line.ends_with("[PASS]"));
        let fail_line = text
            .lines()
            .find(|line| line.contains("above midpoint @(1, 2)"))
            .expect("fail line");
        assert!(fail_line.ends_with("[FAIL]"));
        assert_eq!(pass_line.len(), fail_line.len());
        assert!(text.contains(" 1/2 probes passed"));
        assert!(!text.contains("observed"));
    }

    #[test]
    fn category_block_is_closed_by_a_rule() {
        let reports = vec![CategoryReport {
            category: ProbeCategory::RoundingMode,
            results: vec![result("tie goes to even", true, Lane::ORIGIN)],
        }];
        let text = render(&reports, false);
        let lines: Vec<&str> = text.lines().collect();
        let count = lines
            .iter()
            .position(|line| *line == "  1/1 passed")
            .expect("category count line");
        let rule = "-".repeat(64);
        assert_eq!(lines[count - 1], rule);
        assert_eq!(lines[count + 1], rule);
    }

    #[test]
    fn verbose_shows_bit_patterns_for_failures() {
        let reports = vec![CategoryReport {
            category: ProbeCategory::RoundingMode,
            results: vec![result("above midpoint", false, Lane::ORIGIN)],
        }];
        let text = render(&reports, true);
        assert!(text.contains("expected == 0x4000000000000000"));
        assert!(text.contains("observed 0x4000000000000001"));
        assert!(text.contains("reason   probe_value_mismatch"));
    }
}
