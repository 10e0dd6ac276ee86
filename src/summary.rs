use std::collections::HashMap;
use std::io::{Result, Write};

use crate::report::Report;

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    /// Reason token and how often it was given, most common first.
    pub reasons: Vec<(String, usize)>,
    pub totals: Vec<(String, f64)>,
}

pub fn summarize(report: &Report) -> Summary {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut totals = Vec::new();
    for (id, student) in report {
        for deductions in student.all_deductions() {
            for reason in &deductions.reasons {
                *counts.entry(reason.to_string()).or_default() += 1;
            }
        }
        totals.push((id.clone(), student.total()));
    }

    let mut reasons: Vec<(String, usize)> = counts.into_iter().collect();
    reasons.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Summary { reasons, totals }
}

pub fn write_summary<W: Write>(summary: &Summary, out: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(["reason", "count"])?;
    for (reason, count) in &summary.reasons {
        wtr.write_record([reason.clone(), count.to_string()])?;
    }
    wtr.write_record(["student", "total"])?;
    for (student, total) in &summary.totals {
        wtr.write_record([student.clone(), total.to_string()])?;
    }
    wtr.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"{
        "ghost": {"repo_results": {"deductions": {"value": 100, "reasons": ["missing_repo"]}}},
        "alice": {
            "repo_results": {"deductions": {"value": 1, "reasons": ["no_repo_gitignore"]}},
            "w1": {
                "structure_results": {"deductions": {"value": 1.5, "reasons": ["no_readme", "extra_code_files"]}},
                "a.sh": {"stdout": "", "linterout": "", "deductions": {"value": 1, "reasons": ["timeout"]}, "other": {"exectime_s": 1.0}},
                "b.sh": {"stdout": "", "linterout": "", "deductions": {"value": 1, "reasons": ["timeout"]}, "other": {}}
            },
            "w2": {"structure_results": {"deductions": {"value": 100, "reasons": ["no_folder"]}, "fatal": true}}
        }
    }"#;

    #[test]
    fn reasons_are_counted_across_every_level() {
        let report: Report = serde_json::from_str(REPORT).unwrap();
        let summary = summarize(&report);
        assert_eq!(
            summary.reasons,
            vec![
                ("timeout".to_string(), 2),
                ("extra_code_files".to_string(), 1),
                ("missing_repo".to_string(), 1),
                ("no_folder".to_string(), 1),
                ("no_readme".to_string(), 1),
                ("no_repo_gitignore".to_string(), 1),
            ]
        );
        assert_eq!(summary.totals, vec![("ghost".to_string(), 100.0), ("alice".to_string(), 104.5)]);
    }

    #[test]
    fn summary_is_written_as_csv() {
        let report: Report = serde_json::from_str(REPORT).unwrap();
        let mut out = Vec::new();
        write_summary(&summarize(&report), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("reason,count\ntimeout,2\n"));
        assert!(text.ends_with("student,total\nghost,100\nalice,104.5\n"));
    }
}
