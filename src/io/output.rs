use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::models::{GroupTheme, PersonalTheme};
use crate::stages::AnalysisReport;

impl AnalysisReport {
    /// Write the canonical report to a JSON file
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create file: {:?}", path))?;
        serde_json::to_writer_pretty(file, self).context("Failed to write JSON")?;
        Ok(())
    }
}

/// Markdown rendering of a report
pub struct MarkdownReport<'a> {
    report: &'a AnalysisReport,
}

impl<'a> MarkdownReport<'a> {
    pub fn new(report: &'a AnalysisReport) -> Self {
        Self { report }
    }

    pub fn format(&self) -> String {
        let report = self.report;
        let mut out = String::new();

        out.push_str("# IPA Analysis Report\n\n");
        out.push_str(&format!("- Run: `{}`\n", report.run_id));
        out.push_str(&format!("- Generated: {}\n", report.generated_at));
        out.push_str(&format!("- Model: {}\n", report.model));
        out.push_str(&format!(
            "- Participants analysed: {} ({} excluded)\n\n",
            report.participants.len(),
            report.failures.len()
        ));

        out.push_str("## Group Experiential Themes\n\n");
        for (i, theme) in report.group_themes.iter().enumerate() {
            format_group_theme_md(&mut out, i + 1, theme);
        }

        out.push_str("## Personal Experiential Themes\n\n");
        for analysis in &report.participants {
            out.push_str(&format!("### {}", analysis.participant));
            if let Some(source) = &analysis.source {
                out.push_str(&format!(" ({})", source));
            }
            out.push_str("\n\n");
            for theme in &analysis.personal_themes {
                format_personal_theme_md(&mut out, theme);
            }
        }

        if !report.failures.is_empty() {
            out.push_str("## Excluded Participants\n\n");
            for failure in &report.failures {
                out.push_str(&format!("- **{}**", failure.participant));
                if let Some(source) = &failure.source {
                    out.push_str(&format!(" ({})", source));
                }
                out.push_str(&format!(": {}\n", failure.reason));
            }
            out.push('\n');
        }

        out
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        write_text(path, &self.format())
    }
}

fn format_group_theme_md(out: &mut String, number: usize, theme: &GroupTheme) {
    out.push_str(&format!("### {}. {}\n\n", number, theme.theme_title));
    out.push_str(&format!("{}\n\n", theme.description));

    for (j, subtheme) in theme.subthemes.iter().enumerate() {
        out.push_str(&format!(
            "#### {}.{} {}\n\n",
            number,
            j + 1,
            subtheme.subtheme_title
        ));
        out.push_str(&format!("{}\n\n", subtheme.description));

        for contribution in &subtheme.participant_contributions {
            out.push_str(&format!("**{}**\n\n", contribution.participant_id));
            push_md_extracts(out, &contribution.extracts);
            push_md_list(out, "Analytic comments", &contribution.analytic_comments);
        }
    }
}

fn format_personal_theme_md(out: &mut String, theme: &PersonalTheme) {
    out.push_str(&format!("#### {}\n\n", theme.theme_title));
    out.push_str(&format!("{}\n\n", theme.description));
    push_md_extracts(out, &theme.extracts);
    push_md_list(out, "Analytic comments", &theme.analytic_comments);
}

fn push_md_extracts(out: &mut String, extracts: &[String]) {
    if extracts.is_empty() {
        return;
    }
    out.push_str("Extracts:\n\n");
    for extract in extracts {
        out.push_str(&format!("> {}\n>\n", extract.replace('\n', "\n> ")));
    }
    out.push('\n');
}

fn push_md_list(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("{}:\n\n", heading));
    for item in items {
        out.push_str(&format!("- {}\n", item));
    }
    out.push('\n');
}

/// Plain-text rendering of a report
pub struct TextReport<'a> {
    report: &'a AnalysisReport,
    width: usize,
}

impl<'a> TextReport<'a> {
    pub fn new(report: &'a AnalysisReport) -> Self {
        Self { report, width: 80 }
    }

    pub fn format(&self) -> String {
        let report = self.report;
        let mut out = String::new();

        out.push_str("IPA ANALYSIS REPORT\n");
        out.push_str("===================\n");
        out.push_str(&format!("Run: {}\n", report.run_id));
        out.push_str(&format!("Generated: {}\n", report.generated_at));
        out.push_str(&format!("Model: {}\n\n", report.model));

        out.push_str("GROUP EXPERIENTIAL THEMES\n");
        out.push_str("-------------------------\n\n");
        for (i, theme) in report.group_themes.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, theme.theme_title));
            self.push_wrapped(&mut out, &theme.description, 3);
            out.push('\n');

            for (j, subtheme) in theme.subthemes.iter().enumerate() {
                out.push_str(&format!("   {}.{} {}\n", i + 1, j + 1, subtheme.subtheme_title));
                self.push_wrapped(&mut out, &subtheme.description, 6);

                for contribution in &subtheme.participant_contributions {
                    out.push_str(&format!("      [{}]\n", contribution.participant_id));
                    for extract in &contribution.extracts {
                        self.push_wrapped(&mut out, &format!("\"{}\"", extract), 8);
                    }
                    for comment in &contribution.analytic_comments {
                        self.push_wrapped(&mut out, &format!("* {}", comment), 8);
                    }
                }
                out.push('\n');
            }
        }

        out.push_str("PERSONAL EXPERIENTIAL THEMES\n");
        out.push_str("----------------------------\n\n");
        for analysis in &report.participants {
            out.push_str(&format!("[{}]\n", analysis.participant));
            for theme in &analysis.personal_themes {
                out.push_str(&format!("   {}\n", theme.theme_title));
                self.push_wrapped(&mut out, &theme.description, 6);
                for extract in &theme.extracts {
                    self.push_wrapped(&mut out, &format!("\"{}\"", extract), 8);
                }
                for comment in &theme.analytic_comments {
                    self.push_wrapped(&mut out, &format!("* {}", comment), 8);
                }
            }
            out.push('\n');
        }

        if !report.failures.is_empty() {
            out.push_str("EXCLUDED PARTICIPANTS\n");
            out.push_str("---------------------\n\n");
            for failure in &report.failures {
                self.push_wrapped(&mut out, &format!("{}: {}", failure.participant, failure.reason), 0);
            }
        }

        out
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        write_text(path, &self.format())
    }

    fn push_wrapped(&self, out: &mut String, text: &str, indent: usize) {
        let pad = " ".repeat(indent);
        for line in wrap_text(text, self.width.saturating_sub(indent).max(20)).lines() {
            out.push_str(&pad);
            out.push_str(line);
            out.push('\n');
        }
    }
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create file: {:?}", path))?;
    write!(file, "{}", text)?;
    Ok(())
}

/// Wrap text at approximately the given width
fn wrap_text(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut line_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if line_len + word_len + 1 > width && line_len > 0 {
            result.push('\n');
            line_len = 0;
        }
        if line_len > 0 {
            result.push(' ');
            line_len += 1;
        }
        result.push_str(word);
        line_len += word_len;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ParticipantContribution, ParticipantId, Stage, StageResult, Subtheme};
    use crate::stages::{ParticipantAnalysis, ParticipantFailure};

    fn report() -> AnalysisReport {
        let personal = PersonalTheme {
            theme_title: "Fear of judgement".to_string(),
            description: "Anticipating criticism from colleagues".to_string(),
            extracts: vec!["they'd think I was weak".to_string()],
            analytic_comments: vec!["self as seen by others".to_string()],
        };

        AnalysisReport {
            run_id: "run-1".to_string(),
            generated_at: "2026-01-01T00:00:00Z".to_string(),
            model: "test-model".to_string(),
            participants: vec![ParticipantAnalysis {
                participant: ParticipantId::from_position(0),
                source: Some("p1.txt".to_string()),
                initial_notes: Default::default(),
                experiential_statements: vec!["hiding weakness".to_string()],
                personal_themes: vec![personal],
                history: vec![],
            }],
            failures: vec![ParticipantFailure {
                participant: ParticipantId::from_position(1),
                source: None,
                stage: Some(1),
                reason: "stage 1 (initial notes) failed for P2: model returned an empty response"
                    .to_string(),
                error: crate::error::PipelineError::InsufficientData { failures: vec![] },
                history: vec![],
            }],
            group_themes: vec![GroupTheme {
                theme_title: "Concealment".to_string(),
                description: "Hiding struggle at work".to_string(),
                subthemes: vec![Subtheme {
                    subtheme_title: "Masks".to_string(),
                    description: "Performing competence".to_string(),
                    participant_contributions: vec![ParticipantContribution {
                        participant_id: ParticipantId::from_position(0),
                        extracts: vec!["I put on a face".to_string()],
                        analytic_comments: vec!["dramaturgical self".to_string()],
                    }],
                }],
            }],
            group_result: StageResult::valid(Stage::GroupThemes, None, serde_json::Value::Null),
        }
    }

    const GROUP_FIELDS: [&str; 7] = [
        "Concealment",
        "Hiding struggle at work",
        "Masks",
        "Performing competence",
        "P1",
        "I put on a face",
        "dramaturgical self",
    ];

    #[test]
    fn test_markdown_contains_every_group_field() {
        let markdown = MarkdownReport::new(&report()).format();
        for field in GROUP_FIELDS {
            assert!(markdown.contains(field), "missing {:?}", field);
        }
        assert!(markdown.contains("### 1. Concealment"));
        assert!(markdown.contains("#### 1.1 Masks"));
        assert!(markdown.contains("### P1 (p1.txt)"));
        assert!(markdown.contains("## Excluded Participants"));
        assert!(markdown.contains("**P2**: stage 1"));
    }

    #[test]
    fn test_text_contains_every_group_field() {
        let text = TextReport::new(&report()).format();
        for field in GROUP_FIELDS {
            assert!(text.contains(field), "missing {:?}", field);
        }
        assert!(text.contains("      [P1]\n"));
        assert!(text.contains("EXCLUDED PARTICIPANTS"));
    }

    #[test]
    fn test_json_round_trips_group_themes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let original = report();

        original.write_json(&path).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let themes: Vec<GroupTheme> =
            serde_json::from_value(written["group_themes"].clone()).unwrap();
        assert_eq!(themes, original.group_themes);
        assert_eq!(written["failures"][0]["stage"], 1);
        assert!(written["failures"][0].get("error").is_none());
    }

    #[test]
    fn test_long_descriptions_wrap_under_their_heading() {
        let mut report = report();
        report.group_themes[0].description = "Participants described an ongoing effort to keep \
            their difficulties out of sight at work, rehearsing composure before meetings and \
            retreating to private spaces when the effort became too much to sustain"
            .to_string();

        let text = TextReport::new(&report).format();
        let lines: Vec<&str> = text.lines().collect();
        let heading = lines.iter().position(|l| *l == "1. Concealment").unwrap();
        let description: Vec<&str> = lines[heading + 1..]
            .iter()
            .take_while(|l| !l.is_empty())
            .copied()
            .collect();

        assert!(description.len() > 1);
        for line in &description {
            assert!(line.starts_with("   ") && !line.starts_with("    "));
            assert!(line.chars().count() <= 80, "too wide: {:?}", line);
        }
        let rejoined: Vec<&str> = description.iter().map(|l| l.trim()).collect();
        assert_eq!(
            rejoined.join(" "),
            report.group_themes[0]
                .description
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        );
    }
}
