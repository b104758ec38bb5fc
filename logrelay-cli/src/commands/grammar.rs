//! `logrelay grammar` command handler

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use logrelay_core::config::RelayConfig;
use logrelay_core::event::Event;
use logrelay_pipeline::classifier::presets;
use logrelay_pipeline::{Grammar, LineClassifier, LineDecoder, SourcePipelineConfig};

use crate::cli::{GrammarAction, GrammarArgs, GrammarTestArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `grammar` command.
pub async fn execute(
    args: GrammarArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        GrammarAction::List => writer.render(&list()?),
        GrammarAction::Test(test_args) => {
            let report = classify_lines(&test_args, config_path).await?;
            writer.render(&report)
        }
    }
}

/// Every built-in preset with its rule count.
pub fn list() -> Result<GrammarListReport, CliError> {
    let grammars = presets::preset_names()
        .iter()
        .map(|name| {
            let grammar = Grammar::preset(name)?;
            Ok(GrammarEntry {
                name: (*name).to_owned(),
                rules: grammar.rules().len(),
                speaker_heuristic: grammar.heuristic().is_enabled(),
                strips_color_codes: grammar.strips_color_codes(),
            })
        })
        .collect::<Result<Vec<_>, CliError>>()?;
    Ok(GrammarListReport { grammars })
}

/// Classifies the requested lines in order, sharing one session table
/// so id-only lines resolve the way they would in the daemon.
pub async fn classify_lines(
    args: &GrammarTestArgs,
    config_path: &Path,
) -> Result<GrammarTestReport, CliError> {
    let grammar = resolve_grammar(args, config_path).await?;
    info!(grammar = %grammar.name(), "testing grammar");

    let mut lines: Vec<String> = args.lines.clone();
    if let Some(log) = &args.log {
        let bytes = tokio::fs::read(log).await?;
        lines.extend(split_log(&bytes));
    }
    if lines.is_empty() {
        return Err(CliError::Command(
            "nothing to classify, pass --line or --log".to_owned(),
        ));
    }

    let grammar_name = grammar.name().to_owned();
    let mut classifier = LineClassifier::new(Arc::new(grammar));
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut results = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let event = classifier.classify(line);
        *counts.entry(event.kind().as_str().to_owned()).or_default() += 1;
        if event.is_deliverable() || args.show_unmatched {
            results.push(LineResult {
                line_no: index + 1,
                line: line.clone(),
                event,
            });
        }
    }

    Ok(GrammarTestReport {
        grammar: grammar_name,
        total_lines: lines.len(),
        counts,
        results,
    })
}

async fn resolve_grammar(args: &GrammarTestArgs, config_path: &Path) -> Result<Grammar, CliError> {
    if let Some(name) = &args.source {
        let config = RelayConfig::load(config_path).await?;
        let source = config
            .sources
            .iter()
            .find(|s| &s.name == name)
            .ok_or_else(|| CliError::Command(format!("unknown source: {name}")))?;
        let runtime = SourcePipelineConfig::from_core(source, &config.general);
        return Ok(runtime.load_grammar().await?);
    }
    if let Some(file) = &args.file {
        return Ok(Grammar::load_file(file).await?);
    }
    let preset = args.preset.as_deref().unwrap_or("armagetron");
    Ok(Grammar::preset(preset)?)
}

/// Splits a whole log file into cleaned lines, detecting UTF-16LE the
/// same way the tail follower does. A trailing partial line is kept.
pub fn split_log(bytes: &[u8]) -> Vec<String> {
    let mut decoder = LineDecoder::new();
    let sample_len = bytes.len().min(4096);
    let encoding = decoder.observe_sample(&bytes[..sample_len]);

    let mut rest = bytes;
    if encoding.unit_len() == 2 && rest.starts_with(&[0xFF, 0xFE]) {
        rest = &rest[2..];
    } else if rest.starts_with(&[0xEF, 0xBB, 0xBF]) {
        rest = &rest[3..];
    }

    let mut lines = Vec::new();
    while !rest.is_empty() {
        let end = decoder.find_line_end(rest).unwrap_or(rest.len());
        let line = decoder.decode_line(&rest[..end]);
        if !line.is_empty() {
            lines.push(line);
        }
        rest = &rest[end..];
    }
    lines
}

#[derive(Debug, Serialize)]
pub struct GrammarEntry {
    pub name: String,
    pub rules: usize,
    pub speaker_heuristic: bool,
    pub strips_color_codes: bool,
}

#[derive(Debug, Serialize)]
pub struct GrammarListReport {
    pub grammars: Vec<GrammarEntry>,
}

impl Render for GrammarListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "{:<16} {:>5}  {:<9} {}",
            "PRESET".bold(),
            "RULES".bold(),
            "SPEAKER".bold(),
            "COLOR CODES".bold()
        )?;
        for g in &self.grammars {
            writeln!(
                w,
                "{:<16} {:>5}  {:<9} {}",
                g.name,
                g.rules,
                if g.speaker_heuristic { "filtered" } else { "-" },
                if g.strips_color_codes { "stripped" } else { "-" }
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct LineResult {
    pub line_no: usize,
    pub line: String,
    pub event: Event,
}

#[derive(Debug, Serialize)]
pub struct GrammarTestReport {
    pub grammar: String,
    pub total_lines: usize,
    /// Lines per event kind
    pub counts: BTreeMap<String, usize>,
    pub results: Vec<LineResult>,
}

impl GrammarTestReport {
    pub fn count(&self, kind: &str) -> usize {
        self.counts.get(kind).copied().unwrap_or(0)
    }
}

impl Render for GrammarTestReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Grammar: {}", self.grammar.bold())?;
        for r in &self.results {
            let described = match &r.event {
                Event::Join { name, ip, .. } => match ip {
                    Some(ip) => format!("{} {} ({ip})", "JOIN ".green(), name),
                    None => format!("{} {}", "JOIN ".green(), name),
                },
                Event::Leave { name, .. } => format!("{} {}", "LEAVE".red(), name),
                Event::Chat { name, message, .. } => {
                    format!("{} {}: {}", "CHAT ".cyan(), name, message)
                }
                Event::Unmatched => format!("{}", "-    ".dimmed()),
            };
            writeln!(w, "{:>5}  {}  <- {}", r.line_no, described, r.line.dimmed())?;
        }
        writeln!(w)?;
        let summary: Vec<String> = self.counts.iter().map(|(k, v)| format!("{k}={v}")).collect();
        writeln!(w, "{} lines: {}", self.total_lines, summary.join(" "))
    }
}
