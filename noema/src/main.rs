// Copyright 2024 The Noema Authors

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! One-shot driver for the Noema engine: load a theory file, run a goal,
//! print the result. The reasoning itself lives in `noema-lib`; this
//! binary is file and terminal glue.

use clap::{arg, crate_version, Arg, Command};
use codespan_reporting::{
    diagnostic::Diagnostic,
    files::SimpleFile,
    term::{
        self,
        termcolor::{ColorChoice, StandardStream},
        Config,
    },
};
use colored::Colorize;
use ptree::{write_tree, TreeBuilder};
use std::fs;
use std::path::Path;

use noema_lib::reasoner::{ProveOptions, QueryOptions};
use noema_lib::session::{Session, SessionConfig};
use noema_lib::{ParseError, ProveResult, QueryResult, ReasoningPriority};

fn read_file_or_exit(path: &str) -> SimpleFile<String, String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            eprintln!("Error reading {}: {}", path, err);
            std::process::exit(1);
        }
    };
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());
    SimpleFile::new(name, content)
}

fn report_learn_errors(file: &SimpleFile<String, String>, errors: &[String]) {
    let writer = StandardStream::stderr(ColorChoice::Auto);
    let config = Config::default();
    for error in errors {
        // errors carry "line L:C: message" from the parser; anything else
        // is reported without a label
        let diagnostic = match parse_error_parts(error) {
            Some(parse_error) => parse_error.to_diagnostic(file.source()),
            None => Diagnostic::error().with_message(error.clone()),
        };
        let _ = term::emit(&mut writer.lock(), &config, file, &diagnostic);
    }
}

fn parse_error_parts(text: &str) -> Option<ParseError> {
    let rest = text.strip_prefix("line ")?;
    let (position, message) = rest.split_once(": ")?;
    let (line, column) = position.split_once(':')?;
    Some(ParseError {
        line: line.parse().ok()?,
        column: column.parse().ok()?,
        message: message.to_string(),
    })
}

fn session_from_flags(matches: &clap::ArgMatches) -> Session {
    let mut config = SessionConfig::default();
    if let Some(strategy) = matches.value_of("STRATEGY") {
        config.hdc_strategy = strategy.to_string();
    }
    if let Some(geometry) = matches.value_of("GEOMETRY") {
        match geometry.parse() {
            Ok(geometry) => config.geometry = geometry,
            Err(_) => {
                eprintln!("Invalid geometry: {}", geometry);
                std::process::exit(1);
            }
        }
    }
    if matches.is_present("HOLOGRAPHIC") {
        config.reasoning_priority = ReasoningPriority::Holographic;
    }
    if matches.is_present("CWA") {
        config.closed_world_assumption = true;
    }
    match Session::new(config) {
        Ok(session) => session,
        Err(err) => {
            eprintln!("{}: {}", "configuration error".red(), err);
            std::process::exit(1);
        }
    }
}

fn learn_or_exit(session: &mut Session, file: &SimpleFile<String, String>) {
    let outcome = session.learn(file.source());
    if !outcome.success {
        report_learn_errors(file, &outcome.errors);
        std::process::exit(1);
    }
    for warning in &outcome.warnings {
        eprintln!("{}: {}", "warning".yellow(), warning);
    }
}

fn print_prove(result: &ProveResult, goal: &str, session: &Session, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(result).unwrap_or_default()
        );
        return;
    }
    let verdict = if result.valid {
        "valid".green().bold()
    } else {
        "not derivable".red().bold()
    };
    println!("{} — {}", verdict, session.describe_prove(result, goal));
    if !result.steps.is_empty() {
        let mut builder = TreeBuilder::new(format!("proof ({})", result.method));
        for step in &result.steps {
            let label = match (&step.fact, &step.conclusion) {
                (Some(fact), _) => format!("{}: {}", step.rule, fact),
                (None, Some(conclusion)) => format!("{}: {}", step.rule, conclusion),
                _ => step.rule.clone(),
            };
            builder.add_empty_child(label);
        }
        let tree = builder.build();
        let _ = write_tree(&tree, std::io::stdout());
    }
}

fn print_query(result: &QueryResult, goal: &str, session: &Session, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(result).unwrap_or_default()
        );
        return;
    }
    println!("{}", session.describe_query(result, goal));
    for m in &result.all_results {
        let rendered: Vec<String> = m
            .bindings
            .iter()
            .map(|(name, binding)| {
                format!(
                    "{} = {}",
                    name,
                    noema_lib::answer_of(binding).unwrap_or("_")
                )
            })
            .collect();
        println!("  {}", rendered.join(", "));
    }
}

fn main() {
    let matches = Command::new("noema")
        .version(crate_version!())
        .about("A neuro-symbolic entailment engine over typed triples")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("STRATEGY")
                .long("strategy")
                .global(true)
                .takes_value(true)
                .help("HDC strategy id (default: dense-binary)"),
        )
        .arg(
            Arg::new("GEOMETRY")
                .long("geometry")
                .global(true)
                .takes_value(true)
                .help("Vector geometry (default: 1024)"),
        )
        .arg(
            Arg::new("HOLOGRAPHIC")
                .long("holographic")
                .global(true)
                .help("Try vector retrieval before symbolic search"),
        )
        .arg(
            Arg::new("CWA")
                .long("closed-world")
                .global(true)
                .help("Treat unprovable goals as false under negation"),
        )
        .arg(
            Arg::new("JSON")
                .long("json")
                .global(true)
                .help("Print the raw result JSON"),
        )
        .subcommand(
            Command::new("prove")
                .about("Prove a goal against a theory file.")
                .arg(arg!(<FILE> "The theory file"))
                .arg(arg!(<GOAL> "The goal DSL")),
        )
        .subcommand(
            Command::new("query")
                .about("Enumerate variable bindings for a goal.")
                .arg(arg!(<FILE> "The theory file"))
                .arg(arg!(<GOAL> "The goal DSL, with ?x variables")),
        )
        .subcommand(
            Command::new("check")
                .about("Parse and load a theory file, reporting errors.")
                .arg(arg!(<FILE> "The theory file")),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("prove", sub)) => {
            let file = read_file_or_exit(sub.value_of("FILE").unwrap());
            let goal = sub.value_of("GOAL").unwrap();
            let mut session = session_from_flags(sub);
            learn_or_exit(&mut session, &file);
            let result = session.prove(goal, &ProveOptions::default());
            print_prove(&result, goal, &session, sub.is_present("JSON"));
            std::process::exit(if result.valid { 0 } else { 2 });
        }
        Some(("query", sub)) => {
            let file = read_file_or_exit(sub.value_of("FILE").unwrap());
            let goal = sub.value_of("GOAL").unwrap();
            let mut session = session_from_flags(sub);
            learn_or_exit(&mut session, &file);
            let result = session.query(goal, &QueryOptions::default());
            print_query(&result, goal, &session, sub.is_present("JSON"));
            std::process::exit(if result.success { 0 } else { 2 });
        }
        Some(("check", sub)) => {
            let file = read_file_or_exit(sub.value_of("FILE").unwrap());
            let mut session = session_from_flags(sub);
            let outcome = session.learn(file.source());
            if outcome.success {
                println!(
                    "{}: {} facts, {} rules",
                    "ok".green(),
                    outcome.facts,
                    session.rules().len()
                );
            } else {
                report_learn_errors(&file, &outcome.errors);
                std::process::exit(1);
            }
        }
        _ => unreachable!("subcommand is required"),
    }
}
