use jverify::jvm::class_graph::{ClassGraph, ClassGraphArenas, DeclaredClass};
use jverify::jvm::verifier::{verify_class, MethodOutcome, VerifierSettings};
use jverify::jvm::*;

use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;
use std::process;

fn main() {
    let matches = Command::new("JVM bytecode verifier")
        .version(clap::crate_version!())
        .about("Check that the methods in JVM class files are type-safe")
        .arg(
            Arg::new("trace")
                .long("trace")
                .action(ArgAction::SetTrue)
                .help("Log the inferred state before every instruction"),
        )
        .arg(
            Arg::new("CLASS_FILE")
                .help("Class files to verify (loaded together, so they can refer to each other)")
                .required(true)
                .num_args(1..)
                .value_parser(value_parser!(PathBuf)),
        )
        .get_matches();

    let settings = VerifierSettings {
        trace_states: matches.get_flag("trace"),
    };
    let default_level = if settings.trace_states { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let paths: Vec<&PathBuf> = matches
        .get_many::<PathBuf>("CLASS_FILE")
        .map(|paths| paths.collect())
        .unwrap_or_default();

    // Load everything up front, since the class graph needs every superclass
    let mut failed = false;
    let mut classes = vec![];
    for path in paths {
        log::info!("Reading '{}'", path.display());
        match ClassFile::load_from_path(path) {
            Ok(class_file) => classes.push((path, class_file)),
            Err(err) => {
                log::error!("Failed to load '{}': {}", path.display(), err);
                failed = true;
            }
        }
    }

    let class_graph_arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&class_graph_arenas);
    class_graph.insert_java_library_types();
    let mut declared = vec![];
    for (path, class_file) in &classes {
        match DeclaredClass::from_class_file(class_file) {
            Ok(class) => declared.push(class),
            Err(err) => {
                log::error!("Malformed class '{}': {}", path.display(), err);
                failed = true;
            }
        }
    }
    class_graph.insert_declared_classes(&declared);

    let mut accepted = 0;
    let mut rejected = 0;
    let mut skipped = 0;
    for (path, class_file) in &classes {
        let verdict = match verify_class(class_file, &class_graph, &settings) {
            Ok(verdict) => verdict,
            Err(err) => {
                log::error!("Malformed class '{}': {}", path.display(), err);
                failed = true;
                continue;
            }
        };
        for method in &verdict.methods {
            match &method.outcome {
                MethodOutcome::Accepted => accepted += 1,
                MethodOutcome::Skipped => skipped += 1,
                MethodOutcome::Rejected(err) => {
                    rejected += 1;
                    println!(
                        "{}.{}{} at {}: {}",
                        verdict.class, method.name, method.descriptor, err.position, err.kind
                    );
                }
            }
        }
    }

    println!(
        "{} classes: {} methods accepted, {} rejected, {} skipped",
        classes.len(),
        accepted,
        rejected,
        skipped
    );
    if failed || rejected > 0 {
        process::exit(1);
    }
}
