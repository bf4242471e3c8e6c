use std::{error::Error, fs, sync::Arc};

use clap::{arg, command, value_parser};
use sketch_synth::{sketches_from_json, Engine, SynthesisConfig, TieBreak, TypeIndex};

const DIVIDER: &str = "// ----------------------------------------";

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let defaults = SynthesisConfig::default();
    let matches = command!()
        .arg(arg!(<source> "Java source containing one evidence hole"))
        .arg(arg!(<sketches> "Path to the candidate sketches json file"))
        .arg(
            arg!(--index <FILE> "Path to the type index json file")
                .default_value("tests/java-index.json"),
        )
        .arg(
            arg!(--"max-programs" <N> "Maximum number of distinct programs")
                .required(false)
                .value_parser(value_parser!(usize)),
        )
        .arg(
            arg!(--seed <S> "Shuffle equally ranked candidates with this seed")
                .required(false)
                .value_parser(value_parser!(u64)),
        )
        .arg(
            arg!(--"max-arg-depth" <D> "Deepest nesting of searched arguments")
                .required(false)
                .value_parser(value_parser!(usize)),
        )
        .arg(
            arg!(--"max-compose" <L> "Longest method chain composed from a variable")
                .required(false)
                .value_parser(value_parser!(usize)),
        )
        .get_matches();

    let config = SynthesisConfig {
        max_programs: *matches
            .get_one::<usize>("max-programs")
            .unwrap_or(&defaults.max_programs),
        max_argument_depth: *matches
            .get_one::<usize>("max-arg-depth")
            .unwrap_or(&defaults.max_argument_depth),
        max_compose_length: *matches
            .get_one::<usize>("max-compose")
            .unwrap_or(&defaults.max_compose_length),
        tie_break: match matches.get_one::<u64>("seed") {
            Some(seed) => TieBreak::Seeded(*seed),
            None => TieBreak::Deterministic,
        },
        ..defaults
    };

    let index_path = matches.get_one::<String>("index").ok_or("missing --index")?;
    let source_path = matches.get_one::<String>("source").ok_or("missing source")?;
    let sketches_path = matches.get_one::<String>("sketches").ok_or("missing sketches")?;

    let index = TypeIndex::from_json_file(index_path)?;
    let source = fs::read_to_string(source_path)?;
    let candidates = sketches_from_json(&fs::read_to_string(sketches_path)?)?;
    log::info!("{} candidate sketches", candidates.len());

    let engine = Engine::new(Arc::new(index), config);
    let output = engine.run_batch(&source, &candidates)?;
    for (i, program) in output.programs.iter().enumerate() {
        if i > 0 {
            println!("{}", DIVIDER);
        }
        print!("{}", program);
    }
    eprintln!(
        "{} programs, {} candidates rejected",
        output.programs.len(),
        output.rejected
    );
    Ok(())
}
