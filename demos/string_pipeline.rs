//! String-cleaning pipeline: strips character sets, then uppercases.
//!
//! `cargo run --example string_pipeline -- --debug` turns the taps on.

use anyhow::Result;
use clap::Parser;
use pipework::{stage, PipelineBuilder, Shared, StageDef};

type Batch = Vec<String>;

#[derive(Parser)]
#[command(about = "Clean and uppercase a batch of strings")]
struct Args {
    /// Trace every value crossing a stage boundary.
    #[arg(long)]
    debug: bool,
}

fn remove_chars(name: &'static str, chars: &'static [char]) -> StageDef<Batch> {
    stage(name, move || {
        move |input: Shared<Batch>| {
            for line in input.borrow_mut().iter_mut() {
                line.retain(|c| !chars.contains(&c));
            }
            input
        }
    })
}

fn uppercase() -> StageDef<Batch> {
    stage("uppercase", || {
        |input: Shared<Batch>| {
            for line in input.borrow_mut().iter_mut() {
                *line = line.to_uppercase();
            }
            input
        }
    })
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let pipe = PipelineBuilder::new()
        .stage(remove_chars("punctuation", &['*', ',', '!']))
        .stage(remove_chars("whitespace", &[' ', '\n', '\t']))
        .stage(uppercase())
        .when(args.debug, |builder| builder.debug())
        .build()?;

    let batch = Shared::new(vec![
        "some, strings!".to_string(),
        "another *string*".to_string(),
    ]);

    match pipe.deliver(batch)? {
        Some(cleaned) => {
            for line in cleaned.borrow().iter() {
                println!("{line}");
            }
        }
        None => println!("pipeline produced no output"),
    }
    Ok(())
}
