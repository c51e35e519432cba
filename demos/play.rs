//! Three keyed stages chained with debug taps.
//!
//! Run with `cargo run --example play` — the taps trace every value
//! crossing a stage boundary at debug level.

use anyhow::Result;
use pipework::{stage, PipelineBuilder, Shared, StageDef};
use serde_json::{json, Value};

fn keyed(name: &'static str) -> StageDef<Value> {
    stage(name, move || {
        move |input: Shared<Value>| {
            input.borrow_mut()[name] = json!(name);
            input
        }
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    let pipe = PipelineBuilder::new()
        .stage(keyed("one"))
        .stage(keyed("two"))
        .stage(keyed("three"))
        .debug()
        .build()?;

    let data = Shared::new(json!({}));
    let output = pipe.deliver(data)?;

    println!("{}", "*".repeat(30));
    println!("output {:?}", output);
    Ok(())
}
