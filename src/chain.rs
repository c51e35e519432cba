//! Pipeline construction: right-to-left chaining with optional debug taps.
//!
//! A pipeline is one composite [`Stage`] whose links are wired at build
//! time: stage *i*'s downstream is stage *i + 1*, and the first stage is
//! the externally visible head. Construction walks the definitions in
//! reverse so every downstream is fully live before the stage in front of
//! it is instantiated; nothing is rewired afterwards.
//!
//! # Example
//!
//! ```rust,ignore
//! let pipe = PipelineBuilder::new()
//!     .stage(parse)
//!     .stage(normalize)
//!     .stage(store)
//!     .build()?;
//!
//! let result = pipe.deliver(record)?;
//! ```

use std::fmt;
use std::rc::Rc;

use crate::errors::BuildError;
use crate::stage::{Delivery, Process, Stage, StageDef, INTERNAL_NAMES, TAP_NAME};
use crate::value::Shared;

type Render<T> = Rc<dyn Fn(&Shared<T>) -> String>;

/// Builder for linear pipelines.
///
/// Definitions are chained in the order they are added. A live stage —
/// including the head of another pipeline — can be added wherever a
/// definition is accepted, which is how pipelines nest.
pub struct PipelineBuilder<T> {
    defs: Vec<StageDef<T>>,
    render: Option<Render<T>>,
}

impl<T: 'static> PipelineBuilder<T> {
    /// Create a new empty pipeline builder.
    pub fn new() -> Self {
        Self {
            defs: Vec::new(),
            render: None,
        }
    }

    /// Append a stage definition to the chain.
    pub fn stage(mut self, def: impl Into<StageDef<T>>) -> Self {
        self.defs.push(def.into());
        self
    }

    /// Apply `f` when `condition` holds; otherwise this is a no-op.
    ///
    /// Useful for optional wiring like a debug flag:
    ///
    /// ```rust,ignore
    /// let pipe = PipelineBuilder::new()
    ///     .stage(parse)
    ///     .when(args.debug, |builder| builder.debug())
    ///     .build()?;
    /// ```
    pub fn when<F>(self, condition: bool, f: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        if condition {
            f(self)
        } else {
            self
        }
    }

    /// Interpose a debug tap around every link.
    ///
    /// Taps record the value about to be sent into each stage and the value
    /// received back, via `log::debug!`; they never alter what flows
    /// through, so returned values are identical with and without taps.
    pub fn debug(mut self) -> Self
    where
        T: fmt::Debug,
    {
        self.render = Some(Rc::new(|value: &Shared<T>| format!("{:?}", value.borrow())));
        self
    }

    /// Wire the chain right-to-left and return its head.
    ///
    /// Fails fast on an empty builder; the head of an empty chain would
    /// have nothing to deliver to.
    pub fn build(self) -> Result<Stage<T>, BuildError> {
        let mut head: Option<Stage<T>> = None;
        for def in self.defs.iter().rev() {
            let name = def.name();
            let mut downstream = head.take();
            if let Some(render) = &self.render {
                if let Some(next) = downstream.take() {
                    downstream = Some(tap(name.clone(), next, Rc::clone(render)));
                }
            }
            let built = def.build(downstream);
            head = Some(match &self.render {
                Some(render) => tap(name, built, Rc::clone(render)),
                None => built,
            });
        }
        let head = head.ok_or(BuildError::EmptyPipeline)?;
        log::debug!(target: "pipework::chain", "pipeline built: {} stages", self.defs.len());
        Ok(head)
    }
}

impl<T: 'static> Default for PipelineBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a pipeline from definitions, in declaration order.
pub fn pipeline<T, I>(defs: I) -> Result<Stage<T>, BuildError>
where
    T: 'static,
    I: IntoIterator<Item = StageDef<T>>,
{
    defs.into_iter()
        .fold(PipelineBuilder::new(), |builder, def| builder.stage(def))
        .build()
}

fn tap<T: 'static>(label: String, downstream: Stage<T>, render: Render<T>) -> Stage<T> {
    Stage::primed(TAP_NAME, Box::new(Tap {
        label,
        downstream,
        render,
    }))
}

/// Transparent diagnostic wrapper: records what crosses the boundary of
/// the stage it is labeled with, then delegates unchanged.
///
/// Taps labeled with infrastructure names (other taps, forwarding
/// adapters) stay silent so nested pipelines do not trace themselves.
struct Tap<T> {
    label: String,
    downstream: Stage<T>,
    render: Render<T>,
}

impl<T: 'static> Process<T> for Tap<T> {
    fn resume(&mut self, input: Shared<T>) -> Delivery<T> {
        let loud = !INTERNAL_NAMES.contains(&self.label.as_str());
        if loud {
            log::debug!(
                target: "pipework::trace",
                "sending into '{}': {}",
                self.label,
                (self.render)(&input)
            );
        }
        let output = self.downstream.deliver(input)?;
        if loud {
            match &output {
                Some(value) => log::debug!(
                    target: "pipework::trace",
                    "received from '{}': {}",
                    self.label,
                    (self.render)(value)
                ),
                None => log::debug!(
                    target: "pipework::trace",
                    "received from '{}': <no result>",
                    self.label
                ),
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::stage;

    fn push(label: &'static str) -> StageDef<Vec<&'static str>> {
        stage(label, move || {
            move |input: Shared<Vec<&'static str>>| {
                input.borrow_mut().push(label);
                input
            }
        })
    }

    #[test]
    fn test_chain_runs_stages_in_declared_order() {
        let pipe = PipelineBuilder::new()
            .stage(push("one"))
            .stage(push("two"))
            .stage(push("three"))
            .build()
            .unwrap();

        let result = pipe.deliver(Shared::new(vec![])).unwrap().unwrap();
        assert_eq!(*result.borrow(), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_empty_builder_fails_at_build_time() {
        let err = PipelineBuilder::<Vec<&'static str>>::new().build().unwrap_err();
        assert_eq!(err, BuildError::EmptyPipeline);
    }

    #[test]
    fn test_debug_taps_do_not_alter_values() {
        let plain = pipeline([push("a"), push("b")]).unwrap();
        let tapped = PipelineBuilder::new()
            .stage(push("a"))
            .stage(push("b"))
            .debug()
            .build()
            .unwrap();

        let from_plain = plain.deliver(Shared::new(vec![])).unwrap().unwrap();
        let from_tapped = tapped.deliver(Shared::new(vec![])).unwrap().unwrap();
        assert_eq!(*from_plain.borrow(), *from_tapped.borrow());
    }

    #[test]
    fn test_caller_handle_sees_in_place_mutation() {
        let pipe = pipeline([push("seen")]).unwrap();
        let data = Shared::new(vec![]);
        let result = pipe.deliver(data.clone()).unwrap().unwrap();
        assert!(result.ptr_eq(&data));
        assert_eq!(*data.borrow(), vec!["seen"]);
    }

    #[test]
    fn test_nested_pipeline_preserves_call_order() {
        let inner = pipeline([push("one"), push("two")]).unwrap();
        let outer = PipelineBuilder::new()
            .stage(inner)
            .stage(push("three"))
            .build()
            .unwrap();

        let result = outer.deliver(Shared::new(vec![])).unwrap().unwrap();
        assert_eq!(*result.borrow(), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_when_applies_conditionally() {
        let with_extra = PipelineBuilder::new()
            .stage(push("base"))
            .when(true, |builder| builder.stage(push("extra")))
            .build()
            .unwrap();
        let without_extra = PipelineBuilder::new()
            .stage(push("base"))
            .when(false, |builder| builder.stage(push("extra")))
            .build()
            .unwrap();

        let a = with_extra.deliver(Shared::new(vec![])).unwrap().unwrap();
        let b = without_extra.deliver(Shared::new(vec![])).unwrap().unwrap();
        assert_eq!(*a.borrow(), vec!["base", "extra"]);
        assert_eq!(*b.borrow(), vec!["base"]);
    }
}
