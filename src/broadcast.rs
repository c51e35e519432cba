//! Fan-out delivery to an ordered group of independent stages.
//!
//! A broadcast group is one composite [`Stage`] that, on each delivery,
//! hands the input to every registered member in registration order and
//! discards each member's result. The group itself reports no result.
//!
//! # Aliasing
//!
//! Without copy mode every member receives a handle to the *same* value:
//! if one member mutates it in place, later members in the same delivery
//! — and the caller — observe the mutation. That sharing is part of the
//! contract, not an accident; enable [`BroadcastBuilder::copy`] to give
//! each member an isolated duplicate instead.

use std::rc::Rc;

use crate::stage::{Delivery, Process, Stage, StageDef};
use crate::value::Shared;

/// Pluggable duplication strategy for copy mode. Must produce a fully
/// value-independent duplicate.
pub type CopyFn<T> = Rc<dyn Fn(&Shared<T>) -> Shared<T>>;

/// Builder for broadcast groups.
pub struct BroadcastBuilder<T> {
    members: Vec<StageDef<T>>,
    copy: Option<CopyFn<T>>,
}

impl<T: 'static> BroadcastBuilder<T> {
    /// Create a new empty broadcast builder.
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
            copy: None,
        }
    }

    /// Register a member.
    ///
    /// A factory definition is instantiated fresh on every delivery, so its
    /// processing state never persists between deliveries. Register a live
    /// stage instead when state should carry across deliveries.
    pub fn stage(mut self, member: impl Into<StageDef<T>>) -> Self {
        self.members.push(member.into());
        self
    }

    /// Isolate each member's view of the input by deep-copying it.
    pub fn copy(self) -> Self
    where
        T: Clone,
    {
        self.copy_with(Shared::deep_copy)
    }

    /// Isolate each member's view of the input with a custom duplication
    /// strategy.
    pub fn copy_with(mut self, copy_fn: impl Fn(&Shared<T>) -> Shared<T> + 'static) -> Self {
        self.copy = Some(Rc::new(copy_fn));
        self
    }

    /// Build the group's head stage.
    ///
    /// An empty group is legal; delivering to it is a no-op.
    pub fn build(self) -> Stage<T> {
        Stage::primed(
            "broadcast",
            Box::new(Fanout {
                members: self.members,
                copy: self.copy,
            }),
        )
    }
}

impl<T: 'static> Default for BroadcastBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a broadcast group from members, in registration order.
pub fn broadcast<T, I>(members: I) -> Stage<T>
where
    T: 'static,
    I: IntoIterator<Item = StageDef<T>>,
{
    members
        .into_iter()
        .fold(BroadcastBuilder::new(), |builder, member| builder.stage(member))
        .build()
}

struct Fanout<T> {
    members: Vec<StageDef<T>>,
    copy: Option<CopyFn<T>>,
}

impl<T: 'static> Process<T> for Fanout<T> {
    fn resume(&mut self, input: Shared<T>) -> Delivery<T> {
        for member in &self.members {
            let target = member.build(None);
            let value = match &self.copy {
                Some(copy_fn) => copy_fn(&input),
                None => input.clone(),
            };
            // Member results are discarded; member errors are not.
            target.deliver(value)?;
        }
        Ok(None)
    }
}
