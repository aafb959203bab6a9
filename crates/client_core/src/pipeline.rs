//! Priority-ordered processor pipelines used by the message codec.
//!
//! A pipeline offers one input at a time to its processors, highest priority
//! first. A processor may emit outputs, resubmit a derived input into the same
//! run, and mark the input consumed, after which no later processor sees it.

use std::{cmp::Reverse, fmt::Debug};

use tracing::debug;

use crate::error::CodecError;

/// Cascades deeper than this are treated as a processor bug.
pub const MAX_CASCADE_DEPTH: usize = 8;

pub trait Processor<I, O, A>: Send + Sync {
    /// Cheap guard checked before [`Processor::process`] is invoked.
    fn accepts(&self, _input: &I) -> bool {
        true
    }

    fn process(&self, input: &I, ctx: &mut PipelineContext<'_, I, O, A>) -> Result<(), CodecError>;
}

pub struct Registered<P: ?Sized> {
    pub priority: u32,
    pub origin: &'static str,
    pub processor: Box<P>,
}

pub struct Pipeline<I, O, A> {
    processors: Vec<Registered<dyn Processor<I, O, A>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult<O> {
    pub outputs: Vec<O>,
    pub consumed: bool,
}

pub struct PipelineContext<'p, I, O, A> {
    pipeline: &'p Pipeline<I, O, A>,
    attributes: &'p A,
    collected: Vec<O>,
    consumed: bool,
    depth: usize,
}

impl<'p, I: Debug, O, A> PipelineContext<'p, I, O, A> {
    pub fn attributes(&self) -> &'p A {
        self.attributes
    }

    pub fn collect(&mut self, output: O) {
        self.collected.push(output);
    }

    pub fn collect_all(&mut self, outputs: impl IntoIterator<Item = O>) {
        self.collected.extend(outputs);
    }

    pub fn mark_as_consumed(&mut self) {
        self.consumed = true;
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Runs `input` through the same pipeline and keeps its outputs in place.
    pub fn process_also(&mut self, input: I) -> Result<(), CodecError> {
        let result = self.pipeline.run_one(&input, self.attributes, self.depth + 1)?;
        self.collected.extend(result.outputs);
        Ok(())
    }

    /// Runs `input` through the same pipeline without collecting the outputs.
    pub fn process_detached(&self, input: &I) -> Result<ProcessResult<O>, CodecError> {
        self.pipeline.run_one(input, self.attributes, self.depth + 1)
    }
}

impl<I: Debug, O, A> Pipeline<I, O, A> {
    /// Sorts by descending priority; equal priorities keep registration order.
    pub fn new(mut processors: Vec<Registered<dyn Processor<I, O, A>>>) -> Self {
        processors.sort_by_key(|registered| Reverse(registered.priority));
        Self { processors }
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// `(origin, priority)` in execution order.
    pub fn order(&self) -> Vec<(&'static str, u32)> {
        self.processors
            .iter()
            .map(|registered| (registered.origin, registered.priority))
            .collect()
    }

    pub fn process(&self, input: &I, attributes: &A) -> Result<ProcessResult<O>, CodecError> {
        self.run_one(input, attributes, 0)
    }

    /// Processes every input in order. Unconsumed inputs contribute nothing.
    pub fn process_all<'a>(
        &self,
        inputs: impl IntoIterator<Item = &'a I>,
        attributes: &A,
    ) -> Result<Vec<O>, CodecError>
    where
        I: 'a,
    {
        let mut outputs = Vec::new();
        for input in inputs {
            let result = self.run_one(input, attributes, 0)?;
            if !result.consumed {
                debug!(input = ?input, "codec: input not consumed by any processor");
            }
            outputs.extend(result.outputs);
        }
        Ok(outputs)
    }

    fn run_one(&self, input: &I, attributes: &A, depth: usize) -> Result<ProcessResult<O>, CodecError> {
        if depth > MAX_CASCADE_DEPTH {
            return Err(CodecError::CascadeTooDeep {
                depth,
                element: format!("{input:?}"),
            });
        }
        let mut ctx = PipelineContext {
            pipeline: self,
            attributes,
            collected: Vec::new(),
            consumed: false,
            depth,
        };
        for registered in &self.processors {
            if ctx.consumed {
                break;
            }
            if !registered.processor.accepts(input) {
                continue;
            }
            registered.processor.process(input, &mut ctx)?;
        }
        Ok(ProcessResult {
            outputs: ctx.collected,
            consumed: ctx.consumed,
        })
    }
}

#[cfg(test)]
#[path = "tests/pipeline_tests.rs"]
mod tests;
