use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use super::*;

type TestContext<'p> = PipelineContext<'p, String, String, ()>;

struct Echo {
    tag: &'static str,
    consume: bool,
    calls: Arc<AtomicUsize>,
}

impl Processor<String, String, ()> for Echo {
    fn process(&self, input: &String, ctx: &mut TestContext<'_>) -> Result<(), CodecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ctx.collect(format!("{}:{input}", self.tag));
        if self.consume {
            ctx.mark_as_consumed();
        }
        Ok(())
    }
}

/// Accepts only inputs starting with `prefix`.
struct Prefixed {
    prefix: &'static str,
    calls: Arc<AtomicUsize>,
}

impl Processor<String, String, ()> for Prefixed {
    fn accepts(&self, input: &String) -> bool {
        input.starts_with(self.prefix)
    }

    fn process(&self, input: &String, ctx: &mut TestContext<'_>) -> Result<(), CodecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ctx.collect(input.to_uppercase());
        ctx.mark_as_consumed();
        Ok(())
    }
}

/// Renders `rich:x` as `<`, then whatever `x` becomes, then `>`.
struct Unwrap;

impl Processor<String, String, ()> for Unwrap {
    fn accepts(&self, input: &String) -> bool {
        input.starts_with("rich:")
    }

    fn process(&self, input: &String, ctx: &mut TestContext<'_>) -> Result<(), CodecError> {
        ctx.collect("<".to_string());
        ctx.process_also(input.trim_start_matches("rich:").to_string())?;
        ctx.collect(">".to_string());
        ctx.mark_as_consumed();
        Ok(())
    }
}

struct Forever;

impl Processor<String, String, ()> for Forever {
    fn process(&self, input: &String, ctx: &mut TestContext<'_>) -> Result<(), CodecError> {
        ctx.process_also(format!("{input}+"))
    }
}

fn registered(
    priority: u32,
    origin: &'static str,
    processor: impl Processor<String, String, ()> + 'static,
) -> Registered<dyn Processor<String, String, ()>> {
    Registered {
        priority,
        origin,
        processor: Box::new(processor),
    }
}

fn echo(tag: &'static str, consume: bool) -> (Echo, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    (
        Echo {
            tag,
            consume,
            calls: calls.clone(),
        },
        calls,
    )
}

#[test]
fn orders_by_descending_priority_across_the_whole_range() {
    let priorities = [0, 1, 20_000, i32::MAX as u32, 1 << 31, u32::MAX];
    let processors = priorities
        .iter()
        .map(|priority| registered(*priority, "p", echo("e", false).0))
        .collect();
    let pipeline = Pipeline::new(processors);

    let order: Vec<u32> = pipeline.order().into_iter().map(|(_, p)| p).collect();
    assert_eq!(order, vec![u32::MAX, 1 << 31, i32::MAX as u32, 20_000, 1, 0]);
}

#[test]
fn equal_priorities_keep_registration_order() {
    let pipeline = Pipeline::new(vec![
        registered(5, "first", echo("a", false).0),
        registered(9, "high", echo("h", false).0),
        registered(5, "second", echo("b", false).0),
    ]);

    let result = pipeline.process(&"x".to_string(), &()).expect("process");
    assert_eq!(result.outputs, vec!["h:x", "a:x", "b:x"]);
    assert!(!result.consumed);
}

#[test]
fn consumed_input_is_not_offered_to_lower_priorities() {
    let (high, high_calls) = echo("high", true);
    let (low, low_calls) = echo("low", true);
    let pipeline = Pipeline::new(vec![registered(1, "low", low), registered(2, "high", high)]);

    let result = pipeline.process(&"x".to_string(), &()).expect("process");

    assert_eq!(result.outputs, vec!["high:x"]);
    assert!(result.consumed);
    assert_eq!(high_calls.load(Ordering::SeqCst), 1);
    assert_eq!(low_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn guarded_processors_are_skipped_without_invocation() {
    let face_calls = Arc::new(AtomicUsize::new(0));
    let text_calls = Arc::new(AtomicUsize::new(0));
    let pipeline = Pipeline::new(vec![
        registered(
            1,
            "face",
            Prefixed {
                prefix: "face",
                calls: face_calls.clone(),
            },
        ),
        registered(
            1,
            "text",
            Prefixed {
                prefix: "text",
                calls: text_calls.clone(),
            },
        ),
    ]);

    let inputs = ["text-a", "face-1", "text-b"].map(String::from);
    let outputs = pipeline.process_all(inputs.iter(), &()).expect("process");

    assert_eq!(outputs, vec!["TEXT-A", "FACE-1", "TEXT-B"]);
    assert_eq!(face_calls.load(Ordering::SeqCst), 1);
    assert_eq!(text_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn cascaded_outputs_keep_their_position() {
    let pipeline = Pipeline::new(vec![
        registered(10, "rich", Unwrap),
        registered(
            1,
            "text",
            Prefixed {
                prefix: "t",
                calls: Arc::new(AtomicUsize::new(0)),
            },
        ),
    ]);

    let result = pipeline
        .process(&"rich:text".to_string(), &())
        .expect("process");
    assert_eq!(result.outputs, vec!["<", "TEXT", ">"]);
}

#[test]
fn unbounded_cascade_is_an_error() {
    let pipeline = Pipeline::new(vec![registered(1, "forever", Forever)]);
    let err = pipeline
        .process(&"x".to_string(), &())
        .expect_err("cascade must be bounded");
    assert!(matches!(err, CodecError::CascadeTooDeep { depth, .. } if depth == MAX_CASCADE_DEPTH + 1));
}
