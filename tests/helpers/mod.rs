//! Shared test generators and their descriptors.

use std::any::Any;

use serde_json::json;
use torpor::{
    CoroutineAction, Fault, Frame, GeneratorDescriptor, GeneratorRegistry, MethodId, Step,
    StepContext, Value,
};

/// Deterministic seed for property-test reproducibility.
pub const SEED: [u8; 32] = [
    0x74, 0x6F, 0x72, 0x70, 0x6F, 0x72, 0x53, 0x6E, // "torporSn"
    0x61, 0x70, 0x73, 0x68, 0x6F, 0x74, 0x53, 0x75, // "apshotSu"
    0x69, 0x74, 0x65, 0x56, 0x31, 0x52, 0x75, 0x73, // "iteV1Rus"
    0x74, 0x52, 0x54, 0x30, 0x31, 0x32, 0x33, 0x34, // "tRT01234"
];

/// Yields 1, then 2, then completes.
#[derive(Default)]
pub struct YieldOnly {
    pub state: i32,
    pub current: Option<Value>,
}

impl YieldOnly {
    fn emit(&mut self, value: i64) -> Result<Step, Fault> {
        self.state += 1;
        let value = json!(value);
        self.current = Some(value.clone());
        Ok(Step::Yield(CoroutineAction::Value(value)))
    }
}

impl Frame for YieldOnly {
    fn resume(&mut self, _cx: &mut StepContext<'_>) -> Result<Step, Fault> {
        match self.state {
            0 => self.emit(1),
            1 => self.emit(2),
            _ => {
                self.current = None;
                Ok(Step::Complete)
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub fn yield_only_descriptor() -> GeneratorDescriptor {
    GeneratorDescriptor::builder::<YieldOnly>(MethodId::new("scenarios", "yield_only"))
        .factory(YieldOnly::default)
        .state(|g| g.state, |g, s| g.state = s)
        .current(|g| g.current.clone(), |g, c| g.current = c)
        .build()
        .unwrap()
}

/// `r := 1; yield r; r *= 3; yield r; r *= 4; yield r`.
#[derive(Default)]
pub struct YieldWithVar {
    pub state: i32,
    pub current: Option<Value>,
    pub r: i64,
}

impl Frame for YieldWithVar {
    fn resume(&mut self, _cx: &mut StepContext<'_>) -> Result<Step, Fault> {
        match self.state {
            0 => self.r = 1,
            1 => self.r *= 3,
            2 => self.r *= 4,
            _ => {
                self.current = None;
                return Ok(Step::Complete);
            }
        }
        self.state += 1;
        let value = json!(self.r);
        self.current = Some(value.clone());
        Ok(Step::Yield(CoroutineAction::Value(value)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub fn yield_with_var_descriptor() -> GeneratorDescriptor {
    GeneratorDescriptor::builder::<YieldWithVar>(MethodId::new("scenarios", "yield_with_var"))
        .factory(YieldWithVar::default)
        .state(|g| g.state, |g, s| g.state = s)
        .current(|g| g.current.clone(), |g, c| g.current = c)
        .local("r", |g| g.r, |g, r| g.r = r)
        .build()
        .unwrap()
}

/// Same body as [`YieldWithVar`] but seeded from an argument.
#[derive(Default)]
pub struct YieldWithVarAndArg {
    pub state: i32,
    pub current: Option<Value>,
    pub start: i64,
    pub r: i64,
}

impl YieldWithVarAndArg {
    pub fn new(start: i64) -> Self {
        Self {
            start,
            ..Self::default()
        }
    }
}

impl Frame for YieldWithVarAndArg {
    fn resume(&mut self, _cx: &mut StepContext<'_>) -> Result<Step, Fault> {
        match self.state {
            0 => self.r = self.start,
            1 => self.r *= 3,
            2 => self.r *= 4,
            _ => {
                self.current = None;
                return Ok(Step::Complete);
            }
        }
        self.state += 1;
        let value = json!(self.r);
        self.current = Some(value.clone());
        Ok(Step::Yield(CoroutineAction::Value(value)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub fn yield_with_var_and_arg_descriptor() -> GeneratorDescriptor {
    GeneratorDescriptor::builder::<YieldWithVarAndArg>(MethodId::new(
        "scenarios",
        "yield_with_var_and_arg",
    ))
    .factory(YieldWithVarAndArg::default)
    .state(|g| g.state, |g, s| g.state = s)
    .current(|g| g.current.clone(), |g, c| g.current = c)
    .arg("start", |g| g.start, |g, v| g.start = v)
    .local("r", |g| g.r, |g, r| g.r = r)
    .build()
    .unwrap()
}

/// Faults on its first resume.
pub struct Failing {
    pub message: &'static str,
}

impl Frame for Failing {
    fn resume(&mut self, _cx: &mut StepContext<'_>) -> Result<Step, Fault> {
        Err(Fault::from(self.message))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Ticks down from a captured host counter, standing in for a generator
/// method declared on an instance.
#[derive(Default)]
pub struct CountsForHost {
    pub state: i32,
    pub current: Option<Value>,
    pub host: Option<Value>,
    pub left: i64,
}

impl CountsForHost {
    pub fn new(host: Value, left: i64) -> Self {
        Self {
            host: Some(host),
            left,
            ..Self::default()
        }
    }
}

impl Frame for CountsForHost {
    fn resume(&mut self, _cx: &mut StepContext<'_>) -> Result<Step, Fault> {
        if self.state == 0 {
            self.state = 1;
        }
        if self.left == 0 {
            self.current = None;
            return Ok(Step::Complete);
        }
        self.left -= 1;
        let value = json!(self.left);
        self.current = Some(value.clone());
        Ok(Step::Yield(CoroutineAction::Value(value)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub fn counts_for_host_descriptor() -> GeneratorDescriptor {
    GeneratorDescriptor::builder::<CountsForHost>(MethodId::of_type::<CountsForHost>())
        .factory(CountsForHost::default)
        .state(|g| g.state, |g, s| g.state = s)
        .current(|g| g.current.clone(), |g, c| g.current = c)
        .receiver(|g| g.host.clone(), |g, h| g.host = h)
        .local("left", |g| g.left, |g, v| g.left = v)
        .build()
        .unwrap()
}

/// A registry with every scenario generator plus the built-ins.
pub fn registry() -> GeneratorRegistry {
    let mut registry = GeneratorRegistry::new();
    registry.register(yield_only_descriptor()).unwrap();
    registry.register(yield_with_var_descriptor()).unwrap();
    registry
        .register(yield_with_var_and_arg_descriptor())
        .unwrap();
    registry.register(counts_for_host_descriptor()).unwrap();
    registry
}

/// Advance a frame one step outside any executor.
pub fn advance(frame: &mut dyn Frame) -> Step {
    let mut cx = StepContext::detached();
    frame.resume(&mut cx).expect("scenario frames do not fault")
}

/// The value yielded by a step, panicking on anything else.
pub fn yielded_value(step: Step) -> Value {
    match step {
        Step::Yield(CoroutineAction::Value(value)) => value,
        other => panic!("expected a raw value yield, got {other:?}"),
    }
}
