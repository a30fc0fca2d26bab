//! Generator descriptors and the catalog that resolves them.
//!
//! A descriptor is the registered adapter between a live frame and its
//! neutral snapshot record: a factory to mint a fresh instance plus typed
//! accessors for the program-counter state, the current yield, the
//! optional receiver, and each named argument and hoisted local. The
//! snapshot engine never reasons about a frame's layout directly; the
//! registry is the sole source of truth.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::builtin::{DelayFrame, ParallelFrame};
use crate::frame::Frame;
use crate::identity::MethodId;
use crate::snapshot::{FrameSnapshot, SnapshotError};
use crate::Value;

/// Errors from descriptor registration.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The method id is already bound.
    #[error("descriptor already registered for {method}")]
    DuplicateDescriptor {
        /// The contested identifier.
        method: MethodId,
    },
    /// The frame type is already bound under another id.
    #[error("frame type of {method} is already registered as {existing}")]
    DuplicateType {
        /// The identifier being registered.
        method: MethodId,
        /// The identifier already bound to the type.
        existing: MethodId,
    },
    /// A builder was finished without a required piece.
    #[error("descriptor for {method} is missing its {missing}")]
    IncompleteDescriptor {
        /// The identifier being built.
        method: MethodId,
        /// Which piece was absent.
        missing: &'static str,
    },
}

struct Accessor<T> {
    get: Box<dyn Fn(&dyn Any) -> Result<T, SnapshotError>>,
    set: Box<dyn Fn(&mut dyn Any, T) -> Result<(), SnapshotError>>,
}

fn downcast_ref<'a, G: 'static>(
    any: &'a dyn Any,
    method: &MethodId,
) -> Result<&'a G, SnapshotError> {
    any.downcast_ref::<G>()
        .ok_or_else(|| SnapshotError::IllegalState {
            what: format!("frame is not an instance of `{method}`"),
        })
}

fn downcast_mut<'a, G: 'static>(
    any: &'a mut dyn Any,
    method: &MethodId,
) -> Result<&'a mut G, SnapshotError> {
    any.downcast_mut::<G>()
        .ok_or_else(|| SnapshotError::IllegalState {
            what: format!("frame is not an instance of `{method}`"),
        })
}

/// Registered adapter for one generator method.
pub struct GeneratorDescriptor {
    method: MethodId,
    type_id: TypeId,
    factory: Box<dyn Fn() -> Box<dyn Frame>>,
    state: Accessor<i32>,
    current: Option<Accessor<Option<Value>>>,
    receiver: Option<Accessor<Option<Value>>>,
    args: BTreeMap<String, Accessor<Value>>,
    locals: BTreeMap<String, Accessor<Value>>,
}

impl std::fmt::Debug for GeneratorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorDescriptor")
            .field("method", &self.method)
            .field("type_id", &self.type_id)
            .finish_non_exhaustive()
    }
}

impl GeneratorDescriptor {
    /// Start building a descriptor for the concrete frame type `G`.
    #[must_use]
    pub fn builder<G: Frame>(method: MethodId) -> DescriptorBuilder<G> {
        DescriptorBuilder::new(method)
    }

    /// The registered identifier.
    #[must_use]
    pub fn method(&self) -> &MethodId {
        &self.method
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Read a live frame's resumable state into a snapshot record.
    ///
    /// # Errors
    ///
    /// Fails when the frame is not an instance of this descriptor's type
    /// or a field does not encode.
    pub fn introspect(&self, frame: &dyn Frame) -> Result<FrameSnapshot, SnapshotError> {
        let any = frame.as_any();
        let mut args = BTreeMap::new();
        for (name, accessor) in &self.args {
            args.insert(name.clone(), (accessor.get)(any)?);
        }
        let mut locals = BTreeMap::new();
        for (name, accessor) in &self.locals {
            locals.insert(name.clone(), (accessor.get)(any)?);
        }
        Ok(FrameSnapshot {
            method: self.method.clone(),
            state: (self.state.get)(any)?,
            current: match &self.current {
                Some(accessor) => (accessor.get)(any)?,
                None => None,
            },
            receiver: match &self.receiver {
                Some(accessor) => (accessor.get)(any)?,
                None => None,
            },
            args,
            locals,
        })
    }

    /// Mint a fresh frame seeded with the captured record.
    ///
    /// Unknown arg/local keys are silently dropped unless `strict`; keys
    /// the record omits keep the factory's defaults.
    ///
    /// # Errors
    ///
    /// `SchemaMismatch` in strict mode for unknown keys; codec errors when
    /// a captured value does not decode into its field.
    pub fn instantiate(
        &self,
        snapshot: &FrameSnapshot,
        strict: bool,
    ) -> Result<Box<dyn Frame>, SnapshotError> {
        let mut frame = (self.factory)();
        {
            let any = frame.as_any_mut();
            (self.state.set)(any, snapshot.state)?;
            if let Some(accessor) = &self.current {
                (accessor.set)(any, snapshot.current.clone())?;
            }
            if let Some(accessor) = &self.receiver {
                (accessor.set)(any, snapshot.receiver.clone())?;
            }
            for (name, value) in &snapshot.args {
                match self.args.get(name) {
                    Some(accessor) => (accessor.set)(any, value.clone())?,
                    None if strict => {
                        return Err(SnapshotError::SchemaMismatch {
                            method: self.method.clone(),
                            key: name.clone(),
                        })
                    }
                    None => {}
                }
            }
            for (name, value) in &snapshot.locals {
                match self.locals.get(name) {
                    Some(accessor) => (accessor.set)(any, value.clone())?,
                    None if strict => {
                        return Err(SnapshotError::SchemaMismatch {
                            method: self.method.clone(),
                            key: name.clone(),
                        })
                    }
                    None => {}
                }
            }
        }
        Ok(frame)
    }
}

/// Typed builder for a [`GeneratorDescriptor`].
///
/// Getter/setter pairs are plain `fn` pointers over the concrete frame
/// type; the builder erases them over `dyn Any` and routes values through
/// the serde codec.
pub struct DescriptorBuilder<G> {
    method: MethodId,
    factory: Option<Box<dyn Fn() -> Box<dyn Frame>>>,
    state: Option<Accessor<i32>>,
    current: Option<Accessor<Option<Value>>>,
    receiver: Option<Accessor<Option<Value>>>,
    args: BTreeMap<String, Accessor<Value>>,
    locals: BTreeMap<String, Accessor<Value>>,
    _marker: PhantomData<fn() -> G>,
}

impl<G: Frame> DescriptorBuilder<G> {
    /// Start a builder for `G` under the given identifier.
    #[must_use]
    pub fn new(method: MethodId) -> Self {
        Self {
            method,
            factory: None,
            state: None,
            current: None,
            receiver: None,
            args: BTreeMap::new(),
            locals: BTreeMap::new(),
            _marker: PhantomData,
        }
    }

    /// The zero-state constructor.
    #[must_use]
    pub fn factory(mut self, make: impl Fn() -> G + 'static) -> Self {
        self.factory = Some(Box::new(move || Box::new(make())));
        self
    }

    /// Accessors for the program-counter state number.
    #[must_use]
    pub fn state(mut self, get: fn(&G) -> i32, set: fn(&mut G, i32)) -> Self {
        let get_method = self.method.clone();
        let set_method = self.method.clone();
        self.state = Some(Accessor {
            get: Box::new(move |any| Ok(get(downcast_ref::<G>(any, &get_method)?))),
            set: Box::new(move |any, state| {
                set(downcast_mut::<G>(any, &set_method)?, state);
                Ok(())
            }),
        });
        self
    }

    /// Accessors for the current yielded value.
    #[must_use]
    pub fn current(mut self, get: fn(&G) -> Option<Value>, set: fn(&mut G, Option<Value>)) -> Self {
        self.current = Some(self.opt_value_accessor(get, set));
        self
    }

    /// Accessors for the capturing receiver, if the method has one.
    #[must_use]
    pub fn receiver(
        mut self,
        get: fn(&G) -> Option<Value>,
        set: fn(&mut G, Option<Value>),
    ) -> Self {
        self.receiver = Some(self.opt_value_accessor(get, set));
        self
    }

    /// Accessors for a named argument.
    #[must_use]
    pub fn arg<T>(mut self, name: impl Into<String>, get: fn(&G) -> T, set: fn(&mut G, T)) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        let accessor = self.value_accessor(get, set);
        self.args.insert(name.into(), accessor);
        self
    }

    /// Accessors for a named hoisted local.
    #[must_use]
    pub fn local<T>(mut self, name: impl Into<String>, get: fn(&G) -> T, set: fn(&mut G, T)) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        let accessor = self.value_accessor(get, set);
        self.locals.insert(name.into(), accessor);
        self
    }

    /// A hoisted local whose accessors are fallible and already
    /// value-typed. Used where capture legality depends on frame state.
    pub(crate) fn local_raw(
        mut self,
        name: impl Into<String>,
        get: impl Fn(&G) -> Result<Value, SnapshotError> + 'static,
        set: impl Fn(&mut G, Value) -> Result<(), SnapshotError> + 'static,
    ) -> Self {
        let get_method = self.method.clone();
        let set_method = self.method.clone();
        self.locals.insert(
            name.into(),
            Accessor {
                get: Box::new(move |any| get(downcast_ref::<G>(any, &get_method)?)),
                set: Box::new(move |any, value| set(downcast_mut::<G>(any, &set_method)?, value)),
            },
        );
        self
    }

    /// Finish the descriptor.
    ///
    /// # Errors
    ///
    /// `IncompleteDescriptor` when the factory or state accessors were
    /// never supplied.
    pub fn build(self) -> Result<GeneratorDescriptor, RegistryError> {
        let factory = self.factory.ok_or_else(|| RegistryError::IncompleteDescriptor {
            method: self.method.clone(),
            missing: "factory",
        })?;
        let state = self.state.ok_or_else(|| RegistryError::IncompleteDescriptor {
            method: self.method.clone(),
            missing: "state accessors",
        })?;
        Ok(GeneratorDescriptor {
            method: self.method,
            type_id: TypeId::of::<G>(),
            factory,
            state,
            current: self.current,
            receiver: self.receiver,
            args: self.args,
            locals: self.locals,
        })
    }

    fn value_accessor<T>(&self, get: fn(&G) -> T, set: fn(&mut G, T)) -> Accessor<Value>
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        let get_method = self.method.clone();
        let set_method = self.method.clone();
        Accessor {
            get: Box::new(move |any| {
                Ok(serde_json::to_value(get(downcast_ref::<G>(
                    any,
                    &get_method,
                )?))?)
            }),
            set: Box::new(move |any, value| {
                let frame = downcast_mut::<G>(any, &set_method)?;
                set(frame, serde_json::from_value(value)?);
                Ok(())
            }),
        }
    }

    fn opt_value_accessor(
        &self,
        get: fn(&G) -> Option<Value>,
        set: fn(&mut G, Option<Value>),
    ) -> Accessor<Option<Value>> {
        let get_method = self.method.clone();
        let set_method = self.method.clone();
        Accessor {
            get: Box::new(move |any| Ok(get(downcast_ref::<G>(any, &get_method)?))),
            set: Box::new(move |any, value| {
                set(downcast_mut::<G>(any, &set_method)?, value);
                Ok(())
            }),
        }
    }
}

/// Catalog of generator descriptors keyed by method id.
pub struct GeneratorRegistry {
    by_method: BTreeMap<MethodId, GeneratorDescriptor>,
    by_type: HashMap<TypeId, MethodId>,
}

impl GeneratorRegistry {
    /// A registry pre-seeded with the built-in delay and parallel
    /// descriptors, so whole executors round-trip out of the box.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            by_method: BTreeMap::new(),
            by_type: HashMap::new(),
        };
        registry
            .register(DelayFrame::descriptor())
            .expect("builtin delay descriptor registers into an empty catalog");
        registry
            .register(ParallelFrame::descriptor())
            .expect("builtin parallel descriptor registers into an empty catalog");
        registry
    }

    /// Bind a descriptor.
    ///
    /// # Errors
    ///
    /// `DuplicateDescriptor` when the id is taken, `DuplicateType` when
    /// the concrete frame type is already bound under another id.
    pub fn register(&mut self, descriptor: GeneratorDescriptor) -> Result<(), RegistryError> {
        if self.by_method.contains_key(&descriptor.method) {
            return Err(RegistryError::DuplicateDescriptor {
                method: descriptor.method,
            });
        }
        if let Some(existing) = self.by_type.get(&descriptor.type_id()) {
            return Err(RegistryError::DuplicateType {
                method: descriptor.method,
                existing: existing.clone(),
            });
        }
        self.by_type
            .insert(descriptor.type_id(), descriptor.method.clone());
        self.by_method.insert(descriptor.method.clone(), descriptor);
        Ok(())
    }

    /// Resolve a descriptor by id.
    ///
    /// # Errors
    ///
    /// `UnknownGenerator` when the id is unbound.
    pub fn lookup(&self, method: &MethodId) -> Result<&GeneratorDescriptor, SnapshotError> {
        self.by_method
            .get(method)
            .ok_or_else(|| SnapshotError::UnknownGenerator {
                method: method.clone(),
            })
    }

    /// Resolve the descriptor for a live frame by its concrete type.
    ///
    /// # Errors
    ///
    /// `UnknownType` when the frame's type was never registered.
    pub fn lookup_frame(&self, frame: &dyn Frame) -> Result<&GeneratorDescriptor, SnapshotError> {
        let type_id = frame.as_any().type_id();
        let method = self
            .by_type
            .get(&type_id)
            .ok_or_else(|| SnapshotError::UnknownType {
                type_name: format!("{type_id:?}"),
            })?;
        self.lookup(method)
    }

    /// Whether an id is bound.
    #[must_use]
    pub fn contains(&self, method: &MethodId) -> bool {
        self.by_method.contains_key(method)
    }

    /// Number of registered descriptors, built-ins included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_method.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_method.is_empty()
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{CoroutineAction, Step};
    use crate::coroutine::Fault;
    use crate::frame::StepContext;
    use assert_matches::assert_matches;

    #[derive(Default)]
    struct Counter {
        state: i32,
        limit: i32,
    }

    impl Frame for Counter {
        fn resume(&mut self, _cx: &mut StepContext<'_>) -> Result<Step, Fault> {
            if self.state < self.limit {
                self.state += 1;
                Ok(Step::Yield(CoroutineAction::Pass))
            } else {
                Ok(Step::Complete)
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn counter_descriptor() -> GeneratorDescriptor {
        GeneratorDescriptor::builder::<Counter>(MethodId::new("tests", "counter"))
            .factory(Counter::default)
            .state(|g| g.state, |g, s| g.state = s)
            .arg("limit", |g| g.limit, |g, v| g.limit = v)
            .build()
            .unwrap()
    }

    #[test]
    fn register_rejects_duplicate_id() {
        let mut registry = GeneratorRegistry::new();
        registry.register(counter_descriptor()).unwrap();
        assert_matches!(
            registry.register(counter_descriptor()),
            Err(RegistryError::DuplicateDescriptor { .. })
        );
    }

    #[test]
    fn lookup_unknown_id_fails() {
        let registry = GeneratorRegistry::new();
        assert_matches!(
            registry.lookup(&MethodId::global("missing")),
            Err(SnapshotError::UnknownGenerator { .. })
        );
    }

    #[test]
    fn builder_requires_factory_and_state() {
        let result = GeneratorDescriptor::builder::<Counter>(MethodId::global("partial")).build();
        assert_matches!(
            result,
            Err(RegistryError::IncompleteDescriptor {
                missing: "factory",
                ..
            })
        );
    }

    #[test]
    fn introspect_reads_registered_fields() {
        let mut registry = GeneratorRegistry::new();
        registry.register(counter_descriptor()).unwrap();

        let mut counter = Counter { state: 0, limit: 3 };
        let mut cx = StepContext::detached();
        counter.resume(&mut cx).unwrap();

        let descriptor = registry.lookup_frame(&counter).unwrap();
        let snapshot = descriptor.introspect(&counter).unwrap();
        assert_eq!(snapshot.state, 1);
        assert_eq!(snapshot.args["limit"], serde_json::json!(3));
    }
}
