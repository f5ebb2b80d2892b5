#![doc = include_str!("../../../README.md")]

mod builtins;
pub mod callsite;
mod config;
mod descriptor;
pub mod dispatch;
mod exception;
mod function;
pub mod hash;
mod host;
mod operation_set;
mod registry;
pub mod resolver;
mod runtime;
mod slot;
pub mod tracer;
mod types;
mod value;

pub use crate::{
    callsite::{BinaryOp, CallSite, GetAttr, InPlaceOp, Invoke, RichCompare, SiteKind, UnaryOp},
    config::{DEFAULT_MAX_GUARD_CHAIN, DEFAULT_MAX_RESULT_BYTES, MAX_INHERITANCE_DEPTH, MAX_MRO_LENGTH, RuntimeConfig},
    descriptor::{DescriptorKind, Deleter, GetSetDescriptor, Getter, Property, Setter},
    dispatch::{
        BinaryPlan, Comparison, Step,
        grid::{BinaryFn, BinaryGrid, GridBuilder},
    },
    exception::{ExcType, RunError, RunResult, SimpleException},
    function::{BoundMethod, Function, FunctionBody},
    host::{BuiltinHost, HostClass, HostKey, Shape},
    operation_set::OperationSet,
    registry::{ClassRegistry, Registration, Representation, RepresentationKind},
    runtime::Runtime,
    slot::{NativeFn, Slot, SlotHandle, SlotTable, native_fn},
    tracer::{
        DispatchPath, DispatchTracer, NoopTracer, ProfilingReport, ProfilingTracer, RecordingTracer, StderrTracer,
        TraceEvent,
    },
    types::{LongInt, TypeFlags, TypeObject, TypeRef, TypeSpec, TypeSpecHost},
    value::{AttrMap, DictMode, Instance, NativeObject, Value},
};
