//=====================================================
// File: lib.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: OhScript library root
// Objective: Declare the engine layers and re-export the embedding surface
//=====================================================

pub mod analyzer;
pub mod ast;
pub mod config;
pub mod engine;
pub mod forest;
pub mod interop;
pub mod interpreter;
pub mod parser;
pub mod symbol;
pub mod tokenizer;

pub use config::EngineOptions;
pub use engine::{Engine, Environment, InterfaceShape, ScriptBuilder, ScriptProxy};
pub use forest::{Forest, ForestBuilder, LinkError};
pub use interop::{
    Bindings, FitBroker, HostClass, HostError, HostList, HostMap, HostObject, HostValue, HttpMethod,
};
pub use interpreter::{ErrorCode, OhPanic, PanicCode, ScriptError, Value};
pub use parser::parse;

//=====================================================
// End of file
//=====================================================
