//! The engine instance: a single worker serializing every state change

pub mod engine;
pub mod error;
pub mod worker;


pub use engine::{EngineBuilder, EngineHandle};
pub use error::{EngineError, Result};
pub use worker::{ChangeEffect, SearchView};
