//! Message dispatch runtime: one-shot sends and the scheduled batch runner.

pub mod batch;

pub use batch::BatchDispatcher;
