//! Regression harness for a C compiler: runs corpus test programs through the
//! compiler under test and checks their output against recorded expectations.

pub mod adapter;
pub mod config;
pub mod exec;
pub mod exports;
pub mod golden;
pub mod normalize;
pub mod report;
pub mod runner;
pub mod task;

pub use adapter::{compile_isolated, CompileFault};
pub use config::{ConfigFile, HarnessConfig, TraceFlags};
pub use exports::{ExportLookup, NmExports, PackageExports};
pub use golden::{golden_file_name, GoldenLog, GoldenMode};
pub use report::{CaseFailure, FailureKind, Reporter, RunReport, RunTally};
pub use runner::{ComplianceRunner, TestCase};
pub use task::{CaptureBuf, CompilerTask, ExternalCompiler, TaskCrash, TaskFactory, TaskStream};
