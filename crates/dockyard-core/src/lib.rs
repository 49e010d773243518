//! Dockyard Core
//!
//! スタック定義（dockyard.kdl）のパース、環境変数の解決、
//! ハードニングプロファイルの適用、実行トポロジーの組み立てを提供します。

pub mod discovery;
pub mod env;
pub mod error;
pub mod hardening;
pub mod loader;
pub mod model;
pub mod parser;
pub mod topology;

pub use discovery::*;
pub use env::{ConfigurationSet, EnvMap, ResolvedValue, Source};
pub use error::{Result, StackError};
pub use loader::*;
pub use model::*;
pub use parser::{parse_stack_file, parse_stack_string};
pub use topology::*;
